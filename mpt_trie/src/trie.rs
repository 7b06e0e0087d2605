//! Definitions for the core types [`MerklePatriciaTrie`] and [`Node`].

use std::fmt::{self, Debug};

use enum_as_inner::EnumAsInner;
use ethereum_types::H256;
use log::trace;
use parking_lot::RwLock;

use crate::{
    nibbles::Nibbles,
    proof::Proof,
    trie_hashing::{hash_trie, NodeEncodings},
    trie_ops::{TrieOpError, TrieOpResult},
};

/// Index of a node inside the arena of a [`MerklePatriciaTrie`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NodeHandle(pub(crate) usize);

/// The children slots of a branch node.
pub type BranchChildren = [Option<NodeHandle>; 16];

#[derive(Clone, Debug, EnumAsInner, Eq, PartialEq)]
/// A node of an Ethereum trie. Children are referenced by their
/// [`NodeHandle`] in the owning trie's arena.
pub enum Node {
    /// A branch node, which consists of 16 children and an optional value.
    Branch {
        /// A slice containing the 16 children of this branch node.
        children: BranchChildren,
        /// The payload of this node. Empty if the branch holds no value.
        value: Vec<u8>,
    },
    /// An extension node, which consists of a list of nibbles and a single
    /// child.
    Extension {
        /// The path of this extension.
        nibbles: Nibbles,
        /// The child of this extension node.
        child: NodeHandle,
    },
    /// A leaf node, which consists of a list of nibbles and a value.
    Leaf {
        /// The path of this leaf node.
        nibbles: Nibbles,
        /// The payload of this node
        value: Vec<u8>,
    },
}

impl Node {
    pub(crate) const fn empty_branch() -> Self {
        Node::Branch {
            children: [None; 16],
            value: Vec::new(),
        }
    }
}

/// An ephemeral Merkle-Patricia trie.
///
/// Nodes are stored in an arena and addressed by [`NodeHandle`]s. The trie
/// only grows: there is no deletion, so every node in the arena stays
/// reachable from the root.
///
/// The root hash is computed lazily and cached until the next insert.
#[derive(Default)]
pub struct MerklePatriciaTrie {
    pub(crate) nodes: Vec<Node>,
    pub(crate) root: Option<NodeHandle>,
    pub(crate) num_values: usize,
    hash: RwLock<Option<H256>>,
}

impl Debug for MerklePatriciaTrie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MerklePatriciaTrie")
            .field("root", &self.root)
            .field("num_nodes", &self.nodes.len())
            .field("num_values", &self.num_values)
            .finish()
    }
}

impl MerklePatriciaTrie {
    /// Creates an empty trie.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value into the trie, replacing any previous value under the
    /// same key.
    ///
    /// An empty value is the same as an absent one in an Ethereum trie, so
    /// inserting an empty value for a new key leaves the trie untouched.
    /// Removing an existing value is not supported and returns
    /// [`TrieOpError::ValueRemoval`].
    pub fn insert(&mut self, key: &[u8], value: Vec<u8>) -> TrieOpResult<()> {
        let nibbles = Nibbles::from_bytes_be(key)?;

        if value.is_empty() {
            return match self.get(key) {
                Some(_) => Err(TrieOpError::ValueRemoval(nibbles)),
                None => {
                    trace!("Skipping insert of empty value (key: {:x})", nibbles);
                    Ok(())
                }
            };
        }

        if self.get(key).is_none() {
            self.num_values += 1;
        }

        self.trie_insert(nibbles, value);
        *self.hash.write() = None;

        Ok(())
    }

    /// Inserts every key/value pair of the iterator.
    pub fn extend<K, I>(&mut self, entries: I) -> TrieOpResult<()>
    where
        K: AsRef<[u8]>,
        I: IntoIterator<Item = (K, Vec<u8>)>,
    {
        for (k, v) in entries {
            self.insert(k.as_ref(), v)?;
        }

        Ok(())
    }

    /// Get a value if it exists in the trie.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        let mut curr_nibbles = Nibbles::from_bytes_be(key).ok()?;
        let mut curr = self.root?;

        loop {
            match self.node(curr) {
                Node::Branch { children, value } => {
                    if curr_nibbles.is_empty() {
                        return (!value.is_empty()).then_some(value.as_slice());
                    }

                    let nib = curr_nibbles.pop_next_nibble_front();
                    trace!("Get traversed Branch (nibble: {:x})", nib);
                    curr = children[nib as usize]?;
                }
                Node::Extension { nibbles, child } => {
                    trace!("Get traversed Extension (nibbles: {:x})", nibbles);
                    if !curr_nibbles.starts_with(nibbles) {
                        return None;
                    }

                    curr_nibbles.truncate_n_nibbles_front_mut(nibbles.count());
                    curr = *child;
                }
                Node::Leaf { nibbles, value } => {
                    trace!("Get traversed Leaf (nibbles: {:x})", nibbles);
                    return (*nibbles == curr_nibbles).then_some(value.as_slice());
                }
            }
        }
    }

    /// Returns `true` if the trie holds a value for the key.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// The number of values stored in the trie.
    pub const fn len(&self) -> usize {
        self.num_values
    }

    /// Returns `true` if nothing has been inserted yet.
    pub const fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// The handle of the root node, if the trie is not empty.
    pub const fn root(&self) -> Option<NodeHandle> {
        self.root
    }

    /// Looks up a node in the arena.
    ///
    /// # Panics
    /// Panics if the handle does not belong to this trie.
    pub fn node(&self, handle: NodeHandle) -> &Node {
        &self.nodes[handle.0]
    }

    /// Get the hash of the root node.
    pub fn hash(&self) -> H256 {
        if let Some(h) = *self.hash.read() {
            return h;
        }

        let h = hash_trie(self);
        *self.hash.write() = Some(h);

        h
    }

    /// Creates an inclusion proof for `key`: the encodings of every node on
    /// the path from the root to the node holding the value.
    ///
    /// Fails with [`TrieOpError::KeyNotFound`] if the key was never inserted.
    pub fn create_proof(&self, key: &[u8]) -> TrieOpResult<Proof> {
        let nibbles = Nibbles::from_bytes_be(key)?;
        let path = self.trie_path(&nibbles)?;
        let encodings = NodeEncodings::new(self);

        trace!(
            "Creating proof for {:x} through {} nodes",
            nibbles,
            path.len()
        );

        Ok(Proof::new(
            path.into_iter()
                .map(|handle| encodings.encoding(handle).clone())
                .collect(),
        ))
    }

    pub(crate) fn push_node(&mut self, node: Node) -> NodeHandle {
        self.nodes.push(node);
        NodeHandle(self.nodes.len() - 1)
    }

    /// Returns the handles of all nodes visited while following `key` to its
    /// value.
    fn trie_path(&self, key: &Nibbles) -> TrieOpResult<Vec<NodeHandle>> {
        let not_found = || TrieOpError::KeyNotFound(key.clone());

        let mut curr_nibbles = key.clone();
        let mut curr = self.root.ok_or_else(not_found)?;
        let mut path = Vec::new();

        loop {
            path.push(curr);

            match self.node(curr) {
                Node::Branch { children, value } => {
                    if curr_nibbles.is_empty() {
                        return match value.is_empty() {
                            false => Ok(path),
                            true => Err(not_found()),
                        };
                    }

                    let nib = curr_nibbles.pop_next_nibble_front();
                    curr = children[nib as usize].ok_or_else(not_found)?;
                }
                Node::Extension { nibbles, child } => {
                    if !curr_nibbles.starts_with(nibbles) {
                        return Err(not_found());
                    }

                    curr_nibbles.truncate_n_nibbles_front_mut(nibbles.count());
                    curr = *child;
                }
                Node::Leaf { nibbles, .. } => {
                    return match *nibbles == curr_nibbles {
                        true => Ok(path),
                        false => Err(not_found()),
                    };
                }
            }
        }
    }
}
