//! Defines the insert operation for [`MerklePatriciaTrie`].

use std::{fmt::Display, mem};

use log::trace;
use thiserror::Error;

use crate::{
    nibbles::{BytesToNibblesError, Nibbles},
    trie::{BranchChildren, MerklePatriciaTrie, Node, NodeHandle},
    utils::TrieNodeType,
};

/// Stores the result of trie operations. Returns a [TrieOpError] upon
/// failure.
pub type TrieOpResult<T> = Result<T, TrieOpError>;

/// An error type for trie operation.
#[derive(Clone, Debug, Eq, Error, Hash, PartialEq)]
pub enum TrieOpError {
    /// A proof was requested for a key that was never inserted.
    #[error("No value is stored under key {0:x}; non-membership proofs are not supported")]
    KeyNotFound(Nibbles),

    /// The key could not be turned into a nibble path.
    #[error(transparent)]
    BytesToNibbles(#[from] BytesToNibblesError),

    /// An empty value was inserted over an existing one. In an Ethereum trie
    /// this means deletion, which is not supported.
    #[error("Attempted to remove the value under key {0:x} by inserting an empty value")]
    ValueRemoval(Nibbles),
}

/// A entry to be inserted into a [`MerklePatriciaTrie`].
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
struct InsertEntry {
    nibbles: Nibbles,
    v: Vec<u8>,
}

impl Display for InsertEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "TrieEntry: (k: {}, v: 0x{})",
            &self.nibbles,
            hex::encode(&self.v)
        )
    }
}

impl InsertEntry {
    fn truncate_n_nibbles(&mut self, n: usize) {
        self.nibbles.truncate_n_nibbles_front_mut(n);
    }
}

impl MerklePatriciaTrie {
    /// Walks down from the root and places `v` under `nibbles`, splitting
    /// `Leaf` and `Extension` nodes where the paths diverge.
    pub(crate) fn trie_insert(&mut self, nibbles: Nibbles, v: Vec<u8>) {
        let mut entry = InsertEntry { nibbles, v };
        trace!("Inserting new node {}...", entry);

        let mut curr = match self.root {
            Some(root) => root,
            None => {
                trace!("Insert traversed Empty");
                let leaf = self.push_node(Node::Leaf {
                    nibbles: entry.nibbles,
                    value: entry.v,
                });
                self.root = Some(leaf);
                return;
            }
        };

        loop {
            // Take the node out of the arena so the split helpers can push new
            // nodes while we rebuild this one.
            let node = mem::replace(&mut self.nodes[curr.0], Node::empty_branch());
            trace!("Insert traversed {}", TrieNodeType::from(&node));

            let (updated, next) = match node {
                Node::Branch {
                    mut children,
                    value,
                } => {
                    if entry.nibbles.is_empty() {
                        self.nodes[curr.0] = Node::Branch {
                            children,
                            value: entry.v,
                        };
                        return;
                    }

                    let nibble = entry.nibbles.pop_next_nibble_front() as usize;
                    match children[nibble] {
                        Some(child) => (Node::Branch { children, value }, child),
                        None => {
                            children[nibble] = Some(self.push_node(Node::Leaf {
                                nibbles: entry.nibbles,
                                value: entry.v,
                            }));
                            self.nodes[curr.0] = Node::Branch { children, value };
                            return;
                        }
                    }
                }
                Node::Extension { nibbles, child } => {
                    let common_prefix_len =
                        Nibbles::find_nibble_idx_that_differs_between_nibbles_different_lengths(
                            &nibbles,
                            &entry.nibbles,
                        );

                    if common_prefix_len < nibbles.count() {
                        let split = self.split_extension(nibbles, child, entry, common_prefix_len);
                        self.nodes[curr.0] = split;
                        return;
                    }

                    entry.truncate_n_nibbles(common_prefix_len);
                    (Node::Extension { nibbles, child }, child)
                }
                Node::Leaf { nibbles, value } => {
                    let updated = match nibbles == entry.nibbles {
                        true => Node::Leaf {
                            nibbles,
                            value: entry.v,
                        },
                        false => self.split_leaf(nibbles, value, entry),
                    };
                    self.nodes[curr.0] = updated;
                    return;
                }
            };

            self.nodes[curr.0] = updated;
            curr = next;
        }
    }

    /// Replaces a `Leaf` whose path diverges from the new entry with a
    /// `Branch` holding both, behind an `Extension` for any shared prefix.
    fn split_leaf(
        &mut self,
        existing_nibbles: Nibbles,
        existing_v: Vec<u8>,
        new_entry: InsertEntry,
    ) -> Node {
        let common_prefix_len =
            Nibbles::find_nibble_idx_that_differs_between_nibbles_different_lengths(
                &existing_nibbles,
                &new_entry.nibbles,
            );

        let mut children = [None; 16];
        let mut branch_value = Vec::new();

        self.attach_leaf(
            &mut children,
            &mut branch_value,
            existing_nibbles.truncate_n_nibbles_front(common_prefix_len),
            existing_v,
        );
        self.attach_leaf(
            &mut children,
            &mut branch_value,
            new_entry.nibbles.truncate_n_nibbles_front(common_prefix_len),
            new_entry.v,
        );

        self.finish_split(
            existing_nibbles.get_next_nibbles(common_prefix_len),
            children,
            branch_value,
        )
    }

    /// Breaks an `Extension` at the first nibble that differs from the new
    /// entry. The part of the extension after that nibble keeps pointing at
    /// the original child.
    fn split_extension(
        &mut self,
        ext_nibbles: Nibbles,
        ext_child: NodeHandle,
        new_entry: InsertEntry,
        common_prefix_len: usize,
    ) -> Node {
        let mut children = [None; 16];
        let mut branch_value = Vec::new();

        let mut ext_postfix = ext_nibbles.truncate_n_nibbles_front(common_prefix_len);
        let ext_branch_nibble = ext_postfix.pop_next_nibble_front() as usize;
        children[ext_branch_nibble] = Some(match ext_postfix.is_empty() {
            false => self.push_node(Node::Extension {
                nibbles: ext_postfix,
                child: ext_child,
            }),
            true => ext_child,
        });

        self.attach_leaf(
            &mut children,
            &mut branch_value,
            new_entry.nibbles.truncate_n_nibbles_front(common_prefix_len),
            new_entry.v,
        );

        self.finish_split(
            ext_nibbles.get_next_nibbles(common_prefix_len),
            children,
            branch_value,
        )
    }

    /// Hangs a value below a new branch. A path that ends at the branch
    /// becomes the branch value.
    fn attach_leaf(
        &mut self,
        children: &mut BranchChildren,
        branch_value: &mut Vec<u8>,
        mut postfix: Nibbles,
        value: Vec<u8>,
    ) {
        match postfix.is_empty() {
            true => *branch_value = value,
            false => {
                let nibble = postfix.pop_next_nibble_front() as usize;
                children[nibble] = Some(self.push_node(Node::Leaf {
                    nibbles: postfix,
                    value,
                }));
            }
        }
    }

    fn finish_split(
        &mut self,
        shared_prefix: Nibbles,
        children: BranchChildren,
        value: Vec<u8>,
    ) -> Node {
        let branch = Node::Branch { children, value };

        match shared_prefix.is_empty() {
            true => branch,
            false => {
                trace!("Adding extension node for shared prefix {:x}", shared_prefix);
                Node::Extension {
                    nibbles: shared_prefix,
                    child: self.push_node(branch),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use crate::{
        nibbles::Nibbles,
        testing_utils::{common_setup, entry, generate_n_random_fixed_entries},
        trie::{MerklePatriciaTrie, Node},
        trie_ops::TrieOpResult,
        utils::TrieNodeType,
    };

    fn root_type(trie: &MerklePatriciaTrie) -> Option<TrieNodeType> {
        trie.root().map(|r| TrieNodeType::from(trie.node(r)))
    }

    #[test]
    fn single_insert_is_a_leaf() -> TrieOpResult<()> {
        common_setup();

        let mut trie = MerklePatriciaTrie::new();
        trie.insert(&[0x12, 0x34], vec![9])?;

        let (nibbles, value) = trie.node(trie.root().unwrap()).as_leaf().unwrap();
        assert_eq!(nibbles, &Nibbles::from_str("0x1234").unwrap());
        assert_eq!(value, &vec![9]);

        Ok(())
    }

    #[test]
    fn diverging_first_nibble_gives_root_branch() -> TrieOpResult<()> {
        common_setup();

        let mut trie = MerklePatriciaTrie::new();
        trie.extend([entry(&[0x12]), entry(&[0x34])])?;

        assert_eq!(root_type(&trie), Some(TrieNodeType::Branch));

        Ok(())
    }

    #[test]
    fn insert_splits_extension_in_the_middle() -> TrieOpResult<()> {
        common_setup();

        let mut trie = MerklePatriciaTrie::new();
        trie.extend([entry(&[0x12, 0x34, 0x56]), entry(&[0x12, 0x34, 0x78])])?;
        trie.insert(&[0x12, 0x99, 0x00], vec![7])?;

        let (ext_nibbles, branch) = trie.node(trie.root().unwrap()).as_extension().unwrap();
        assert_eq!(ext_nibbles, &Nibbles::from_str("0x12").unwrap());

        let (children, _) = trie.node(*branch).as_branch().unwrap();
        assert_eq!(children.iter().flatten().count(), 2);

        let (old_ext, _) = trie.node(children[3].unwrap()).as_extension().unwrap();
        assert_eq!(old_ext, &Nibbles::from_str("0x4").unwrap());
        assert!(matches!(trie.node(children[9].unwrap()), Node::Leaf { .. }));

        assert_eq!(trie.get(&[0x12, 0x34, 0x56]), Some([0x12, 0x34, 0x56].as_slice()));
        assert_eq!(trie.get(&[0x12, 0x99, 0x00]), Some([7].as_slice()));

        Ok(())
    }

    #[test]
    fn insert_splits_extension_at_its_last_nibble() -> TrieOpResult<()> {
        common_setup();

        let mut trie = MerklePatriciaTrie::new();
        trie.extend([entry(&[0x12, 0x34]), entry(&[0x12, 0x35])])?;
        trie.insert(&[0x13, 0x00], vec![1])?;

        let (ext_nibbles, branch) = trie.node(trie.root().unwrap()).as_extension().unwrap();
        assert_eq!(ext_nibbles, &Nibbles::from_str("0x1").unwrap());

        // The old extension "0x23" lost its first nibble to the new branch.
        let (children, _) = trie.node(*branch).as_branch().unwrap();
        let (rest, _) = trie.node(children[2].unwrap()).as_extension().unwrap();
        assert_eq!(rest, &Nibbles::from_str("0x3").unwrap());

        Ok(())
    }

    #[test]
    fn extension_child_reused_when_split_consumes_whole_extension() -> TrieOpResult<()> {
        common_setup();

        let mut trie = MerklePatriciaTrie::new();
        trie.extend([entry(&[0x12, 0x34]), entry(&[0x12, 0x35])])?;

        let (_, old_branch) = trie.node(trie.root().unwrap()).as_extension().unwrap();
        let old_branch = *old_branch;

        trie.insert(&[0x12, 0x44], vec![1])?;

        let (_, new_branch) = trie.node(trie.root().unwrap()).as_extension().unwrap();
        let (children, _) = trie.node(*new_branch).as_branch().unwrap();
        assert_eq!(children[3], Some(old_branch));

        Ok(())
    }

    #[test]
    fn many_inserts_are_all_retrievable() -> TrieOpResult<()> {
        common_setup();

        let entries: Vec<_> = generate_n_random_fixed_entries(2000, 8, 3).collect();
        let mut trie = MerklePatriciaTrie::new();
        trie.extend(entries.iter().cloned())?;

        for (k, v) in entries.iter() {
            assert_eq!(trie.get(k), Some(v.as_slice()));
        }

        Ok(())
    }
}
