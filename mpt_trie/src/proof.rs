//! Inclusion proofs: the node encodings on the path from a root to a value,
//! and replaying them against a claimed root.

use std::fmt::{self, Display};

use bytes::Bytes;
use ethereum_types::H256;
use log::trace;
use rlp::{DecoderError, Rlp};
use thiserror::Error;

use crate::{
    nibbles::{BytesToNibblesError, FromHexPrefixError, Nibbles},
    trie_hashing::hash_bytes,
};

/// The raw RLP encodings of every node visited on the way from the root to the
/// node holding a value, root first.
///
/// Nodes embedded inline in their parent are listed as well.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct Proof {
    nodes: Vec<Bytes>,
}

impl Proof {
    /// Wraps a list of node encodings.
    pub fn new(nodes: Vec<Bytes>) -> Self {
        Self { nodes }
    }

    /// The node encodings, root first.
    pub fn nodes(&self) -> &[Bytes] {
        &self.nodes
    }

    /// Number of nodes in the proof.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the proof has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Consumes the proof and returns the node encodings.
    pub fn into_nodes(self) -> Vec<Bytes> {
        self.nodes
    }
}

impl From<Vec<Bytes>> for Proof {
    fn from(nodes: Vec<Bytes>) -> Self {
        Self::new(nodes)
    }
}

impl Display for Proof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, node) in self.nodes.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "0x{}", hex::encode(node))?;
        }
        write!(f, "]")
    }
}

/// Reasons a proof fails to bind a value to a root.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ProofInvalidError {
    /// The proof has no nodes at all.
    #[error("Proof is empty")]
    EmptyProof,

    /// The key could not be turned into a nibble path.
    #[error(transparent)]
    InvalidKey(#[from] BytesToNibblesError),

    /// The first node does not hash to the claimed root.
    #[error("Root node hashes to {found:x}, expected {expected:x}")]
    RootHashMismatch {
        /// The claimed root.
        expected: H256,
        /// The hash of the first proof node.
        found: H256,
    },

    /// A node does not match the reference in its parent.
    #[error("Node {depth} does not match the reference held by its parent")]
    BrokenHashChain {
        /// Position of the offending node in the proof.
        depth: usize,
    },

    /// A node could not be decoded as a trie node.
    #[error("Node {depth} is malformed: {reason}")]
    MalformedNode {
        /// Position of the offending node in the proof.
        depth: usize,
        /// What was wrong with it.
        reason: MalformedNodeReason,
    },

    /// The path stored in the nodes leads away from the key.
    #[error("Path in node {depth} diverges from the key")]
    PathDiverged {
        /// Position of the node where the paths split.
        depth: usize,
    },

    /// The proof stops before reaching the node holding the value.
    #[error("Proof ends at node {depth} before reaching the value ({remaining} key nibbles left)")]
    IncompleteProof {
        /// Position of the last node.
        depth: usize,
        /// Number of nibbles that were never matched.
        remaining: usize,
    },

    /// The path reaches a node that holds no value for the key.
    #[error("Node {depth} holds no value for the key")]
    MissingValue {
        /// Position of the node where the value should be.
        depth: usize,
    },

    /// The value was found before the end of the proof.
    #[error("Value found at node {depth} but the proof has {extra} more nodes")]
    TrailingNodes {
        /// Position of the node holding the value.
        depth: usize,
        /// Number of nodes after it.
        extra: usize,
    },
}

/// Why a proof node could not be interpreted.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum MalformedNodeReason {
    /// Not valid RLP.
    #[error("invalid RLP ({0})")]
    Rlp(#[from] DecoderError),

    /// RLP decodes, but with bytes left over after the node.
    #[error("{0} trailing bytes after the node")]
    TrailingBytes(usize),

    /// A list with neither 2 (leaf / extension) nor 17 (branch) items.
    #[error("unexpected item count {0}")]
    ItemCount(usize),

    /// A child reference that is neither a hash nor an embedded node.
    #[error("child reference of {0} bytes")]
    ChildReference(usize),

    /// The path of a leaf or extension is not valid hex prefix encoding.
    #[error(transparent)]
    HexPrefix(#[from] FromHexPrefixError),
}

/// Where the next proof node must come from.
enum NodeReference {
    Hash(H256),
    Inline(Vec<u8>),
}

/// Replays `proof` for `key` against `root` and returns the value it binds.
///
/// The first node must hash to `root`. Every following node must match the
/// reference its parent holds: its keccak hash, or its exact bytes when the
/// parent embeds it. The paths stored in the nodes must consume the whole key
/// and the last node must hold the value.
///
/// Embedded children may also be left out of `proof`, as geth does. Once the
/// listed nodes run out, an embedded child is decoded straight from its
/// parent.
pub fn verify_proof(
    root: H256,
    key: &[u8],
    proof: &[Bytes],
) -> Result<Vec<u8>, ProofInvalidError> {
    let mut remaining = Nibbles::from_bytes_be(key)?;
    let mut expected = NodeReference::Hash(root);

    if proof.is_empty() {
        return Err(ProofInvalidError::EmptyProof);
    }

    let mut depth = 0;
    loop {
        let embedded;
        let node: &[u8] = match proof.get(depth) {
            Some(node) => {
                check_reference(&expected, node, depth)?;
                node
            }
            None => match std::mem::replace(&mut expected, NodeReference::Inline(Vec::new())) {
                NodeReference::Inline(raw) if !raw.is_empty() => {
                    trace!("Proof node {} is embedded in its parent", depth);
                    embedded = raw;
                    &embedded
                }
                _ => {
                    return Err(ProofInvalidError::IncompleteProof {
                        depth: depth - 1,
                        remaining: remaining.count(),
                    })
                }
            },
        };

        let malformed = |reason: MalformedNodeReason| ProofInvalidError::MalformedNode {
            depth,
            reason,
        };
        let rlp = Rlp::new(node);
        let items = decode_node_items(&rlp).map_err(malformed)?;

        let found = match items.len() {
            17 => {
                if remaining.is_empty() {
                    trace!("Proof node {} is the Branch holding the value", depth);
                    let value = items[16].data().map_err(|e| malformed(e.into()))?;
                    Some(value.to_vec())
                } else {
                    let nibble = remaining.pop_next_nibble_front() as usize;
                    trace!("Proof node {} is a Branch (nibble: {:x})", depth, nibble);
                    expected = child_reference(&items[nibble]).map_err(malformed)?;

                    if matches!(&expected, NodeReference::Inline(r) if r.is_empty()) {
                        return Err(ProofInvalidError::PathDiverged { depth });
                    }
                    None
                }
            }
            2 => {
                let path = items[0].data().map_err(|e| malformed(e.into()))?;
                let (nibbles, is_leaf) =
                    Nibbles::from_hex_prefix_encoding(path).map_err(|e| malformed(e.into()))?;

                if !remaining.starts_with(&nibbles) {
                    return Err(ProofInvalidError::PathDiverged { depth });
                }
                remaining.truncate_n_nibbles_front_mut(nibbles.count());

                match is_leaf {
                    true => {
                        trace!("Proof node {} is a Leaf (nibbles: {:x})", depth, nibbles);
                        if !remaining.is_empty() {
                            return Err(ProofInvalidError::PathDiverged { depth });
                        }

                        let value = items[1].data().map_err(|e| malformed(e.into()))?;
                        Some(value.to_vec())
                    }
                    false => {
                        trace!("Proof node {} is an Extension (nibbles: {:x})", depth, nibbles);
                        expected = child_reference(&items[1]).map_err(malformed)?;
                        None
                    }
                }
            }
            n => return Err(malformed(MalformedNodeReason::ItemCount(n))),
        };

        if let Some(value) = found {
            if value.is_empty() {
                return Err(ProofInvalidError::MissingValue { depth });
            }

            let extra = proof.len().saturating_sub(depth + 1);
            if extra > 0 {
                return Err(ProofInvalidError::TrailingNodes { depth, extra });
            }

            return Ok(value);
        }

        depth += 1;
    }
}

fn check_reference(
    expected: &NodeReference,
    node: &[u8],
    depth: usize,
) -> Result<(), ProofInvalidError> {
    match expected {
        NodeReference::Hash(h) => {
            let found = H256(hash_bytes(node));
            match (found == *h, depth) {
                (true, _) => Ok(()),
                (false, 0) => Err(ProofInvalidError::RootHashMismatch {
                    expected: *h,
                    found,
                }),
                (false, _) => Err(ProofInvalidError::BrokenHashChain { depth }),
            }
        }
        NodeReference::Inline(raw) => match raw.as_slice() == node {
            true => Ok(()),
            false => Err(ProofInvalidError::BrokenHashChain { depth }),
        },
    }
}

fn decode_node_items<'a>(rlp: &Rlp<'a>) -> Result<Vec<Rlp<'a>>, MalformedNodeReason> {
    let info = rlp.payload_info()?;
    let total = info.header_len + info.value_len;
    if total != rlp.as_raw().len() {
        return Err(MalformedNodeReason::TrailingBytes(
            rlp.as_raw().len().saturating_sub(total),
        ));
    }

    if !rlp.is_list() {
        return Err(MalformedNodeReason::Rlp(DecoderError::RlpExpectedToBeList));
    }

    let count = rlp.item_count()?;
    Ok((0..count).map(|i| rlp.at(i)).collect::<Result<_, _>>()?)
}

/// Reads a child slot: a 32 byte hash, an embedded node, or the empty string
/// for a missing child (returned as an empty inline reference).
fn child_reference(item: &Rlp<'_>) -> Result<NodeReference, MalformedNodeReason> {
    if item.is_list() {
        return Ok(NodeReference::Inline(item.as_raw().to_vec()));
    }

    let data = item.data()?;
    match data.len() {
        0 => Ok(NodeReference::Inline(Vec::new())),
        32 => Ok(NodeReference::Hash(H256::from_slice(data))),
        n => Err(MalformedNodeReason::ChildReference(n)),
    }
}
