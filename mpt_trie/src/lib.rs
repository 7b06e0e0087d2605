//! Utilities and types for building ephemeral Ethereum Merkle-Patricia tries
//! and extracting inclusion proofs from them.
//!
//! The core of this library is the
//! [`MerklePatriciaTrie`][trie::MerklePatriciaTrie] type, an insert-only trie
//! whose nodes live in an arena. It produces the same root hash as the tries
//! Ethereum clients build for a block's transactions and receipts, and can
//! hand out a [`Proof`][proof::Proof] for any value it holds.
//! [`verify_proof`][proof::verify_proof] replays such a proof against a root.

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_debug_implementations)]
#![deny(missing_docs)]

pub mod nibbles;
pub mod proof;
pub mod trie;
mod trie_hashing;
pub mod trie_ops;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing_utils;
