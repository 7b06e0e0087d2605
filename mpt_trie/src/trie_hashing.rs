//! RLP encoding and hashing of trie nodes.

use bytes::Bytes;
use ethereum_types::H256;
use keccak_hash::{keccak, KECCAK_NULL_RLP};
use rlp::RlpStream;

use crate::{
    trie::{MerklePatriciaTrie, Node, NodeHandle},
    utils::bytes_to_h256,
};

/// How a node is referenced from its parent.
#[derive(Clone, Debug, Hash)]
pub enum EncodedNode {
    /// Node that is RLPed but not hashed (embedded inline in the parent).
    Raw(Bytes),
    /// Node that is hashed.
    Hashed([u8; 32]),
}

/// The RLP encoding of every node in a trie, indexed by [`NodeHandle`].
///
/// Encodings are computed bottom up once, so each node is only hashed a
/// single time even though both hashing and proof creation need them.
pub(crate) struct NodeEncodings {
    raw: Vec<Bytes>,
}

impl NodeEncodings {
    pub(crate) fn new(trie: &MerklePatriciaTrie) -> Self {
        let mut encodings = Self {
            raw: vec![Bytes::new(); trie.nodes.len()],
        };

        if let Some(root) = trie.root {
            encodings.encode_node(trie, root);
        }

        encodings
    }

    /// The raw RLP of a node. Never empty for a node reachable from the
    /// root.
    pub(crate) fn encoding(&self, handle: NodeHandle) -> &Bytes {
        &self.raw[handle.0]
    }

    fn encode_node(&mut self, trie: &MerklePatriciaTrie, handle: NodeHandle) -> EncodedNode {
        if self.raw[handle.0].is_empty() {
            let bytes = self.rlp_encode_node(trie, trie.node(handle));
            self.raw[handle.0] = bytes;
        }

        hash_bytes_if_large_enough(self.raw[handle.0].clone())
    }

    fn rlp_encode_node(&mut self, trie: &MerklePatriciaTrie, node: &Node) -> Bytes {
        match node {
            Node::Branch { children, value } => {
                let mut stream = RlpStream::new_list(17);

                for c in children.iter() {
                    match c {
                        Some(child) => {
                            let encoded = self.encode_node(trie, *child);
                            append_to_stream(&mut stream, encoded);
                        }
                        None => {
                            stream.append_empty_data();
                        }
                    }
                }

                match value.is_empty() {
                    false => stream.append(value),
                    true => stream.append_empty_data(),
                };

                stream.out().freeze()
            }
            Node::Extension { nibbles, child } => {
                let mut stream = RlpStream::new_list(2);

                stream.append(&nibbles.to_hex_prefix_encoding(false).as_ref());
                let encoded = self.encode_node(trie, *child);
                append_to_stream(&mut stream, encoded);

                stream.out().freeze()
            }
            Node::Leaf { nibbles, value } => {
                let hex_prefix_k = nibbles.to_hex_prefix_encoding(true);
                let mut stream = RlpStream::new_list(2);

                stream.append(&hex_prefix_k.as_ref());
                stream.append(value);

                stream.out().freeze()
            }
        }
    }
}

/// Calculates the root hash of a trie. The root is always hashed, even when
/// its encoding is shorter than 32 bytes.
pub(crate) fn hash_trie(trie: &MerklePatriciaTrie) -> H256 {
    match trie.root {
        Some(root) => {
            let encodings = NodeEncodings::new(trie);
            bytes_to_h256(&hash_bytes(encodings.encoding(root)))
        }
        None => KECCAK_NULL_RLP,
    }
}

fn hash_bytes_if_large_enough(bytes: Bytes) -> EncodedNode {
    match bytes.len() >= 32 {
        false => EncodedNode::Raw(bytes),
        true => EncodedNode::Hashed(hash_bytes(&bytes)),
    }
}

fn append_to_stream(s: &mut RlpStream, node: EncodedNode) {
    match node {
        EncodedNode::Raw(b) => s.append_raw(&b, 1),
        EncodedNode::Hashed(h) => s.append(&h.as_ref()),
    };
}

pub(crate) fn hash_bytes(bytes: &[u8]) -> [u8; 32] {
    keccak(bytes).0
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use eth_trie::{EthTrie, MemoryDB, Trie};
    use ethereum_types::H256;
    use keccak_hash::KECCAK_NULL_RLP;
    use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

    use crate::{
        testing_utils::{
            common_setup, generate_n_random_fixed_entries, generate_n_random_rlp_index_entries,
            large_entry, TestInsertValEntry,
        },
        trie::MerklePatriciaTrie,
        trie_ops::TrieOpResult,
    };

    const NUM_INSERTS_FOR_ETH_TRIE_CRATE_MASSIVE_TEST: usize = 1000;

    fn get_lib_trie_root_hash(entries: &[TestInsertValEntry]) -> TrieOpResult<H256> {
        let mut trie = MerklePatriciaTrie::new();
        trie.extend(entries.iter().cloned())?;

        Ok(trie.hash())
    }

    fn get_eth_trie_root_hash(entries: &[TestInsertValEntry]) -> H256 {
        let memdb = Arc::new(MemoryDB::new(true));
        let mut trie = EthTrie::new(memdb);

        for (k, v) in entries.iter() {
            trie.insert(k, v).unwrap();
        }

        H256(trie.root_hash().unwrap().0)
    }

    fn assert_matches_eth_trie(entries: &[TestInsertValEntry]) -> TrieOpResult<()> {
        assert_eq!(
            get_lib_trie_root_hash(entries)?,
            get_eth_trie_root_hash(entries)
        );

        Ok(())
    }

    #[test]
    fn empty_hash_is_correct() {
        common_setup();

        assert_eq!(MerklePatriciaTrie::new().hash(), KECCAK_NULL_RLP);
    }

    #[test]
    fn single_entry_hash_matches_eth_trie() -> TrieOpResult<()> {
        common_setup();

        assert_matches_eth_trie(&[(vec![0x80], vec![0x01, 0x02])])?;
        assert_matches_eth_trie(&[large_entry(&[0x12, 0x34])])
    }

    #[test]
    fn small_inline_children_hash_matches_eth_trie() -> TrieOpResult<()> {
        common_setup();

        // Tiny values keep every child encoding below 32 bytes.
        let entries: Vec<_> = (0..20_u8).map(|i| (vec![i], vec![i + 1])).collect();
        assert_matches_eth_trie(&entries)
    }

    #[test]
    fn key_prefix_of_another_key_hash_matches_eth_trie() -> TrieOpResult<()> {
        common_setup();

        assert_matches_eth_trie(&[
            large_entry(&[0x12]),
            large_entry(&[0x12, 0x34]),
            large_entry(&[0x12, 0x34, 0x56]),
            (vec![0x13], vec![0x01]),
        ])
    }

    #[test]
    fn massive_random_data_insert_hashes_agree_with_eth_trie() -> TrieOpResult<()> {
        common_setup();

        let entries: Vec<_> =
            generate_n_random_fixed_entries(NUM_INSERTS_FOR_ETH_TRIE_CRATE_MASSIVE_TEST, 32, 9)
                .collect();
        assert_matches_eth_trie(&entries)
    }

    #[test]
    fn rlp_index_keys_hash_agrees_with_eth_trie() -> TrieOpResult<()> {
        common_setup();

        for n in [1, 2, 3, 16, 127, 128, 129, 300] {
            let entries: Vec<_> = generate_n_random_rlp_index_entries(n, 5).collect();
            assert_matches_eth_trie(&entries)?;
        }

        Ok(())
    }

    #[test]
    fn insertion_order_does_not_change_the_root() -> TrieOpResult<()> {
        common_setup();

        let mut entries: Vec<_> = generate_n_random_rlp_index_entries(200, 11).collect();
        let expected = get_lib_trie_root_hash(&entries)?;

        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..10 {
            entries.shuffle(&mut rng);
            assert_eq!(get_lib_trie_root_hash(&entries)?, expected);
        }

        Ok(())
    }

    #[test]
    fn hash_is_invalidated_by_insert() -> TrieOpResult<()> {
        common_setup();

        let mut trie = MerklePatriciaTrie::new();
        trie.insert(&[0x01], vec![0x01])?;
        let first = trie.hash();

        trie.insert(&[0x02], vec![0x02])?;
        assert_ne!(trie.hash(), first);
        assert_eq!(
            trie.hash(),
            get_eth_trie_root_hash(&[(vec![0x01], vec![0x01]), (vec![0x02], vec![0x02])])
        );

        Ok(())
    }
}
