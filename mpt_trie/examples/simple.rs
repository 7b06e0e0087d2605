//! Simple example showing off the basics of the library.

use mpt_trie::{proof::verify_proof, trie::MerklePatriciaTrie, trie_ops::TrieOpResult};

fn main() -> TrieOpResult<()> {
    // Construct an empty trie:
    let mut trie = MerklePatriciaTrie::new();

    // Elements can be inserted into the trie by calling insert directly:
    trie.insert(b"hello", b"world!".to_vec())?;

    // Or from an iterator of key value pairs. Block tries use the RLP of the
    // position in the block as the key:
    trie.extend((0_u64..3).map(|i| (rlp::encode(&i), vec![i as u8 + 1; 40])))?;

    // Tries can be queried:
    assert_eq!(trie.get(b"hello"), Some(b"world!".as_slice()));
    assert_eq!(trie.get(b"goodbye"), None);

    // Trie hashes can be calculated (and are cached until the next insert):
    let root = trie.hash();

    // Proofs list the encodings of every node from the root down to the value,
    // and can be checked against the root alone:
    let proof = trie.create_proof(b"hello")?;
    println!("proof for \"hello\": {}", proof);

    assert_eq!(
        verify_proof(root, b"hello", proof.nodes()),
        Ok(b"world!".to_vec())
    );

    Ok(())
}
