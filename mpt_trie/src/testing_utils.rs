use std::{
    collections::HashSet,
    iter::{once, repeat},
};

use rand::{rngs::StdRng, Rng, RngCore, SeedableRng};

/// A key/value pair as handed to [`MerklePatriciaTrie::insert`].
///
/// [`MerklePatriciaTrie::insert`]: crate::trie::MerklePatriciaTrie::insert
pub(crate) type TestInsertValEntry = (Vec<u8>, Vec<u8>);

pub(crate) fn common_setup() {
    // Try init since multiple tests calling `init` will cause an error.
    let _ = pretty_env_logger::try_init();
}

/// An entry whose value is the key itself.
pub(crate) fn entry(k: &[u8]) -> TestInsertValEntry {
    (k.to_vec(), k.to_vec())
}

/// Makes sure the leaf holding this entry is >= 32 bytes when RLP encoded, so
/// it gets referenced by hash.
pub(crate) fn large_entry(k: &[u8]) -> TestInsertValEntry {
    (k.to_vec(), once(2).chain(repeat(255).take(32)).collect())
}

/// Generates `n` entries with random distinct keys of `key_len` bytes and
/// random values of varying length.
pub(crate) fn generate_n_random_fixed_entries(
    n: usize,
    key_len: usize,
    seed: u64,
) -> impl Iterator<Item = TestInsertValEntry> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut seen = HashSet::new();

    (0..)
        .map(move |_| {
            let mut k = vec![0; key_len];
            rng.fill_bytes(&mut k);
            (k, gen_rand_value(&mut rng))
        })
        .filter(move |(k, _)| seen.insert(k.clone()))
        .take(n)
}

/// Generates entries keyed like a block's transaction trie: the key is the RLP
/// of the index `0..n`.
pub(crate) fn generate_n_random_rlp_index_entries(
    n: usize,
    seed: u64,
) -> impl Iterator<Item = TestInsertValEntry> {
    let mut rng = StdRng::seed_from_u64(seed);

    (0..n as u64).map(move |i| (rlp::encode(&i).to_vec(), gen_rand_value(&mut rng)))
}

fn gen_rand_value(rng: &mut StdRng) -> Vec<u8> {
    let len = rng.gen_range(1..=120);
    (0..len).map(|_| rng.gen()).collect()
}
