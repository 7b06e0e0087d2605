//! Inclusion proofs for the transactions and receipts of an Ethereum block.
//!
//! The block's entries are fetched from a [`ChainDataSource`], re-encoded in
//! their canonical consensus form and inserted into a fresh
//! [`MerklePatriciaTrie`](mpt_trie::trie::MerklePatriciaTrie). The proof for
//! the requested entry is then extracted and the computed root is compared
//! with the root published in the block header.
//!
//! [`ChainDataSource`]: provider::ChainDataSource

pub mod compat;
pub mod encoding;
pub mod env;
pub mod orchestrator;
pub mod provider;
pub mod retry;
pub mod tracing;
pub mod types;

/// Like `#[serde(with = "::hex")]`, but tolerates and emits leading `0x`
/// prefixes
mod hex {
    use serde::{de::Error as _, Deserialize as _, Deserializer, Serializer};

    pub fn serialize<S: Serializer, T>(data: T, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: hex::ToHex,
    {
        let s = data.encode_hex::<String>();
        serializer.serialize_str(&format!("0x{}", s))
    }

    pub fn deserialize<'de, D: Deserializer<'de>, T>(deserializer: D) -> Result<T, D::Error>
    where
        T: hex::FromHex,
        T::Error: std::fmt::Display,
    {
        let s = String::deserialize(deserializer)?;
        match s.strip_prefix("0x") {
            Some(rest) => T::from_hex(rest),
            None => T::from_hex(&*s),
        }
        .map_err(D::Error::custom)
    }

    /// The same for a list of byte strings.
    pub mod list {
        use serde::{
            de::Error as _, ser::SerializeSeq as _, Deserialize as _, Deserializer, Serializer,
        };

        pub fn serialize<S: Serializer>(data: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
            let mut seq = serializer.serialize_seq(Some(data.len()))?;
            for item in data {
                seq.serialize_element(&format!("0x{}", hex::encode(item)))?;
            }
            seq.end()
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Vec<Vec<u8>>, D::Error> {
            Vec::<String>::deserialize(deserializer)?
                .iter()
                .map(|s| hex::decode(s.strip_prefix("0x").unwrap_or(s)))
                .collect::<Result<_, _>>()
                .map_err(D::Error::custom)
        }
    }
}
