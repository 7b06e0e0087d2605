use std::{fmt, str::FromStr};

use ethereum_types::H256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifies the block to read from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BlockSelector {
    Hash(H256),
    Number(u64),
    Latest,
}

#[derive(Debug, Error)]
#[error("invalid block {input:?}: expected `latest`, a block number or a 32 byte block hash")]
pub struct ParseBlockSelectorError {
    input: String,
}

impl FromStr for BlockSelector {
    type Err = ParseBlockSelectorError;

    /// Accepts `latest`, a decimal or `0x` prefixed block number, or a
    /// `0x` prefixed 32 byte hash.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseBlockSelectorError {
            input: s.to_owned(),
        };

        if s.eq_ignore_ascii_case("latest") {
            return Ok(BlockSelector::Latest);
        }

        match s.strip_prefix("0x") {
            Some(digits) if digits.len() == 64 => {
                let mut hash = [0; 32];
                hex::decode_to_slice(digits, &mut hash).map_err(|_| err())?;
                Ok(BlockSelector::Hash(H256(hash)))
            }
            Some(digits) => u64::from_str_radix(digits, 16)
                .map(BlockSelector::Number)
                .map_err(|_| err()),
            None => s.parse().map(BlockSelector::Number).map_err(|_| err()),
        }
    }
}

impl fmt::Display for BlockSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockSelector::Hash(h) => write!(f, "{h:#x}"),
            BlockSelector::Number(n) => write!(f, "{n}"),
            BlockSelector::Latest => write!(f, "latest"),
        }
    }
}

impl From<H256> for BlockSelector {
    fn from(hash: H256) -> Self {
        BlockSelector::Hash(hash)
    }
}

impl From<u64> for BlockSelector {
    fn from(number: u64) -> Self {
        BlockSelector::Number(number)
    }
}

/// The parts of a block header the proofs are checked against, plus the
/// block's transaction hashes in block order.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockReference {
    pub hash: H256,
    pub number: u64,
    pub state_root: H256,
    pub transactions_root: H256,
    pub receipts_root: H256,
    pub transactions: Vec<H256>,
}

#[cfg(test)]
mod tests {
    use ethereum_types::H256;

    use super::BlockSelector;

    #[test]
    fn parses_block_selectors() -> anyhow::Result<()> {
        assert_eq!("latest".parse::<BlockSelector>()?, BlockSelector::Latest);
        assert_eq!("19000000".parse::<BlockSelector>()?, BlockSelector::Number(19_000_000));
        assert_eq!("0x10".parse::<BlockSelector>()?, BlockSelector::Number(16));

        let hash = format!("0x{}", "ab".repeat(32));
        assert_eq!(
            hash.parse::<BlockSelector>()?,
            BlockSelector::Hash(H256::repeat_byte(0xab))
        );
        assert_eq!(BlockSelector::Hash(H256::repeat_byte(0xab)).to_string(), hash);

        Ok(())
    }

    #[test]
    fn rejects_garbage() {
        assert!("".parse::<BlockSelector>().is_err());
        assert!("pending".parse::<BlockSelector>().is_err());
        assert!(format!("0x{}", "zz".repeat(32)).parse::<BlockSelector>().is_err());
    }
}
