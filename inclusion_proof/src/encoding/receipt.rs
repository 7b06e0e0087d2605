//! Canonical encoding of transaction receipts.
//!
//! A receipt is `rlp([status, cumulativeGasUsed, logsBloom, logs])`, with the
//! EIP-2718 type byte in front for typed transactions, and each log is
//! `rlp([address, [topic, ...], data])`.

use bytes::Bytes;
use ethereum_types::{Bloom, H160, H256, U256};
use serde::{Deserialize, Serialize};

use super::{encode, encode_typed, EncodingError, RlpValue};

/// Receipt status of a successful transaction.
const STATUS_SUCCESS: u64 = 1;

/// A log emitted while executing a transaction.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct LogRecord {
    pub address: H160,
    pub topics: Vec<H256>,
    #[serde(with = "crate::hex")]
    pub data: Vec<u8>,
}

impl From<&LogRecord> for RlpValue {
    fn from(log: &LogRecord) -> Self {
        RlpValue::List(vec![
            log.address.into(),
            RlpValue::List(log.topics.iter().copied().map(RlpValue::from).collect()),
            log.data.clone().into(),
        ])
    }
}

impl LogRecord {
    pub fn encode(&self) -> Bytes {
        encode(&self.into())
    }
}

/// A transaction receipt and where it sits in its block.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReceiptRecord {
    pub transaction_hash: H256,
    pub block_hash: H256,
    /// Position in the block, starting at 0.
    pub index: u64,
    /// `None` or `Some(0)` for legacy transactions.
    pub tx_type: Option<u8>,
    pub status: bool,
    pub cumulative_gas_used: U256,
    pub logs_bloom: Bloom,
    pub logs: Vec<LogRecord>,
}

impl ReceiptRecord {
    /// The canonical bytes of the receipt, as stored in the receipts trie.
    ///
    /// A failed status is the empty string and a successful one `0x01`.
    pub fn encode(&self) -> Result<Bytes, EncodingError> {
        let tx_type = self.tx_type.unwrap_or_default();
        if tx_type > 0x7f {
            return Err(EncodingError::InvalidTypeByte(tx_type));
        }

        Ok(encode_typed(tx_type, &self.into()))
    }
}

impl From<&ReceiptRecord> for RlpValue {
    fn from(receipt: &ReceiptRecord) -> Self {
        let status = match receipt.status {
            true => RlpValue::from(STATUS_SUCCESS),
            false => RlpValue::Empty,
        };

        RlpValue::List(vec![
            status,
            receipt.cumulative_gas_used.into(),
            receipt.logs_bloom.into(),
            RlpValue::List(receipt.logs.iter().map(RlpValue::from).collect()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use ethereum_types::{Bloom, H160, H256, U256};

    use super::{LogRecord, ReceiptRecord};
    use crate::encoding::{encode, EncodingError, RlpValue};

    fn receipt(tx_type: Option<u8>, status: bool) -> ReceiptRecord {
        ReceiptRecord {
            transaction_hash: H256::repeat_byte(0x01),
            block_hash: H256::repeat_byte(0x02),
            index: 0,
            tx_type,
            status,
            cumulative_gas_used: U256::from(21_000_u64),
            logs_bloom: Bloom::zero(),
            logs: vec![],
        }
    }

    #[test]
    fn matches_the_hex_field_encoding() -> Result<(), EncodingError> {
        // What a JSON-RPC client would hand over for a failed receipt with no
        // logs and no gas used.
        let mut failed = receipt(None, false);
        failed.cumulative_gas_used = U256::zero();

        let from_hex = RlpValue::List(vec![
            RlpValue::from_hex_str("0x")?,
            RlpValue::from_quantity_hex("0x0")?,
            RlpValue::from_hex_str(&format!("0x{}", "00".repeat(256)))?,
            RlpValue::List(vec![]),
        ]);

        assert_eq!(failed.encode()?, encode(&from_hex));

        Ok(())
    }

    #[test]
    fn typed_receipt_with_a_log_matches_the_hex_fields() -> Result<(), EncodingError> {
        let mut ok = receipt(Some(2), true);
        ok.logs = vec![LogRecord {
            address: H160::from_low_u64_be(0xff),
            topics: vec![H256::from_low_u64_be(1)],
            data: vec![],
        }];

        let from_hex = RlpValue::List(vec![
            RlpValue::from_quantity_hex("0x1")?,
            RlpValue::from_quantity_hex("0x5208")?,
            RlpValue::from_hex_str(&format!("0x{}", "00".repeat(256)))?,
            RlpValue::List(vec![RlpValue::List(vec![
                RlpValue::from_hex_str("0x00000000000000000000000000000000000000ff")?,
                RlpValue::List(vec![RlpValue::from_hex_str(&format!(
                    "0x{}01",
                    "00".repeat(31)
                ))?]),
                RlpValue::from_hex_str("0x")?,
            ])]),
        ]);

        let encoded = ok.encode()?;
        assert_eq!(RlpValue::from(&ok), from_hex);
        assert_eq!(encoded[0], 0x02);
        assert_eq!(&encoded[1..], &encode(&from_hex)[..]);

        Ok(())
    }

    #[test]
    fn status_and_gas_fields() -> Result<(), EncodingError> {
        let ok = receipt(None, true).encode()?;
        let rlp = rlp::Rlp::new(&ok);

        assert_eq!(rlp.item_count()?, 4);
        assert_eq!(rlp.at(0)?.as_raw(), &[0x01]);
        assert_eq!(rlp.at(1)?.as_raw(), &[0x82, 0x52, 0x08]);
        assert_eq!(rlp.at(2)?.data()?.len(), 256);

        let failed = receipt(None, false).encode()?;
        assert_eq!(rlp::Rlp::new(&failed).at(0)?.as_raw(), &[0x80]);

        Ok(())
    }

    #[test]
    fn typed_receipts_are_prefixed() -> Result<(), EncodingError> {
        let legacy = receipt(None, true).encode()?;
        let explicit_legacy = receipt(Some(0), true).encode()?;
        let dynamic = receipt(Some(2), true).encode()?;

        assert_eq!(legacy, explicit_legacy);
        assert_eq!(dynamic[0], 0x02);
        assert_eq!(&dynamic[1..], &legacy[..]);

        Ok(())
    }

    #[test]
    fn rejects_type_bytes_outside_the_envelope_range() {
        assert!(matches!(
            receipt(Some(0xc0), true).encode(),
            Err(EncodingError::InvalidTypeByte(0xc0))
        ));
    }

    #[test]
    fn logs_are_encoded_in_order() -> Result<(), EncodingError> {
        let first = LogRecord {
            address: H160::repeat_byte(0x0a),
            topics: vec![H256::repeat_byte(0xee)],
            data: vec![0x01, 0x02],
        };
        let second = LogRecord {
            address: H160::repeat_byte(0x0b),
            topics: vec![],
            data: vec![],
        };

        let mut forward = receipt(Some(2), true);
        forward.logs = vec![first.clone(), second.clone()];
        let mut backward = forward.clone();
        backward.logs = vec![second, first.clone()];

        let encoded = forward.encode()?;
        let logs = rlp::Rlp::new(&encoded[1..]).at(3)?;
        assert_eq!(logs.item_count()?, 2);
        assert_eq!(logs.at(0)?.as_raw(), &first.encode()[..]);
        assert_ne!(encoded, backward.encode()?);

        Ok(())
    }
}
