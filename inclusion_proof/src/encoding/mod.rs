//! Canonical RLP encoding of the values that end up in a block's tries.
//!
//! Transactions and receipts have their own encoders in [`txn`] and
//! [`receipt`]. This module holds the generic building block they share:
//! [`RlpValue`], a loosely typed value as found in JSON-RPC payloads, and the
//! encoding of trie keys.

use bytes::{BufMut, Bytes, BytesMut};
use ethereum_types::{Bloom, H160, H256, U256};
use rlp::{Encodable, Rlp, RlpStream};
use thiserror::Error;

pub mod receipt;
pub mod txn;

/// Everything that can go wrong when turning external data into canonical
/// bytes or back.
#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("invalid hex string {input:?}: {source}")]
    InvalidHex {
        input: String,
        #[source]
        source: hex::FromHexError,
    },

    #[error("integer of {0} bytes does not fit in 256 bits")]
    IntegerTooWide(usize),

    #[error("malformed RLP: {0}")]
    Rlp(#[from] rlp::DecoderError),

    #[error("expected {expected} RLP fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("{0} trailing bytes after the RLP item")]
    TrailingBytes(usize),

    #[error("cannot decode an empty byte string")]
    EmptyInput,

    #[error("unsupported transaction type {0:#04x}")]
    UnsupportedTxType(u8),

    #[error("type byte {0:#04x} is outside the typed envelope range 0x00..=0x7f")]
    InvalidTypeByte(u8),
}

/// A value to be RLP encoded.
///
/// JSON-RPC hands out every field as a hex string. `"0x"` means "nothing" and
/// must become the RLP empty string, never the text of the sentinel.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RlpValue {
    /// An unsigned integer, encoded big endian without leading zeros. Zero is
    /// the empty string.
    Uint(U256),
    /// A raw byte string.
    Bytes(Vec<u8>),
    /// The `0x` sentinel: the empty byte string.
    Empty,
    /// A list of values.
    List(Vec<RlpValue>),
}

impl RlpValue {
    /// Parses a hex byte string. An odd number of digits gets a leading `0`
    /// nibble, and `"0x"` (or `""`) yields [`RlpValue::Empty`].
    pub fn from_hex_str(s: &str) -> Result<Self, EncodingError> {
        let bytes = decode_hex_padded(s)?;

        Ok(match bytes.is_empty() {
            true => RlpValue::Empty,
            false => RlpValue::Bytes(bytes),
        })
    }

    /// Parses a hex quantity (such as `"0x1b4"`) as an unsigned integer.
    pub fn from_quantity_hex(s: &str) -> Result<Self, EncodingError> {
        let bytes = decode_hex_padded(s)?;
        let first_nonzero = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
        let significant = &bytes[first_nonzero..];

        if significant.len() > 32 {
            return Err(EncodingError::IntegerTooWide(significant.len()));
        }

        Ok(RlpValue::Uint(U256::from_big_endian(significant)))
    }
}

impl From<U256> for RlpValue {
    fn from(v: U256) -> Self {
        RlpValue::Uint(v)
    }
}

impl From<u64> for RlpValue {
    fn from(v: u64) -> Self {
        RlpValue::Uint(v.into())
    }
}

impl From<Vec<u8>> for RlpValue {
    fn from(v: Vec<u8>) -> Self {
        match v.is_empty() {
            true => RlpValue::Empty,
            false => RlpValue::Bytes(v),
        }
    }
}

impl From<Vec<RlpValue>> for RlpValue {
    fn from(v: Vec<RlpValue>) -> Self {
        RlpValue::List(v)
    }
}

impl From<H160> for RlpValue {
    fn from(v: H160) -> Self {
        RlpValue::Bytes(v.as_bytes().to_vec())
    }
}

impl From<H256> for RlpValue {
    fn from(v: H256) -> Self {
        RlpValue::Bytes(v.as_bytes().to_vec())
    }
}

impl From<Bloom> for RlpValue {
    fn from(v: Bloom) -> Self {
        RlpValue::Bytes(v.as_bytes().to_vec())
    }
}

/// A missing address, as in the `to` of a contract creation, is the `0x`
/// sentinel.
impl From<Option<H160>> for RlpValue {
    fn from(v: Option<H160>) -> Self {
        v.map_or(RlpValue::Empty, RlpValue::from)
    }
}

impl Encodable for RlpValue {
    fn rlp_append(&self, s: &mut RlpStream) {
        match self {
            RlpValue::Uint(v) => {
                s.append(v);
            }
            RlpValue::Bytes(b) => {
                s.append(&b.as_slice());
            }
            RlpValue::Empty => {
                s.append_empty_data();
            }
            RlpValue::List(items) => {
                s.begin_list(items.len());
                for item in items {
                    s.append(item);
                }
            }
        }
    }
}

/// RLP encodes a value.
pub fn encode(value: &RlpValue) -> Bytes {
    rlp::encode(value).freeze()
}

/// RLP encodes `value` behind its EIP-2718 type byte. Type `0` is a legacy
/// payload and gets no prefix.
pub(crate) fn encode_typed(tx_type: u8, value: &RlpValue) -> Bytes {
    let payload = encode(value);
    if tx_type == 0 {
        return payload;
    }

    let mut out = BytesMut::with_capacity(payload.len() + 1);
    out.put_u8(tx_type);
    out.put_slice(&payload);

    out.freeze()
}

/// The trie key of the entry at `index` in its block: the RLP of the index.
pub fn encode_index(index: u64) -> Bytes {
    rlp::encode(&index).freeze()
}

fn decode_hex_padded(s: &str) -> Result<Vec<u8>, EncodingError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    let res = match digits.len() % 2 {
        0 => hex::decode(digits),
        _ => hex::decode(format!("0{digits}")),
    };

    res.map_err(|source| EncodingError::InvalidHex {
        input: s.to_owned(),
        source,
    })
}

/// Checks that `rlp` is a list of exactly `expected` items spanning the whole
/// input.
pub(crate) fn expect_list(rlp: &Rlp<'_>, expected: usize) -> Result<(), EncodingError> {
    let info = rlp.payload_info()?;
    let len = info.header_len + info.value_len;
    let raw_len = rlp.as_raw().len();
    if len > raw_len {
        return Err(rlp::DecoderError::RlpIsTooShort.into());
    }
    if len < raw_len {
        return Err(EncodingError::TrailingBytes(raw_len - len));
    }

    if !rlp.is_list() {
        return Err(rlp::DecoderError::RlpExpectedToBeList.into());
    }

    let found = rlp.item_count()?;
    match found == expected {
        true => Ok(()),
        false => Err(EncodingError::FieldCount { expected, found }),
    }
}
