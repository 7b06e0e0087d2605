//! Canonical (EIP-2718) encoding of signed transactions.
//!
//! - legacy: `rlp([nonce, gasPrice, gasLimit, to, value, input, v, r, s])`
//! - access list: `0x01 || rlp([chainId, nonce, gasPrice, gasLimit, to, value,
//!   input, accessList, v, r, s])`
//! - dynamic fee: `0x02 || rlp([chainId, nonce, maxPriorityFeePerGas,
//!   maxFeePerGas, gasLimit, to, value, input, accessList, v, r, s])`

use bytes::Bytes;
use enum_as_inner::EnumAsInner;
use ethereum_types::{H160, H256, U256};
use keccak_hash::keccak;
use rlp::{Decodable, DecoderError, Rlp};

use super::{encode_typed, expect_list, EncodingError, RlpValue};

/// Type byte of access list (EIP-2930) transactions.
pub const ACCESS_LIST_TX_TYPE: u8 = 0x01;
/// Type byte of dynamic fee (EIP-1559) transactions.
pub const DYNAMIC_FEE_TX_TYPE: u8 = 0x02;

const LEGACY_FIELDS: usize = 9;
const ACCESS_LIST_FIELDS: usize = 11;
const DYNAMIC_FEE_FIELDS: usize = 12;

/// One `[address, [storageKey, ...]]` entry of an access list.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AccessListItem {
    pub address: H160,
    pub storage_keys: Vec<H256>,
}

impl From<&AccessListItem> for RlpValue {
    fn from(item: &AccessListItem) -> Self {
        RlpValue::List(vec![
            item.address.into(),
            RlpValue::List(item.storage_keys.iter().copied().map(RlpValue::from).collect()),
        ])
    }
}

impl Decodable for AccessListItem {
    fn decode(rlp: &Rlp<'_>) -> Result<Self, DecoderError> {
        if rlp.item_count()? != 2 {
            return Err(DecoderError::RlpIncorrectListLen);
        }

        Ok(Self {
            address: rlp.val_at(0)?,
            storage_keys: rlp.list_at(1)?,
        })
    }
}

/// A pre-EIP-2718 transaction.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LegacyTxn {
    pub nonce: U256,
    pub gas_price: U256,
    pub gas_limit: U256,
    /// `None` for contract creation.
    pub to: Option<H160>,
    pub value: U256,
    pub input: Vec<u8>,
    pub v: U256,
    pub r: U256,
    pub s: U256,
}

/// An EIP-2930 transaction.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AccessListTxn {
    pub chain_id: U256,
    pub nonce: U256,
    pub gas_price: U256,
    pub gas_limit: U256,
    pub to: Option<H160>,
    pub value: U256,
    pub input: Vec<u8>,
    pub access_list: Vec<AccessListItem>,
    /// The y parity of the signature.
    pub v: U256,
    pub r: U256,
    pub s: U256,
}

/// An EIP-1559 transaction.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DynamicFeeTxn {
    pub chain_id: U256,
    pub nonce: U256,
    pub max_priority_fee_per_gas: U256,
    pub max_fee_per_gas: U256,
    pub gas_limit: U256,
    pub to: Option<H160>,
    pub value: U256,
    pub input: Vec<u8>,
    pub access_list: Vec<AccessListItem>,
    /// The y parity of the signature.
    pub v: U256,
    pub r: U256,
    pub s: U256,
}

impl From<&LegacyTxn> for RlpValue {
    fn from(tx: &LegacyTxn) -> Self {
        RlpValue::List(vec![
            tx.nonce.into(),
            tx.gas_price.into(),
            tx.gas_limit.into(),
            tx.to.into(),
            tx.value.into(),
            tx.input.clone().into(),
            tx.v.into(),
            tx.r.into(),
            tx.s.into(),
        ])
    }
}

impl From<&AccessListTxn> for RlpValue {
    fn from(tx: &AccessListTxn) -> Self {
        RlpValue::List(vec![
            tx.chain_id.into(),
            tx.nonce.into(),
            tx.gas_price.into(),
            tx.gas_limit.into(),
            tx.to.into(),
            tx.value.into(),
            tx.input.clone().into(),
            access_list_value(&tx.access_list),
            tx.v.into(),
            tx.r.into(),
            tx.s.into(),
        ])
    }
}

impl From<&DynamicFeeTxn> for RlpValue {
    fn from(tx: &DynamicFeeTxn) -> Self {
        RlpValue::List(vec![
            tx.chain_id.into(),
            tx.nonce.into(),
            tx.max_priority_fee_per_gas.into(),
            tx.max_fee_per_gas.into(),
            tx.gas_limit.into(),
            tx.to.into(),
            tx.value.into(),
            tx.input.clone().into(),
            access_list_value(&tx.access_list),
            tx.v.into(),
            tx.r.into(),
            tx.s.into(),
        ])
    }
}

impl From<&TypedTransaction> for RlpValue {
    fn from(tx: &TypedTransaction) -> Self {
        match tx {
            TypedTransaction::Legacy(tx) => tx.into(),
            TypedTransaction::AccessList(tx) => tx.into(),
            TypedTransaction::DynamicFee(tx) => tx.into(),
        }
    }
}

/// A signed transaction of one of the supported types.
#[derive(Clone, Debug, EnumAsInner, Eq, PartialEq)]
pub enum TypedTransaction {
    Legacy(LegacyTxn),
    AccessList(AccessListTxn),
    DynamicFee(DynamicFeeTxn),
}

impl TypedTransaction {
    /// The EIP-2718 type byte. `0` for legacy transactions.
    pub const fn tx_type(&self) -> u8 {
        match self {
            TypedTransaction::Legacy(_) => 0,
            TypedTransaction::AccessList(_) => ACCESS_LIST_TX_TYPE,
            TypedTransaction::DynamicFee(_) => DYNAMIC_FEE_TX_TYPE,
        }
    }

    /// The canonical bytes of the transaction, as stored in the transactions
    /// trie. Typed transactions get their type byte prepended to the RLP list.
    pub fn encode(&self) -> Bytes {
        encode_typed(self.tx_type(), &RlpValue::from(self))
    }

    /// The transaction hash: keccak of the canonical bytes.
    pub fn hash(&self) -> H256 {
        keccak(self.encode())
    }

    /// Reverses [`TypedTransaction::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self, EncodingError> {
        let first = *bytes.first().ok_or(EncodingError::EmptyInput)?;

        match first {
            ACCESS_LIST_TX_TYPE => {
                let rlp = Rlp::new(&bytes[1..]);
                expect_list(&rlp, ACCESS_LIST_FIELDS)?;

                Ok(TypedTransaction::AccessList(AccessListTxn {
                    chain_id: rlp.val_at(0)?,
                    nonce: rlp.val_at(1)?,
                    gas_price: rlp.val_at(2)?,
                    gas_limit: rlp.val_at(3)?,
                    to: decode_to(&rlp.at(4)?)?,
                    value: rlp.val_at(5)?,
                    input: rlp.val_at(6)?,
                    access_list: rlp.list_at(7)?,
                    v: rlp.val_at(8)?,
                    r: rlp.val_at(9)?,
                    s: rlp.val_at(10)?,
                }))
            }
            DYNAMIC_FEE_TX_TYPE => {
                let rlp = Rlp::new(&bytes[1..]);
                expect_list(&rlp, DYNAMIC_FEE_FIELDS)?;

                Ok(TypedTransaction::DynamicFee(DynamicFeeTxn {
                    chain_id: rlp.val_at(0)?,
                    nonce: rlp.val_at(1)?,
                    max_priority_fee_per_gas: rlp.val_at(2)?,
                    max_fee_per_gas: rlp.val_at(3)?,
                    gas_limit: rlp.val_at(4)?,
                    to: decode_to(&rlp.at(5)?)?,
                    value: rlp.val_at(6)?,
                    input: rlp.val_at(7)?,
                    access_list: rlp.list_at(8)?,
                    v: rlp.val_at(9)?,
                    r: rlp.val_at(10)?,
                    s: rlp.val_at(11)?,
                }))
            }
            0xc0.. => {
                let rlp = Rlp::new(bytes);
                expect_list(&rlp, LEGACY_FIELDS)?;

                Ok(TypedTransaction::Legacy(LegacyTxn {
                    nonce: rlp.val_at(0)?,
                    gas_price: rlp.val_at(1)?,
                    gas_limit: rlp.val_at(2)?,
                    to: decode_to(&rlp.at(3)?)?,
                    value: rlp.val_at(4)?,
                    input: rlp.val_at(5)?,
                    v: rlp.val_at(6)?,
                    r: rlp.val_at(7)?,
                    s: rlp.val_at(8)?,
                }))
            }
            other => Err(EncodingError::UnsupportedTxType(other)),
        }
    }
}

/// A transaction as reported by a data source: either one we can encode or
/// the type byte of one we cannot.
#[derive(Clone, Debug, EnumAsInner, Eq, PartialEq)]
pub enum TxnEnvelope {
    Supported(TypedTransaction),
    Unsupported { tx_type: u8 },
}

impl TxnEnvelope {
    /// The canonical bytes, or an empty byte string for unsupported types so
    /// that blocks mixing in newer types can still be processed.
    pub fn encode(&self) -> Bytes {
        match self {
            TxnEnvelope::Supported(tx) => tx.encode(),
            TxnEnvelope::Unsupported { .. } => Bytes::new(),
        }
    }

    pub const fn tx_type(&self) -> u8 {
        match self {
            TxnEnvelope::Supported(tx) => tx.tx_type(),
            TxnEnvelope::Unsupported { tx_type } => *tx_type,
        }
    }
}

impl From<TypedTransaction> for TxnEnvelope {
    fn from(tx: TypedTransaction) -> Self {
        TxnEnvelope::Supported(tx)
    }
}

/// A transaction and where it sits in its block.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransactionRecord {
    pub hash: H256,
    pub block_hash: H256,
    /// Position in the block, starting at 0.
    pub index: u64,
    pub envelope: TxnEnvelope,
}

impl TransactionRecord {
    pub fn encode(&self) -> Bytes {
        self.envelope.encode()
    }
}

fn access_list_value(access_list: &[AccessListItem]) -> RlpValue {
    RlpValue::List(access_list.iter().map(RlpValue::from).collect())
}

fn decode_to(rlp: &Rlp<'_>) -> Result<Option<H160>, DecoderError> {
    match rlp.is_empty() {
        true => Ok(None),
        false => rlp.as_val().map(Some),
    }
}
