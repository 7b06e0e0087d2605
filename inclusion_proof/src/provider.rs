//! Where blocks, transactions, receipts and account proofs come from.

use std::future::Future;

use alloy::{
    providers::Provider,
    rpc::types::{
        AccessList, Block, BlockId, BlockTransactionsKind, Transaction, TransactionReceipt,
    },
    transports::Transport,
};
use anyhow::{bail, Context as _};
use ethereum_types::{H160, H256, U256};

use crate::{
    compat::Compat,
    encoding::{
        receipt::{LogRecord, ReceiptRecord},
        txn::{
            AccessListItem, AccessListTxn, DynamicFeeTxn, LegacyTxn, TransactionRecord,
            TxnEnvelope, TypedTransaction, ACCESS_LIST_TX_TYPE, DYNAMIC_FEE_TX_TYPE,
        },
    },
    types::{BlockReference, BlockSelector},
};

/// A read only view of the chain.
///
/// Failures are reported as they are; retrying is left to the
/// implementation's transport.
pub trait ChainDataSource {
    fn block_header(
        &self,
        block: BlockSelector,
    ) -> impl Future<Output = anyhow::Result<BlockReference>> + Send;

    fn transaction(
        &self,
        hash: H256,
    ) -> impl Future<Output = anyhow::Result<TransactionRecord>> + Send;

    fn transaction_receipt(
        &self,
        hash: H256,
    ) -> impl Future<Output = anyhow::Result<ReceiptRecord>> + Send;

    /// The `eth_getProof` response for `address` and `storage_keys`.
    fn account_proof(
        &self,
        address: H160,
        storage_keys: Vec<H256>,
        block: BlockSelector,
    ) -> impl Future<Output = anyhow::Result<serde_json::Value>> + Send;
}

/// A [`ChainDataSource`] backed by a JSON-RPC node.
pub struct RpcDataSource<ProviderT, TransportT> {
    provider: ProviderT,
    _phantom: std::marker::PhantomData<TransportT>,
}

impl<ProviderT, TransportT> RpcDataSource<ProviderT, TransportT>
where
    ProviderT: Provider<TransportT>,
    TransportT: Transport + Clone,
{
    pub const fn new(provider: ProviderT) -> Self {
        Self {
            provider,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<ProviderT, TransportT> ChainDataSource for RpcDataSource<ProviderT, TransportT>
where
    ProviderT: Provider<TransportT>,
    TransportT: Transport + Clone,
{
    async fn block_header(&self, block: BlockSelector) -> anyhow::Result<BlockReference> {
        let block = self
            .provider
            .get_block(to_block_id(block), BlockTransactionsKind::Hashes)
            .await?
            .with_context(|| format!("block {block} does not exist"))?;

        block_reference(block)
    }

    async fn transaction(&self, hash: H256) -> anyhow::Result<TransactionRecord> {
        let tx = self
            .provider
            .get_transaction_by_hash(hash.compat())
            .await?
            .with_context(|| format!("transaction {hash:#x} does not exist"))?;

        transaction_record(tx).with_context(|| format!("bad transaction {hash:#x}"))
    }

    async fn transaction_receipt(&self, hash: H256) -> anyhow::Result<ReceiptRecord> {
        let receipt = self
            .provider
            .get_transaction_receipt(hash.compat())
            .await?
            .with_context(|| format!("no receipt for transaction {hash:#x}"))?;

        receipt_record(receipt).with_context(|| format!("bad receipt for {hash:#x}"))
    }

    async fn account_proof(
        &self,
        address: H160,
        storage_keys: Vec<H256>,
        block: BlockSelector,
    ) -> anyhow::Result<serde_json::Value> {
        let keys: Vec<alloy::primitives::B256> =
            storage_keys.into_iter().map(Compat::compat).collect();
        let proof = self
            .provider
            .get_proof(address.compat(), keys)
            .block_id(to_block_id(block))
            .await
            .with_context(|| format!("eth_getProof failed for {address:#x} at block {block}"))?;

        Ok(serde_json::to_value(proof)?)
    }
}

fn to_block_id(block: BlockSelector) -> BlockId {
    match block {
        BlockSelector::Hash(hash) => BlockId::from(Compat::<alloy::primitives::B256>::compat(hash)),
        BlockSelector::Number(number) => BlockId::from(number),
        BlockSelector::Latest => BlockId::latest(),
    }
}

fn block_reference(block: Block) -> anyhow::Result<BlockReference> {
    let transactions = block
        .transactions
        .as_hashes()
        .context("block was returned with full transactions")?
        .iter()
        .map(|h| h.compat())
        .collect();

    Ok(BlockReference {
        hash: block.header.hash.compat(),
        number: block.header.number,
        state_root: block.header.state_root.compat(),
        transactions_root: block.header.transactions_root.compat(),
        receipts_root: block.header.receipts_root.compat(),
        transactions,
    })
}

fn transaction_record(tx: Transaction) -> anyhow::Result<TransactionRecord> {
    let hash: H256 = tx.hash.compat();
    let block_hash = tx.block_hash.context("transaction is still pending")?.compat();
    let index = tx.transaction_index.context("transaction has no index")?;
    let tx_type = tx.transaction_type.unwrap_or_default();

    let envelope = match tx_type {
        0 | ACCESS_LIST_TX_TYPE | DYNAMIC_FEE_TX_TYPE => {
            TxnEnvelope::Supported(typed_transaction(tx_type, tx)?)
        }
        other => TxnEnvelope::Unsupported { tx_type: other },
    };

    Ok(TransactionRecord {
        hash,
        block_hash,
        index,
        envelope,
    })
}

fn typed_transaction(tx_type: u8, tx: Transaction) -> anyhow::Result<TypedTransaction> {
    let sig = tx.signature.context("transaction is not signed")?;
    let (v, r, s) = (sig.v.compat(), sig.r.compat(), sig.s.compat());
    let to = tx.to.map(Compat::compat);
    let value = tx.value.compat();
    let input = tx.input.to_vec();
    let nonce = U256::from(tx.nonce);
    let gas_limit = U256::from(tx.gas);

    Ok(match tx_type {
        0 => TypedTransaction::Legacy(LegacyTxn {
            nonce,
            gas_price: U256::from(tx.gas_price.context("missing gasPrice")?),
            gas_limit,
            to,
            value,
            input,
            v,
            r,
            s,
        }),
        ACCESS_LIST_TX_TYPE => TypedTransaction::AccessList(AccessListTxn {
            chain_id: U256::from(tx.chain_id.context("missing chainId")?),
            nonce,
            gas_price: U256::from(tx.gas_price.context("missing gasPrice")?),
            gas_limit,
            to,
            value,
            input,
            access_list: access_list(tx.access_list),
            v,
            r,
            s,
        }),
        DYNAMIC_FEE_TX_TYPE => TypedTransaction::DynamicFee(DynamicFeeTxn {
            chain_id: U256::from(tx.chain_id.context("missing chainId")?),
            nonce,
            max_priority_fee_per_gas: U256::from(
                tx.max_priority_fee_per_gas
                    .context("missing maxPriorityFeePerGas")?,
            ),
            max_fee_per_gas: U256::from(tx.max_fee_per_gas.context("missing maxFeePerGas")?),
            gas_limit,
            to,
            value,
            input,
            access_list: access_list(tx.access_list),
            v,
            r,
            s,
        }),
        other => bail!("unsupported transaction type {other:#04x}"),
    })
}

fn access_list(list: Option<AccessList>) -> Vec<AccessListItem> {
    list.map(|list| list.0)
        .unwrap_or_default()
        .into_iter()
        .map(|item| AccessListItem {
            address: item.address.compat(),
            storage_keys: item.storage_keys.into_iter().map(Compat::compat).collect(),
        })
        .collect()
}

fn receipt_record(receipt: TransactionReceipt) -> anyhow::Result<ReceiptRecord> {
    let envelope = &receipt.inner;
    let logs = envelope
        .logs()
        .iter()
        .map(|log| LogRecord {
            address: log.inner.address.compat(),
            topics: log.topics().iter().map(|t| t.compat()).collect(),
            data: log.inner.data.data.to_vec(),
        })
        .collect();

    Ok(ReceiptRecord {
        transaction_hash: receipt.transaction_hash.compat(),
        block_hash: receipt
            .block_hash
            .context("receipt of a pending transaction")?
            .compat(),
        index: receipt.transaction_index.context("receipt has no index")?,
        tx_type: Some(u8::from(envelope.tx_type())),
        status: envelope.status(),
        cumulative_gas_used: U256::from(envelope.cumulative_gas_used()),
        logs_bloom: (*envelope.logs_bloom()).compat(),
        logs,
    })
}
