//! An in-memory chain for driving the orchestrator without a node.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use anyhow::{anyhow, Context as _};
use eth_trie::{EthTrie, MemoryDB, Trie as _};
use ethereum_types::{Bloom, H160, H256, U256};
use inclusion_proof::{
    encoding::{
        encode_index,
        receipt::{LogRecord, ReceiptRecord},
        txn::{LegacyTxn, TransactionRecord, TxnEnvelope, TypedTransaction},
    },
    provider::ChainDataSource,
    types::{BlockReference, BlockSelector},
};
use keccak_hash::keccak;
use tokio::time::Instant;

/// One call made against a [`FakeChain`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Fetch {
    Block(BlockSelector),
    Transaction(H256),
    Receipt(H256),
    AccountProof(H160),
}

#[derive(Default)]
pub struct FakeChain {
    blocks: HashMap<H256, BlockReference>,
    latest: Option<H256>,
    transactions: HashMap<H256, TransactionRecord>,
    receipts: HashMap<H256, ReceiptRecord>,
    failing: HashSet<H256>,
    fetched: Mutex<Vec<Fetch>>,
    first_fetch_at: Mutex<Option<Instant>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Counts a transaction or receipt request as running until dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(chain: &'a FakeChain) -> Self {
        let now = chain.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        chain.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(&chain.in_flight)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn legacy_txn(nonce: u64) -> LegacyTxn {
    LegacyTxn {
        nonce: nonce.into(),
        gas_price: U256::from(1_000_000_000_u64),
        gas_limit: U256::from(21_000_u64),
        to: Some(H160::from_low_u64_be(0xdead)),
        value: U256::from(nonce * 1_000),
        input: vec![],
        v: U256::from(27_u64),
        r: U256::from(nonce + 1),
        s: U256::from(nonce + 2),
    }
}

/// The root an independent trie implementation computes for `values`
/// stored under their RLP encoded positions.
pub fn reference_root(values: &[Vec<u8>]) -> H256 {
    let mut trie = EthTrie::new(Arc::new(MemoryDB::new(true)));
    for (i, value) in values.iter().enumerate() {
        trie.insert(&encode_index(i as u64), value).unwrap();
    }
    H256(trie.root_hash().unwrap().0)
}

impl FakeChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a block holding `envelopes` in order, with one successful
    /// receipt per transaction. The block's published roots are computed by
    /// an independent trie implementation.
    pub fn push_block(&mut self, envelopes: Vec<TxnEnvelope>) -> BlockReference {
        let number = self.blocks.len() as u64;
        let hash = keccak(number.to_be_bytes());

        let mut records = Vec::new();
        let mut receipts = Vec::new();
        for (i, envelope) in envelopes.into_iter().enumerate() {
            let index = i as u64;
            let tx_hash = match &envelope {
                TxnEnvelope::Supported(tx) => tx.hash(),
                TxnEnvelope::Unsupported { tx_type } => {
                    keccak([*tx_type, number as u8, index as u8])
                }
            };
            let tx_type = envelope.tx_type();

            records.push(TransactionRecord {
                hash: tx_hash,
                block_hash: hash,
                index,
                envelope,
            });
            receipts.push(ReceiptRecord {
                transaction_hash: tx_hash,
                block_hash: hash,
                index,
                tx_type: Some(tx_type),
                status: true,
                cumulative_gas_used: U256::from(21_000 * (index + 1)),
                logs_bloom: Bloom::zero(),
                logs: vec![LogRecord {
                    address: H160::from_low_u64_be(index + 1),
                    topics: vec![H256::from_low_u64_be(index)],
                    data: vec![index as u8; 4],
                }],
            });
        }

        let block = BlockReference {
            hash,
            number,
            state_root: H256::repeat_byte(0x5a),
            transactions_root: reference_root(
                &records.iter().map(|r| r.encode().to_vec()).collect::<Vec<_>>(),
            ),
            receipts_root: reference_root(
                &receipts
                    .iter()
                    .map(|r| r.encode().unwrap().to_vec())
                    .collect::<Vec<_>>(),
            ),
            transactions: records.iter().map(|r| r.hash).collect(),
        };

        self.transactions
            .extend(records.into_iter().map(|r| (r.hash, r)));
        self.receipts
            .extend(receipts.into_iter().map(|r| (r.transaction_hash, r)));
        self.blocks.insert(hash, block.clone());
        self.latest = Some(hash);

        block
    }

    pub fn block_mut(&mut self, hash: H256) -> &mut BlockReference {
        self.blocks.get_mut(&hash).unwrap()
    }

    /// Makes every request about `hash` fail.
    pub fn fail_on(&mut self, hash: H256) {
        self.failing.insert(hash);
    }

    pub fn fetched(&self) -> Vec<Fetch> {
        self.fetched.lock().unwrap().clone()
    }

    /// When the first request of any kind arrived.
    pub fn first_fetch_at(&self) -> Option<Instant> {
        *self.first_fetch_at.lock().unwrap()
    }

    /// The most transaction and receipt requests that were running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, fetch: Fetch) {
        self.first_fetch_at
            .lock()
            .unwrap()
            .get_or_insert_with(Instant::now);
        self.fetched.lock().unwrap().push(fetch);
    }

    fn check_failing(&self, hash: H256) -> anyhow::Result<()> {
        match self.failing.contains(&hash) {
            true => Err(anyhow!("injected failure for {hash:#x}")),
            false => Ok(()),
        }
    }
}

impl ChainDataSource for FakeChain {
    async fn block_header(&self, block: BlockSelector) -> anyhow::Result<BlockReference> {
        self.record(Fetch::Block(block));
        let hash = match block {
            BlockSelector::Hash(hash) => hash,
            BlockSelector::Number(n) => keccak(n.to_be_bytes()),
            BlockSelector::Latest => self.latest.context("empty chain")?,
        };
        self.check_failing(hash)?;

        self.blocks.get(&hash).cloned().context("unknown block")
    }

    async fn transaction(&self, hash: H256) -> anyhow::Result<TransactionRecord> {
        self.record(Fetch::Transaction(hash));
        let _in_flight = InFlight::enter(self);
        // Give every other buffered request the chance to start.
        tokio::task::yield_now().await;
        self.check_failing(hash)?;

        self.transactions
            .get(&hash)
            .cloned()
            .context("unknown transaction")
    }

    async fn transaction_receipt(&self, hash: H256) -> anyhow::Result<ReceiptRecord> {
        self.record(Fetch::Receipt(hash));
        let _in_flight = InFlight::enter(self);
        tokio::task::yield_now().await;
        self.check_failing(hash)?;

        self.receipts.get(&hash).cloned().context("unknown receipt")
    }

    async fn account_proof(
        &self,
        address: H160,
        storage_keys: Vec<H256>,
        block: BlockSelector,
    ) -> anyhow::Result<serde_json::Value> {
        self.record(Fetch::AccountProof(address));

        Ok(serde_json::json!({
            "address": address,
            "accountProof": [],
            "storageProof": storage_keys
                .iter()
                .map(|key| serde_json::json!({ "key": key, "value": "0x0", "proof": [] }))
                .collect::<Vec<_>>(),
            "requestedAt": block.to_string(),
        }))
    }
}

pub fn supported(tx: TypedTransaction) -> TxnEnvelope {
    TxnEnvelope::Supported(tx)
}
