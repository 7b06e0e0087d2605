//! Drives proof generation for one request: fetch the target entry and its
//! block, fetch every sibling in block order, rebuild the block's trie and
//! extract and check the proof.

pub mod cli;

use std::{fmt, num::NonZeroUsize, time::Duration};

use bytes::Bytes;
use ethereum_types::{H160, H256};
use futures::{StreamExt as _, TryStreamExt as _};
use mpt_trie::{
    proof::{verify_proof, ProofInvalidError},
    trie::MerklePatriciaTrie,
    trie_ops::TrieOpError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    encoding::{encode_index, txn::TxnEnvelope, EncodingError},
    provider::ChainDataSource,
    types::{BlockReference, BlockSelector},
};

/// The steps of a proof request, in order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProofStage {
    FetchingTarget,
    FetchingSiblings,
    BuildingTrie,
    ExtractingProof,
    CrossValidating,
    Done,
}

impl fmt::Display for ProofStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProofStage::FetchingTarget => "fetching target",
            ProofStage::FetchingSiblings => "fetching siblings",
            ProofStage::BuildingTrie => "building trie",
            ProofStage::ExtractingProof => "extracting proof",
            ProofStage::CrossValidating => "cross validating",
            ProofStage::Done => "done",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum ProofGenError {
    #[error("data source failed while {stage}")]
    DataSource {
        stage: ProofStage,
        #[source]
        source: anyhow::Error,
    },

    #[error("cannot encode entry {index} of block {block_hash:#x}")]
    Encoding {
        block_hash: H256,
        index: u64,
        #[source]
        source: EncodingError,
    },

    #[error("trie operation failed for block {block_hash:#x}")]
    Trie {
        block_hash: H256,
        #[source]
        source: TrieOpError,
    },

    #[error("the proof extracted for index {index} does not verify against the computed root")]
    ProofInvalid {
        index: u64,
        #[source]
        source: ProofInvalidError,
    },

    #[error("transaction {tx_hash:#x} is not listed in block {block_hash:#x}")]
    TargetNotInBlock { tx_hash: H256, block_hash: H256 },

    #[error("transaction {tx_hash:#x} has unsupported type {tx_type:#04x}")]
    UnsupportedTargetType { tx_hash: H256, tx_type: u8 },

    #[error("eth_getProof response for {address:#x} is not a JSON object")]
    MalformedAccountProof { address: H160 },
}

impl ProofGenError {
    fn data_source(stage: ProofStage) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| ProofGenError::DataSource { stage, source }
    }
}

/// Tunables of a [`ProofGenerator`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ProverConfig {
    /// Upper bound on sibling requests in flight. `1` fetches them one after
    /// the other.
    pub fetch_concurrency: NonZeroUsize,
    /// Wait before the first request, giving a freshly mined block time to
    /// propagate to the node.
    pub settle_delay: Duration,
}

impl Default for ProverConfig {
    fn default() -> Self {
        Self {
            fetch_concurrency: NonZeroUsize::MIN,
            settle_delay: Duration::ZERO,
        }
    }
}

/// Reported when the root of the rebuilt trie is not the one in the block
/// header. The proof is still returned.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RootMismatchWarning {
    pub block_hash: H256,
    pub computed: H256,
    pub published: H256,
}

/// An inclusion proof for one entry of a block's trie.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofOutput {
    /// Node encodings from the root down to the node holding the value.
    #[serde(with = "crate::hex::list")]
    pub proof: Vec<Vec<u8>>,
    /// Root hash of the rebuilt trie.
    pub root: H256,
    /// The trie key: RLP of the entry's index.
    #[serde(with = "crate::hex")]
    pub index: Vec<u8>,
    /// The canonical encoding of the entry.
    #[serde(with = "crate::hex")]
    pub value: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_mismatch: Option<RootMismatchWarning>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ReceiptProofOutput {
    #[serde(flatten)]
    pub proof: ProofOutput,
    /// RLP of the first log's `[address, topics, data]`, empty when the
    /// receipt has no logs.
    #[serde(with = "crate::hex")]
    pub event: Vec<u8>,
}

/// An `eth_getProof` response together with the state root of the block it
/// was taken at.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateProofOutput {
    #[serde(flatten)]
    pub account_proof: serde_json::Map<String, serde_json::Value>,
    pub block_state_root: H256,
}

/// Builds inclusion proofs from the data of a [`ChainDataSource`].
#[derive(Debug)]
pub struct ProofGenerator<S> {
    source: S,
    config: ProverConfig,
}

impl<S: ChainDataSource> ProofGenerator<S> {
    pub const fn new(source: S, config: ProverConfig) -> Self {
        Self { source, config }
    }

    pub const fn source(&self) -> &S {
        &self.source
    }

    /// Proves the inclusion of transaction `tx_hash` in its block's
    /// transactions trie.
    pub async fn transaction_proof(&self, tx_hash: H256) -> Result<ProofOutput, ProofGenError> {
        enter(ProofStage::FetchingTarget);
        self.settle().await;
        let target = self
            .source
            .transaction(tx_hash)
            .await
            .map_err(ProofGenError::data_source(ProofStage::FetchingTarget))?;
        if let TxnEnvelope::Unsupported { tx_type } = target.envelope {
            return Err(ProofGenError::UnsupportedTargetType { tx_hash, tx_type });
        }
        let block = self.block_of(tx_hash, target.block_hash).await?;
        let target_index = position_in_block(&block, tx_hash)?;
        if target.index != target_index {
            warn!(
                %tx_hash,
                reported = target.index,
                listed = target_index,
                "transaction index disagrees with block order"
            );
        }

        enter(ProofStage::FetchingSiblings);
        let siblings =
            futures::stream::iter(block.transactions.iter().map(|h| self.source.transaction(*h)))
                .buffered(self.config.fetch_concurrency.get())
                .try_collect::<Vec<_>>()
                .await
                .map_err(ProofGenError::data_source(ProofStage::FetchingSiblings))?;

        let entries = siblings
            .iter()
            .enumerate()
            .map(|(i, tx)| (i as u64, tx.encode()));
        let mut output = build_proof(block.hash, entries, target_index)?;
        cross_validate(&mut output, &block, block.transactions_root);

        enter(ProofStage::Done);
        Ok(output)
    }

    /// Proves the inclusion of the receipt of `tx_hash` in its block's
    /// receipts trie.
    pub async fn receipt_proof(&self, tx_hash: H256) -> Result<ReceiptProofOutput, ProofGenError> {
        enter(ProofStage::FetchingTarget);
        self.settle().await;
        let target = self
            .source
            .transaction_receipt(tx_hash)
            .await
            .map_err(ProofGenError::data_source(ProofStage::FetchingTarget))?;
        let block = self.block_of(tx_hash, target.block_hash).await?;
        let target_index = position_in_block(&block, tx_hash)?;

        enter(ProofStage::FetchingSiblings);
        let siblings = futures::stream::iter(
            block
                .transactions
                .iter()
                .map(|h| self.source.transaction_receipt(*h)),
        )
        .buffered(self.config.fetch_concurrency.get())
        .try_collect::<Vec<_>>()
        .await
        .map_err(ProofGenError::data_source(ProofStage::FetchingSiblings))?;

        let entries = siblings
            .iter()
            .enumerate()
            .map(|(i, receipt)| {
                let index = i as u64;
                receipt
                    .encode()
                    .map(|bytes| (index, bytes))
                    .map_err(|source| ProofGenError::Encoding {
                        block_hash: block.hash,
                        index,
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut proof = build_proof(block.hash, entries, target_index)?;
        cross_validate(&mut proof, &block, block.receipts_root);

        let event = target
            .logs
            .first()
            .map(|log| log.encode().to_vec())
            .unwrap_or_default();

        enter(ProofStage::Done);
        Ok(ReceiptProofOutput { proof, event })
    }

    /// Fetches the account and storage proof of `address` and `storage_key`
    /// at `block`, along with the block's state root.
    pub async fn state_proof(
        &self,
        address: H160,
        storage_key: H256,
        block: BlockSelector,
    ) -> Result<StateProofOutput, ProofGenError> {
        enter(ProofStage::FetchingTarget);
        self.settle().await;
        let header = self
            .source
            .block_header(block)
            .await
            .map_err(ProofGenError::data_source(ProofStage::FetchingTarget))?;

        // Pin the proof to the header we just read so `latest` cannot move
        // in between.
        let response = self
            .source
            .account_proof(address, vec![storage_key], BlockSelector::Hash(header.hash))
            .await
            .map_err(ProofGenError::data_source(ProofStage::FetchingTarget))?;
        let serde_json::Value::Object(account_proof) = response else {
            return Err(ProofGenError::MalformedAccountProof { address });
        };

        enter(ProofStage::Done);
        Ok(StateProofOutput {
            account_proof,
            block_state_root: header.state_root,
        })
    }

    async fn settle(&self) {
        if !self.config.settle_delay.is_zero() {
            debug!(delay = ?self.config.settle_delay, "waiting before the first request");
            tokio::time::sleep(self.config.settle_delay).await;
        }
    }

    async fn block_of(
        &self,
        tx_hash: H256,
        block_hash: H256,
    ) -> Result<BlockReference, ProofGenError> {
        let block = self
            .source
            .block_header(BlockSelector::Hash(block_hash))
            .await
            .map_err(ProofGenError::data_source(ProofStage::FetchingTarget))?;
        info!(
            %tx_hash,
            block = block.number,
            entries = block.transactions.len(),
            "fetched target block"
        );

        Ok(block)
    }
}

/// Builds the trie of `entries`, keyed by the RLP of their index, and
/// extracts the proof for `target_index`.
///
/// The proof is checked against the computed root before it is returned.
/// Entries whose encoding is empty are left out of the trie.
pub fn build_proof<I>(
    block_hash: H256,
    entries: I,
    target_index: u64,
) -> Result<ProofOutput, ProofGenError>
where
    I: IntoIterator<Item = (u64, Bytes)>,
{
    enter(ProofStage::BuildingTrie);
    let mut trie = MerklePatriciaTrie::new();
    for (index, value) in entries {
        trie.insert(&encode_index(index), value.to_vec())
            .map_err(|source| ProofGenError::Trie { block_hash, source })?;
    }
    let root = trie.hash();
    debug!(%block_hash, entries = trie.len(), %root, "built trie");

    enter(ProofStage::ExtractingProof);
    let key = encode_index(target_index);
    let proof = trie
        .create_proof(&key)
        .map_err(|source| ProofGenError::Trie { block_hash, source })?;
    let value = verify_proof(root, &key, proof.nodes()).map_err(|source| {
        ProofGenError::ProofInvalid {
            index: target_index,
            source,
        }
    })?;
    debug!(nodes = proof.len(), index = target_index, "extracted proof");

    Ok(ProofOutput {
        proof: proof.into_nodes().into_iter().map(|n| n.to_vec()).collect(),
        root,
        index: key.to_vec(),
        value,
        root_mismatch: None,
    })
}

fn cross_validate(output: &mut ProofOutput, block: &BlockReference, published: H256) {
    enter(ProofStage::CrossValidating);
    if output.root == published {
        return;
    }

    warn!(
        block_hash = %block.hash,
        computed = %output.root,
        %published,
        "computed trie root does not match the block header"
    );
    output.root_mismatch = Some(RootMismatchWarning {
        block_hash: block.hash,
        computed: output.root,
        published,
    });
}

fn position_in_block(block: &BlockReference, tx_hash: H256) -> Result<u64, ProofGenError> {
    block
        .transactions
        .iter()
        .position(|h| *h == tx_hash)
        .map(|i| i as u64)
        .ok_or(ProofGenError::TargetNotInBlock {
            tx_hash,
            block_hash: block.hash,
        })
}

fn enter(stage: ProofStage) {
    debug!(%stage, "proof stage");
}
