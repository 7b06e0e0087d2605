use clap::{Parser, Subcommand, ValueHint};
use ethereum_types::{H160, H256};
use inclusion_proof::{orchestrator::cli::CliProverConfig, types::BlockSelector};
use url::Url;

const RPC_HELP_HEADING: &str = "RPC options";

/// Builds inclusion proofs for Ethereum transactions, receipts and state.
#[derive(Parser)]
#[command(version, propagate_version = true)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,

    /// The node RPC URL.
    #[arg(short = 'u', long, env = "PROOFGEN_RPC_URL", help_heading = RPC_HELP_HEADING, value_hint = ValueHint::Url)]
    pub(crate) rpc_url: Url,
    /// Wait in milliseconds before retrying a rate limited request. Doubles
    /// on every further retry.
    #[arg(long, env = "PROOFGEN_BACKOFF", help_heading = RPC_HELP_HEADING, default_value_t = 0)]
    pub(crate) backoff: u64,
    /// How often a rate limited request is retried. Other failures are never
    /// retried.
    #[arg(long, env = "PROOFGEN_MAX_RETRIES", help_heading = RPC_HELP_HEADING, default_value_t = 0)]
    pub(crate) max_retries: u32,

    #[clap(flatten)]
    pub(crate) prover_config: CliProverConfig,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Account and storage proof of one slot, with the block's state root.
    State {
        /// The account address.
        account: H160,
        /// The storage slot.
        storage_key: H256,
        /// `latest`, a block number or a block hash.
        block: BlockSelector,
    },
    /// Inclusion proof of a transaction's receipt in its block.
    Receipt {
        /// The transaction hash.
        tx_hash: H256,
    },
    /// Inclusion proof of a transaction in its block.
    Transaction {
        /// The transaction hash.
        tx_hash: H256,
    },
}
