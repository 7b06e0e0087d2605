use std::{num::NonZeroUsize, time::Duration};

use clap::Args;

const HELP_HEADING: &str = "Proof generation options";

/// Command line view of [`ProverConfig`](super::ProverConfig).
#[derive(Args, Clone, Debug, PartialEq, Eq)]
pub struct CliProverConfig {
    /// Maximum number of sibling entries fetched concurrently. `1` fetches
    /// them strictly in order.
    #[arg(long, env = "PROOFGEN_FETCH_CONCURRENCY", help_heading = HELP_HEADING, default_value = "1")]
    fetch_concurrency: NonZeroUsize,
    /// Milliseconds to wait before the first request, so that a freshly
    /// mined block has reached the node.
    #[arg(long, env = "PROOFGEN_SETTLE_DELAY_MS", help_heading = HELP_HEADING, default_value_t = 2000)]
    settle_delay_ms: u64,
}

impl From<CliProverConfig> for super::ProverConfig {
    fn from(cli: CliProverConfig) -> Self {
        Self {
            fetch_concurrency: cli.fetch_concurrency,
            settle_delay: Duration::from_millis(cli.settle_delay_ms),
        }
    }
}
