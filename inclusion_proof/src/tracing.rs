//! Log output of the `proofgen` binary.
//!
//! Logs go to stderr because stdout carries the JSON results. `RUST_LOG`
//! picks the verbosity and falls back to [`DEFAULT_DIRECTIVES`]. The trie
//! library logs through the `log` crate; those records are forwarded too, so
//! `RUST_LOG=mpt_trie=trace` shows every node a proof walks through.

use tracing_subscriber::{filter::LevelFilter, EnvFilter};

/// Used when `RUST_LOG` is unset or empty: stage transitions and warnings of
/// this crate, and only warnings from dependencies.
pub const DEFAULT_DIRECTIVES: &str = "warn,inclusion_proof=info,proofgen=info";

/// Builds the filter for `directives`. Directives that do not parse are
/// skipped rather than rejected.
pub fn filter(directives: Option<&str>) -> EnvFilter {
    let directives = match directives {
        Some(d) if !d.trim().is_empty() => d,
        _ => DEFAULT_DIRECTIVES,
    };

    EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .parse_lossy(directives)
}

/// Installs the global subscriber.
pub fn init() {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true)
        .with_env_filter(filter(directives.as_deref()))
        .init();
}
