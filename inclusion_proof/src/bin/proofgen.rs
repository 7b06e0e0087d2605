use std::io::Write as _;

use anyhow::{Context as _, Result};
use clap::Parser;
use inclusion_proof::{
    env::load_dotenvy_vars_if_present,
    orchestrator::{ProofGenerator, ProverConfig},
    provider::RpcDataSource,
    retry::build_http_retry_provider,
};
use serde::Serialize;
use tracing::info;

use self::proofgen::*;
mod proofgen {
    pub mod cli;
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenvy_vars_if_present();
    inclusion_proof::tracing::init();

    let args = cli::Cli::parse();
    let prover_config: ProverConfig = args.prover_config.into();
    info!(rpc_url = %args.rpc_url, ?prover_config, "starting");

    let provider = build_http_retry_provider(args.rpc_url, args.backoff, args.max_retries);
    let generator = ProofGenerator::new(RpcDataSource::new(provider), prover_config);

    match args.command {
        cli::Command::State {
            account,
            storage_key,
            block,
        } => print_json(
            &generator
                .state_proof(account, storage_key, block)
                .await
                .context("state proof failed")?,
        ),
        cli::Command::Receipt { tx_hash } => print_json(
            &generator
                .receipt_proof(tx_hash)
                .await
                .context("receipt proof failed")?,
        ),
        cli::Command::Transaction { tx_hash } => print_json(
            &generator
                .transaction_proof(tx_hash)
                .await
                .context("transaction proof failed")?,
        ),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;

    Ok(())
}
