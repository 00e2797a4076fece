//! Thin binary entrypoint: load configuration, install a tracing
//! subscriber, boot the Orchestrator, and block until shutdown.

use std::time::Duration;

use clap::Parser;
use evm_transfer_indexer_core::{Orchestrator, Settings};
use tracing_subscriber::EnvFilter;

/// Multi-chain ERC20 Transfer indexer.
#[derive(Debug, Parser)]
#[command(name = "evm-transfer-indexer", version)]
struct Cli {
    /// Seconds to wait for in-flight poll cycles to drain on shutdown.
    #[arg(long, env = "SHUTDOWN_DRAIN_SECS", default_value_t = 10)]
    shutdown_drain_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::load()?;
    tracing::info!(networks = settings.networks.len(), "loaded configuration");

    let (orchestrator, _query_facade) = Orchestrator::boot(&settings).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");

    orchestrator.shutdown(Duration::from_secs(cli.shutdown_drain_secs)).await;
    Ok(())
}
