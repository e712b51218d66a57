//! Solana Volume Bot
//!
//! Runs one volume campaign:
//! - Rotates swaps across a wallet set until the target volume is reached
//! - Routes each swap through a Raydium pool or the Jupiter aggregator
//! - Re-reads the campaign settings file every cycle
//! - Stops cleanly on Ctrl-C at the next cycle boundary

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};

use sol_volume_bot::config::{AppConfig, FileSettings, SettingsSource};
use sol_volume_bot::execution::{
    AggregatorSwapBackend, JupiterClient, PoolSwapBackend, SwapAssembler, SwapRouter,
    TransactionSubmitter,
};
use sol_volume_bot::feeds::JupiterPriceFeed;
use sol_volume_bot::network::{ChainClient, RpcManager};
use sol_volume_bot::orchestrator::{SwapCycle, VolumeOrchestrator};
use sol_volume_bot::pool::PoolResolver;
use sol_volume_bot::telemetry::{init_logging, init_metrics};
use sol_volume_bot::wallet::load_wallets;

/// Solana Volume Bot - multi-wallet swap volume campaigns
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Override log level
    #[arg(long)]
    log_level: Option<String>,

    /// Seed for reproducible cycle timing and direction
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load(&args.config)?;
    if let Some(level) = args.log_level {
        config.telemetry.log_level = level;
    }
    if args.seed.is_some() {
        config.campaign.rng_seed = args.seed;
    }

    let _log_guard = init_logging(&config.telemetry)?;

    info!("Starting Solana Volume Bot v{}", env!("CARGO_PKG_VERSION"));

    if config.telemetry.enable_metrics {
        init_metrics(config.telemetry.metrics_port)?;
    }

    let wallets = load_wallets(&config.campaign.wallets_path)?;
    let settings = FileSettings::new(&config.campaign.settings_path);
    let initial = settings.load()?;
    info!(
        "Campaign for {}: target {} via {}, base {}",
        initial.token, initial.target_volume, initial.routing_mode, initial.base_asset
    );

    let native_mint = config.protocols.mints.native()?;
    let chain: Arc<dyn ChainClient> = Arc::new(RpcManager::new(&config.rpc)?);
    let submitter = Arc::new(
        TransactionSubmitter::new(chain.clone(), config.execution.simulate_before_submit)
            .with_confirm_timeout(Duration::from_secs(config.execution.confirm_timeout_secs)),
    );

    let pool_backend = PoolSwapBackend::new(
        chain.clone(),
        PoolResolver::new(chain.clone(), &config.protocols)?,
        SwapAssembler::new(&config.execution, native_mint),
        submitter.clone(),
        native_mint,
    );
    let jupiter = JupiterClient::new(
        &config.protocols.jupiter,
        Some(config.execution.compute_unit_price),
    )?;
    let aggregator_backend = AggregatorSwapBackend::new(Arc::new(jupiter), submitter);
    let router = SwapRouter::new(Arc::new(pool_backend), Arc::new(aggregator_backend));

    let oracle = Arc::new(JupiterPriceFeed::new(
        &config.protocols.jupiter,
        &config.protocols.mints,
    )?);
    let executor = SwapCycle::new(chain, router, oracle, &config.protocols.mints)?;

    let mut orchestrator = VolumeOrchestrator::new(
        wallets,
        Arc::new(settings),
        Arc::new(executor),
        config.campaign.rng_seed,
    );

    let cancel = orchestrator.cancel_handle();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received, stopping after the current cycle...");
                cancel.cancel();
            }
            Err(err) => {
                error!("Error listening for shutdown signal: {}", err);
            }
        }
    });

    let report = orchestrator.run().await.context("Campaign failed to start")?;
    println!("{}", report);

    info!("Solana Volume Bot stopped");
    Ok(())
}
