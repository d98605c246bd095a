//! # Supply Monitor
//!
//! Host service for the multichain token pipeline.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin supply_monitor -- light
//! cargo run --bin supply_monitor -- --config Config.toml full
//! cargo run --bin supply_monitor -- watch --interval-secs 60
//! ```
//!
//! Results are printed as JSON, one `ChainResult` per configured chain. `watch` runs a full
//! refresh once and then re-prices on every interval until Ctrl+C.

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;
use multichain_token_sdk::{metrics, ChainResult, MultiChainOrchestrator, Settings};
use tokio::signal;
use tokio::time::{interval, Duration, MissedTickBehavior};

#[derive(Parser, Debug)]
#[command(name = "supply_monitor", about = "Multichain token supply and pool price monitor")]
struct Cli {
    /// Settings file (TOML). Missing file means built-in defaults.
    #[arg(long, default_value = "Config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Supply figures and pool-manager balances only
    Light,
    /// Log scan, contract discovery, pool detection and pricing
    Full,
    /// Full refresh, then periodic price refreshes
    Watch {
        #[arg(long, default_value_t = 60)]
        interval_secs: u64,
    },
}

fn print_results(results: &[ChainResult]) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(results)?);
    Ok(())
}

#[cfg(feature = "observability")]
fn install_exporter() {
    match metrics_exporter_prometheus::PrometheusBuilder::new().install() {
        Ok(()) => info!("Prometheus exporter installed"),
        Err(e) => log::warn!("Prometheus exporter not installed: {}", e),
    }
}

#[cfg(not(feature = "observability"))]
fn install_exporter() {}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    env_logger::init();

    let cli = Cli::parse();

    install_exporter();
    metrics::describe_metrics();

    let settings = Settings::from_path(&cli.config)?;
    info!(
        "Settings loaded: {} chains, token {} ({:?})",
        settings.chains.len(),
        settings.token.symbol,
        settings.token.address
    );

    let orchestrator = MultiChainOrchestrator::from_settings(settings)?;
    for chain in orchestrator.chains() {
        info!(
            "[{}] chain id {}, {} blocks per log request, {} block window",
            chain.name,
            chain.chain_id,
            chain.max_block_range(),
            chain.scan_window()
        );
    }

    match cli.command {
        Command::Light => print_results(&orchestrator.refresh_light().await)?,
        Command::Full => print_results(&orchestrator.refresh_full().await)?,
        Command::Watch { interval_secs } => {
            let mut results = orchestrator.refresh_full().await;
            print_results(&results)?;

            let mut ticker = interval(Duration::from_secs(interval_secs.max(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        results = orchestrator.refresh_prices(&results).await;
                        print_results(&results)?;
                    }
                    _ = signal::ctrl_c() => {
                        info!("Shutdown signal received, stopping");
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}
