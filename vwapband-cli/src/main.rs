//! `vwapband` command-line entry point.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use vwapband_core::SignalEngine;
use vwapband_service::{AppConfig, BinanceFuturesSource, HistoricalBarSource};

#[derive(Parser)]
#[command(name = "vwapband", about = "VWAP band trade-signal service", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the signal service: backfill, poll the feed, deliver signals.
    Run {
        /// Path to the TOML configuration file.
        #[arg(short, long, default_value = "vwapband.toml")]
        config: PathBuf,
    },

    /// Parse and validate a configuration file, then exit.
    CheckConfig {
        #[arg(short, long, default_value = "vwapband.toml")]
        config: PathBuf,
    },

    /// Fetch today's session for one symbol and print its current bands.
    Bands {
        /// Symbol to inspect, e.g. ETHUSDT.
        symbol: String,

        #[arg(short, long, default_value = "vwapband.toml")]
        config: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config } => {
            let config = AppConfig::load(&config).context("failed to load config")?;
            vwapband_service::run(config)
        }
        Commands::CheckConfig { config: path } => {
            let config = AppConfig::load(&path).context("failed to load config")?;
            println!(
                "config ok: {} symbols, interval {}, multiplier {}",
                config.symbols.len(),
                config.interval,
                config.engine.band_multiplier
            );
            Ok(())
        }
        Commands::Bands { symbol, config } => {
            let config = AppConfig::load(&config).context("failed to load config")?;
            print_bands(&symbol, &config)
        }
    }
}

/// One-shot session replay: pull today's bars, fold them through an engine,
/// print the resulting bands and position as JSON.
fn print_bands(symbol: &str, config: &AppConfig) -> anyhow::Result<()> {
    let source = BinanceFuturesSource::new(config.interval.clone())
        .context("failed to build bar source")?;

    let mut engine = SignalEngine::new(symbol, config.engine.clone());

    let midnight = Utc::now()
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .unwrap_or_else(Utc::now);

    let mut cursor = midnight;
    loop {
        let page = source
            .fetch(symbol, cursor, 1000)
            .context("failed to fetch session bars")?;
        if page.is_empty() {
            break;
        }
        let last = page[page.len() - 1].timestamp;
        let summary = engine.backfill_range(&page);
        info!(applied = summary.applied, rejected = summary.rejected, "page replayed");
        if page.len() < 1000 {
            break;
        }
        cursor = last + chrono::Duration::milliseconds(1);
    }

    let report = serde_json::json!({
        "symbol": symbol,
        "session_date": engine.session_date(),
        "bars": engine.bar_count(),
        "bands": engine.current_bands(),
        "position": engine.position(),
        "last_close": engine.latest_bar().map(|b| b.close),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
