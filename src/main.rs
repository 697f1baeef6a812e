//! Cross-venue arbitrage engine entry point.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use rust_decimal_macros::dec;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crossarb::config::Config;
use crossarb::coordinator::Coordinator;
use crossarb::ledger::MemoryLedger;
use crossarb::metrics;
use crossarb::utils::shutdown_signal;
use crossarb::venue::mock::{ListingBuilder, MockVenueClient};
use crossarb::venue::VenueRegistry;

/// Cross-venue binary-market arbitrage engine.
#[derive(Parser, Debug)]
#[command(name = "crossarb")]
#[command(about = "Arbitrage engine for binary-outcome markets across venues")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the decision loop against paper venues (default).
    ///
    /// Real venue adapters implement `VenueClient` and register in place of
    /// the paper venues.
    Run,

    /// Check configuration validity.
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    let filter = if args.verbose {
        EnvFilter::new("crossarb=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    // Initialize metrics
    metrics::init_metrics();

    match args.command {
        Some(Command::CheckConfig) => cmd_check_config().await,
        Some(Command::Run) | None => cmd_run().await,
    }
}

/// Check configuration validity.
async fn cmd_check_config() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("CROSSARB - CONFIGURATION CHECK");
    println!("======================================================================");

    print!("Loading configuration... ");
    let config = match Config::load() {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration load failed"));
        }
    };

    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    println!();
    println!("Match confidence threshold: {}", config.min_match_confidence);
    println!("Min profit per unit:        {}", config.min_profit_per_unit);
    println!("Fee / slippage:             {} / {}", config.fee_pct, config.slippage_pct);
    println!("Position size bounds:       [{}, {}]", config.min_position_size, config.max_position_size);
    println!("Max open positions:         {}", config.max_open_positions);
    println!("Swap improvement pct:       {}", config.min_swap_improvement_pct);
    println!("Stop loss pct:              {}", config.stop_loss_pct);
    println!("Max hold minutes:           {}", config.max_hold_minutes);
    println!("Poll interval secs:         {}", config.poll_interval_secs);
    println!();
    println!("Configuration is valid.");
    Ok(())
}

/// Run the decision loop.
async fn cmd_run() -> anyhow::Result<()> {
    let config = Config::load()?;
    config.validate().map_err(|e| anyhow::anyhow!(e))?;

    if config.metrics_enabled {
        let builder =
            PrometheusBuilder::new().with_http_listener(([0, 0, 0, 0], config.metrics_port));
        match builder.install() {
            Ok(()) => info!(port = config.metrics_port, "Prometheus exporter listening"),
            Err(err) => warn!(%err, "failed to install Prometheus exporter"),
        }
    }

    let registry = paper_venues();
    let ledger = Arc::new(MemoryLedger::new());
    let coordinator = Coordinator::new(config, registry, ledger);
    coordinator.seed_balances().await;

    info!("starting paper-trading loop, Ctrl-C to stop");
    let cancel = coordinator.cancel_handle();
    tokio::select! {
        result = coordinator.run() => result?,
        _ = shutdown_signal() => cancel.cancel(),
    }

    info!(
        portfolio_value = %coordinator.portfolio_value().await,
        "stopped"
    );
    Ok(())
}

/// Two paper venues with overlapping markets and a deliberate price gap.
fn paper_venues() -> VenueRegistry {
    let alpha = MockVenueClient::new("alpha");
    alpha.add_listing(
        ListingBuilder::new("alpha", "alpha-fed-sept", "Fed cuts rates at the September 2026 meeting")
            .prices(dec!(0.41), dec!(0.59))
            .volume(dec!(25_000))
            .liquidity(dec!(4_000))
            .build(),
    );
    alpha.add_listing(
        ListingBuilder::new("alpha", "alpha-btc-100k", "Bitcoin above $100k on December 31 2026")
            .prices(dec!(0.63), dec!(0.37))
            .volume(dec!(80_000))
            .liquidity(dec!(12_000))
            .build(),
    );

    let beta = MockVenueClient::new("beta");
    beta.add_listing(
        ListingBuilder::new("beta", "beta-fed-21", "Fed cuts rates at September 2026 FOMC meeting")
            .prices(dec!(0.49), dec!(0.51))
            .volume(dec!(18_000))
            .liquidity(dec!(2_500))
            .build(),
    );
    beta.add_listing(
        ListingBuilder::new("beta", "beta-btc-669", "Bitcoin above $100k on December 31 2026")
            .prices(dec!(0.66), dec!(0.34))
            .volume(dec!(40_000))
            .liquidity(dec!(9_000))
            .build(),
    );

    let mut registry = VenueRegistry::new();
    registry.register(Arc::new(alpha));
    registry.register(Arc::new(beta));
    registry
}
