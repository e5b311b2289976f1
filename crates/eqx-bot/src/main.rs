//! Equity execution engine - entry point
//!
//! Runs one pass over the configured symbols and exits. Schedule it
//! externally for repeated cycles.

use anyhow::Result;
use clap::Parser;
use eqx_telemetry::{Metrics, Verbosity};
use tracing::info;

/// Risk-gated equity execution engine
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via EQX_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Comma-separated symbols, overriding the configured list
    #[arg(short, long, value_delimiter = ',')]
    symbols: Vec<String>,

    /// Deny new entries; protective and liquidating orders still flow
    #[arg(long)]
    kill: bool,

    /// Detailed logging, including position and order snapshots
    #[arg(short, long)]
    verbose: bool,

    /// Market-sell every long position and exit
    #[arg(long)]
    flatten: bool,

    /// Print metrics in the Prometheus text format before exiting
    #[arg(long)]
    print_metrics: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Determine config path: CLI arg > EQX_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("EQX_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    let mut config = eqx_bot::AppConfig::from_file(&config_path)?;
    if args.verbose {
        config.logging.verbosity = Verbosity::Detailed;
    }
    if args.kill {
        config.execution.force_disable_entries = true;
    }
    let symbols: Vec<String> = args
        .symbols
        .iter()
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();
    if !symbols.is_empty() {
        config.set_symbols(symbols);
    }

    eqx_telemetry::init_logging(config.logging.verbosity)?;

    info!("Starting eqx-bot v{}", env!("CARGO_PKG_VERSION"));
    info!(
        config_path = %config_path,
        broker = ?config.broker.kind,
        execute_trades = config.execution.execute_trades,
        force_disable_entries = config.execution.force_disable_entries,
        "Configuration loaded"
    );

    let app = eqx_bot::Application::new(config)?;

    if args.flatten {
        let report = app.flatten_all().await?;
        info!(
            requested = report.requested,
            submitted = report.submitted,
            failed = report.failed,
            "Flatten done"
        );
    } else {
        let report = app.run().await;
        let totals = report.totals();
        info!(
            symbols = totals.symbols,
            entries = totals.entries,
            errors = totals.errors,
            "Cycle done"
        );
    }

    if args.print_metrics {
        print!("{}", Metrics::render());
    }

    Ok(())
}
