//! Options Signal Runner CLI
//!
//! Reads a quote stream and an underlying bar series from JSON, runs the
//! signal engine and writes the orders and final positions as JSON.
//!
//! # Usage
//!
//! ```bash
//! optsignal \
//!   --quotes quotes.json \
//!   --bars bars.json \
//!   --config optsignal.toml \
//!   --mode partitioned \
//!   --output orders.json
//! ```
//!
//! # Exit Codes
//!
//! - 0: Success (including a clean stop on a data gap or cutoff)
//! - 2: Configuration error
//! - 3: Runtime error (I/O, malformed records, unsorted bars)

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use optsignal::engine::records::{bars_from_records, quotes_from_records};
use optsignal::engine::{
    run_signals, BarRecord, BarSeries, EngineConfig, ExecutionMode, QuoteRecord, RunReport,
    SignalError,
};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Sequential,
    Partitioned,
}

impl From<ModeArg> for ExecutionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Sequential => ExecutionMode::Sequential,
            ModeArg::Partitioned => ExecutionMode::Partitioned,
        }
    }
}

/// Offline options mispricing signals
#[derive(Parser, Debug)]
#[command(name = "optsignal")]
#[command(about = "Generate option order signals from quotes and underlying bars")]
struct Cli {
    /// JSON array of quote records
    #[arg(short, long)]
    quotes: PathBuf,

    /// JSON array of bar records
    #[arg(short, long)]
    bars: PathBuf,

    /// Engine config (TOML); falls back to OPTSIGNAL_CONFIG_PATH
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured execution mode
    #[arg(short, long, value_enum)]
    mode: Option<ModeArg>,

    /// Override worker threads for partitioned mode
    #[arg(long)]
    workers: Option<usize>,

    /// Override the event cap
    #[arg(long)]
    max_events: Option<u64>,

    /// Override the end-time cutoff (RFC3339)
    #[arg(long)]
    end_time: Option<String>,

    /// Output file (stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "optsignal=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::from_env(),
    };
    if let Some(mode) = cli.mode {
        config.execution.mode = mode.into();
    }
    if cli.workers.is_some() {
        config.execution.workers = cli.workers;
    }
    if cli.max_events.is_some() {
        config.limits.max_events = cli.max_events;
    }
    if cli.end_time.is_some() {
        config.limits.end_time = cli.end_time.clone();
    }
    config.validate()?;
    Ok(config)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing {}", path.display()))
}

fn write_report(report: &RunReport, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    match output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "report written");
        }
        None => {
            let stdout = std::io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            writeln!(out, "{}", json)?;
            out.flush()?;
        }
    }
    Ok(())
}

fn execute(cli: &Cli, config: &EngineConfig) -> Result<()> {
    let quote_records: Vec<QuoteRecord> = read_json(&cli.quotes)?;
    let bar_records: Vec<BarRecord> = read_json(&cli.bars)?;
    let quotes = quotes_from_records(&quote_records)?;
    let bars = BarSeries::new(bars_from_records(&bar_records)?).context("bar series")?;
    info!(
        quotes = quotes.len(),
        bars = bars.len(),
        mode = ?config.execution.mode,
        "inputs loaded"
    );

    let run = run_signals(config, Arc::new(bars), &quotes)?;
    write_report(&RunReport::from(&run), cli.output.as_deref())
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            process::exit(2);
        }
    };

    if let Err(e) = execute(&cli, &config) {
        let code = match e.downcast_ref::<SignalError>() {
            Some(SignalError::Config { .. }) => 2,
            _ => 3,
        };
        eprintln!("Error: {:#}", e);
        process::exit(code);
    }
}
