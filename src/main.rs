//! Partition relay.
//!
//! Forwards records from a source partition to a destination, one at a time,
//! committing each source offset only after the destination acknowledged it.
//!
//! # Architecture Overview
//!
//! ```text
//!   ┌──────────────┐    ┌──────────────────────────────────────┐    ┌──────────────┐
//!   │   source     │    │              RELAY LOOP               │    │ destination  │
//!   │  partition   │───▶│ receive → breaker → send → commit     │───▶│  partition   │
//!   └──────────────┘    │            │                          │    └──────────────┘
//!          ▲            │            ▼                          │
//!          │            │   open: hold record, pause intake,    │
//!          └────────────┼── cool down, retry the same record    │
//!        pause/resume   └──────────────────────────────────────┘
//!
//!   Cross-cutting: config (TOML) · observability (tracing, Prometheus)
//!                  lifecycle (signals, graceful shutdown)
//! ```

use std::path::PathBuf;

use clap::Parser;

use partition_relay::config::{load_config, validate_config, ConfigError, RelayConfig};
use partition_relay::lifecycle;
use partition_relay::observability::logging;

#[derive(Parser)]
#[command(name = "partition-relay", version)]
#[command(about = "Relay records between partitions behind a circuit breaker", long_about = None)]
struct Cli {
    /// TOML config file. Built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `observability.log_level`.
    #[arg(long)]
    log_level: Option<String>,

    /// Validate the config, print it resolved as JSON, and exit.
    #[arg(long)]
    check: bool,
}

fn resolve_config(cli: &Cli) -> Result<RelayConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RelayConfig::default(),
    };
    if let Some(level) = &cli.log_level {
        config.observability.log_level = level.clone();
    }
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    if cli.check {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "partition-relay starting");
    tracing::info!(
        transport = ?config.transport.kind,
        failure_ratio = config.breaker.failure_ratio,
        minimum_throughput = config.breaker.minimum_throughput,
        break_duration_ms = config.breaker.break_duration_ms,
        "Configuration loaded"
    );

    let stats = lifecycle::run(config).await?;
    tracing::info!(
        forwarded = stats.forwarded,
        skipped = stats.skipped,
        "Relay exited"
    );
    Ok(())
}
