// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! orchestrator-listener: fleet-level coordinator.
//!
//! Aggregates completions from every worker's result directories, judges
//! worker health from heartbeat freshness, times out stuck tasks, and
//! raises notifications via trigger files.
//!
//! Exits 0 on clean (signal-driven) shutdown, non-zero on startup failure.

use anyhow::Context;
use clap::Parser;
use fabric_core::{ListenerConfig, LogFormat, SystemClock};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(
    name = "orchestrator-listener",
    version,
    about = "Task Fabric fleet coordinator"
)]
struct Cli {
    /// Comma-separated worker names (default: discover from shared root)
    #[arg(long = "workers", value_name = "A,B,C", value_delimiter = ',')]
    workers: Vec<String>,

    /// Log filter (overrides LOG_LEVEL)
    #[arg(long = "log-level", value_name = "LEVEL")]
    log_level: Option<String>,

    /// Log encoding: text or json (overrides LOG_FORMAT)
    #[arg(long = "log-format", value_name = "FORMAT")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ListenerConfig::from_env().context("invalid listener configuration")?;
    config.workers = cli.workers;
    if let Some(format) = &cli.log_format {
        config.log_format = format.parse()?;
    }
    config.validate()?;

    init_logging(cli.log_level.as_deref(), config.log_format)?;
    info!(
        shared_root = %config.shared_root.display(),
        "starting orchestrator listener"
    );

    fabric_listener::run(config, SystemClock).await?;

    info!("orchestrator listener exited cleanly");
    Ok(())
}

fn init_logging(level: Option<&str>, format: LogFormat) -> anyhow::Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).context("invalid --log-level")?,
        None => EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
    Ok(())
}
