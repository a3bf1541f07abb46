// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! worker-watcher: per-worker task dispatch daemon.
//!
//! Watches `tasks/<worker>/` under the shared root, executes each task
//! through the agent CLI with retry, circuit breaking and dead-lettering,
//! and publishes heartbeats and Prometheus metrics.
//!
//! Exits 0 on clean (signal-driven) shutdown, non-zero on startup failure.

use anyhow::Context;
use clap::Parser;
use fabric_adapters::SystemRunner;
use fabric_core::{LogFormat, SystemClock, WatcherConfig};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(
    name = "worker-watcher",
    version,
    about = "Task Fabric worker: dispatches task files to an agent CLI"
)]
struct Cli {
    /// Worker name (selects per-worker subpaths under the shared root);
    /// falls back to WORKER_NAME
    worker: Option<String>,

    /// Maximum simultaneous attempts (overrides MAX_CONCURRENT_TASKS)
    #[arg(long = "max-concurrent", value_name = "N")]
    max_concurrent: Option<usize>,

    /// Log filter (overrides LOG_LEVEL), e.g. "info" or "fabric_watcher=debug"
    #[arg(long = "log-level", value_name = "LEVEL")]
    log_level: Option<String>,

    /// Log encoding: text or json (overrides LOG_FORMAT)
    #[arg(long = "log-format", value_name = "FORMAT")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let worker = cli
        .worker
        .or_else(|| std::env::var("WORKER_NAME").ok())
        .filter(|w| !w.trim().is_empty())
        .context("worker name required (positional argument or WORKER_NAME)")?;
    let mut config = WatcherConfig::from_env(&worker).context("invalid worker configuration")?;
    if let Some(n) = cli.max_concurrent {
        config.max_concurrent_tasks = n;
    }
    if let Some(format) = &cli.log_format {
        config.log_format = format.parse()?;
    }
    config.validate()?;

    init_logging(cli.log_level.as_deref(), config.log_format)?;
    info!(
        worker = %config.worker_name,
        shared_root = %config.shared_root.display(),
        max_concurrent = config.max_concurrent_tasks,
        "starting worker watcher"
    );

    fabric_watcher::run(config, SystemRunner, SystemClock).await?;

    info!("worker watcher exited cleanly");
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
