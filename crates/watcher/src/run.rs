// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker supervisor: wires watcher → queue → dispatcher and owns the
//! lifecycle.
//!
//! Structure per worker process:
//! - ingest task: file events + startup scan + periodic rescan → queue
//! - dispatch task: queue → semaphore-bounded executor tasks
//! - heartbeat task and metrics server
//!
//! SIGTERM/SIGINT cancels the tree: ingestion stops, in-flight attempts
//! get a grace of `task_timeout + 10s`, stragglers are aborted, and the
//! final heartbeat carries `status=stopped`. No result file is written
//! after that final heartbeat.

use crate::context::WorkerContext;
use crate::executor::TaskExecutor;
use crate::heartbeat::{self, HeartbeatPublisher};
use crate::metrics::{self, MetricsError};
use crate::queue::{TaskQueue, TaskQueueRx};
use fabric_adapters::{fs_watch, TaskRunner, WatchError};
use fabric_core::{Clock, ConfigError, WatcherConfig, WorkerStatus};
use fabric_storage::AtomicWriteError;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Fatal startup / lifecycle errors; exits non-zero.
#[derive(Debug, Error)]
pub enum WatcherError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error("failed to publish startup heartbeat: {0}")]
    Heartbeat(#[from] AtomicWriteError),

    #[error("failed to install signal handler: {0}")]
    Signal(#[source] std::io::Error),
}

/// Run one worker until SIGTERM/SIGINT. Clean drain returns `Ok(())`.
pub async fn run<R: TaskRunner, C: Clock>(
    config: WatcherConfig,
    runner: R,
    clock: C,
) -> Result<(), WatcherError> {
    config.validate()?;
    let paths = config.paths();
    paths.ensure()?;

    let (queue, queue_rx) = TaskQueue::bounded(config.queue_capacity());
    let ctx = Arc::new(WorkerContext::new(config.clone(), queue.depth_handle())?);

    ctx.set_status(WorkerStatus::Starting);
    heartbeat::publish(&ctx, clock.now_utc())?;
    ctx.sync_dlq_gauge();

    // Bind the metrics port before accepting work so conflicts are fatal.
    let listener = metrics::bind(config.metrics_port).await?;
    info!(port = config.metrics_port, "metrics endpoint listening");

    let cancel = CancellationToken::new();
    let metrics_task = tokio::spawn({
        let metrics_ctx = Arc::clone(&ctx);
        let metrics_cancel = cancel.clone();
        async move {
            let shared = metrics_ctx.metrics_handle();
            if let Err(error) = metrics::serve(listener, shared, metrics_cancel).await {
                error!(%error, "metrics server stopped");
            }
        }
    });

    let (event_tx, event_rx) = mpsc::channel(64);
    let watch_guard = fs_watch::watch_json_dir(&paths.tasks_dir(), event_tx)?;
    info!(dir = %paths.tasks_dir().display(), "watching for tasks");

    let ingest = tokio::spawn(ingest_loop(
        Arc::clone(&ctx),
        queue,
        event_rx,
        cancel.clone(),
    ));

    let executor = Arc::new(TaskExecutor::new(
        Arc::clone(&ctx),
        runner,
        clock.clone(),
    ));
    let dispatch = tokio::spawn(dispatch_loop(
        Arc::clone(&ctx),
        executor,
        queue_rx,
        cancel.clone(),
    ));

    ctx.set_status(WorkerStatus::Alive);
    let heartbeats = tokio::spawn(
        HeartbeatPublisher::new(Arc::clone(&ctx), clock.clone()).run(cancel.clone()),
    );

    wait_for_shutdown().await?;

    // Drain: no new enqueues, in-flight attempts get the grace period.
    ctx.set_status(WorkerStatus::Draining);
    if let Err(error) = heartbeat::publish(&ctx, clock.now_utc()) {
        warn!(%error, "failed to publish draining heartbeat");
    }
    drop(watch_guard);
    cancel.cancel();

    let _ = ingest.await;
    let _ = dispatch.await;
    let _ = heartbeats.await;
    let _ = metrics_task.await;

    ctx.set_status(WorkerStatus::Stopped);
    if let Err(error) = heartbeat::publish(&ctx, clock.now_utc()) {
        warn!(%error, "failed to publish final heartbeat");
    }
    info!("worker drained and stopped");
    Ok(())
}

async fn wait_for_shutdown() -> Result<(), WatcherError> {
    let mut sigterm = signal(SignalKind::terminate()).map_err(WatcherError::Signal)?;
    let mut sigint = signal(SignalKind::interrupt()).map_err(WatcherError::Signal)?;

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down..."),
        _ = sigint.recv() => info!("received SIGINT, shutting down..."),
    }
    Ok(())
}

/// Feed the queue from file events, the startup scan, and the periodic
/// rescan that re-offers deferred or dropped tasks.
async fn ingest_loop(
    ctx: Arc<WorkerContext>,
    queue: TaskQueue,
    mut event_rx: mpsc::Receiver<PathBuf>,
    cancel: CancellationToken,
) {
    let tasks_dir = ctx.paths().tasks_dir();

    // Recover work that predates this process.
    match fs_watch::scan_json_dir(&tasks_dir) {
        Ok(paths) => {
            for path in paths {
                enqueue(&ctx, &queue, path);
            }
        }
        Err(error) => warn!(%error, "startup scan failed"),
    }

    let mut rescan = tokio::time::interval(ctx.config().rescan_interval);
    rescan.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The interval fires immediately once; the startup scan covered that.
    rescan.tick().await;

    loop {
        tokio::select! {
            Some(path) = event_rx.recv() => {
                enqueue(&ctx, &queue, path);
            }
            _ = rescan.tick() => {
                match fs_watch::scan_json_dir(&tasks_dir) {
                    Ok(paths) => {
                        for path in paths {
                            enqueue(&ctx, &queue, path);
                        }
                    }
                    Err(error) => warn!(%error, "rescan failed"),
                }
            }
            _ = cancel.cancelled() => break,
        }
    }
}

fn enqueue(ctx: &WorkerContext, queue: &TaskQueue, path: PathBuf) {
    let Some(stem) = path.file_stem().and_then(|s| s.to_str()).map(String::from) else {
        return;
    };
    if !ctx.try_mark_inflight(&stem) {
        return;
    }
    if queue.try_push(path) {
        ctx.metrics().set_queue_size(queue.depth());
    } else {
        ctx.clear_inflight(&stem);
        ctx.metrics().queue_drop();
        warn!(task = %stem, "dispatch queue full, dropping (rescan will re-offer)");
    }
}

/// Pull from the queue within the concurrency bound and run executors.
/// On cancellation, waits out the drain grace and aborts stragglers.
async fn dispatch_loop<R: TaskRunner, C: Clock>(
    ctx: Arc<WorkerContext>,
    executor: Arc<TaskExecutor<R, C>>,
    mut queue_rx: TaskQueueRx,
    cancel: CancellationToken,
) {
    let semaphore = Arc::new(Semaphore::new(ctx.config().max_concurrent_tasks));
    let mut attempts: JoinSet<()> = JoinSet::new();

    loop {
        while attempts.try_join_next().is_some() {}

        tokio::select! {
            maybe = queue_rx.pop() => {
                let Some(path) = maybe else { break };
                ctx.metrics().set_queue_size(queue_rx.depth());

                let permit = tokio::select! {
                    acquired = Arc::clone(&semaphore).acquire_owned() => {
                        match acquired {
                            Ok(permit) => permit,
                            Err(_) => break,
                        }
                    }
                    _ = cancel.cancelled() => break,
                };

                let ctx = Arc::clone(&ctx);
                let executor = Arc::clone(&executor);
                attempts.spawn(async move {
                    let _permit = permit;
                    let stem = path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .unwrap_or_default()
                        .to_string();
                    ctx.begin_attempt();
                    match executor.execute(&path).await {
                        Ok(outcome) => debug!(task = %stem, ?outcome, "executor finished"),
                        Err(error) => {
                            // Task file stays put; the rescan retries it.
                            error!(task = %stem, %error, "executor I/O failure");
                        }
                    }
                    ctx.end_attempt();
                    ctx.clear_inflight(&stem);
                });
            }
            _ = cancel.cancelled() => break,
        }
    }

    drain_attempts(&ctx, attempts).await;
}

async fn drain_attempts(ctx: &WorkerContext, mut attempts: JoinSet<()>) {
    let grace = ctx.config().drain_grace();
    let deadline = tokio::time::Instant::now() + grace;

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match tokio::time::timeout(remaining, attempts.join_next()).await {
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(_elapsed) => {
                warn!(
                    outstanding = attempts.len(),
                    "drain grace expired, aborting remaining attempts"
                );
                attempts.shutdown().await;
                break;
            }
        }
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
