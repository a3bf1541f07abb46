// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener state and the fleet event loop.
//!
//! One FileWatcher per worker's `results/` and `dlq/`, one over
//! `heartbeats/`, and a periodic tick for health, pending-task discovery
//! and timeout detection. The worker set is fixed at startup (explicit
//! `--workers` list or discovery from the shared root).

use fabric_adapters::fs_watch::{self, DirWatcher};
use fabric_adapters::WatchError;
use fabric_core::{Clock, ConfigError, FleetPaths, FleetState, ListenerConfig, TaskState};
use fabric_storage::{LoadOutcome, StateStore, StateStoreError};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Fatal listener errors; exits non-zero.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error(transparent)]
    State(#[from] StateStoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to install signal handler: {0}")]
    Signal(#[source] std::io::Error),
}

/// A filesystem fact observed by one of the watchers.
#[derive(Debug)]
pub(crate) enum FleetEvent {
    Result { worker: String, path: PathBuf },
    Dlq { worker: String, path: PathBuf },
    Heartbeat { path: PathBuf },
}

/// Fleet coordinator state. Event handlers live in `completion.rs`,
/// `health.rs`, and `reconcile.rs`.
pub struct OrchestratorListener<C: Clock> {
    pub(crate) config: ListenerConfig,
    pub(crate) paths: FleetPaths,
    pub(crate) workers: Vec<String>,
    pub(crate) store: StateStore,
    pub(crate) fleet: FleetState,
    pub(crate) clock: C,
}

impl<C: Clock> OrchestratorListener<C> {
    pub fn new(config: ListenerConfig, clock: C) -> Result<Self, ListenerError> {
        config.validate()?;
        let paths = config.paths();
        paths.ensure()?;

        let workers = if config.workers.is_empty() {
            paths.discover_workers()
        } else {
            config.workers.clone()
        };
        let store = StateStore::new(paths.state_file());

        Ok(Self {
            config,
            paths,
            workers,
            store,
            fleet: FleetState::default(),
            clock,
        })
    }

    pub fn fleet(&self) -> &FleetState {
        &self.fleet
    }

    pub fn workers(&self) -> &[String] {
        &self.workers
    }

    /// Load the persisted snapshot, then rebuild from filesystem ground
    /// truth (files win over stale snapshot entries).
    pub fn startup(&mut self) -> Result<(), ListenerError> {
        match self.store.load(self.clock.now_utc())? {
            LoadOutcome::Loaded(fleet) => {
                info!(tasks = fleet.tasks.len(), "loaded fleet state snapshot");
                self.fleet = fleet;
            }
            LoadOutcome::Missing => info!("no fleet state snapshot, starting fresh"),
            LoadOutcome::Corrupt { archived_to } => {
                warn!(
                    archive = %archived_to.display(),
                    "state snapshot was corrupt, rebuilding from filesystem"
                );
            }
        }

        self.reconcile();
        self.persist();
        Ok(())
    }

    pub(crate) fn persist(&self) {
        if let Err(error) = self.store.save(&self.fleet, self.clock.now_utc()) {
            warn!(%error, "failed to persist fleet state");
        }
    }

    pub(crate) fn handle_event(&mut self, event: FleetEvent) {
        match event {
            FleetEvent::Result { worker, path } => {
                self.handle_terminal_file(&worker, &path, TaskState::Completed);
            }
            FleetEvent::Dlq { worker, path } => {
                self.handle_terminal_file(&worker, &path, TaskState::DeadLettered);
            }
            FleetEvent::Heartbeat { path } => self.ingest_heartbeat(&path),
        }
    }
}

/// Keeps a directory watch alive together with its forwarding task.
struct WatchForward {
    _watcher: DirWatcher,
    _task: tokio::task::JoinHandle<()>,
}

fn forward(
    dir: &Path,
    tx: mpsc::Sender<FleetEvent>,
    wrap: impl Fn(PathBuf) -> FleetEvent + Send + 'static,
) -> Result<WatchForward, WatchError> {
    let (path_tx, mut path_rx) = mpsc::channel(64);
    let watcher = fs_watch::watch_json_dir(dir, path_tx)?;
    let task = tokio::spawn(async move {
        while let Some(path) = path_rx.recv().await {
            if tx.send(wrap(path)).await.is_err() {
                break;
            }
        }
    });
    Ok(WatchForward {
        _watcher: watcher,
        _task: task,
    })
}

/// Run the listener until SIGTERM/SIGINT.
pub async fn run<C: Clock>(config: ListenerConfig, clock: C) -> Result<(), ListenerError> {
    let cancel = CancellationToken::new();
    let mut sigterm = signal(SignalKind::terminate()).map_err(ListenerError::Signal)?;
    let mut sigint = signal(SignalKind::interrupt()).map_err(ListenerError::Signal)?;

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM, shutting down..."),
            _ = sigint.recv() => info!("received SIGINT, shutting down..."),
        }
        signal_cancel.cancel();
    });

    run_until_cancelled(config, clock, cancel).await
}

/// Event loop body, cancellable for tests and embedding.
pub async fn run_until_cancelled<C: Clock>(
    config: ListenerConfig,
    clock: C,
    cancel: CancellationToken,
) -> Result<(), ListenerError> {
    let mut listener = OrchestratorListener::new(config, clock)?;
    listener.startup()?;
    info!(workers = ?listener.workers(), "orchestrator listener ready");

    let (tx, mut rx) = mpsc::channel(256);
    let mut guards = Vec::new();
    for worker in listener.workers().to_vec() {
        let wp = listener.paths.worker(&worker);
        // Watched directories must exist before the workers first write
        // into them; creation is idempotent on both sides.
        std::fs::create_dir_all(wp.results_dir())?;
        std::fs::create_dir_all(wp.dlq_dir())?;
        std::fs::create_dir_all(wp.tasks_dir())?;

        let w = worker.clone();
        guards.push(forward(&wp.results_dir(), tx.clone(), move |path| {
            FleetEvent::Result {
                worker: w.clone(),
                path,
            }
        })?);
        let w = worker.clone();
        guards.push(forward(&wp.dlq_dir(), tx.clone(), move |path| {
            FleetEvent::Dlq {
                worker: w.clone(),
                path,
            }
        })?);
    }
    guards.push(forward(&listener.paths.heartbeats_dir(), tx.clone(), |path| {
        FleetEvent::Heartbeat { path }
    })?);
    drop(tx);

    let mut tick = tokio::time::interval(listener.config.tick_interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            Some(event) = rx.recv() => listener.handle_event(event),
            _ = tick.tick() => listener.tick(),
            _ = cancel.cancelled() => break,
        }
    }

    listener.persist();
    info!("orchestrator listener stopped");
    Ok(())
}
