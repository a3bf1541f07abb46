// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared per-worker state threaded through every component.
//!
//! The context replaces process globals: metrics, the circuit breaker,
//! lifecycle status, and attempt bookkeeping all live here behind one
//! `Arc`. Only the breaker and the small bookkeeping maps take a lock;
//! the hot counters are atomics.

use crate::metrics::{MetricsError, WatcherMetrics};
use fabric_core::{
    Attempt, CircuitBreaker, CircuitState, Heartbeat, Permit, WatcherConfig, WorkerPaths,
    WorkerStatus,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

pub struct WorkerContext {
    config: WatcherConfig,
    paths: WorkerPaths,
    metrics: Arc<WatcherMetrics>,
    breaker: Mutex<CircuitBreaker>,
    status: Mutex<WorkerStatus>,
    active_tasks: AtomicU64,
    completed_total: AtomicU64,
    failed_total: AtomicU64,
    queue_depth: Arc<AtomicU64>,
    /// Task ids currently queued or executing in this process, so watcher
    /// events and rescans never double-dispatch.
    inflight: Mutex<HashSet<String>>,
    /// Attempt history for tasks deferred by an open circuit, so the
    /// eventual terminal record keeps the full story.
    deferred_attempts: Mutex<HashMap<String, Vec<Attempt>>>,
}

impl WorkerContext {
    pub fn new(config: WatcherConfig, queue_depth: Arc<AtomicU64>) -> Result<Self, MetricsError> {
        let paths = config.paths();
        let metrics = Arc::new(WatcherMetrics::new(&config.worker_name)?);
        let breaker = CircuitBreaker::new(
            config.circuit_failure_threshold,
            config.circuit_open_duration,
        );
        metrics.set_circuit_state(breaker.state());
        Ok(Self {
            paths,
            metrics,
            breaker: Mutex::new(breaker),
            status: Mutex::new(WorkerStatus::Starting),
            active_tasks: AtomicU64::new(0),
            completed_total: AtomicU64::new(0),
            failed_total: AtomicU64::new(0),
            queue_depth,
            inflight: Mutex::new(HashSet::new()),
            deferred_attempts: Mutex::new(HashMap::new()),
            config,
        })
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    pub fn paths(&self) -> &WorkerPaths {
        &self.paths
    }

    pub fn metrics(&self) -> &WatcherMetrics {
        &self.metrics
    }

    /// Shared handle for the metrics HTTP server.
    pub fn metrics_handle(&self) -> Arc<WatcherMetrics> {
        Arc::clone(&self.metrics)
    }

    // -- circuit breaker ------------------------------------------------

    pub fn breaker_allow(&self, now: Instant) -> Permit {
        let mut breaker = self.breaker.lock();
        let permit = breaker.allow(now);
        self.metrics.set_circuit_state(breaker.state());
        permit
    }

    pub fn breaker_record_success(&self) {
        let mut breaker = self.breaker.lock();
        breaker.record_success();
        self.metrics.set_circuit_state(breaker.state());
    }

    pub fn breaker_record_failure(&self, now: Instant) {
        let mut breaker = self.breaker.lock();
        breaker.record_failure(now);
        self.metrics.set_circuit_state(breaker.state());
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.lock().state()
    }

    // -- lifecycle ------------------------------------------------------

    pub fn status(&self) -> WorkerStatus {
        *self.status.lock()
    }

    pub fn set_status(&self, status: WorkerStatus) {
        *self.status.lock() = status;
    }

    // -- attempt bookkeeping --------------------------------------------

    pub fn begin_attempt(&self) {
        let active = self.active_tasks.fetch_add(1, Ordering::Relaxed) + 1;
        self.metrics.set_active_tasks(active);
    }

    pub fn end_attempt(&self) {
        let prev = self.active_tasks.fetch_sub(1, Ordering::Relaxed);
        self.metrics.set_active_tasks(prev.saturating_sub(1));
    }

    pub fn record_completed(&self) {
        self.completed_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Claim a task id for this process. False when already claimed.
    pub fn try_mark_inflight(&self, task_id: &str) -> bool {
        self.inflight.lock().insert(task_id.to_string())
    }

    pub fn clear_inflight(&self, task_id: &str) {
        self.inflight.lock().remove(task_id);
    }

    pub fn take_deferred_attempts(&self, task_id: &str) -> Vec<Attempt> {
        self.deferred_attempts
            .lock()
            .remove(task_id)
            .unwrap_or_default()
    }

    pub fn stash_deferred_attempts(&self, task_id: &str, attempts: Vec<Attempt>) {
        self.deferred_attempts
            .lock()
            .insert(task_id.to_string(), attempts);
    }

    /// Refresh the dead-letter gauge from the directory contents.
    pub fn sync_dlq_gauge(&self) {
        let count = std::fs::read_dir(self.paths.dlq_dir())
            .map(|entries| {
                entries
                    .flatten()
                    .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
                    .count() as u64
            })
            .unwrap_or(0);
        self.metrics.set_dlq_size(count);
    }

    /// Vitals snapshot for the heartbeat publisher.
    pub fn snapshot(&self, timestamp: chrono::DateTime<chrono::Utc>) -> Heartbeat {
        let queue_depth = self.queue_depth.load(Ordering::Relaxed);
        self.metrics.set_queue_size(queue_depth);
        Heartbeat {
            worker: self.config.worker_name.clone(),
            timestamp,
            status: self.status(),
            active_tasks: self.active_tasks.load(Ordering::Relaxed),
            queue_depth,
            completed_total: self.completed_total.load(Ordering::Relaxed),
            failed_total: self.failed_total.load(Ordering::Relaxed),
            circuit_state: self.circuit_state(),
        }
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
