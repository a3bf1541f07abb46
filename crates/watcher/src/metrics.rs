// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prometheus metrics registry and the `/metrics` HTTP endpoint.

use fabric_core::CircuitState;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::net::Ipv4Addr;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("metrics registry error: {0}")]
    Registry(#[from] prometheus::Error),

    #[error("failed to bind metrics port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("metrics server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Per-worker metrics, all labelled with the worker name so a scrape of
/// several workers aggregates cleanly.
pub struct WatcherMetrics {
    worker: String,
    registry: Registry,
    tasks_processed: IntCounterVec,
    task_duration: HistogramVec,
    queue_size: IntGaugeVec,
    active_tasks: IntGaugeVec,
    circuit_state: IntGaugeVec,
    dlq_size: IntGaugeVec,
    queue_dropped: IntCounterVec,
    heartbeat_failures: IntCounterVec,
}

impl WatcherMetrics {
    pub fn new(worker: &str) -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let tasks_processed = IntCounterVec::new(
            Opts::new(
                "watcher_tasks_processed_total",
                "Attempts finished, by terminal status of the attempt",
            ),
            &["worker", "status"],
        )?;
        let task_duration = HistogramVec::new(
            HistogramOpts::new(
                "watcher_task_duration_seconds",
                "Wall-clock duration of subprocess attempts",
            ),
            &["worker"],
        )?;
        let queue_size = IntGaugeVec::new(
            Opts::new("watcher_task_queue_size", "Tasks waiting in the dispatch queue"),
            &["worker"],
        )?;
        let active_tasks = IntGaugeVec::new(
            Opts::new("watcher_active_tasks", "Attempts currently executing"),
            &["worker"],
        )?;
        let circuit_state = IntGaugeVec::new(
            Opts::new(
                "watcher_circuit_breaker_state",
                "Circuit breaker state (0=closed, 1=open, 2=half_open)",
            ),
            &["worker"],
        )?;
        let dlq_size = IntGaugeVec::new(
            Opts::new("watcher_dlq_size", "Entries in the dead-letter queue"),
            &["worker"],
        )?;
        let queue_dropped = IntCounterVec::new(
            Opts::new(
                "watcher_queue_dropped_total",
                "Enqueues dropped because the dispatch queue was full",
            ),
            &["worker"],
        )?;
        let heartbeat_failures = IntCounterVec::new(
            Opts::new(
                "watcher_heartbeat_failures_total",
                "Heartbeat writes that failed",
            ),
            &["worker"],
        )?;

        registry.register(Box::new(tasks_processed.clone()))?;
        registry.register(Box::new(task_duration.clone()))?;
        registry.register(Box::new(queue_size.clone()))?;
        registry.register(Box::new(active_tasks.clone()))?;
        registry.register(Box::new(circuit_state.clone()))?;
        registry.register(Box::new(dlq_size.clone()))?;
        registry.register(Box::new(queue_dropped.clone()))?;
        registry.register(Box::new(heartbeat_failures.clone()))?;

        Ok(Self {
            worker: worker.to_string(),
            registry,
            tasks_processed,
            task_duration,
            queue_size,
            active_tasks,
            circuit_state,
            dlq_size,
            queue_dropped,
            heartbeat_failures,
        })
    }

    pub fn task_processed(&self, status: &str) {
        self.tasks_processed
            .with_label_values(&[&self.worker, status])
            .inc();
    }

    pub fn observe_duration(&self, seconds: f64) {
        self.task_duration
            .with_label_values(&[&self.worker])
            .observe(seconds);
    }

    pub fn set_queue_size(&self, size: u64) {
        self.queue_size
            .with_label_values(&[&self.worker])
            .set(size as i64);
    }

    pub fn set_active_tasks(&self, active: u64) {
        self.active_tasks
            .with_label_values(&[&self.worker])
            .set(active as i64);
    }

    pub fn set_circuit_state(&self, state: CircuitState) {
        self.circuit_state
            .with_label_values(&[&self.worker])
            .set(state.as_gauge());
    }

    pub fn set_dlq_size(&self, size: u64) {
        self.dlq_size
            .with_label_values(&[&self.worker])
            .set(size as i64);
    }

    pub fn queue_drop(&self) {
        self.queue_dropped.with_label_values(&[&self.worker]).inc();
    }

    pub fn heartbeat_failure(&self) {
        self.heartbeat_failures
            .with_label_values(&[&self.worker])
            .inc();
    }

    /// Render the registry in Prometheus text exposition format.
    pub fn gather_text(&self) -> String {
        let families = self.registry.gather();
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(error) = encoder.encode(&families, &mut buffer) {
            tracing::warn!(%error, "failed to encode metrics");
            return String::new();
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

/// Serve `GET /metrics` until cancelled.
///
/// The listener is bound by the caller so a port conflict is a fatal
/// startup error rather than a background task death.
pub async fn serve(
    listener: tokio::net::TcpListener,
    metrics: Arc<WatcherMetrics>,
    cancel: CancellationToken,
) -> Result<(), MetricsError> {
    let app = axum::Router::new().route(
        "/metrics",
        axum::routing::get(move || {
            let metrics = Arc::clone(&metrics);
            async move { metrics.gather_text() }
        }),
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(MetricsError::Serve)
}

/// Bind the metrics port on all interfaces.
pub async fn bind(port: u16) -> Result<tokio::net::TcpListener, MetricsError> {
    tokio::net::TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
        .await
        .map_err(|source| MetricsError::Bind { port, source })
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
