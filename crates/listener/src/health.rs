// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health monitoring, pending-task discovery, and fleet-level timeouts.

use crate::notify;
use crate::run::OrchestratorListener;
use fabric_core::{Clock, Heartbeat, TaskState, WorkerHealth};
use std::path::Path;
use tracing::{debug, info, warn};

impl<C: Clock> OrchestratorListener<C> {
    /// One periodic pass: heartbeat freshness, new task files, timeouts.
    pub(crate) fn tick(&mut self) {
        self.refresh_heartbeats();
        self.discover_pending();
        self.classify_health();
        self.check_timeouts();
        self.persist();
    }

    /// Ingest a heartbeat file (watcher event path).
    pub(crate) fn ingest_heartbeat(&mut self, path: &Path) {
        if let Some(heartbeat) = read_heartbeat(path) {
            debug!(worker = %heartbeat.worker, status = %heartbeat.status, "heartbeat");
            self.fleet.record_heartbeat(heartbeat);
        }
    }

    /// Re-read every worker's heartbeat file. Covers heartbeats written
    /// before our watcher existed; ordering is safe because stale
    /// timestamps are ignored.
    fn refresh_heartbeats(&mut self) {
        for worker in self.workers.clone() {
            let path = self.paths.worker(&worker).heartbeat_file();
            if let Some(heartbeat) = read_heartbeat(&path) {
                self.fleet.record_heartbeat(heartbeat);
            }
        }
    }

    /// Track task files as `pending`; a pending task still on disk a full
    /// tick later is promoted to `in_flight` (a live worker has started
    /// or will start it; there is no per-attempt signal to watch).
    fn discover_pending(&mut self) {
        let now = self.clock.now_utc();
        for worker in self.workers.clone() {
            let tasks_dir = self.paths.worker(&worker).tasks_dir();
            let Ok(entries) = std::fs::read_dir(&tasks_dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().is_none_or(|ext| ext != "json") {
                    continue;
                }
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                match self.fleet.tasks.get(stem) {
                    None => {
                        self.fleet.observe_task(stem, &worker, TaskState::Pending, now);
                        debug!(task = %stem, worker = %worker, "task observed");
                    }
                    Some(entry)
                        if entry.state == TaskState::Pending
                            && (now - entry.observed_at).to_std().unwrap_or_default()
                                >= self.config.tick_interval =>
                    {
                        self.fleet.advance_task(stem, TaskState::InFlight, now);
                    }
                    Some(_) => {}
                }
            }
        }
    }

    /// Classify heartbeat freshness and notify on transitions into
    /// `unresponsive`. Cleanly stopped workers are exempt.
    fn classify_health(&mut self) {
        let now = self.clock.now_utc();
        let interval = self.config.heartbeat_interval;

        for worker in self.workers.clone() {
            let Some(entry) = self.fleet.workers.get(&worker) else {
                continue;
            };
            let Some(heartbeat) = entry.heartbeat.clone() else {
                continue;
            };
            let stopped = entry.is_stopped();

            let health = WorkerHealth::classify(heartbeat.age(now), interval);
            let previous = self.fleet.set_health(&worker, health);

            if health == WorkerHealth::Unresponsive
                && previous != Some(WorkerHealth::Unresponsive)
                && !stopped
            {
                let age_seconds = heartbeat.age(now).as_secs();
                warn!(worker = %worker, age_seconds, "worker unresponsive");
                let payload = serde_json::json!({
                    "event": "worker_unresponsive",
                    "worker": worker,
                    "age_seconds": age_seconds,
                    "last_heartbeat": heartbeat.timestamp,
                    "observed_at": now,
                });
                if let Err(error) = notify::event_trigger(
                    &self.paths,
                    "worker_unresponsive",
                    &worker,
                    &payload,
                    self.clock.epoch_ms(),
                ) {
                    warn!(worker = %worker, %error, "failed to write unresponsive trigger");
                }
            } else if health == WorkerHealth::Healthy
                && previous == Some(WorkerHealth::Unresponsive)
            {
                info!(worker = %worker, "worker recovered");
            }
        }
    }

    /// Mark tasks stuck beyond `fleet_task_timeout` and notify.
    fn check_timeouts(&mut self) {
        let now = self.clock.now_utc();
        let timeout = self.config.fleet_task_timeout;

        let stuck: Vec<(String, String)> = self
            .fleet
            .tasks
            .values()
            .filter(|entry| {
                matches!(entry.state, TaskState::Pending | TaskState::InFlight)
                    && (now - entry.observed_at).to_std().unwrap_or_default() > timeout
            })
            .map(|entry| (entry.task_id.clone(), entry.worker.clone()))
            .collect();

        for (task_id, worker) in stuck {
            if !self.fleet.advance_task(&task_id, TaskState::TimedOut, now) {
                continue;
            }
            warn!(task = %task_id, worker = %worker, "fleet task timeout");
            let payload = serde_json::json!({
                "event": "task_timeout",
                "task_id": task_id,
                "worker": worker,
                "timeout_seconds": timeout.as_secs(),
                "observed_at": now,
            });
            if let Err(error) = notify::event_trigger(
                &self.paths,
                "task_timeout",
                &task_id,
                &payload,
                self.clock.epoch_ms(),
            ) {
                warn!(task = %task_id, %error, "failed to write timeout trigger");
            }
        }
    }
}

/// Read a heartbeat file, tolerating absence and partial history.
fn read_heartbeat(path: &Path) -> Option<Heartbeat> {
    let bytes = std::fs::read(path).ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(heartbeat) => Some(heartbeat),
        Err(error) => {
            warn!(path = %path.display(), %error, "malformed heartbeat file");
            None
        }
    }
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
