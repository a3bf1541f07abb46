// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fleet-wide aggregate state held by the orchestrator listener.
//!
//! Task transitions are monotone forward; only the restart-time
//! reconciliation pass may rewrite an entry wholesale.

use crate::heartbeat::{Heartbeat, WorkerStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Where a task sits in its fleet-level lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    InFlight,
    Completed,
    DeadLettered,
    TimedOut,
    Orphaned,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::DeadLettered)
    }

    /// Forward-progress rank. Transitions may only move to a strictly
    /// higher rank; `timed_out`/`orphaned` may still resolve to a
    /// terminal result if one eventually lands on disk.
    fn rank(self) -> u8 {
        match self {
            TaskState::Pending => 0,
            TaskState::InFlight => 1,
            TaskState::TimedOut | TaskState::Orphaned => 2,
            TaskState::Completed | TaskState::DeadLettered => 3,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Pending => write!(f, "pending"),
            TaskState::InFlight => write!(f, "in_flight"),
            TaskState::Completed => write!(f, "completed"),
            TaskState::DeadLettered => write!(f, "dead_lettered"),
            TaskState::TimedOut => write!(f, "timed_out"),
            TaskState::Orphaned => write!(f, "orphaned"),
        }
    }
}

/// One tracked task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEntry {
    pub task_id: String,
    pub worker: String,
    pub state: TaskState,
    /// When the listener first saw evidence of this task.
    pub observed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Derived health classification for a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerHealth {
    Healthy,
    Degraded,
    Unresponsive,
}

impl WorkerHealth {
    /// Classify by heartbeat age: healthy under 2 intervals, degraded
    /// under 3, unresponsive beyond.
    pub fn classify(age: Duration, interval: Duration) -> Self {
        if age < interval * 2 {
            WorkerHealth::Healthy
        } else if age < interval * 3 {
            WorkerHealth::Degraded
        } else {
            WorkerHealth::Unresponsive
        }
    }
}

impl fmt::Display for WorkerHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerHealth::Healthy => write!(f, "healthy"),
            WorkerHealth::Degraded => write!(f, "degraded"),
            WorkerHealth::Unresponsive => write!(f, "unresponsive"),
        }
    }
}

/// One tracked worker: last observed heartbeat plus derived health.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerEntry {
    pub worker: String,
    pub heartbeat: Option<Heartbeat>,
    pub health: WorkerHealth,
}

impl WorkerEntry {
    /// A worker that announced `stopped` shut down cleanly; its silence
    /// afterwards is not an incident.
    pub fn is_stopped(&self) -> bool {
        self.heartbeat
            .as_ref()
            .is_some_and(|hb| hb.status == WorkerStatus::Stopped)
    }
}

/// Aggregate state persisted by the StateStore.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetState {
    pub tasks: HashMap<String, TaskEntry>,
    pub workers: HashMap<String, WorkerEntry>,
}

impl FleetState {
    /// Record that a task exists (first sighting keeps `observed_at`).
    /// Returns true if the entry changed.
    pub fn observe_task(
        &mut self,
        task_id: &str,
        worker: &str,
        state: TaskState,
        now: DateTime<Utc>,
    ) -> bool {
        match self.tasks.get_mut(task_id) {
            Some(entry) => Self::advance_entry(entry, state, now),
            None => {
                self.tasks.insert(
                    task_id.to_string(),
                    TaskEntry {
                        task_id: task_id.to_string(),
                        worker: worker.to_string(),
                        state,
                        observed_at: now,
                        updated_at: now,
                    },
                );
                true
            }
        }
    }

    /// Monotone transition for an already-known task. Returns true if the
    /// state actually moved.
    pub fn advance_task(&mut self, task_id: &str, state: TaskState, now: DateTime<Utc>) -> bool {
        match self.tasks.get_mut(task_id) {
            Some(entry) => Self::advance_entry(entry, state, now),
            None => false,
        }
    }

    fn advance_entry(entry: &mut TaskEntry, state: TaskState, now: DateTime<Utc>) -> bool {
        if state.rank() > entry.state.rank() {
            entry.state = state;
            entry.updated_at = now;
            true
        } else {
            false
        }
    }

    /// Reconciliation override: filesystem ground truth wins over
    /// whatever a stale snapshot said.
    pub fn force_task(
        &mut self,
        task_id: &str,
        worker: &str,
        state: TaskState,
        now: DateTime<Utc>,
    ) {
        let entry = self
            .tasks
            .entry(task_id.to_string())
            .or_insert_with(|| TaskEntry {
                task_id: task_id.to_string(),
                worker: worker.to_string(),
                state,
                observed_at: now,
                updated_at: now,
            });
        if entry.state != state {
            entry.state = state;
            entry.updated_at = now;
        }
    }

    /// Ingest a heartbeat, ignoring out-of-order (older) timestamps.
    /// Returns true if the stored heartbeat was replaced.
    pub fn record_heartbeat(&mut self, hb: Heartbeat) -> bool {
        let entry = self
            .workers
            .entry(hb.worker.clone())
            .or_insert_with(|| WorkerEntry {
                worker: hb.worker.clone(),
                heartbeat: None,
                health: WorkerHealth::Healthy,
            });
        match &entry.heartbeat {
            Some(prev) if prev.timestamp > hb.timestamp => false,
            _ => {
                entry.heartbeat = Some(hb);
                true
            }
        }
    }

    /// Update a worker's derived health. Returns the previous value so
    /// callers can detect transitions.
    pub fn set_health(&mut self, worker: &str, health: WorkerHealth) -> Option<WorkerHealth> {
        let entry = self
            .workers
            .entry(worker.to_string())
            .or_insert_with(|| WorkerEntry {
                worker: worker.to_string(),
                heartbeat: None,
                health,
            });
        let previous = entry.health;
        entry.health = health;
        Some(previous)
    }

    /// Task ids currently in `state`.
    pub fn tasks_in_state(&self, state: TaskState) -> Vec<&TaskEntry> {
        let mut entries: Vec<&TaskEntry> =
            self.tasks.values().filter(|t| t.state == state).collect();
        entries.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        entries
    }
}

#[cfg(test)]
#[path = "fleet_tests.rs"]
mod tests;
