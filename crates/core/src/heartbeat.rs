// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker liveness snapshot published to `heartbeats/<worker>.json`.

use crate::breaker::CircuitState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Worker lifecycle phase carried in heartbeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Starting,
    Alive,
    Draining,
    Stopped,
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerStatus::Starting => write!(f, "starting"),
            WorkerStatus::Alive => write!(f, "alive"),
            WorkerStatus::Draining => write!(f, "draining"),
            WorkerStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// Periodic vitals snapshot. Written atomically so readers never see a
/// truncated file; `timestamp` is non-decreasing for a live worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub worker: String,
    pub timestamp: DateTime<Utc>,
    pub status: WorkerStatus,
    pub active_tasks: u64,
    pub queue_depth: u64,
    pub completed_total: u64,
    pub failed_total: u64,
    pub circuit_state: CircuitState,
}

impl Heartbeat {
    /// Age of this heartbeat relative to `now` (zero if in the future).
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.timestamp).to_std().unwrap_or(Duration::ZERO)
    }
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;
