// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task, attempt, and terminal-result records.
//!
//! These are the typed decoders for every JSON file the fabric exchanges
//! over the shared filesystem. Unknown fields on a task are preserved
//! verbatim and carried into its terminal result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Exit classification of a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Success,
    Failed,
    Timeout,
    LockConflict,
    InvalidPayload,
    CircuitOpen,
}

impl AttemptStatus {
    /// Deferrals leave the task file in place to be re-observed; they are
    /// neither failures nor retries.
    pub fn is_deferral(self) -> bool {
        matches!(self, AttemptStatus::LockConflict | AttemptStatus::CircuitOpen)
    }

    /// Whether this outcome consumes an attempt number for retry
    /// accounting. Deferrals do not.
    pub fn counts_toward_retries(self) -> bool {
        matches!(
            self,
            AttemptStatus::Success | AttemptStatus::Failed | AttemptStatus::Timeout
        )
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptStatus::Success => write!(f, "success"),
            AttemptStatus::Failed => write!(f, "failed"),
            AttemptStatus::Timeout => write!(f, "timeout"),
            AttemptStatus::LockConflict => write!(f, "lock_conflict"),
            AttemptStatus::InvalidPayload => write!(f, "invalid_payload"),
            AttemptStatus::CircuitOpen => write!(f, "circuit_open"),
        }
    }
}

/// A unit of work dropped under `tasks/<worker>/` by an external producer.
///
/// Tasks are immutable after write; the executor removes the file once a
/// terminal record exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub worker: String,
    /// Opaque payload forwarded to the agent subprocess.
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
    /// Producer-supplied fields outside the schema, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Why a task file could not be decoded.
#[derive(Debug, Error)]
pub enum TaskDecodeError {
    #[error("malformed task JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("task_id {task_id:?} does not match filename stem {stem:?}")]
    IdMismatch { task_id: String, stem: String },
}

impl Task {
    /// Decode a task file, enforcing that `task_id` equals the filename stem.
    pub fn decode(bytes: &[u8], stem: &str) -> Result<Self, TaskDecodeError> {
        let task: Task = serde_json::from_slice(bytes)?;
        if task.task_id != stem {
            return Err(TaskDecodeError::IdMismatch {
                task_id: task.task_id,
                stem: stem.to_string(),
            });
        }
        Ok(task)
    }

    /// Minimal stand-in for an undecodable payload, so the dead-letter
    /// record still identifies the task by its filename stem.
    pub fn placeholder(stem: &str, worker: &str) -> Self {
        Self {
            task_id: stem.to_string(),
            worker: worker.to_string(),
            description: String::new(),
            created_at: None,
            metadata: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// Record of one subprocess invocation for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    /// 1-based; deferrals do not advance it.
    pub attempt_number: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub exit_status: AttemptStatus,
    pub stdout_excerpt: String,
    pub stderr_excerpt: String,
    pub duration_seconds: f64,
}

/// Terminal disposition of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalStatus {
    Completed,
    DeadLettered,
}

impl fmt::Display for FinalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalStatus::Completed => write!(f, "completed"),
            FinalStatus::DeadLettered => write!(f, "dead_lettered"),
        }
    }
}

/// The terminal record written to `results/<worker>/` or `dlq/<worker>/`.
///
/// Exactly one is written per task, atomically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    #[serde(flatten)]
    pub task: Task,
    pub attempts: Vec<Attempt>,
    pub final_status: FinalStatus,
    pub completed_at: DateTime<Utc>,
}

impl TaskResult {
    pub fn completed(task: Task, attempts: Vec<Attempt>, completed_at: DateTime<Utc>) -> Self {
        Self {
            task,
            attempts,
            final_status: FinalStatus::Completed,
            completed_at,
        }
    }

    pub fn dead_lettered(task: Task, attempts: Vec<Attempt>, completed_at: DateTime<Utc>) -> Self {
        Self {
            task,
            attempts,
            final_status: FinalStatus::DeadLettered,
            completed_at,
        }
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
