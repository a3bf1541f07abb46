// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Completion aggregation: terminal records arriving in `results/` and
//! `dlq/` directories.

use crate::notify;
use crate::run::OrchestratorListener;
use fabric_core::{Clock, FinalStatus, TaskResult, TaskState};
use std::path::Path;
use tracing::{info, warn};

impl<C: Clock> OrchestratorListener<C> {
    /// Ingest a terminal record file. `dir_state` is the state implied by
    /// the directory it landed in; the record's own `final_status` wins
    /// when the file parses.
    pub(crate) fn handle_terminal_file(&mut self, worker: &str, path: &Path, dir_state: TaskState) {
        let Some(task_id) = path.file_stem().and_then(|s| s.to_str()).map(String::from) else {
            return;
        };

        let state = match read_result(path) {
            Some(result) => match result.final_status {
                FinalStatus::Completed => TaskState::Completed,
                FinalStatus::DeadLettered => TaskState::DeadLettered,
            },
            None => dir_state,
        };

        let now = self.clock.now_utc();
        if self.fleet.observe_task(&task_id, worker, state, now) {
            info!(task = %task_id, worker, state = %state, "task reached terminal state");
            if let Err(error) = notify::done_trigger(&self.paths, &task_id) {
                warn!(task = %task_id, %error, "failed to write completion trigger");
            }
            self.persist();
        }
    }
}

/// Read a terminal record, tolerating a vanished or unreadable file.
fn read_result(path: &Path) -> Option<TaskResult> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(error) => {
            warn!(path = %path.display(), %error, "could not read result file");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(result) => Some(result),
        Err(error) => {
            warn!(path = %path.display(), %error, "malformed result file");
            None
        }
    }
}

#[cfg(test)]
#[path = "completion_tests.rs"]
mod tests;
