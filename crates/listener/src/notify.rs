// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Trigger files raised toward the external orchestrator.
//!
//! Completion markers are bare `<task_id>.done` files (idempotent: one
//! terminal result per task). Notification events get a unique filename
//! per emission so re-raising never clobbers an earlier event.

use fabric_core::FleetPaths;
use fabric_storage::{write_json_atomic, AtomicWriteError};
use std::path::PathBuf;

/// Mark a task's completion for the orchestrator.
pub fn done_trigger(paths: &FleetPaths, task_id: &str) -> std::io::Result<()> {
    let path = paths
        .orchestrator_triggers_dir()
        .join(format!("{task_id}.done"));
    std::fs::write(path, b"")
}

/// Raise a notification event (`<kind>_<subject>_<epoch_ms>_<uuid8>.json`).
pub fn event_trigger(
    paths: &FleetPaths,
    kind: &str,
    subject: &str,
    payload: &serde_json::Value,
    epoch_ms: u64,
) -> Result<PathBuf, AtomicWriteError> {
    let unique = uuid::Uuid::new_v4().simple().to_string();
    let name = format!("{kind}_{subject}_{epoch_ms}_{}.json", &unique[..8]);
    let path = paths.orchestrator_triggers_dir().join(name);
    write_json_atomic(&path, payload)?;
    Ok(path)
}

#[cfg(test)]
#[path = "notify_tests.rs"]
mod tests;
