// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Restart reconciliation: rebuild FleetState from filesystem ground
//! truth. Files always win over whatever the snapshot remembered.

use crate::run::OrchestratorListener;
use fabric_core::{Clock, TaskState};
use std::path::Path;
use tracing::warn;

impl<C: Clock> OrchestratorListener<C> {
    pub(crate) fn reconcile(&mut self) {
        let now = self.clock.now_utc();

        for worker in self.workers.clone() {
            let wp = self.paths.worker(&worker);

            for stem in json_stems(&wp.results_dir()) {
                self.fleet
                    .force_task(&stem, &worker, TaskState::Completed, now);
            }
            for stem in json_stems(&wp.dlq_dir()) {
                self.fleet
                    .force_task(&stem, &worker, TaskState::DeadLettered, now);
            }
            for stem in json_stems(&wp.tasks_dir()) {
                // A task file plus a terminal record means the worker died
                // between the result write and the task-file removal; the
                // terminal record wins.
                let terminal = self
                    .fleet
                    .tasks
                    .get(&stem)
                    .is_some_and(|entry| entry.state.is_terminal());
                if !terminal {
                    self.fleet.force_task(&stem, &worker, TaskState::Pending, now);
                }
            }

            let heartbeat_path = wp.heartbeat_file();
            self.ingest_heartbeat(&heartbeat_path);
        }

        // Snapshot entries with no file evidence anywhere: the task went
        // missing without a terminal record.
        let unaccounted: Vec<(String, String)> = self
            .fleet
            .tasks
            .values()
            .filter(|entry| matches!(entry.state, TaskState::Pending | TaskState::InFlight))
            .map(|entry| (entry.task_id.clone(), entry.worker.clone()))
            .collect();

        for (task_id, worker) in unaccounted {
            let wp = self.paths.worker(&worker);
            let evidence = wp.task_file(&task_id).exists()
                || wp.result_file(&task_id).exists()
                || wp.dlq_file(&task_id).exists();
            if !evidence {
                warn!(task = %task_id, worker = %worker, "task has no file evidence, orphaned");
                self.fleet
                    .force_task(&task_id, &worker, TaskState::Orphaned, now);
            }
        }
    }
}

fn json_stems(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut stems: Vec<String> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .filter_map(|path| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .map(String::from)
        })
        .collect();
    stems.sort();
    stems
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod tests;
