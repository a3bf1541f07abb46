// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for listener tests.

use crate::run::OrchestratorListener;
use fabric_core::{
    Attempt, AttemptStatus, CircuitState, Clock, FakeClock, FinalStatus, Heartbeat,
    ListenerConfig, Task, TaskResult, WorkerStatus,
};
use fabric_storage::write_json_atomic;
use std::time::Duration;

pub(crate) struct Fixture {
    /// Keeps the temp shared root alive for the test's duration.
    #[allow(dead_code)]
    pub dir: tempfile::TempDir,
    pub clock: FakeClock,
    pub listener: OrchestratorListener<FakeClock>,
}

impl Fixture {
    pub fn new(workers: &[&str]) -> Self {
        Self::with_config(workers, |_| {})
    }

    pub fn with_config(workers: &[&str], tune: impl FnOnce(&mut ListenerConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ListenerConfig::new(dir.path());
        config.workers = workers.iter().map(|w| w.to_string()).collect();
        config.tick_interval = Duration::from_secs(5);
        config.heartbeat_interval = Duration::from_secs(10);
        tune(&mut config);

        let clock = FakeClock::new();
        for worker in workers {
            let wp = config.paths().worker(worker);
            std::fs::create_dir_all(wp.tasks_dir()).unwrap();
            std::fs::create_dir_all(wp.results_dir()).unwrap();
            std::fs::create_dir_all(wp.dlq_dir()).unwrap();
        }
        let listener = OrchestratorListener::new(config, clock.clone()).unwrap();
        Self {
            dir,
            clock,
            listener,
        }
    }

    pub fn terminal_record(&self, worker: &str, task_id: &str, status: FinalStatus) -> TaskResult {
        let now = self.clock.now_utc();
        TaskResult {
            task: Task {
                task_id: task_id.to_string(),
                worker: worker.to_string(),
                description: "echo hi".to_string(),
                created_at: None,
                metadata: None,
                extra: serde_json::Map::new(),
            },
            attempts: vec![Attempt {
                attempt_number: 1,
                started_at: now,
                finished_at: now,
                exit_status: match status {
                    FinalStatus::Completed => AttemptStatus::Success,
                    FinalStatus::DeadLettered => AttemptStatus::Failed,
                },
                stdout_excerpt: String::new(),
                stderr_excerpt: String::new(),
                duration_seconds: 0.1,
            }],
            final_status: status,
            completed_at: now,
        }
    }

    pub fn write_result(&self, worker: &str, task_id: &str) {
        let record = self.terminal_record(worker, task_id, FinalStatus::Completed);
        let path = self.listener.paths.worker(worker).result_file(task_id);
        write_json_atomic(&path, &record).unwrap();
    }

    pub fn write_dlq(&self, worker: &str, task_id: &str) {
        let record = self.terminal_record(worker, task_id, FinalStatus::DeadLettered);
        let path = self.listener.paths.worker(worker).dlq_file(task_id);
        write_json_atomic(&path, &record).unwrap();
    }

    pub fn write_task_file(&self, worker: &str, task_id: &str) {
        let path = self.listener.paths.worker(worker).task_file(task_id);
        let body = serde_json::json!({
            "task_id": task_id,
            "worker": worker,
            "description": "echo hi",
        });
        std::fs::write(path, serde_json::to_vec(&body).unwrap()).unwrap();
    }

    pub fn write_heartbeat(&self, worker: &str, status: WorkerStatus) {
        let heartbeat = Heartbeat {
            worker: worker.to_string(),
            timestamp: self.clock.now_utc(),
            status,
            active_tasks: 0,
            queue_depth: 0,
            completed_total: 0,
            failed_total: 0,
            circuit_state: CircuitState::Closed,
        };
        let path = self.listener.paths.worker(worker).heartbeat_file();
        write_json_atomic(&path, &heartbeat).unwrap();
    }

    /// Filenames currently under `triggers/orchestrator/`.
    pub fn trigger_names(&self) -> Vec<String> {
        let dir = self.listener.paths.orchestrator_triggers_dir();
        let Ok(entries) = std::fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .flatten()
            .filter_map(|e| e.file_name().to_str().map(String::from))
            .collect();
        names.sort();
        names
    }
}
