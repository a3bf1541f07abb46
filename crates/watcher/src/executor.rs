// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task execution: lock, decode, dispatch through the breaker, retry,
//! and write the terminal record.
//!
//! Errors inside an attempt never unwind the dispatcher; they become an
//! `exit_status` on the attempt record. Only I/O failures writing the
//! terminal record surface as [`ExecutorError`], in which case the task
//! file stays in place and the rescan retries the whole task.

use crate::context::WorkerContext;
use fabric_adapters::{
    FileLock, Invocation, LockError, ProcessOutput, ProcessStatus, RunnerError, TaskRunner,
};
use fabric_core::{
    Attempt, AttemptStatus, Clock, Permit, RetryDecision, Task, TaskResult, WatcherConfig,
};
use fabric_storage::{write_json_atomic, AtomicWriteError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Why a task was left in place for a later sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferReason {
    /// Another executor holds the advisory lock.
    LockConflict,
    /// The circuit breaker refused a permit.
    CircuitOpen,
}

/// Terminal outcome of one `execute` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    Completed { attempts: usize },
    DeadLettered { attempts: usize },
    Deferred(DeferReason),
    /// The file vanished before we owned it; another process finished it.
    AlreadyClaimed,
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("failed to read task file {path}: {source}")]
    ReadTask {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Write(#[from] AtomicWriteError),

    #[error("failed to write trigger {path}: {source}")]
    Trigger {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove task file {path}: {source}")]
    RemoveTask {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Internal classification of a finished subprocess attempt.
enum AttemptOutcome {
    Success,
    Failure(AttemptStatus),
}

pub struct TaskExecutor<R, C> {
    ctx: Arc<WorkerContext>,
    runner: R,
    clock: C,
}

impl<R: TaskRunner, C: Clock> TaskExecutor<R, C> {
    pub fn new(ctx: Arc<WorkerContext>, runner: R, clock: C) -> Self {
        Self { ctx, runner, clock }
    }

    /// Drive one task to a terminal record or a deferral.
    ///
    /// The advisory lock is held for the whole retry loop, so attempts
    /// for a single task are strictly sequential across the fleet.
    pub async fn execute(&self, task_path: &Path) -> Result<ExecOutcome, ExecutorError> {
        let config = self.ctx.config();
        let stem = task_stem(task_path);

        let _lock = match FileLock::acquire(task_path, config.lock_wait).await {
            Ok(lock) => lock,
            Err(LockError::Gone(_)) => return Ok(ExecOutcome::AlreadyClaimed),
            Err(LockError::Timeout { .. }) => {
                // Another executor owns it; it will finish the task.
                tracing::debug!(task = %stem, "advisory lock held elsewhere, deferring");
                return Ok(ExecOutcome::Deferred(DeferReason::LockConflict));
            }
            Err(err) => return Err(ExecutorError::Lock(err)),
        };

        // We may have won the lock only because the prior owner finished
        // and removed the file.
        let bytes = match tokio::fs::read(task_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ExecOutcome::AlreadyClaimed);
            }
            Err(source) => {
                return Err(ExecutorError::ReadTask {
                    path: task_path.to_path_buf(),
                    source,
                });
            }
        };

        let task = match Task::decode(&bytes, &stem) {
            Ok(task) => task,
            Err(error) => {
                tracing::warn!(task = %stem, %error, "invalid task payload, dead-lettering");
                return self.dead_letter_invalid(task_path, &stem, &error.to_string()).await;
            }
        };

        self.run_attempts(task_path, task).await
    }

    async fn run_attempts(
        &self,
        task_path: &Path,
        task: Task,
    ) -> Result<ExecOutcome, ExecutorError> {
        let config = self.ctx.config();
        let policy = config.retry_policy();
        let mut attempts = self.ctx.take_deferred_attempts(&task.task_id);

        loop {
            let attempt_number = next_attempt_number(&attempts);

            if let Permit::Denied { retry_in } = self.ctx.breaker_allow(self.clock.now()) {
                let now = self.clock.now_utc();
                attempts.push(deferral_attempt(
                    attempt_number,
                    AttemptStatus::CircuitOpen,
                    now,
                ));
                self.ctx.metrics().task_processed("circuit_open");
                self.ctx.stash_deferred_attempts(&task.task_id, attempts);
                tracing::debug!(
                    task = %task.task_id,
                    retry_in = ?retry_in,
                    "circuit open, deferring task"
                );
                return Ok(ExecOutcome::Deferred(DeferReason::CircuitOpen));
            }

            let started_at = self.clock.now_utc();
            let run = self
                .runner
                .run(build_invocation(config, &task), config.task_timeout)
                .await;
            let finished_at = self.clock.now_utc();

            let (attempt, outcome) = classify(attempt_number, started_at, finished_at, run);
            self.ctx.metrics().observe_duration(attempt.duration_seconds);
            self.ctx
                .metrics()
                .task_processed(&attempt.exit_status.to_string());
            attempts.push(attempt);

            match outcome {
                AttemptOutcome::Success => {
                    self.ctx.breaker_record_success();
                    return self.write_completed(task_path, task, attempts).await;
                }
                AttemptOutcome::Failure(kind) => {
                    self.ctx.breaker_record_failure(self.clock.now());
                    self.ctx.record_failed();

                    match policy.decide(attempt_number, kind) {
                        RetryDecision::Retry { delay } => {
                            tracing::info!(
                                task = %task.task_id,
                                attempt = attempt_number,
                                delay_ms = delay.as_millis() as u64,
                                "attempt failed, retrying"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        RetryDecision::GiveUp | RetryDecision::Defer => {
                            tracing::warn!(
                                task = %task.task_id,
                                attempts = attempts.len(),
                                "retry budget exhausted, dead-lettering"
                            );
                            return self.write_dead_lettered(task_path, task, attempts).await;
                        }
                    }
                }
            }
        }
    }

    async fn write_completed(
        &self,
        task_path: &Path,
        task: Task,
        attempts: Vec<Attempt>,
    ) -> Result<ExecOutcome, ExecutorError> {
        let paths = self.ctx.paths();
        let task_id = task.task_id.clone();
        let count = attempts.len();
        let result = TaskResult::completed(task, attempts, self.clock.now_utc());

        write_json_atomic(&paths.result_file(&task_id), &result)?;

        let trigger = paths.done_trigger(&task_id);
        std::fs::write(&trigger, b"").map_err(|source| ExecutorError::Trigger {
            path: trigger.clone(),
            source,
        })?;

        remove_task_file(task_path)?;
        self.ctx.record_completed();
        tracing::info!(task = %task_id, attempts = count, "task completed");
        Ok(ExecOutcome::Completed { attempts: count })
    }

    async fn write_dead_lettered(
        &self,
        task_path: &Path,
        task: Task,
        attempts: Vec<Attempt>,
    ) -> Result<ExecOutcome, ExecutorError> {
        let paths = self.ctx.paths();
        let task_id = task.task_id.clone();
        let count = attempts.len();
        let result = TaskResult::dead_lettered(task, attempts, self.clock.now_utc());

        write_json_atomic(&paths.dlq_file(&task_id), &result)?;
        remove_task_file(task_path)?;
        self.ctx.sync_dlq_gauge();
        tracing::warn!(task = %task_id, attempts = count, "task dead-lettered");
        Ok(ExecOutcome::DeadLettered { attempts: count })
    }

    async fn dead_letter_invalid(
        &self,
        task_path: &Path,
        stem: &str,
        error: &str,
    ) -> Result<ExecOutcome, ExecutorError> {
        let now = self.clock.now_utc();
        let task = Task::placeholder(stem, &self.ctx.config().worker_name);
        let attempt = Attempt {
            attempt_number: 1,
            started_at: now,
            finished_at: now,
            exit_status: AttemptStatus::InvalidPayload,
            stdout_excerpt: String::new(),
            stderr_excerpt: error.to_string(),
            duration_seconds: 0.0,
        };
        self.ctx.metrics().task_processed("invalid_payload");
        self.ctx.record_failed();
        self.write_dead_lettered(task_path, task, vec![attempt]).await
    }
}

/// Filename stem, which the schema requires to equal `task_id`.
fn task_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

/// Attempt numbering counts real executions; deferrals do not advance it.
fn next_attempt_number(attempts: &[Attempt]) -> u32 {
    attempts
        .iter()
        .filter(|a| a.exit_status.counts_toward_retries())
        .count() as u32
        + 1
}

fn deferral_attempt(
    attempt_number: u32,
    status: AttemptStatus,
    at: chrono::DateTime<chrono::Utc>,
) -> Attempt {
    Attempt {
        attempt_number,
        started_at: at,
        finished_at: at,
        exit_status: status,
        stdout_excerpt: String::new(),
        stderr_excerpt: String::new(),
        duration_seconds: 0.0,
    }
}

/// Agent invocation contract: the configured command line, then the task
/// description after `-p`. Task identity rides on the environment.
fn build_invocation(config: &WatcherConfig, task: &Task) -> Invocation {
    let mut parts = config.agent_command.split_whitespace().map(String::from);
    let program = parts.next().unwrap_or_else(|| "claude".to_string());
    let mut args: Vec<String> = parts.collect();
    args.push("-p".to_string());
    args.push(task.description.clone());

    Invocation {
        program,
        args,
        env: vec![
            ("TASK_ID".to_string(), task.task_id.clone()),
            ("TASK_WORKER".to_string(), task.worker.clone()),
        ],
        cwd: None,
    }
}

fn classify(
    attempt_number: u32,
    started_at: chrono::DateTime<chrono::Utc>,
    finished_at: chrono::DateTime<chrono::Utc>,
    run: Result<ProcessOutput, RunnerError>,
) -> (Attempt, AttemptOutcome) {
    match run {
        Ok(output) => {
            let (status, outcome) = match output.status {
                ProcessStatus::Exited(0) => (AttemptStatus::Success, AttemptOutcome::Success),
                ProcessStatus::Exited(_) | ProcessStatus::Signaled => (
                    AttemptStatus::Failed,
                    AttemptOutcome::Failure(AttemptStatus::Failed),
                ),
                ProcessStatus::TimedOut => (
                    AttemptStatus::Timeout,
                    AttemptOutcome::Failure(AttemptStatus::Timeout),
                ),
            };
            (
                Attempt {
                    attempt_number,
                    started_at,
                    finished_at,
                    exit_status: status,
                    stdout_excerpt: output.stdout_tail,
                    stderr_excerpt: output.stderr_tail,
                    duration_seconds: output.duration.as_secs_f64(),
                },
                outcome,
            )
        }
        Err(error) => (
            Attempt {
                attempt_number,
                started_at,
                finished_at,
                exit_status: AttemptStatus::Failed,
                stdout_excerpt: String::new(),
                stderr_excerpt: error.to_string(),
                duration_seconds: 0.0,
            },
            AttemptOutcome::Failure(AttemptStatus::Failed),
        ),
    }
}

fn remove_task_file(task_path: &Path) -> Result<(), ExecutorError> {
    match std::fs::remove_file(task_path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ExecutorError::RemoveTask {
            path: task_path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
