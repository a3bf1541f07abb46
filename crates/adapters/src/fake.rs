// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted [`TaskRunner`] for tests.

use crate::runner::{RunnerError, TaskRunner};
use crate::subprocess::{Invocation, ProcessOutput, ProcessStatus};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Returns queued outcomes in order and records every invocation.
///
/// Once the script is exhausted, further runs succeed with empty output
/// so tests only script the interesting prefix.
#[derive(Clone, Default)]
pub struct FakeRunner {
    script: Arc<Mutex<VecDeque<ProcessOutput>>>,
    calls: Arc<Mutex<Vec<Invocation>>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful run with the given stdout.
    pub fn succeed(&self, stdout: &str) -> &Self {
        self.push(ProcessStatus::Exited(0), stdout, "");
        self
    }

    /// Queue a failed run (exit 1) with the given stderr.
    pub fn fail(&self, stderr: &str) -> &Self {
        self.push(ProcessStatus::Exited(1), "", stderr);
        self
    }

    /// Queue a run ending in a wall-clock timeout.
    pub fn time_out(&self) -> &Self {
        self.push(ProcessStatus::TimedOut, "", "");
        self
    }

    /// Queue a run killed by a signal.
    pub fn signaled(&self) -> &Self {
        self.push(ProcessStatus::Signaled, "", "");
        self
    }

    fn push(&self, status: ProcessStatus, stdout: &str, stderr: &str) {
        self.script.lock().push_back(ProcessOutput {
            status,
            stdout_tail: stdout.to_string(),
            stderr_tail: stderr.to_string(),
            duration: Duration::from_millis(10),
        });
    }

    /// Every invocation seen so far, in order.
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl TaskRunner for FakeRunner {
    async fn run(
        &self,
        invocation: Invocation,
        _timeout: Duration,
    ) -> Result<ProcessOutput, RunnerError> {
        self.calls.lock().push(invocation);
        let scripted = self.script.lock().pop_front();
        Ok(scripted.unwrap_or(ProcessOutput {
            status: ProcessStatus::Exited(0),
            stdout_tail: String::new(),
            stderr_tail: String::new(),
            duration: Duration::from_millis(10),
        }))
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
