// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runner seam between the executor and the agent subprocess.

use crate::subprocess::{self, Invocation, ProcessOutput, SpawnError};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors from running a task's subprocess.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Spawn(#[from] SpawnError),
}

/// Executes one attempt's subprocess.
///
/// The production implementation shells out to the agent CLI; tests
/// substitute a scripted fake so attempt sequencing is deterministic.
#[async_trait]
pub trait TaskRunner: Clone + Send + Sync + 'static {
    async fn run(
        &self,
        invocation: Invocation,
        timeout: Duration,
    ) -> Result<ProcessOutput, RunnerError>;
}

/// Real runner backed by [`subprocess::run_with_timeout`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl TaskRunner for SystemRunner {
    async fn run(
        &self,
        invocation: Invocation,
        timeout: Duration,
    ) -> Result<ProcessOutput, RunnerError> {
        Ok(subprocess::run_with_timeout(invocation, timeout).await?)
    }
}
