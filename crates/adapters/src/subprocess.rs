// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess execution with bounded output capture.
//!
//! The agent CLI is spawned as the leader of a fresh process group so a
//! timeout can take down the whole tree, not just the direct child.
//! stdout/stderr are drained concurrently into tail buffers that retain
//! only the last [`STREAM_TAIL_LIMIT`] bytes of each stream.

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};

/// Bytes retained per captured stream (tail).
pub const STREAM_TAIL_LIMIT: usize = 64 * 1024;

/// Fully resolved subprocess invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Extra variables layered over the inherited environment.
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
}

/// How the subprocess ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Exited(i32),
    /// Terminated by a signal (no exit code).
    Signaled,
    /// Wall clock expired; the process group was killed.
    TimedOut,
}

/// Captured outcome of one subprocess run.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: ProcessStatus,
    pub stdout_tail: String,
    pub stderr_tail: String,
    pub duration: Duration,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status == ProcessStatus::Exited(0)
    }
}

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Run `invocation` to completion or `timeout`, whichever comes first.
///
/// On timeout the child's process group receives SIGKILL and the status
/// is [`ProcessStatus::TimedOut`]; output captured so far is kept.
pub async fn run_with_timeout(
    invocation: Invocation,
    timeout: Duration,
) -> Result<ProcessOutput, SpawnError> {
    let mut cmd = Command::new(&invocation.program);
    cmd.args(&invocation.args)
        .envs(invocation.env.iter().cloned())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true);
    if let Some(cwd) = &invocation.cwd {
        cmd.current_dir(cwd);
    }

    let started = Instant::now();
    let mut child = cmd.spawn().map_err(|source| SpawnError::Spawn {
        program: invocation.program.clone(),
        source,
    })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let stdout_task = tokio::spawn(read_tail(stdout));
    let stderr_task = tokio::spawn(read_tail(stderr));

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(exit)) => match exit.code() {
            Some(code) => ProcessStatus::Exited(code),
            None => ProcessStatus::Signaled,
        },
        Ok(Err(source)) => {
            return Err(SpawnError::Wait {
                program: invocation.program.clone(),
                source,
            });
        }
        Err(_elapsed) => {
            kill_process_group(&child);
            let _ = child.wait().await;
            ProcessStatus::TimedOut
        }
    };

    let stdout_tail = stdout_task.await.unwrap_or_default();
    let stderr_tail = stderr_task.await.unwrap_or_default();

    Ok(ProcessOutput {
        status,
        stdout_tail,
        stderr_tail,
        duration: started.elapsed(),
    })
}

/// SIGKILL the child's whole process group (pgid == child pid because
/// the child was spawned with `process_group(0)`).
fn kill_process_group(child: &Child) {
    if let Some(pid) = child.id() {
        if let Err(error) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            tracing::warn!(pid, %error, "failed to kill subprocess group");
        }
    }
}

/// Drain a stream, retaining the trailing [`STREAM_TAIL_LIMIT`] bytes.
async fn read_tail<R: tokio::io::AsyncRead + Unpin>(reader: Option<R>) -> String {
    let Some(mut reader) = reader else {
        return String::new();
    };
    let mut tail: VecDeque<u8> = VecDeque::with_capacity(8192);
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                tail.extend(&buf[..n]);
                if tail.len() > STREAM_TAIL_LIMIT {
                    tail.drain(..tail.len() - STREAM_TAIL_LIMIT);
                }
            }
        }
    }
    let bytes: Vec<u8> = tail.into_iter().collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
