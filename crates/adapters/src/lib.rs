// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fabric-adapters: OS seams for the Task Fabric
//!
//! Everything that touches the kernel lives here: filesystem-change
//! notification, advisory file locks, and subprocess execution with
//! process-group cleanup. The [`TaskRunner`] trait is the executor's
//! seam for swapping the real agent CLI with a scripted fake in tests.

pub mod fs_watch;
pub mod lock;
pub mod runner;
pub mod subprocess;

pub use fs_watch::{scan_json_dir, watch_json_dir, DirWatcher, WatchError};
pub use lock::{FileLock, LockError};
pub use runner::{RunnerError, SystemRunner, TaskRunner};
pub use subprocess::{Invocation, ProcessOutput, ProcessStatus, SpawnError, STREAM_TAIL_LIMIT};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeRunner;
