// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Advisory file locking for single-executor semantics.
//!
//! Workers observing the same task file race on an exclusive flock; the
//! loser backs off with `LockError::Timeout` and produces no side
//! effects. The lock is released when the guard drops, and removing the
//! locked path while holding the guard is fine (the handle stays valid).

use fs2::FileExt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// How often a blocked acquirer re-tries the non-blocking lock.
const LOCK_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum LockError {
    /// File disappeared before we could lock it: another executor
    /// already finished the task.
    #[error("file vanished before locking: {0}")]
    Gone(PathBuf),

    #[error("lock on {path} not acquired within {waited:?}")]
    Timeout { path: PathBuf, waited: Duration },

    #[error("lock io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// RAII guard over an exclusive advisory lock.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Acquire an exclusive lock on `path`, polling up to `wait`.
    pub async fn acquire(path: &Path, wait: Duration) -> Result<Self, LockError> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let file = match File::open(path) {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(LockError::Gone(path.to_path_buf()));
                }
                Err(source) => {
                    return Err(LockError::Io {
                        path: path.to_path_buf(),
                        source,
                    });
                }
            };

            match file.try_lock_exclusive() {
                Ok(()) => {
                    return Ok(Self {
                        file,
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if is_contended(&e) => {}
                Err(source) => {
                    return Err(LockError::Io {
                        path: path.to_path_buf(),
                        source,
                    });
                }
            }

            if tokio::time::Instant::now() + LOCK_POLL > deadline {
                return Err(LockError::Timeout {
                    path: path.to_path_buf(),
                    waited: wait,
                });
            }
            tokio::time::sleep(LOCK_POLL).await;
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn is_contended(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
