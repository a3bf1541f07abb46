// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded FIFO between the file watcher and the dispatcher.
//!
//! Enqueue never blocks: when the queue is full the path is dropped and
//! the caller records a warning metric. Dropped work is not lost; the
//! file stays in `tasks/<worker>/` and the periodic rescan re-offers it.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Producer half.
#[derive(Clone)]
pub struct TaskQueue {
    tx: mpsc::Sender<PathBuf>,
    depth: Arc<AtomicU64>,
}

/// Consumer half (single dispatcher).
pub struct TaskQueueRx {
    rx: mpsc::Receiver<PathBuf>,
    depth: Arc<AtomicU64>,
}

impl TaskQueue {
    /// Create a queue holding at most `capacity` paths.
    pub fn bounded(capacity: usize) -> (TaskQueue, TaskQueueRx) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let depth = Arc::new(AtomicU64::new(0));
        (
            TaskQueue {
                tx,
                depth: Arc::clone(&depth),
            },
            TaskQueueRx { rx, depth },
        )
    }

    /// Non-blocking enqueue. Returns false when the queue is full (or the
    /// consumer is gone) and the path was dropped.
    pub fn try_push(&self, path: PathBuf) -> bool {
        match self.tx.try_send(path) {
            Ok(()) => {
                self.depth.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => false,
        }
    }

    /// Current number of queued paths.
    pub fn depth(&self) -> u64 {
        self.depth.load(Ordering::Relaxed)
    }

    /// Shared handle for liveness reporting.
    pub fn depth_handle(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.depth)
    }
}

impl TaskQueueRx {
    /// Await the next path; `None` once all producers are dropped and the
    /// queue is drained.
    pub async fn pop(&mut self) -> Option<PathBuf> {
        let path = self.rx.recv().await?;
        self.depth.fetch_sub(1, Ordering::Relaxed);
        Some(path)
    }

    pub fn depth(&self) -> u64 {
        self.depth.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
