// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic heartbeat publication.

use crate::context::WorkerContext;
use fabric_core::Clock;
use fabric_storage::{write_json_atomic, AtomicWriteError};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Write one heartbeat snapshot atomically.
pub fn publish(ctx: &WorkerContext, now: chrono::DateTime<chrono::Utc>) -> Result<(), AtomicWriteError> {
    let heartbeat = ctx.snapshot(now);
    write_json_atomic(&ctx.paths().heartbeat_file(), &heartbeat)
}

/// Publishes a heartbeat every `heartbeat_interval` until cancelled.
///
/// Write failures are logged and counted but never stop the loop; a
/// worker that cannot heartbeat should still drain its tasks.
pub struct HeartbeatPublisher<C: Clock> {
    ctx: Arc<WorkerContext>,
    clock: C,
}

impl<C: Clock> HeartbeatPublisher<C> {
    pub fn new(ctx: Arc<WorkerContext>, clock: C) -> Self {
        Self { ctx, clock }
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.ctx.config().heartbeat_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(error) = publish(&self.ctx, self.clock.now_utc()) {
                        warn!(%error, "heartbeat write failed");
                        self.ctx.metrics().heartbeat_failure();
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
    }
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;
