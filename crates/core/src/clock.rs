// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction so time-dependent logic is testable.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Source of monotonic and wall-clock time.
pub trait Clock: Clone + Send + Sync + 'static {
    /// Monotonic instant for interval arithmetic.
    fn now(&self) -> Instant;

    /// Wall-clock epoch milliseconds.
    fn epoch_ms(&self) -> u64;

    /// Wall-clock UTC timestamp (derived from [`Clock::epoch_ms`]).
    fn now_utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.epoch_ms() as i64).unwrap_or(DateTime::UNIX_EPOCH)
    }
}

/// Real system clock for production use.
#[derive(Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn epoch_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Manually advanced clock for tests.
///
/// Starts at a fixed epoch so assertions on serialized timestamps are
/// deterministic. `advance` moves both the monotonic and wall clocks.
#[derive(Clone)]
pub struct FakeClock {
    base_instant: Instant,
    base_epoch_ms: u64,
    offset: Arc<Mutex<Duration>>,
}

impl FakeClock {
    const BASE_EPOCH_MS: u64 = 1_700_000_000_000;

    pub fn new() -> Self {
        Self {
            base_instant: Instant::now(),
            base_epoch_ms: Self::BASE_EPOCH_MS,
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Advance the clock by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut offset = self.offset.lock();
        *offset += delta;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.base_instant + *self.offset.lock()
    }

    fn epoch_ms(&self) -> u64 {
        self.base_epoch_ms + self.offset.lock().as_millis() as u64
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
