// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Circuit breaker gating dispatch against an unreliable downstream.
//!
//! Pure state machine: callers supply the current [`Instant`] so the
//! transitions are deterministic under test. The watcher wraps one of
//! these in a mutex and shares it across executor tasks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Breaker state, also published in heartbeats and as a metrics gauge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Gauge encoding: closed = 0, open = 1, half_open = 2.
    pub fn as_gauge(self) -> i64 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Outcome of asking the breaker for a dispatch permit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permit {
    /// Dispatch permitted. `probe` is set for the single half-open trial.
    Granted { probe: bool },
    /// Dispatch refused; the breaker re-opens for probing after `retry_in`.
    Denied { retry_in: Duration },
}

impl Permit {
    pub fn is_granted(self) -> bool {
        matches!(self, Permit::Granted { .. })
    }
}

/// Three-state breaker with a single-probe half-open phase.
///
/// Denials are not failures: they must not be fed back via
/// [`CircuitBreaker::record_failure`].
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    open_duration: Duration,
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, open_duration: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            open_duration,
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            probe_in_flight: false,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Ask for a dispatch permit.
    ///
    /// Open circuits lapse into half-open once the cooldown has elapsed;
    /// half-open grants exactly one probe until that probe is settled by
    /// `record_success` or `record_failure`.
    pub fn allow(&mut self, now: Instant) -> Permit {
        match self.state {
            CircuitState::Closed => Permit::Granted { probe: false },
            CircuitState::Open => {
                let elapsed = self
                    .opened_at
                    .map(|at| now.saturating_duration_since(at))
                    .unwrap_or(self.open_duration);
                if elapsed >= self.open_duration {
                    self.state = CircuitState::HalfOpen;
                    self.probe_in_flight = true;
                    Permit::Granted { probe: true }
                } else {
                    Permit::Denied {
                        retry_in: self.open_duration - elapsed,
                    }
                }
            }
            CircuitState::HalfOpen => {
                if self.probe_in_flight {
                    Permit::Denied {
                        retry_in: Duration::ZERO,
                    }
                } else {
                    self.probe_in_flight = true;
                    Permit::Granted { probe: true }
                }
            }
        }
    }

    /// Settle a granted permit with a successful outcome.
    pub fn record_success(&mut self) {
        if self.state == CircuitState::HalfOpen {
            self.state = CircuitState::Closed;
            self.opened_at = None;
        }
        self.probe_in_flight = false;
        self.consecutive_failures = 0;
    }

    /// Settle a granted permit with a failed outcome.
    pub fn record_failure(&mut self, now: Instant) {
        match self.state {
            CircuitState::HalfOpen => {
                // Failed probe: back to open with a fresh cooldown.
                self.state = CircuitState::Open;
                self.opened_at = Some(now);
                self.probe_in_flight = false;
            }
            CircuitState::Closed => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.failure_threshold {
                    self.state = CircuitState::Open;
                    self.opened_at = Some(now);
                }
            }
            CircuitState::Open => {
                // Late result from a dispatch granted before the trip.
                self.consecutive_failures += 1;
            }
        }
    }
}

#[cfg(test)]
#[path = "breaker_tests.rs"]
mod tests;
