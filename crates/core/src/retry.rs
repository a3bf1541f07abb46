// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry policy: pure decision over attempt count and error kind.

use crate::task::AttemptStatus;
use std::time::Duration;

/// Exponential backoff parameters for retriable failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts beyond this go to the dead-letter queue.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
}

/// What to do after a non-success attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    GiveUp,
    /// Neither retry nor give up: leave the task file in place to be
    /// re-observed (lock conflicts, open circuit).
    Defer,
}

impl RetryPolicy {
    /// Backoff before the retry that follows `attempt_number`:
    /// `min(initial × multiplier^(n-1), max_delay)`.
    pub fn backoff_delay(&self, attempt_number: u32) -> Duration {
        let exp = self
            .backoff_multiplier
            .powi(attempt_number.saturating_sub(1).min(i32::MAX as u32) as i32);
        let secs = self.initial_delay.as_secs_f64() * exp;
        let capped = secs.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped >= 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            self.max_delay
        }
    }

    /// Decide the fate of a task after attempt `attempt_number` ended with
    /// `outcome`. Success is terminal and never consults the policy.
    pub fn decide(&self, attempt_number: u32, outcome: AttemptStatus) -> RetryDecision {
        match outcome {
            AttemptStatus::Failed | AttemptStatus::Timeout => {
                if attempt_number <= self.max_retries {
                    RetryDecision::Retry {
                        delay: self.backoff_delay(attempt_number),
                    }
                } else {
                    RetryDecision::GiveUp
                }
            }
            AttemptStatus::InvalidPayload => RetryDecision::GiveUp,
            AttemptStatus::LockConflict | AttemptStatus::CircuitOpen => RetryDecision::Defer,
            AttemptStatus::Success => RetryDecision::GiveUp,
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
