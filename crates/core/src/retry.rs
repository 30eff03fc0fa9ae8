//! Bounded per-step retry policy with exponential backoff.
//!
//! Only a single step is ever retried; a job as a whole is never restarted.

use std::time::Duration;

use crate::error::StepExecutionError;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per step, including the first one. At least 1.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Cap for the exponential growth.
    pub max_backoff: Duration,
    /// Multiplier applied per further attempt.
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    /// One attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Whether `attempt` (1-based) may be followed by another one.
    pub fn should_retry(&self, error: &StepExecutionError, attempt: u32) -> bool {
        error.is_retryable() && attempt < self.max_attempts.max(1)
    }

    /// Delay to wait after failed `attempt` (1-based) before retrying.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::from_secs_f64(secs.min(self.max_backoff.as_secs_f64()).max(0.0))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}
