use std::time::Duration;

use uplink_core::retry::RetryPolicy;

/// Worker pool configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum number of jobs executing at once (default: `4`).
    pub concurrency: usize,
    /// Per-attempt step timeout in seconds (default: `300`).
    pub step_timeout_secs: u64,
    /// Attempts per step, including the first (default: `3`).
    pub step_max_attempts: u32,
    /// Backoff before the first retry, in milliseconds (default: `500`).
    pub step_backoff_ms: u64,
    /// Delay of each dry-run step in milliseconds (default: `750`).
    pub dry_run_step_delay_ms: u64,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default |
    /// |--------------------------|---------|
    /// | `WORKER_CONCURRENCY`     | `4`     |
    /// | `STEP_TIMEOUT_SECS`      | `300`   |
    /// | `STEP_MAX_ATTEMPTS`      | `3`     |
    /// | `STEP_BACKOFF_MS`        | `500`   |
    /// | `DRY_RUN_STEP_DELAY_MS`  | `750`   |
    ///
    /// # Panics
    ///
    /// Panics if a variable is set but does not parse.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let concurrency: usize = std::env::var("WORKER_CONCURRENCY")
            .unwrap_or_else(|_| defaults.concurrency.to_string())
            .parse()
            .expect("WORKER_CONCURRENCY must be a valid usize");

        let step_timeout_secs: u64 = std::env::var("STEP_TIMEOUT_SECS")
            .unwrap_or_else(|_| defaults.step_timeout_secs.to_string())
            .parse()
            .expect("STEP_TIMEOUT_SECS must be a valid u64");

        let step_max_attempts: u32 = std::env::var("STEP_MAX_ATTEMPTS")
            .unwrap_or_else(|_| defaults.step_max_attempts.to_string())
            .parse()
            .expect("STEP_MAX_ATTEMPTS must be a valid u32");

        let step_backoff_ms: u64 = std::env::var("STEP_BACKOFF_MS")
            .unwrap_or_else(|_| defaults.step_backoff_ms.to_string())
            .parse()
            .expect("STEP_BACKOFF_MS must be a valid u64");

        let dry_run_step_delay_ms: u64 = std::env::var("DRY_RUN_STEP_DELAY_MS")
            .unwrap_or_else(|_| defaults.dry_run_step_delay_ms.to_string())
            .parse()
            .expect("DRY_RUN_STEP_DELAY_MS must be a valid u64");

        Self {
            concurrency: concurrency.max(1),
            step_timeout_secs,
            step_max_attempts: step_max_attempts.max(1),
            step_backoff_ms,
            dry_run_step_delay_ms,
        }
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    pub fn dry_run_step_delay(&self) -> Duration {
        Duration::from_millis(self.dry_run_step_delay_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.step_max_attempts,
            initial_backoff: Duration::from_millis(self.step_backoff_ms),
            ..RetryPolicy::default()
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            step_timeout_secs: 300,
            step_max_attempts: 3,
            step_backoff_ms: 500,
            dry_run_step_delay_ms: 750,
        }
    }
}
