use std::time::Duration;

use crate::config::RetryConfig;

/// Bounded retry policy for the single provider call site.
///
/// Only rate-limit failures are retryable; every other provider error is
/// surfaced immediately. With `max_attempts = 2` this is exactly
/// "one automatic retry after a fixed delay".
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            // A policy that never attempts at all is nonsense.
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_secs(config.backoff_seconds),
        )
    }

    /// Whether another attempt is allowed after attempt number `attempt`
    /// (1-based) failed.
    pub fn should_retry(&self, attempt: u32, rate_limited: bool) -> bool {
        rate_limited && attempt < self.max_attempts
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}
