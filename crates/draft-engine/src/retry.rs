//! Retry policy for failed remote saves.
//!
//! Linear backoff: attempt `n` (counting failures so far) waits
//! `base_delay * n`. The policy is plain data, decoupled from the save path;
//! the manager schedules the delays on one-shot tasks it can cancel.

use std::time::Duration;

/// Bounded linear-backoff retry policy.
///
/// A save gets `max_retries` additional attempts after the first failure,
/// `max_retries + 1` attempts in total.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Whether to schedule another attempt after `failures` failures.
    pub fn should_retry(&self, failures: u32) -> bool {
        failures <= self.max_retries
    }

    /// Delay before retry number `attempt` (1-based). Strictly increasing.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}
