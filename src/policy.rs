//! # Retry policy for the calendar oracle fetch.
//!
//! [`RetryPolicy`] bounds the attempt count and spaces the attempts with
//! a linear backoff: attempt `n` is followed by a wait of `n × step`.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use svcvisor::RetryPolicy;
//!
//! let policy = RetryPolicy::default();
//! assert_eq!(policy.attempts, 10);
//! assert_eq!(policy.delay(1), Duration::from_secs(1));
//! assert_eq!(policy.delay(4), Duration::from_secs(4));
//! ```

use std::time::Duration;

/// Linear retry backoff.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Maximum number of attempts before giving up.
    pub attempts: u32,
    /// Backoff unit; attempt `n` waits `n × step` afterwards.
    pub step: Duration,
}

impl Default for RetryPolicy {
    /// Returns the oracle policy: 10 attempts, 1 s step.
    fn default() -> Self {
        Self {
            attempts: 10,
            step: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Computes the wait that follows the given 1-based attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.step * attempt
    }
}
