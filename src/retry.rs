//! Retry policy for transient step failures.
//!
//! The policy shape is fixed: a bounded number of additional attempts with a
//! constant pause between them. Only failures flagged `retryable` qualify.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::StepFailure;

/// How often, and how patiently, a failing step is retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Additional attempts after the first one.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Pause between attempts, in milliseconds.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

fn default_max_retries() -> u32 {
    2
}

fn default_delay_ms() -> u64 {
    250
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            delay_ms: default_delay_ms(),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given bound and delay.
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            delay_ms: delay.as_millis() as u64,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Pause between attempts.
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Maximum number of invocations of one step.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Whether another attempt is allowed after `attempts` invocations ended in `failure`.
    pub fn should_retry(&self, attempts: u32, failure: &StepFailure) -> bool {
        failure.retryable && attempts < self.max_attempts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay(), Duration::from_millis(250));
    }

    #[test]
    fn test_retries_stop_at_bound() {
        let policy = RetryPolicy::new(2, Duration::from_millis(1));
        let failure = StepFailure::transient("timeout");
        assert!(policy.should_retry(1, &failure));
        assert!(policy.should_retry(2, &failure));
        assert!(!policy.should_retry(3, &failure));
    }

    #[test]
    fn test_non_retryable_failure_is_never_retried() {
        let policy = RetryPolicy::default();
        assert!(!policy.should_retry(1, &StepFailure::client_input("404")));
        assert!(!RetryPolicy::none().should_retry(1, &StepFailure::transient("503")));
    }
}
