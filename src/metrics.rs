//! Budget and usage metrics.
//!
//! Two lifetimes meet here:
//!
//! - [`BudgetSnapshot`] is a point-in-time view of one request's spending,
//!   judged against a [`BudgetCeiling`] before every step.
//! - [`AggregateMetrics`] lives for the whole process and absorbs the terminal
//!   totals of every request. It is shared by concurrent requests, so every
//!   counter is an atomic.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Running totals for one request.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetSnapshot {
    /// Outbound calls made, retries counted separately.
    pub api_calls: u32,
    /// Estimated cost units spent.
    pub cost_units: f64,
    /// Prompt tokens reported by the synthesis provider.
    pub prompt_token_count: u64,
    /// Completion tokens reported by the synthesis provider.
    pub completion_token_count: u64,
    /// Wall-clock time since the request started.
    pub elapsed: Duration,
}

impl BudgetSnapshot {
    /// Total tokens (prompt + completion).
    pub fn total_tokens(&self) -> u64 {
        self.prompt_token_count + self.completion_token_count
    }
}

/// Per-request resource ceiling.
///
/// A limit counts as exceeded once it has been reached: a request at its
/// call limit may not start another step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetCeiling {
    /// Maximum outbound calls.
    #[serde(default = "default_max_api_calls")]
    pub max_api_calls: u32,
    /// Maximum estimated cost units.
    #[serde(default = "default_max_cost_units")]
    pub max_cost_units: f64,
    /// Maximum elapsed time, in milliseconds.
    #[serde(default = "default_max_elapsed_ms")]
    pub max_elapsed_ms: u64,
}

fn default_max_api_calls() -> u32 {
    20
}

fn default_max_cost_units() -> f64 {
    0.5
}

fn default_max_elapsed_ms() -> u64 {
    30_000
}

impl Default for BudgetCeiling {
    fn default() -> Self {
        Self {
            max_api_calls: default_max_api_calls(),
            max_cost_units: default_max_cost_units(),
            max_elapsed_ms: default_max_elapsed_ms(),
        }
    }
}

impl BudgetCeiling {
    /// A ceiling that nothing reaches in practice.
    pub fn unlimited() -> Self {
        Self {
            max_api_calls: u32::MAX,
            max_cost_units: f64::INFINITY,
            max_elapsed_ms: u64::MAX,
        }
    }

    /// Maximum elapsed time.
    pub fn max_elapsed(&self) -> Duration {
        Duration::from_millis(self.max_elapsed_ms)
    }

    /// Describe the first limit `snapshot` has reached, if any.
    pub fn exceeded_by(&self, snapshot: &BudgetSnapshot) -> Option<String> {
        if snapshot.api_calls >= self.max_api_calls {
            Some(format!(
                "api call limit reached ({} of {})",
                snapshot.api_calls, self.max_api_calls
            ))
        } else if snapshot.cost_units >= self.max_cost_units {
            Some(format!(
                "cost limit reached ({:.4} of {:.4})",
                snapshot.cost_units, self.max_cost_units
            ))
        } else if snapshot.elapsed >= self.max_elapsed() {
            Some(format!(
                "time limit reached ({} ms of {} ms)",
                snapshot.elapsed.as_millis(),
                self.max_elapsed_ms
            ))
        } else {
            None
        }
    }
}

/// Process-wide request statistics.
///
/// Initialized once, shared by reference (usually behind an `Arc`) with every
/// request, and never reset.
#[derive(Debug, Default)]
pub struct AggregateMetrics {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    total_errors: AtomicU64,
    total_api_calls: AtomicU64,
    total_latency_us: AtomicU64,
}

impl AggregateMetrics {
    /// Create zeroed aggregates.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one finished request into the totals.
    pub fn fold(&self, success: bool, errors: u32, budget: &BudgetSnapshot) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        }
        self.total_errors.fetch_add(u64::from(errors), Ordering::Relaxed);
        self.total_api_calls
            .fetch_add(u64::from(budget.api_calls), Ordering::Relaxed);
        let latency_us = u64::try_from(budget.elapsed.as_micros()).unwrap_or(u64::MAX);
        self.total_latency_us.fetch_add(latency_us, Ordering::Relaxed);
    }

    /// Get current aggregate values.
    #[must_use]
    pub fn snapshot(&self) -> AggregateSnapshot {
        AggregateSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            total_errors: self.total_errors.load(Ordering::Relaxed),
            total_api_calls: self.total_api_calls.load(Ordering::Relaxed),
            total_latency_us: self.total_latency_us.load(Ordering::Relaxed),
        }
    }
}

/// Aggregate values at a point in time.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    /// Requests finalized.
    pub total_requests: u64,
    /// Requests answered without the generic fallback.
    pub successful_requests: u64,
    /// Sum of `errors_encountered` over all requests.
    pub total_errors: u64,
    /// Outbound calls over all requests.
    pub total_api_calls: u64,
    /// Sum of request latencies in microseconds.
    pub total_latency_us: u64,
}

impl AggregateSnapshot {
    /// Fraction of requests that succeeded, 0.0 before the first request.
    pub fn success_rate(&self) -> f64 {
        if self.total_requests > 0 {
            self.successful_requests as f64 / self.total_requests as f64
        } else {
            0.0
        }
    }

    /// Mean request latency.
    pub fn average_latency(&self) -> Duration {
        if self.total_requests > 0 {
            Duration::from_micros(self.total_latency_us / self.total_requests)
        } else {
            Duration::ZERO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_ceiling_reports_first_reached_limit() {
        let ceiling = BudgetCeiling {
            max_api_calls: 3,
            max_cost_units: 0.01,
            max_elapsed_ms: 1_000,
        };
        let mut snapshot = BudgetSnapshot::default();
        assert_eq!(ceiling.exceeded_by(&snapshot), None);

        snapshot.cost_units = 0.02;
        assert!(ceiling.exceeded_by(&snapshot).unwrap().starts_with("cost limit"));

        snapshot.api_calls = 3;
        assert!(ceiling.exceeded_by(&snapshot).unwrap().starts_with("api call limit"));
    }

    #[test]
    fn test_unlimited_ceiling() {
        let snapshot = BudgetSnapshot {
            api_calls: 10_000,
            cost_units: 1e9,
            elapsed: Duration::from_secs(3600),
            ..Default::default()
        };
        assert_eq!(BudgetCeiling::unlimited().exceeded_by(&snapshot), None);
    }

    #[test]
    fn test_aggregate_rates() {
        let metrics = AggregateMetrics::new();
        assert_eq!(metrics.snapshot().success_rate(), 0.0);

        let budget = |ms| BudgetSnapshot {
            api_calls: 4,
            elapsed: Duration::from_millis(ms),
            ..Default::default()
        };
        metrics.fold(true, 0, &budget(100));
        metrics.fold(true, 1, &budget(300));
        metrics.fold(false, 2, &budget(200));

        let snap = metrics.snapshot();
        assert_eq!(snap.total_requests, 3);
        assert_eq!(snap.successful_requests, 2);
        assert_eq!(snap.total_errors, 3);
        assert_eq!(snap.total_api_calls, 12);
        assert!((snap.success_rate() - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(snap.average_latency(), Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_concurrent_folds_are_not_lost() {
        let metrics = Arc::new(AggregateMetrics::new());
        let handles: Vec<_> = (0..64)
            .map(|i| {
                let metrics = Arc::clone(&metrics);
                tokio::spawn(async move {
                    for _ in 0..100 {
                        metrics.fold(i % 2 == 0, 1, &BudgetSnapshot::default());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let snap = metrics.snapshot();
        assert_eq!(snap.total_requests, 6_400);
        assert_eq!(snap.successful_requests, 3_200);
        assert_eq!(snap.total_errors, 6_400);
    }
}
