//! Per-request execution context.
//!
//! The [`ExecutionContext`] is handed to every step of one request. It is the
//! request's budget tracker: steps report each outbound call (and token usage)
//! to it, the supervisor consults [`ExecutionContext::snapshot`] before every
//! step, and [`ExecutionContext::finalize`] folds the terminal totals into the
//! process-wide [`AggregateMetrics`].
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use wayfinder::ExecutionContext;
//!
//! let ctx = ExecutionContext::new();
//! ctx.record_call("weather", 0.0015, Duration::from_millis(80));
//! ctx.record_call("route", 0.005, Duration::from_millis(120));
//!
//! let budget = ctx.snapshot();
//! assert_eq!(budget.api_calls, 2);
//! assert_eq!(ctx.calls_for("route"), 1);
//! ```

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

use crate::metrics::{AggregateMetrics, BudgetSnapshot};
use crate::supervisor::Outcome;

/// One outbound call as seen by the budget tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    /// Step that made the call.
    pub step: String,
    /// Estimated cost units charged.
    pub cost_units: f64,
    /// How long the call took (or until it was abandoned).
    pub latency: Duration,
}

#[derive(Debug, Default)]
struct Ledger {
    calls: Vec<CallRecord>,
    cost_units: f64,
    prompt_token_count: u64,
    completion_token_count: u64,
    finalized: bool,
}

/// Budget tracker passed to every step of one request.
///
/// Cloning is cheap and clones share the same ledger. A context is never
/// shared across requests; only the aggregates behind it are.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    request_id: Uuid,
    started: Instant,
    ledger: Arc<Mutex<Ledger>>,
    aggregates: Arc<AggregateMetrics>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext {
    /// Create a standalone context with its own, private aggregates.
    #[must_use]
    pub fn new() -> Self {
        Self::for_request(Uuid::new_v4(), Arc::new(AggregateMetrics::new()))
    }

    /// Create the context of one request, reporting into shared aggregates.
    #[must_use]
    pub fn for_request(request_id: Uuid, aggregates: Arc<AggregateMetrics>) -> Self {
        Self {
            request_id,
            started: Instant::now(),
            ledger: Arc::new(Mutex::new(Ledger::default())),
            aggregates,
        }
    }

    /// Id of the request this context belongs to.
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Time since the request started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Record one outbound call attempt. Retries are recorded separately.
    pub fn record_call(&self, step_name: &str, cost_units: f64, latency: Duration) {
        let mut ledger = self.ledger();
        ledger.cost_units += cost_units;
        ledger.calls.push(CallRecord {
            step: step_name.to_string(),
            cost_units,
            latency,
        });
        debug!(
            request_id = %self.request_id,
            step = step_name,
            cost_units,
            latency_ms = latency.as_millis() as u64,
            "outbound call recorded"
        );
    }

    /// Record token usage reported by the synthesis provider.
    pub fn record_tokens(&self, prompt: u64, completion: u64) {
        let mut ledger = self.ledger();
        ledger.prompt_token_count += prompt;
        ledger.completion_token_count += completion;
    }

    /// Get a snapshot of the current budget.
    #[must_use]
    pub fn snapshot(&self) -> BudgetSnapshot {
        let ledger = self.ledger();
        BudgetSnapshot {
            api_calls: ledger.calls.len() as u32,
            cost_units: ledger.cost_units,
            prompt_token_count: ledger.prompt_token_count,
            completion_token_count: ledger.completion_token_count,
            elapsed: self.started.elapsed(),
        }
    }

    /// Number of calls recorded by `step_name`.
    pub fn calls_for(&self, step_name: &str) -> u32 {
        self.ledger()
            .calls
            .iter()
            .filter(|c| c.step == step_name)
            .count() as u32
    }

    /// All calls recorded so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<CallRecord> {
        self.ledger().calls.clone()
    }

    /// Fold this request's totals into the process-wide aggregates.
    ///
    /// Only the first call has an effect; returns whether it did.
    pub fn finalize(&self, outcome: Outcome, errors: u32) -> bool {
        let budget = {
            let mut ledger = self.ledger();
            if ledger.finalized {
                return false;
            }
            ledger.finalized = true;
            BudgetSnapshot {
                api_calls: ledger.calls.len() as u32,
                cost_units: ledger.cost_units,
                prompt_token_count: ledger.prompt_token_count,
                completion_token_count: ledger.completion_token_count,
                elapsed: self.started.elapsed(),
            }
        };
        self.aggregates.fold(outcome.is_success(), errors, &budget);
        true
    }

    /// The aggregates this context reports into.
    pub fn aggregates(&self) -> &Arc<AggregateMetrics> {
        &self.aggregates
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_totals() {
        let ctx = ExecutionContext::new();
        ctx.record_call("location", 0.0, Duration::from_millis(5));
        ctx.record_call("synthesis", 0.0014, Duration::from_millis(900));
        ctx.record_tokens(400, 300);

        let snap = ctx.snapshot();
        assert_eq!(snap.api_calls, 2);
        assert!((snap.cost_units - 0.0014).abs() < 1e-12);
        assert_eq!(snap.total_tokens(), 700);
        assert_eq!(ctx.calls()[1].step, "synthesis");
    }

    #[test]
    fn test_clones_share_the_ledger() {
        let ctx = ExecutionContext::new();
        let clone = ctx.clone();
        clone.record_call("route", 0.005, Duration::ZERO);
        assert_eq!(ctx.calls_for("route"), 1);
        assert_eq!(ctx.calls_for("weather"), 0);
    }

    #[test]
    fn test_finalize_folds_once() {
        let aggregates = Arc::new(AggregateMetrics::new());
        let ctx = ExecutionContext::for_request(Uuid::new_v4(), Arc::clone(&aggregates));
        ctx.record_call("route", 0.005, Duration::ZERO);

        assert!(ctx.finalize(Outcome::Templated, 1));
        assert!(!ctx.finalize(Outcome::Templated, 1));

        let snap = aggregates.snapshot();
        assert_eq!(snap.total_requests, 1);
        assert_eq!(snap.successful_requests, 1);
        assert_eq!(snap.total_errors, 1);
        assert_eq!(snap.total_api_calls, 1);
    }
}
