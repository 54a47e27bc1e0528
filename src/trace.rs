//! Step execution records.
//!
//! Every pipeline step reached during a request leaves exactly one
//! [`TraceRecord`] in the [`WorkflowState`](crate::WorkflowState), whatever its
//! outcome. Retries of the same step are folded into that one record's
//! `attempts` count.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::StepFailure;

/// How a step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// The step produced its output.
    Succeeded,
    /// The step produced a substitute output (e.g. a default location).
    Degraded,
    /// The step produced nothing after its last attempt.
    Failed,
    /// The step was never invoked.
    Skipped,
}

impl StepStatus {
    /// Returns true when this status counts as an encountered error.
    pub fn is_failure(&self) -> bool {
        matches!(self, StepStatus::Failed)
    }
}

/// A timestamped record of one step's execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceRecord {
    /// Unix epoch timestamp in milliseconds when the record was written.
    pub timestamp: u128,
    /// Name of the step.
    pub step: String,
    /// Final status of the step.
    pub status: StepStatus,
    /// Number of times the step was invoked, retries included.
    pub attempts: u32,
    /// Wall-clock time spent on the step across all attempts.
    pub duration_ms: u128,
    /// The failure behind a `Failed` or `Skipped` status, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StepFailure>,
}

impl TraceRecord {
    /// Create a record stamped with the current time.
    #[must_use]
    pub fn new(
        step: impl Into<String>,
        status: StepStatus,
        attempts: u32,
        duration: Duration,
        error: Option<StepFailure>,
    ) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        Self {
            timestamp,
            step: step.into(),
            status,
            attempts,
            duration_ms: duration.as_millis(),
            error,
        }
    }
}
