//! Pipeline steps.
//!
//! This module defines the [`Step`] trait, one stage of the fixed pipeline,
//! along with [`invoke`], the boundary every outbound call goes through.
//!
//! A step never mutates the state it is given: it reads a borrowed
//! [`WorkflowState`], and on success returns a new state with its output field
//! set. On failure it returns a classified [`StepFailure`] and the supervisor
//! keeps the previous state.

use async_trait::async_trait;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::context::ExecutionContext;
use crate::error::{ServiceError, StepFailure};
use crate::state::{Field, WorkflowState};
use crate::trace::StepStatus;

pub mod alternatives;
pub mod location;
pub mod route;
pub mod synthesis;
pub mod weather;

pub use alternatives::AlternativesStep;
pub use location::LocationStep;
pub use route::RouteStep;
pub use synthesis::SynthesisStep;
pub use weather::WeatherStep;

/// What a step hands back: the next state, or why there is none.
pub type StepResult = std::result::Result<WorkflowState, StepFailure>;

/// Whether the pipeline can go on without a step's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criticality {
    /// Failure halts the pipeline.
    Critical,
    /// Failure degrades the answer.
    Optional,
}

/// One stage of the pipeline.
///
/// Implementations declare their inputs with [`Step::requires`] and their
/// output with [`Step::produces`]; the supervisor checks both before calling
/// [`Step::execute`]. An execution makes at most one outbound call, through
/// [`invoke`].
#[async_trait]
pub trait Step: Send + Sync {
    /// Returns a human-readable name for this step. Defaults to the type name.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Fields that must be present before this step may run.
    fn requires(&self) -> &[Field] {
        &[]
    }

    /// The write-once field this step fills in.
    fn produces(&self) -> Field;

    /// Whether the pipeline survives this step failing.
    fn criticality(&self) -> Criticality {
        Criticality::Optional
    }

    /// Status to record for a successful execution that produced `next`.
    fn assess(&self, _next: &WorkflowState) -> StepStatus {
        StepStatus::Succeeded
    }

    /// Execute this step against the current state.
    async fn execute(&self, ctx: &ExecutionContext, state: &WorkflowState) -> StepResult;
}

/// Make one outbound call on behalf of `step_name`.
///
/// This is the only place collaborator errors are classified. The call runs
/// under `timeout`; a panic inside the collaborator is caught. Whatever
/// happens, the attempt is reported to the budget tracker with the cost
/// `cost` computes from the result (`None` on failure) before returning.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use wayfinder::{step::invoke, ExecutionContext, FailureKind, ServiceError};
///
/// # tokio_test::block_on(async {
/// let ctx = ExecutionContext::new();
/// let failure = invoke(&ctx, "weather", Duration::from_secs(1), |_: Option<&u8>| 0.0015, async {
///     Err::<u8, _>(ServiceError::RateLimited)
/// })
/// .await
/// .unwrap_err();
///
/// assert_eq!(failure.kind, FailureKind::TransientService);
/// assert_eq!(ctx.calls_for("weather"), 1);
/// # });
/// ```
pub async fn invoke<T, Fut, C>(
    ctx: &ExecutionContext,
    step_name: &str,
    timeout: Duration,
    cost: C,
    call: Fut,
) -> Result<T, StepFailure>
where
    Fut: Future<Output = Result<T, ServiceError>> + Send,
    C: FnOnce(Option<&T>) -> f64,
{
    let started = Instant::now();
    let outcome = tokio::time::timeout(timeout, AssertUnwindSafe(call).catch_unwind()).await;
    let latency = started.elapsed();

    let result = match outcome {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(ServiceError::Unexpected("collaborator panicked".to_string())),
        Err(_) => Err(ServiceError::Timeout(timeout)),
    };

    ctx.record_call(step_name, cost(result.as_ref().ok()), latency);

    result.map_err(|err| {
        let failure = err.classify();
        warn!(
            request_id = %ctx.request_id(),
            step = step_name,
            retryable = failure.retryable,
            error = %err,
            "outbound call failed"
        );
        failure
    })
}
