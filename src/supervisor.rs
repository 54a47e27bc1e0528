//! The supervising controller.
//!
//! A [`Supervisor`] owns the ordered step list and runs it against one
//! [`WorkflowState`] per request. Per request it moves through
//! `Created → Running(i) → … → Completed | Halted`, passing through the
//! non-terminal `Degraded` whenever an optional step comes up empty.
//!
//! Policy, applied uniformly to every step:
//!
//! - **Budget**: checked before each step (and each retry). Once the ceiling is
//!   reached, every remaining step is recorded as skipped and the budget
//!   apology is returned without further calls.
//! - **Preconditions**: a step whose inputs are missing is not invoked. An
//!   optional one is recorded as skipped; a critical one as failed, halting.
//! - **Retry**: retryable failures are retried up to the configured bound with
//!   a fixed pause. One trace record per step, whatever the attempt count.
//! - **Fallback**: optional failures degrade; critical failures halt with an
//!   apology plus partial state; a failed synthesis is replaced by the
//!   templated summary.
//! - **Deadline**: the whole pipeline runs under the request timeout; an
//!   attempt still in flight when it expires is dropped and its result
//!   discarded.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::Clients;
use crate::config::PipelineConfig;
use crate::context::ExecutionContext;
use crate::error::StepFailure;
use crate::metrics::{AggregateMetrics, AggregateSnapshot, BudgetSnapshot};
use crate::render::{self, FallbackReason};
use crate::state::{Field, WorkflowState};
use crate::step::{
    AlternativesStep, Criticality, LocationStep, RouteStep, Step, SynthesisStep, WeatherStep,
};
use crate::trace::StepStatus;

/// Which kind of answer a request ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "reason")]
pub enum Outcome {
    /// Written by the language-generation provider.
    Synthesized,
    /// Plain-text summary built from the route.
    Templated,
    /// Generic apology.
    Fallback(FallbackReason),
}

impl Outcome {
    /// Whether the request produced directions.
    pub fn is_success(&self) -> bool {
        !matches!(self, Outcome::Fallback(_))
    }
}

/// Per-request pipeline status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// State created, nothing run yet.
    Created,
    /// Running the step at this index.
    Running(usize),
    /// An optional step came up empty; the pipeline goes on.
    Degraded,
    /// Stopped early; the answer is an apology.
    Halted,
    /// Ran to the end; the answer is synthesized or templated.
    Completed,
}

/// What the front end receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionsResponse {
    /// Id of the request.
    pub request_id: Uuid,
    /// The answer. Never empty.
    pub final_answer: String,
    /// Which kind of answer this is.
    pub outcome: Outcome,
    /// Wall-clock processing time in seconds.
    pub processing_time_s: f64,
    /// Outbound calls made for this request, retries included.
    pub messages_exchanged: u32,
    /// Steps that failed.
    pub errors_encountered: u32,
}

/// Everything a finished request leaves behind.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    /// Final workflow state, trace included.
    pub state: WorkflowState,
    /// Kind of answer.
    pub outcome: Outcome,
    /// Terminal status (`Completed` or `Halted`).
    pub status: RunStatus,
    /// Every status the request passed through, in order.
    pub history: Vec<RunStatus>,
    /// The answer handed to the user.
    pub final_answer: String,
    /// Terminal budget totals.
    pub budget: BudgetSnapshot,
    /// Every outbound call recorded for the request.
    pub calls: Vec<crate::context::CallRecord>,
}

impl PipelineRun {
    /// Whether any optional step came up empty.
    pub fn degraded(&self) -> bool {
        self.history.contains(&RunStatus::Degraded)
    }
}

enum Attempt {
    Done(WorkflowState),
    Failed(StepFailure),
    OverBudget(StepFailure),
    TimedOut,
}

/// Runs the fixed step pipeline, one request at a time per call.
///
/// A supervisor is shared across concurrent requests; each request gets its
/// own state and [`ExecutionContext`]. Only the aggregate metrics are shared.
///
/// # Example
///
/// ```rust
/// use wayfinder::{Clients, Outcome, PipelineConfig, Supervisor};
///
/// # tokio_test::block_on(async {
/// let supervisor = Supervisor::new(Clients::fixed(), PipelineConfig::default());
///
/// let response = supervisor.handle_request("public transport to Times Square").await;
/// assert_eq!(response.outcome, Outcome::Synthesized);
/// assert!(response.final_answer.contains("Times Square"));
/// assert_eq!(response.errors_encountered, 0);
/// assert_eq!(supervisor.metrics().total_requests, 1);
/// # });
/// ```
pub struct Supervisor {
    steps: Vec<Box<dyn Step>>,
    config: PipelineConfig,
    aggregates: Arc<AggregateMetrics>,
    name: String,
}

impl Supervisor {
    /// Create a supervisor running the standard five steps in order:
    /// location, weather, route, alternatives, synthesis.
    pub fn new(clients: Clients, config: PipelineConfig) -> Self {
        let steps: Vec<Box<dyn Step>> = vec![
            Box::new(LocationStep::new(clients.location, &config)),
            Box::new(WeatherStep::new(clients.weather, &config)),
            Box::new(RouteStep::new(Arc::clone(&clients.route), &config)),
            Box::new(AlternativesStep::new(clients.route, &config)),
            Box::new(SynthesisStep::new(clients.synthesis, &config)),
        ];
        Self::with_steps(steps, config)
    }

    /// Create a supervisor over an explicit, ordered step list.
    pub fn with_steps(steps: Vec<Box<dyn Step>>, config: PipelineConfig) -> Self {
        Self {
            steps,
            config,
            aggregates: Arc::new(AggregateMetrics::new()),
            name: "wayfinder".to_string(),
        }
    }

    /// Report into existing process-wide aggregates.
    pub fn with_aggregates(mut self, aggregates: Arc<AggregateMetrics>) -> Self {
        self.aggregates = aggregates;
        self
    }

    /// Set a human-readable name used in logs.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Returns the name of this supervisor.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Step names in execution order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// The active configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Current process-wide metrics.
    pub fn metrics(&self) -> AggregateSnapshot {
        self.aggregates.snapshot()
    }

    /// Answer one request. Never fails: every outcome carries a non-empty answer.
    pub async fn handle_request(&self, query: &str) -> DirectionsResponse {
        let started = Instant::now();
        let run = self.run(query).await;
        DirectionsResponse {
            request_id: run.state.request_id(),
            final_answer: run.final_answer,
            outcome: run.outcome,
            processing_time_s: started.elapsed().as_secs_f64(),
            messages_exchanged: run.budget.api_calls,
            errors_encountered: run.state.errors_encountered(),
        }
    }

    /// Answer independent requests concurrently, preserving input order.
    pub async fn handle_batch<I, S>(&self, queries: I) -> Vec<DirectionsResponse>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let queries: Vec<S> = queries.into_iter().collect();
        join_all(queries.iter().map(|q| self.handle_request(q.as_ref()))).await
    }

    /// Run the pipeline for `query` and return everything it produced.
    pub async fn run(&self, query: &str) -> PipelineRun {
        let mut state = WorkflowState::new(query);
        let ctx = ExecutionContext::for_request(state.request_id(), Arc::clone(&self.aggregates));
        let deadline = Instant::now() + self.config.request_timeout();
        let mut history = vec![RunStatus::Created];
        let mut halt: Option<FallbackReason> = None;

        info!(
            supervisor = %self.name,
            request_id = %state.request_id(),
            destination = ?state.parsed().destination,
            "request started"
        );

        for (index, step) in self.steps.iter().enumerate() {
            let name = step.name();

            if let Some(reason) = self.config.budget.exceeded_by(&ctx.snapshot()) {
                warn!(request_id = %state.request_id(), step = name, %reason, "budget exceeded, skipping remaining steps");
                self.skip_over_budget(&mut state, index, &reason);
                halt = Some(FallbackReason::BudgetExceeded);
                break;
            }
            history.push(RunStatus::Running(index));

            if state.has(step.produces()) {
                debug!(request_id = %state.request_id(), step = name, "output already present, skipping");
                state.record(name, StepStatus::Skipped, 0, Duration::ZERO, None);
                continue;
            }

            let missing: Vec<Field> = step
                .requires()
                .iter()
                .copied()
                .filter(|field| !state.has(*field))
                .collect();
            if !missing.is_empty() {
                let detail = format!(
                    "missing prerequisite: {}",
                    missing.iter().map(Field::to_string).collect::<Vec<_>>().join(", ")
                );
                match step.criticality() {
                    Criticality::Critical => {
                        warn!(request_id = %state.request_id(), step = name, %detail, "critical step cannot run");
                        state.record(
                            name,
                            StepStatus::Failed,
                            0,
                            Duration::ZERO,
                            Some(StepFailure::critical(detail)),
                        );
                        halt = Some(FallbackReason::Halted);
                        break;
                    }
                    Criticality::Optional => {
                        debug!(request_id = %state.request_id(), step = name, %detail, "skipping step");
                        state.record(name, StepStatus::Skipped, 0, Duration::ZERO, None);
                        history.push(RunStatus::Degraded);
                        continue;
                    }
                }
            }

            let started = Instant::now();
            let (attempt, attempts) = self.attempt(step.as_ref(), &ctx, &state, deadline).await;
            let elapsed = started.elapsed();

            match attempt {
                Attempt::Done(next) => {
                    debug_assert_eq!(next.trace().len(), state.trace().len());
                    let status = step.assess(&next);
                    state = next;
                    state.record(name, status, attempts, elapsed, None);
                    if status == StepStatus::Degraded {
                        history.push(RunStatus::Degraded);
                    }
                    debug!(request_id = %state.request_id(), step = name, attempts, ?status, "step finished");
                }
                Attempt::Failed(failure) => {
                    state.record(name, StepStatus::Failed, attempts, elapsed, Some(failure.clone()));
                    match step.criticality() {
                        Criticality::Critical => {
                            warn!(request_id = %state.request_id(), step = name, attempts, error = %failure, "critical step failed, halting");
                            halt = Some(FallbackReason::Halted);
                            break;
                        }
                        Criticality::Optional => {
                            info!(request_id = %state.request_id(), step = name, attempts, error = %failure, "optional step failed, continuing degraded");
                            history.push(RunStatus::Degraded);
                        }
                    }
                }
                Attempt::OverBudget(failure) => {
                    warn!(request_id = %state.request_id(), step = name, attempts, error = %failure, "budget exceeded during retries, skipping remaining steps");
                    let reason = failure.message.clone();
                    state.record(name, StepStatus::Failed, attempts, elapsed, Some(failure));
                    self.skip_over_budget(&mut state, index + 1, &reason);
                    halt = Some(FallbackReason::BudgetExceeded);
                    break;
                }
                Attempt::TimedOut => {
                    warn!(request_id = %state.request_id(), step = name, attempts, "request deadline passed, abandoning pipeline");
                    state.record(
                        name,
                        StepStatus::Failed,
                        attempts,
                        elapsed,
                        Some(StepFailure::critical("request deadline exceeded")),
                    );
                    halt = Some(FallbackReason::TimedOut);
                    break;
                }
            }
        }

        let (outcome, final_answer) = self.conclude(&mut state, halt);
        history.push(if outcome.is_success() {
            RunStatus::Completed
        } else {
            RunStatus::Halted
        });
        let status = *history.last().unwrap_or(&RunStatus::Halted);

        ctx.finalize(outcome, state.errors_encountered());
        let budget = ctx.snapshot();

        info!(
            supervisor = %self.name,
            request_id = %state.request_id(),
            ?outcome,
            errors = state.errors_encountered(),
            api_calls = budget.api_calls,
            elapsed_ms = budget.elapsed.as_millis() as u64,
            "request finished"
        );

        PipelineRun {
            state,
            outcome,
            status,
            history,
            final_answer,
            budget,
            calls: ctx.calls(),
        }
    }

    /// Invoke `step` until it succeeds, fails for good, or the deadline passes.
    async fn attempt(
        &self,
        step: &dyn Step,
        ctx: &ExecutionContext,
        state: &WorkflowState,
        deadline: Instant,
    ) -> (Attempt, u32) {
        let retry = &self.config.retry;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let failure = match tokio::time::timeout_at(deadline, step.execute(ctx, state)).await {
                Err(_) => return (Attempt::TimedOut, attempts),
                Ok(Ok(next)) => {
                    if attempts > 1 {
                        debug!(request_id = %ctx.request_id(), step = step.name(), attempts, "retry succeeded");
                    }
                    return (Attempt::Done(next), attempts);
                }
                Ok(Err(failure)) => failure,
            };

            if !retry.should_retry(attempts, &failure) {
                return (Attempt::Failed(failure), attempts);
            }
            if let Some(reason) = self.config.budget.exceeded_by(&ctx.snapshot()) {
                debug!(request_id = %ctx.request_id(), step = step.name(), last_error = %failure, "not retrying");
                return (Attempt::OverBudget(StepFailure::budget_exceeded(reason)), attempts);
            }

            warn!(
                request_id = %ctx.request_id(),
                step = step.name(),
                attempt = attempts,
                max_retries = retry.max_retries,
                error = %failure,
                "step failed, will retry"
            );
            if tokio::time::timeout_at(deadline, tokio::time::sleep(retry.delay()))
                .await
                .is_err()
            {
                return (Attempt::TimedOut, attempts);
            }
        }
    }

    /// Record every step from `from` on as skipped for lack of budget.
    fn skip_over_budget(&self, state: &mut WorkflowState, from: usize, reason: &str) {
        for skipped in self.steps.iter().skip(from) {
            state.record(
                skipped.name(),
                StepStatus::Skipped,
                0,
                Duration::ZERO,
                Some(StepFailure::budget_exceeded(reason)),
            );
        }
    }

    /// Pick the answer: apology when halted, otherwise the synthesized text or,
    /// failing that, the templated summary (written into the state).
    fn conclude(&self, state: &mut WorkflowState, halt: Option<FallbackReason>) -> (Outcome, String) {
        if let Some(reason) = halt {
            return (Outcome::Fallback(reason), render::fallback_answer(state, reason));
        }
        if let Some(answer) = state.final_answer() {
            return (Outcome::Synthesized, answer.to_string());
        }
        match render::templated_summary(state) {
            Some(summary) => {
                if let Err(err) = state.set_final_answer(summary.clone()) {
                    warn!(request_id = %state.request_id(), error = %err, "could not store templated answer");
                }
                (Outcome::Templated, summary)
            }
            None => {
                let reason = FallbackReason::Halted;
                (Outcome::Fallback(reason), render::fallback_answer(state, reason))
            }
        }
    }
}
