//! # wayfinder
//!
//! Supervised, budget-aware step pipeline that turns a free-text travel
//! request ("public transport to Times Square") into a directions answer.
//!
//! A request flows through a fixed sequence of steps, each reading a shared
//! [`WorkflowState`] and filling in exactly one write-once field. A
//! [`Supervisor`] runs them in order and applies one policy to all of them:
//! retries for transient failures, graceful degradation for optional steps,
//! an apology when a critical step fails, and a per-request budget ceiling.
//!
//! ## Core Concepts
//!
//! - **WorkflowState**: Write-once record of everything gathered for a request
//! - **Step**: One stage of the pipeline (location, weather, route, alternatives, synthesis)
//! - **ExecutionContext**: Per-request budget tracker every outbound call reports to
//! - **Supervisor**: Runs the steps and decides retry, skip, degrade or halt
//! - **AggregateMetrics**: Process-wide counters folded in once per request
//! - **Clients**: The external collaborators, behind traits
//!
//! ## Example: Handling a Request
//!
//! ```rust
//! use wayfinder::{Clients, PipelineConfig, StepStatus, Supervisor};
//!
//! # tokio_test::block_on(async {
//! let supervisor = Supervisor::new(Clients::fixed(), PipelineConfig::default());
//!
//! let run = supervisor.run("how do I get to Central Park?").await;
//! assert!(run.outcome.is_success());
//! assert_eq!(run.state.trace().len(), 5);
//! assert!(run.state.trace().iter().all(|r| r.status == StepStatus::Succeeded));
//! assert_eq!(run.budget.api_calls, 5);
//! # });
//! ```

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod metrics;
pub mod query;
pub mod render;
pub mod retry;
pub mod state;
pub mod step;
pub mod supervisor;
pub mod trace;

pub use client::Clients;
pub use config::{CostTable, PipelineConfig};
pub use context::{CallRecord, ExecutionContext};
pub use error::{Error, FailureKind, Result, ServiceError, StepFailure};
pub use metrics::{AggregateMetrics, AggregateSnapshot, BudgetCeiling, BudgetSnapshot};
pub use query::{ParsedQuery, TravelMode};
pub use render::FallbackReason;
pub use retry::RetryPolicy;
pub use state::{Field, Location, LocationSource, RouteLeg, RouteSummary, WeatherSnapshot, WorkflowState};
pub use step::{Criticality, Step, StepResult};
pub use supervisor::{DirectionsResponse, Outcome, PipelineRun, RunStatus, Supervisor};
pub use trace::{StepStatus, TraceRecord};
