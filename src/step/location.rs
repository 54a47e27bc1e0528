//! Resolve where the traveller is.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::{invoke, Criticality, Step, StepResult};
use crate::client::LocationClient;
use crate::config::PipelineConfig;
use crate::context::ExecutionContext;
use crate::state::{Field, Location, LocationSource, WorkflowState};
use crate::trace::StepStatus;

/// Produces `origin` from the caller's network address.
///
/// The only step with a built-in default: when resolution fails and a default
/// location is configured, the step still succeeds with that default and is
/// recorded as degraded. Without a default, the failure stands and halts the
/// pipeline.
pub struct LocationStep {
    client: Arc<dyn LocationClient>,
    probe_ip: String,
    fallback: Option<Location>,
    timeout: Duration,
    cost: f64,
}

impl LocationStep {
    /// Create the step from its collaborator and the pipeline configuration.
    pub fn new(client: Arc<dyn LocationClient>, config: &PipelineConfig) -> Self {
        Self {
            client,
            probe_ip: config.probe_ip.clone(),
            fallback: config.default_location.clone(),
            timeout: config.call_timeout(),
            cost: config.costs.location,
        }
    }
}

#[async_trait]
impl Step for LocationStep {
    fn name(&self) -> &str {
        "location"
    }

    fn produces(&self) -> Field {
        Field::Origin
    }

    fn criticality(&self) -> Criticality {
        Criticality::Critical
    }

    fn assess(&self, next: &WorkflowState) -> StepStatus {
        match next.origin() {
            Some(origin) if origin.source == LocationSource::Default => StepStatus::Degraded,
            _ => StepStatus::Succeeded,
        }
    }

    async fn execute(&self, ctx: &ExecutionContext, state: &WorkflowState) -> StepResult {
        let resolved = invoke(
            ctx,
            self.name(),
            self.timeout,
            |_| self.cost,
            self.client.resolve(&self.probe_ip),
        )
        .await;

        let origin = match (resolved, &self.fallback) {
            (Ok(origin), _) => Location {
                source: LocationSource::Resolved,
                ..origin
            },
            (Err(failure), Some(default)) => {
                info!(
                    request_id = %ctx.request_id(),
                    default = %default.display_name,
                    reason = %failure,
                    "geolocation failed, using default location"
                );
                Location {
                    source: LocationSource::Default,
                    ..default.clone()
                }
            }
            (Err(failure), None) => return Err(failure),
        };

        let mut next = state.clone();
        next.set_origin(origin)?;
        Ok(next)
    }
}
