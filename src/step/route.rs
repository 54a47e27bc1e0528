//! The primary itinerary.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::{invoke, Criticality, Step, StepResult};
use crate::client::RouteClient;
use crate::config::PipelineConfig;
use crate::context::ExecutionContext;
use crate::error::StepFailure;
use crate::state::{Field, WorkflowState};

/// Produces `route`. Critical: without a route there is nothing to answer.
pub struct RouteStep {
    client: Arc<dyn RouteClient>,
    timeout: Duration,
    cost: f64,
}

impl RouteStep {
    /// Create the step from its collaborator and the pipeline configuration.
    pub fn new(client: Arc<dyn RouteClient>, config: &PipelineConfig) -> Self {
        Self {
            client,
            timeout: config.call_timeout(),
            cost: config.costs.route,
        }
    }
}

/// The origin as a provider understands it: an explicit place from the query,
/// or the resolved coordinates.
pub(crate) fn origin_query(state: &WorkflowState) -> Option<String> {
    if let Some(hint) = &state.parsed().origin_hint {
        return Some(hint.clone());
    }
    state
        .origin()
        .map(|o| format!("{:.6},{:.6}", o.latitude, o.longitude))
}

#[async_trait]
impl Step for RouteStep {
    fn name(&self) -> &str {
        "route"
    }

    fn requires(&self) -> &[Field] {
        &[Field::Origin, Field::Destination]
    }

    fn produces(&self) -> Field {
        Field::Route
    }

    fn criticality(&self) -> Criticality {
        Criticality::Critical
    }

    async fn execute(&self, ctx: &ExecutionContext, state: &WorkflowState) -> StepResult {
        let (Some(origin), Some(destination)) = (origin_query(state), state.parsed().destination.as_deref())
        else {
            return Err(StepFailure::critical("route requires an origin and a destination"));
        };

        let route = invoke(
            ctx,
            self.name(),
            self.timeout,
            |_| self.cost,
            self.client.route(&origin, destination, state.parsed().mode),
        )
        .await?;

        let mut next = state.clone();
        next.set_route(route)?;
        Ok(next)
    }
}
