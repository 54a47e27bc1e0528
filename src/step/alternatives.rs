//! Other ways to make the same trip.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::route::origin_query;
use super::{invoke, Step, StepResult};
use crate::client::RouteClient;
use crate::config::PipelineConfig;
use crate::context::ExecutionContext;
use crate::error::StepFailure;
use crate::state::{Field, WorkflowState};

/// Produces `alternatives`. Optional.
///
/// Itineraries that duplicate the primary route's summary are dropped.
pub struct AlternativesStep {
    client: Arc<dyn RouteClient>,
    limit: usize,
    timeout: Duration,
    cost: f64,
}

impl AlternativesStep {
    /// Create the step from its collaborator and the pipeline configuration.
    pub fn new(client: Arc<dyn RouteClient>, config: &PipelineConfig) -> Self {
        Self {
            client,
            limit: config.max_alternatives,
            timeout: config.call_timeout(),
            cost: config.costs.alternatives,
        }
    }
}

#[async_trait]
impl Step for AlternativesStep {
    fn name(&self) -> &str {
        "alternatives"
    }

    fn requires(&self) -> &[Field] {
        &[Field::Origin, Field::Destination]
    }

    fn produces(&self) -> Field {
        Field::Alternatives
    }

    async fn execute(&self, ctx: &ExecutionContext, state: &WorkflowState) -> StepResult {
        let mut next = state.clone();
        if self.limit == 0 {
            next.set_alternatives(Vec::new())?;
            return Ok(next);
        }

        let (Some(origin), Some(destination)) = (origin_query(state), state.parsed().destination.as_deref())
        else {
            return Err(StepFailure::critical("alternatives require an origin and a destination"));
        };

        let mut alternatives = invoke(
            ctx,
            self.name(),
            self.timeout,
            |_| self.cost,
            self.client
                .alternatives(&origin, destination, state.parsed().mode, self.limit),
        )
        .await?;

        if let Some(primary) = state.route() {
            alternatives.retain(|alt| alt.summary != primary.summary);
        }
        alternatives.truncate(self.limit);

        next.set_alternatives(alternatives)?;
        Ok(next)
    }
}
