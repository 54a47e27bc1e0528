//! Current conditions at the origin.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::{invoke, Step, StepResult};
use crate::client::WeatherClient;
use crate::config::PipelineConfig;
use crate::context::ExecutionContext;
use crate::error::StepFailure;
use crate::state::{Field, WorkflowState};

/// Produces `weather`. Optional: without it the answer just skips the weather.
pub struct WeatherStep {
    client: Arc<dyn WeatherClient>,
    timeout: Duration,
    cost: f64,
}

impl WeatherStep {
    /// Create the step from its collaborator and the pipeline configuration.
    pub fn new(client: Arc<dyn WeatherClient>, config: &PipelineConfig) -> Self {
        Self {
            client,
            timeout: config.call_timeout(),
            cost: config.costs.weather,
        }
    }
}

#[async_trait]
impl Step for WeatherStep {
    fn name(&self) -> &str {
        "weather"
    }

    fn requires(&self) -> &[Field] {
        &[Field::Origin]
    }

    fn produces(&self) -> Field {
        Field::Weather
    }

    async fn execute(&self, ctx: &ExecutionContext, state: &WorkflowState) -> StepResult {
        let Some(origin) = state.origin() else {
            return Err(StepFailure::critical("weather requires an origin"));
        };

        let weather = invoke(
            ctx,
            self.name(),
            self.timeout,
            |_| self.cost,
            self.client.current(origin.latitude, origin.longitude),
        )
        .await?;

        let mut next = state.clone();
        next.set_weather(weather)?;
        Ok(next)
    }
}
