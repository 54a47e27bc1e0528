//! Turn the collected state into a friendly answer.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::{invoke, Step, StepResult};
use crate::client::{Generation, SynthesisClient};
use crate::config::{CostTable, PipelineConfig};
use crate::context::ExecutionContext;
use crate::error::StepFailure;
use crate::render::PromptContext;
use crate::state::{Field, WorkflowState};

/// Produces `final_answer` through the language-generation provider.
///
/// Optional: when it fails, the supervisor writes a templated summary instead.
/// The prompt is built only from state fields; weather and alternatives are
/// left out when absent.
pub struct SynthesisStep {
    client: Arc<dyn SynthesisClient>,
    costs: CostTable,
    timeout: Duration,
}

impl SynthesisStep {
    /// Create the step from its collaborator and the pipeline configuration.
    pub fn new(client: Arc<dyn SynthesisClient>, config: &PipelineConfig) -> Self {
        Self {
            client,
            costs: config.costs.clone(),
            timeout: config.call_timeout(),
        }
    }
}

#[async_trait]
impl Step for SynthesisStep {
    fn name(&self) -> &str {
        "synthesis"
    }

    fn requires(&self) -> &[Field] {
        &[Field::Route]
    }

    fn produces(&self) -> Field {
        Field::FinalAnswer
    }

    async fn execute(&self, ctx: &ExecutionContext, state: &WorkflowState) -> StepResult {
        let Some(prompt) = PromptContext::from_state(state) else {
            return Err(StepFailure::critical("synthesis requires a route"));
        };

        let generation = invoke(
            ctx,
            self.name(),
            self.timeout,
            |g: Option<&Generation>| {
                g.map_or(0.0, |g| self.costs.synthesis(g.prompt_tokens + g.completion_tokens))
            },
            self.client.generate(&prompt),
        )
        .await?;

        ctx.record_tokens(generation.prompt_tokens, generation.completion_tokens);

        let text = generation.text.trim();
        if text.is_empty() {
            return Err(StepFailure::transient("provider returned an empty answer"));
        }

        let mut next = state.clone();
        next.set_final_answer(text)?;
        Ok(next)
    }
}
