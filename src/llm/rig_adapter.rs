//! Adapter bridging rig's `CompletionModel` to the [`LlmProvider`] trait.

use async_trait::async_trait;
use rig::completion::{CompletionModel, Prompt};

use crate::error::LlmError;
use crate::llm::provider::LlmProvider;

/// Wraps a rig agent built on any provider's completion model.
pub struct RigAdapter<M: CompletionModel> {
    agent: rig::agent::Agent<M>,
    model_name: String,
}

impl<M: CompletionModel> RigAdapter<M> {
    /// Build an adapter around `model`.
    pub fn new(model: M, model_name: &str) -> Self {
        let agent = rig::agent::AgentBuilder::new(model).build();
        Self {
            agent,
            model_name: model_name.to_string(),
        }
    }
}

#[async_trait]
impl<M: CompletionModel> LlmProvider for RigAdapter<M> {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        self.agent
            .prompt(prompt)
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: "rig".to_string(),
                reason: e.to_string(),
            })
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
