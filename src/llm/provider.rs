//! `LlmProvider` — the narrow interface to the generation backend.
//!
//! The engine only ever needs prompt-in/text-out; model selection, retries
//! and caching inside a single call are the backend's business.

use async_trait::async_trait;

use crate::error::LlmError;

/// A text-generation backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a completion for a single prompt.
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;

    /// Model identifier, for logging.
    fn model_name(&self) -> &str;
}
