//! Execution context handed to every handler call.
//!
//! Handlers receive their collaborators explicitly instead of reaching for
//! process-wide state; this is the only way a handler can see the rest of
//! the system.

use std::sync::Arc;

use crate::config::AgentConfig;
use crate::llm::LlmProvider;
use crate::store::TaskStore;

/// Shared collaborators available to handlers.
#[derive(Clone)]
pub struct ExecutionContext {
    /// Generation backend.
    pub llm: Arc<dyn LlmProvider>,
    /// The task store, so handlers can enqueue follow-up work.
    pub store: Arc<dyn TaskStore>,
    /// Agent configuration.
    pub config: AgentConfig,
}

impl ExecutionContext {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        store: Arc<dyn TaskStore>,
        config: AgentConfig,
    ) -> Self {
        Self { llm, store, config }
    }
}
