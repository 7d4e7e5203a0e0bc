//! Task handlers — the replaceable leaves of the engine.
//!
//! A handler is a function from `(task, context)` to an outcome. The
//! dispatcher invokes handlers opaquely: it never looks inside the payload
//! and only distinguishes three cases — outcome says success, outcome says
//! failure, or the handler returned an error (crashed).

pub mod builtin;

use async_trait::async_trait;

use crate::context::ExecutionContext;
use crate::error::HandlerError;
use crate::store::Task;

pub use builtin::builtin_handlers;

/// What a handler reports back.
///
/// `Failure` is the explicit error marker: the handler ran to completion
/// and is reporting that the work itself failed. A crashed handler returns
/// `Err(HandlerError)` instead; the dispatcher records both as task
/// failures but logs them differently.
#[derive(Debug, Clone)]
pub enum HandlerOutcome {
    Success(serde_json::Value),
    Failure(String),
}

impl HandlerOutcome {
    /// Success with a plain message payload.
    pub fn message(msg: impl Into<String>) -> Self {
        HandlerOutcome::Success(serde_json::json!({
            "status": "success",
            "message": msg.into(),
        }))
    }

    /// Success with an arbitrary result value.
    pub fn success(value: serde_json::Value) -> Self {
        HandlerOutcome::Success(value)
    }

    /// Semantic failure with a reason.
    pub fn failure(reason: impl Into<String>) -> Self {
        HandlerOutcome::Failure(reason.into())
    }
}

/// An executable registered against a task type.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Handler name, for logging.
    fn name(&self) -> &str;

    /// Execute the task. Handlers must be retry-safe from scratch: a crash
    /// mid-task re-queues the task without resuming partial progress.
    async fn handle(
        &self,
        task: &Task,
        ctx: &ExecutionContext,
    ) -> Result<HandlerOutcome, HandlerError>;
}
