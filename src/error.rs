//! Error types for autodev.

use std::path::PathBuf;

/// Top-level error type for the agent.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Task store error: {0}")]
    Store(#[from] StoreError),

    #[error("Handler error: {0}")]
    Handler(#[from] HandlerError),

    #[error("Git error: {0}")]
    Git(#[from] GitError),

    #[error("Hosting error: {0}")]
    Hosting(#[from] HostingError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Workflow error: {0}")]
    Workflow(String),
}

/// Configuration-related errors. These are fatal: the process refuses to
/// start rather than run in a degraded state.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Task store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to persist task store to {path}: {source}")]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read task store from {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Task {id} not found")]
    NotFound { id: String },

    #[error("Task {id} already in status {status}, cannot transition to {target}")]
    InvalidTransition {
        id: String,
        status: String,
        target: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Handler execution errors. A handler that returns one of these has
/// *crashed*; a handler that wants to report a semantic failure returns
/// [`crate::handlers::HandlerOutcome::failure`] instead.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Handler {name} execution failed: {reason}")]
    ExecutionFailed { name: String, reason: String },

    #[error("Invalid payload for handler {name}: {reason}")]
    InvalidPayload { name: String, reason: String },

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Local version-control errors.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("Failed to open repository at {path}: {reason}")]
    Open { path: PathBuf, reason: String },

    #[error("Git operation '{operation}' failed: {reason}")]
    Operation { operation: String, reason: String },

    #[error("Branch '{branch}' not found")]
    BranchNotFound { branch: String },

    #[error("Push of branch '{branch}' failed: {reason}")]
    PushFailed { branch: String, reason: String },
}

impl From<git2::Error> for GitError {
    fn from(e: git2::Error) -> Self {
        GitError::Operation {
            operation: "libgit2".to_string(),
            reason: e.message().to_string(),
        }
    }
}

/// Hosting-provider (pull request API) errors.
#[derive(Debug, thiserror::Error)]
pub enum HostingError {
    #[error("Request to hosting API failed: {0}")]
    Request(String),

    #[error("Hosting API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Pull request #{number} not found")]
    NotFound { number: u64 },

    #[error("Hosting credentials not configured")]
    NotConfigured,
}

impl From<reqwest::Error> for HostingError {
    fn from(e: reqwest::Error) -> Self {
        HostingError::Request(e.to_string())
    }
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for the agent.
pub type Result<T> = std::result::Result<T, Error>;
