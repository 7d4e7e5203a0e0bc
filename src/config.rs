//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Agent name for identification (branch prefixes, commit author).
    pub name: String,
    /// Directory holding the queue snapshot, monitor file, and logs.
    pub data_dir: PathBuf,
    /// Root of the git repository the agent improves.
    pub repo_path: PathBuf,
    /// Seed tasks file loaded by agent mode when the queue is empty.
    pub tasks_file: PathBuf,
    /// Daemon poll interval.
    pub check_interval: Duration,
    /// Whether to push improvement branches to the remote.
    pub auto_push: bool,
    /// Base branch that pull requests target.
    pub base_branch: String,
    /// Age cutoff for `cleanup` of terminal tasks.
    pub cleanup_max_age_days: i64,
    /// Model identifier for the generation backend.
    pub model: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "autodev".to_string(),
            data_dir: PathBuf::from("./data"),
            repo_path: PathBuf::from("."),
            tasks_file: PathBuf::from("tasks.json"),
            check_interval: Duration::from_secs(10),
            auto_push: false,
            base_branch: "main".to_string(),
            cleanup_max_age_days: 7,
            model: "claude-sonnet-4-20250514".to_string(),
        }
    }
}

impl AgentConfig {
    /// Path of the task queue snapshot file.
    pub fn queue_file(&self) -> PathBuf {
        self.data_dir.join("task_queue.json")
    }

    /// Path of the pull-request monitor file.
    pub fn monitor_file(&self) -> PathBuf {
        self.data_dir.join("monitored_prs.json")
    }

    /// Path of the error log scanned by `analyze-logs` mode.
    pub fn error_log_file(&self) -> PathBuf {
        self.data_dir.join("logs").join("agent_errors.log")
    }
}

/// Hosting-provider credentials, read from the environment.
///
/// All three variables must be present for push/PR creation to be
/// attempted; otherwise the agent degrades to local-only operation.
#[derive(Clone)]
pub struct HostingConfig {
    pub owner: String,
    pub repo: String,
    pub token: SecretString,
}

impl HostingConfig {
    /// Build from `GITHUB_REPO_OWNER`, `GITHUB_REPO_NAME` and `GITHUB_TOKEN`.
    ///
    /// Returns `None` when any of them is unset — absence is not an error,
    /// it just disables the hosting integration.
    pub fn from_env() -> Option<Self> {
        let owner = std::env::var("GITHUB_REPO_OWNER").ok()?;
        let repo = std::env::var("GITHUB_REPO_NAME").ok()?;
        let token = std::env::var("GITHUB_TOKEN").ok()?;
        Some(Self {
            owner,
            repo,
            token: SecretString::from(token),
        })
    }
}

impl std::fmt::Debug for HostingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostingConfig")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("token", &"[redacted]")
            .finish()
    }
}

/// Read a required environment variable, mapping absence to a fatal
/// configuration error.
pub fn require_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}
