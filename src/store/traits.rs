//! `TaskStore` trait — the single async interface the engine depends on.
//!
//! The dispatcher and orchestrator only ever see this trait, so the
//! snapshot-file backend can be swapped for an embedded store without
//! touching either of them.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::StoreError;
use crate::store::task::{Task, TaskStats};

/// Result of a [`TaskStore::cleanup`] pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupStats {
    pub original_count: usize,
    pub removed_count: usize,
    pub remaining_count: usize,
    pub backup_created: bool,
}

/// Persistent, insertion-ordered collection of tasks.
///
/// Every mutating operation persists the full snapshot before returning;
/// the backing file is the single source of truth.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Add one task, normalizing missing status/added_time/id. Returns the
    /// normalized task. No dedup — callers check for equivalent pending
    /// work first where duplicates matter.
    async fn add(&self, task: Task) -> Result<Task, StoreError>;

    /// Add several tasks in one persist. Returns the number added.
    async fn add_many(&self, tasks: Vec<Task>) -> Result<usize, StoreError>;

    /// Claim the first pending task in insertion order, transitioning it
    /// to processing and stamping `start_time`. `None` means the queue has
    /// no pending work — not an error.
    async fn claim_next(&self) -> Result<Option<Task>, StoreError>;

    /// Terminal transition: processing → completed, stamping
    /// `completed_time` and attaching the result.
    async fn mark_completed(&self, id: &str, result: serde_json::Value)
    -> Result<(), StoreError>;

    /// Terminal transition: processing → failed, stamping `completed_time`
    /// and attaching the error message.
    async fn mark_failed(&self, id: &str, error: &str) -> Result<(), StoreError>;

    /// Crash recovery: every task found in processing goes back to
    /// pending, clearing `start_time`. Returns the number moved.
    /// Idempotent — a second call with no intervening claims moves zero.
    async fn requeue_stuck(&self) -> Result<usize, StoreError>;

    /// Re-queue failed tasks whose payload matches every criteria field,
    /// clearing their error and completion stamp. Returns the number moved.
    async fn requeue_failed(
        &self,
        criteria: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<usize, StoreError>;

    /// Whether a pending or processing task of this type exists.
    async fn has_task_type(&self, task_type: &str) -> bool;

    /// Whether a pending or processing task with this description exists.
    /// The scheduler bridge uses this to avoid duplicate accumulation.
    async fn has_pending_description(&self, description: &str) -> bool;

    /// Fetch a task by id.
    async fn get(&self, id: &str) -> Option<Task>;

    /// Per-status counts.
    async fn stats(&self) -> TaskStats;

    /// Remove completed/failed tasks whose `completed_time` is older than
    /// `max_age`. Never touches pending or processing tasks. When `backup`
    /// is set, a timestamped copy of the snapshot file is written first.
    async fn cleanup(
        &self,
        max_age: chrono::Duration,
        backup: bool,
    ) -> Result<CleanupStats, StoreError>;

    /// Full copy of the task list, for reporting.
    async fn snapshot(&self) -> Vec<Task>;
}
