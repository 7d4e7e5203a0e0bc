//! Task data model — the unit of work flowing through the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a task.
///
/// Transitions: `pending → processing → {completed | failed}`, plus
/// `processing → pending` via crash recovery (`requeue_stuck`). There is
/// no cancellation of an in-flight task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A single unit of work.
///
/// The engine owns `id`, `status` and every timestamp; handlers only ever
/// read the payload and produce a result. Exactly one of `result`/`error`
/// is present once the task is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Stable opaque identifier, assigned at creation if absent.
    #[serde(default)]
    pub id: String,
    /// Key used to resolve a handler.
    #[serde(rename = "type", default)]
    pub task_type: String,
    /// Lifecycle status.
    #[serde(default = "default_status")]
    pub status: TaskStatus,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// When the task entered the queue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_time: Option<DateTime<Utc>>,
    /// When the task was claimed for processing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// When the task reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_time: Option<DateTime<Utc>>,
    /// When the task was last returned to pending by crash recovery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requeued_time: Option<DateTime<Utc>>,
    /// Output attached on completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error message attached on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Handler-specific fields, never interpreted by the engine.
    #[serde(flatten)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

fn default_status() -> TaskStatus {
    TaskStatus::Pending
}

impl Task {
    /// Create a pending task of the given type.
    pub fn new(task_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task_type: task_type.into(),
            status: TaskStatus::Pending,
            description: None,
            added_time: None,
            start_time: None,
            completed_time: None,
            requeued_time: None,
            result: None,
            error: None,
            payload: serde_json::Map::new(),
        }
    }

    /// Builder: set description.
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Builder: attach a payload field.
    pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    /// Whether the task has reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Fill in the fields the store owns: id, pending status, added_time.
    ///
    /// Values already present are left untouched, so tasks loaded from a
    /// seed file keep their ids.
    pub(crate) fn normalize(&mut self) {
        if self.id.is_empty() {
            self.id = Uuid::new_v4().to_string();
        }
        if self.added_time.is_none() {
            self.added_time = Some(Utc::now());
        }
    }
}

/// Per-status counts reported by [`super::TaskStore::stats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

impl TaskStats {
    /// Whether there is any live (pending or processing) work.
    pub fn is_idle(&self) -> bool {
        self.pending == 0 && self.processing == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_is_pending_without_timestamps() {
        let task = Task::new("analysis");
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.added_time.is_none());
        assert!(task.result.is_none());
        assert!(task.error.is_none());
    }

    #[test]
    fn deserializes_with_missing_status_and_id() {
        let task: Task =
            serde_json::from_str(r#"{"type": "refactoring", "target_file": "src/lib.rs"}"#)
                .unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.id.is_empty());
        assert_eq!(
            task.payload.get("target_file").and_then(|v| v.as_str()),
            Some("src/lib.rs")
        );
    }

    #[test]
    fn payload_round_trips_through_flatten() {
        let task = Task::new("code_fix")
            .with_field("error_details", serde_json::json!("missing semicolon"));
        let json = serde_json::to_string(&task).unwrap();
        let back: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(
            back.payload.get("error_details").and_then(|v| v.as_str()),
            Some("missing semicolon")
        );
    }
}
