//! File-backed task store — a single JSON snapshot, rewritten whole on
//! every mutation.
//!
//! A missing or empty file is an empty queue. A structurally invalid file
//! is quarantined (renamed alongside the original with a timestamp suffix)
//! and the store starts empty; the quarantine preserves the bytes for
//! manual recovery instead of silently discarding them.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::store::task::{Task, TaskStats, TaskStatus};
use crate::store::traits::{CleanupStats, TaskStore};

/// Snapshot-file implementation of [`TaskStore`].
pub struct JsonTaskStore {
    path: PathBuf,
    tasks: RwLock<Vec<Task>>,
}

impl JsonTaskStore {
    /// Open the store at `path`, loading whatever snapshot exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Read {
                path: path.clone(),
                source,
            })?;
        }
        let tasks = Self::load(&path)?;
        Ok(Self {
            path,
            tasks: RwLock::new(tasks),
        })
    }

    fn load(path: &Path) -> Result<Vec<Task>, StoreError> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(path).map_err(|source| StoreError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str::<Vec<Task>>(&content) {
            Ok(tasks) => Ok(tasks),
            Err(e) => {
                let quarantine =
                    path.with_extension(format!("corrupt-{}", Utc::now().format("%Y%m%d%H%M%S")));
                tracing::error!(
                    path = %path.display(),
                    quarantine = %quarantine.display(),
                    error = %e,
                    "Task store file is unparsable; quarantining it and starting empty"
                );
                if let Err(rename_err) = std::fs::rename(path, &quarantine) {
                    tracing::error!(
                        error = %rename_err,
                        "Failed to quarantine corrupt task store file"
                    );
                }
                Ok(Vec::new())
            }
        }
    }

    fn persist(&self, tasks: &[Task]) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(tasks)?;
        std::fs::write(&self.path, json).map_err(|source| StoreError::Persist {
            path: self.path.clone(),
            source,
        })
    }

    /// Path of the backing snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TaskStore for JsonTaskStore {
    async fn add(&self, mut task: Task) -> Result<Task, StoreError> {
        task.normalize();
        let mut tasks = self.tasks.write().await;
        tasks.push(task.clone());
        self.persist(&tasks)?;
        tracing::debug!(task_type = %task.task_type, id = %task.id, "Task added");
        Ok(task)
    }

    async fn add_many(&self, mut new_tasks: Vec<Task>) -> Result<usize, StoreError> {
        if new_tasks.is_empty() {
            return Ok(0);
        }
        for task in &mut new_tasks {
            task.normalize();
        }
        let count = new_tasks.len();
        let mut tasks = self.tasks.write().await;
        tasks.extend(new_tasks);
        self.persist(&tasks)?;
        tracing::info!(count, "Added tasks to the queue");
        Ok(count)
    }

    async fn claim_next(&self) -> Result<Option<Task>, StoreError> {
        let mut tasks = self.tasks.write().await;
        let Some(task) = tasks.iter_mut().find(|t| t.status == TaskStatus::Pending) else {
            return Ok(None);
        };
        task.status = TaskStatus::Processing;
        task.start_time = Some(Utc::now());
        let claimed = task.clone();
        self.persist(&tasks)?;
        Ok(Some(claimed))
    }

    async fn mark_completed(
        &self,
        id: &str,
        result: serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
        if task.is_terminal() {
            return Err(StoreError::InvalidTransition {
                id: id.to_string(),
                status: task.status.to_string(),
                target: TaskStatus::Completed.to_string(),
            });
        }
        task.status = TaskStatus::Completed;
        task.completed_time = Some(Utc::now());
        task.result = Some(result);
        task.error = None;
        self.persist(&tasks)
    }

    async fn mark_failed(&self, id: &str, error: &str) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
        if task.is_terminal() {
            return Err(StoreError::InvalidTransition {
                id: id.to_string(),
                status: task.status.to_string(),
                target: TaskStatus::Failed.to_string(),
            });
        }
        task.status = TaskStatus::Failed;
        task.completed_time = Some(Utc::now());
        task.error = Some(error.to_string());
        task.result = None;
        self.persist(&tasks)
    }

    async fn requeue_stuck(&self) -> Result<usize, StoreError> {
        let mut tasks = self.tasks.write().await;
        let mut requeued = 0;
        for task in tasks.iter_mut() {
            if task.status == TaskStatus::Processing {
                task.status = TaskStatus::Pending;
                task.start_time = None;
                task.requeued_time = Some(Utc::now());
                requeued += 1;
                tracing::info!(
                    id = %task.id,
                    task_type = %task.task_type,
                    "Re-queued stuck task"
                );
            }
        }
        if requeued > 0 {
            self.persist(&tasks)?;
        }
        Ok(requeued)
    }

    async fn requeue_failed(
        &self,
        criteria: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<usize, StoreError> {
        let mut tasks = self.tasks.write().await;
        let mut requeued = 0;
        for task in tasks.iter_mut() {
            if task.status != TaskStatus::Failed {
                continue;
            }
            let matches = criteria
                .iter()
                .all(|(k, v)| task.payload.get(k) == Some(v));
            if matches {
                task.status = TaskStatus::Pending;
                task.error = None;
                task.completed_time = None;
                task.requeued_time = Some(Utc::now());
                requeued += 1;
            }
        }
        if requeued > 0 {
            self.persist(&tasks)?;
        }
        Ok(requeued)
    }

    async fn has_task_type(&self, task_type: &str) -> bool {
        self.tasks.read().await.iter().any(|t| {
            t.task_type == task_type
                && matches!(t.status, TaskStatus::Pending | TaskStatus::Processing)
        })
    }

    async fn has_pending_description(&self, description: &str) -> bool {
        self.tasks.read().await.iter().any(|t| {
            t.description.as_deref() == Some(description)
                && matches!(t.status, TaskStatus::Pending | TaskStatus::Processing)
        })
    }

    async fn get(&self, id: &str) -> Option<Task> {
        self.tasks.read().await.iter().find(|t| t.id == id).cloned()
    }

    async fn stats(&self) -> TaskStats {
        let tasks = self.tasks.read().await;
        let mut stats = TaskStats {
            total: tasks.len(),
            ..Default::default()
        };
        for task in tasks.iter() {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Processing => stats.processing += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    async fn cleanup(
        &self,
        max_age: chrono::Duration,
        backup: bool,
    ) -> Result<CleanupStats, StoreError> {
        let mut backup_created = false;
        if backup && self.path.exists() {
            let backup_path = self
                .path
                .with_extension(format!("backup-{}", Utc::now().format("%Y%m%d_%H%M%S")));
            match std::fs::copy(&self.path, &backup_path) {
                Ok(_) => {
                    backup_created = true;
                    tracing::info!(path = %backup_path.display(), "Backup created");
                }
                Err(e) => tracing::warn!(error = %e, "Failed to create backup"),
            }
        }

        let cutoff = Utc::now() - max_age;
        let mut tasks = self.tasks.write().await;
        let original_count = tasks.len();
        tasks.retain(|task| match task.status {
            // Live work is never removed, regardless of age.
            TaskStatus::Pending | TaskStatus::Processing => true,
            TaskStatus::Completed | TaskStatus::Failed => {
                !matches!(task.completed_time, Some(t) if t < cutoff)
            }
        });
        let removed_count = original_count - tasks.len();
        if removed_count > 0 {
            self.persist(&tasks)?;
            tracing::info!(removed_count, "Cleaned obsolete tasks");
        }
        Ok(CleanupStats {
            original_count,
            removed_count,
            remaining_count: tasks.len(),
            backup_created,
        })
    }

    async fn snapshot(&self) -> Vec<Task> {
        self.tasks.read().await.clone()
    }
}

/// Load tasks from an external seed file (e.g. `tasks.json`) without
/// adding them to any store. Missing file → empty list with a warning;
/// unparsable file → empty list with an error log.
pub fn load_tasks_from_file(path: &Path) -> Vec<Task> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "Tasks file not found");
        return Vec::new();
    }
    match std::fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Failed to parse tasks file");
                Vec::new()
            }
        },
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Failed to read tasks file");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> JsonTaskStore {
        JsonTaskStore::open(dir.path().join("task_queue.json")).unwrap()
    }

    #[tokio::test]
    async fn add_sets_pending_status_and_added_time_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let added = store.add(Task::new("analysis")).await.unwrap();
        assert_eq!(added.status, TaskStatus::Pending);
        let first_stamp = added.added_time.expect("added_time must be set");

        // Reloading from disk preserves the original stamp.
        drop(store);
        let store = store_in(&dir);
        let reloaded = store.get(&added.id).await.unwrap();
        assert_eq!(reloaded.added_time, Some(first_stamp));
    }

    #[tokio::test]
    async fn claim_next_transitions_and_never_returns_twice() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let task = store.add(Task::new("refactoring")).await.unwrap();

        let claimed = store.claim_next().await.unwrap().unwrap();
        assert_eq!(claimed.id, task.id);
        assert_eq!(claimed.status, TaskStatus::Processing);
        assert!(claimed.start_time.is_some());

        // Immediate re-query shows processing, and nothing else is claimable.
        assert_eq!(
            store.get(&task.id).await.unwrap().status,
            TaskStatus::Processing
        );
        assert!(store.claim_next().await.unwrap().is_none());

        // After requeue the same task can be claimed again.
        assert_eq!(store.requeue_stuck().await.unwrap(), 1);
        let reclaimed = store.claim_next().await.unwrap().unwrap();
        assert_eq!(reclaimed.id, task.id);
    }

    #[tokio::test]
    async fn claim_preserves_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let first = store.add(Task::new("a")).await.unwrap();
        let second = store.add(Task::new("b")).await.unwrap();

        assert_eq!(store.claim_next().await.unwrap().unwrap().id, first.id);
        assert_eq!(store.claim_next().await.unwrap().unwrap().id, second.id);
    }

    #[tokio::test]
    async fn requeue_stuck_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.add(Task::new("a")).await.unwrap();
        store.add(Task::new("b")).await.unwrap();
        store.claim_next().await.unwrap();
        store.claim_next().await.unwrap();

        assert_eq!(store.requeue_stuck().await.unwrap(), 2);
        assert_eq!(store.requeue_stuck().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn requeue_clears_start_time() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let task = store.add(Task::new("a")).await.unwrap();
        store.claim_next().await.unwrap();
        store.requeue_stuck().await.unwrap();

        let requeued = store.get(&task.id).await.unwrap();
        assert_eq!(requeued.status, TaskStatus::Pending);
        assert!(requeued.start_time.is_none());
        assert!(requeued.requeued_time.is_some());
    }

    #[tokio::test]
    async fn terminal_transitions_attach_exactly_one_output() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let ok = store.add(Task::new("a")).await.unwrap();
        let bad = store.add(Task::new("b")).await.unwrap();
        store.claim_next().await.unwrap();
        store.claim_next().await.unwrap();

        store
            .mark_completed(&ok.id, serde_json::json!({"message": "done"}))
            .await
            .unwrap();
        store.mark_failed(&bad.id, "handler exploded").await.unwrap();

        let completed = store.get(&ok.id).await.unwrap();
        assert_eq!(completed.status, TaskStatus::Completed);
        assert!(completed.result.is_some());
        assert!(completed.error.is_none());
        assert!(completed.completed_time.is_some());

        let failed = store.get(&bad.id).await.unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert!(failed.result.is_none());
        assert_eq!(failed.error.as_deref(), Some("handler exploded"));

        // Double-terminal is rejected.
        assert!(matches!(
            store.mark_failed(&ok.id, "again").await,
            Err(StoreError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn cleanup_never_removes_live_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        // An ancient pending task and an ancient completed one.
        let mut old_pending = Task::new("pending_forever");
        old_pending.added_time = Some(Utc::now() - chrono::Duration::days(365));
        let old_pending = store.add(old_pending).await.unwrap();

        let done = store.add(Task::new("done_long_ago")).await.unwrap();
        // Claim the completed one (skipping the pending task would reorder,
        // so claim both and requeue the first).
        store.claim_next().await.unwrap();
        store.claim_next().await.unwrap();
        store
            .mark_completed(&done.id, serde_json::json!("ok"))
            .await
            .unwrap();
        store.requeue_stuck().await.unwrap();

        // Backdate the completion stamp past the cutoff.
        {
            let mut tasks = store.tasks.write().await;
            tasks
                .iter_mut()
                .find(|t| t.id == done.id)
                .unwrap()
                .completed_time = Some(Utc::now() - chrono::Duration::days(30));
            store.persist(&tasks).unwrap();
        }

        let stats = store
            .cleanup(chrono::Duration::days(7), false)
            .await
            .unwrap();
        assert_eq!(stats.removed_count, 1);
        assert!(store.get(&old_pending.id).await.is_some());
        assert!(store.get(&done.id).await.is_none());
    }

    #[tokio::test]
    async fn cleanup_keeps_recent_terminal_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let task = store.add(Task::new("a")).await.unwrap();
        store.claim_next().await.unwrap();
        store.mark_failed(&task.id, "boom").await.unwrap();

        let stats = store
            .cleanup(chrono::Duration::days(7), false)
            .await
            .unwrap();
        assert_eq!(stats.removed_count, 0);
        assert!(store.get(&task.id).await.is_some());
    }

    #[tokio::test]
    async fn missing_and_empty_files_are_empty_queues() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert_eq!(store.stats().await.total, 0);

        let empty = dir.path().join("empty.json");
        std::fs::write(&empty, "  \n").unwrap();
        let store = JsonTaskStore::open(&empty).unwrap();
        assert_eq!(store.stats().await.total, 0);
    }

    #[tokio::test]
    async fn corrupt_file_is_quarantined_not_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task_queue.json");
        std::fs::write(&path, "{ not valid json").unwrap();

        let store = JsonTaskStore::open(&path).unwrap();
        assert_eq!(store.stats().await.total, 0);

        // The corrupt bytes still exist under a quarantine name.
        let quarantined: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_name()
                    .to_string_lossy()
                    .contains("corrupt")
            })
            .collect();
        assert_eq!(quarantined.len(), 1);
    }

    #[tokio::test]
    async fn requeue_failed_matches_payload_criteria() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let task = store
            .add(Task::new("code_fix").with_field("error_type", serde_json::json!("syntax")))
            .await
            .unwrap();
        store.claim_next().await.unwrap();
        store.mark_failed(&task.id, "could not fix").await.unwrap();

        let mut criteria = serde_json::Map::new();
        criteria.insert("error_type".to_string(), serde_json::json!("syntax"));
        assert_eq!(store.requeue_failed(&criteria).await.unwrap(), 1);

        let requeued = store.get(&task.id).await.unwrap();
        assert_eq!(requeued.status, TaskStatus::Pending);
        assert!(requeued.error.is_none());
        assert!(requeued.completed_time.is_none());
    }
}
