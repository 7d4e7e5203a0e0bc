//! Dispatcher — claims one task at a time and records its outcome.
//!
//! A handler failure never propagates out of `process_next`: it is
//! converted into a task failure and the loop continues. Only store
//! persistence errors surface to the caller.

use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::dispatch::registry::HandlerRegistry;
use crate::error::StoreError;
use crate::handlers::HandlerOutcome;
use crate::store::TaskStore;

/// Executes queued tasks through registered handlers, one at a time.
pub struct Dispatcher {
    store: Arc<dyn TaskStore>,
    registry: HandlerRegistry,
    ctx: ExecutionContext,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn TaskStore>, registry: HandlerRegistry, ctx: ExecutionContext) -> Self {
        Self {
            store,
            registry,
            ctx,
        }
    }

    /// Claim and execute the next pending task.
    ///
    /// Returns `Ok(false)` when the queue has no pending work. A task with
    /// no type or no registered handler fails terminally — a missing
    /// handler will never appear on retry, so retrying is pointless.
    pub async fn process_next(&self) -> Result<bool, StoreError> {
        let Some(task) = self.store.claim_next().await? else {
            return Ok(false);
        };

        if task.task_type.is_empty() {
            self.store
                .mark_failed(&task.id, "Task has no 'type' field")
                .await?;
            return Ok(true);
        }

        let Some(handler) = self.registry.get(&task.task_type) else {
            self.store
                .mark_failed(
                    &task.id,
                    &format!("No handler registered for type '{}'", task.task_type),
                )
                .await?;
            return Ok(true);
        };

        tracing::info!(
            task_type = %task.task_type,
            id = %task.id,
            "Executing task"
        );

        match handler.handle(&task, &self.ctx).await {
            Ok(HandlerOutcome::Success(result)) => {
                self.store.mark_completed(&task.id, result).await?;
            }
            Ok(HandlerOutcome::Failure(reason)) => {
                // The handler ran and reported that the work itself failed.
                tracing::error!(
                    task_type = %task.task_type,
                    id = %task.id,
                    reason = %reason,
                    "Task reported failure"
                );
                self.store.mark_failed(&task.id, &reason).await?;
            }
            Err(e) => {
                tracing::error!(
                    task_type = %task.task_type,
                    id = %task.id,
                    error = %e,
                    "Handler crashed"
                );
                self.store.mark_failed(&task.id, &e.to_string()).await?;
            }
        }

        Ok(true)
    }

    /// Process tasks until the queue is drained. Returns the number
    /// processed — zero means "no more work right now".
    pub async fn process_all(&self) -> Result<usize, StoreError> {
        let mut count = 0;
        while self.process_next().await? {
            count += 1;
        }
        Ok(count)
    }

    /// The registry backing this dispatcher.
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;
    use crate::error::{HandlerError, LlmError};
    use crate::handlers::TaskHandler;
    use crate::llm::LlmProvider;
    use crate::store::{JsonTaskStore, Task, TaskStatus};
    use async_trait::async_trait;

    struct NoopProvider;

    #[async_trait]
    impl LlmProvider for NoopProvider {
        async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
            Ok(String::new())
        }
        fn model_name(&self) -> &str {
            "noop"
        }
    }

    struct OkHandler;

    #[async_trait]
    impl TaskHandler for OkHandler {
        fn name(&self) -> &str {
            "ok"
        }
        async fn handle(
            &self,
            _task: &Task,
            _ctx: &ExecutionContext,
        ) -> Result<HandlerOutcome, HandlerError> {
            Ok(HandlerOutcome::message("done"))
        }
    }

    struct CrashingHandler;

    #[async_trait]
    impl TaskHandler for CrashingHandler {
        fn name(&self) -> &str {
            "crash"
        }
        async fn handle(
            &self,
            _task: &Task,
            _ctx: &ExecutionContext,
        ) -> Result<HandlerOutcome, HandlerError> {
            Err(HandlerError::ExecutionFailed {
                name: "crash".to_string(),
                reason: "synthetic crash".to_string(),
            })
        }
    }

    struct RefusingHandler;

    #[async_trait]
    impl TaskHandler for RefusingHandler {
        fn name(&self) -> &str {
            "refuse"
        }
        async fn handle(
            &self,
            _task: &Task,
            _ctx: &ExecutionContext,
        ) -> Result<HandlerOutcome, HandlerError> {
            Ok(HandlerOutcome::failure("cannot do this"))
        }
    }

    fn dispatcher_with(
        dir: &tempfile::TempDir,
        registry: HandlerRegistry,
    ) -> (Dispatcher, Arc<dyn TaskStore>) {
        let store: Arc<dyn TaskStore> =
            Arc::new(JsonTaskStore::open(dir.path().join("queue.json")).unwrap());
        let ctx = ExecutionContext::new(
            Arc::new(NoopProvider),
            Arc::clone(&store),
            AgentConfig {
                data_dir: dir.path().to_path_buf(),
                ..Default::default()
            },
        );
        (Dispatcher::new(Arc::clone(&store), registry, ctx), store)
    }

    #[tokio::test]
    async fn empty_queue_returns_false() {
        let dir = tempfile::tempdir().unwrap();
        let (dispatcher, _) = dispatcher_with(&dir, HandlerRegistry::new());
        assert!(!dispatcher.process_next().await.unwrap());
    }

    #[tokio::test]
    async fn unregistered_type_fails_terminally() {
        let dir = tempfile::tempdir().unwrap();
        let (dispatcher, store) = dispatcher_with(&dir, HandlerRegistry::new());
        for _ in 0..3 {
            store.add(Task::new("nonexistent")).await.unwrap();
        }

        assert_eq!(dispatcher.process_all().await.unwrap(), 3);

        let stats = store.stats().await;
        assert_eq!(stats.failed, 3);
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test]
    async fn missing_type_fails_terminally() {
        let dir = tempfile::tempdir().unwrap();
        let (dispatcher, store) = dispatcher_with(&dir, HandlerRegistry::new());
        let task = store.add(Task::new("")).await.unwrap();

        assert!(dispatcher.process_next().await.unwrap());
        let failed = store.get(&task.id).await.unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert!(failed.error.as_deref().unwrap().contains("type"));
    }

    #[tokio::test]
    async fn crashing_handler_records_failure_and_loop_continues() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = HandlerRegistry::new();
        registry.register("crash", Arc::new(CrashingHandler));
        registry.register("ok", Arc::new(OkHandler));
        let (dispatcher, store) = dispatcher_with(&dir, registry);

        let crashing = store.add(Task::new("crash")).await.unwrap();
        let fine = store.add(Task::new("ok")).await.unwrap();

        assert_eq!(dispatcher.process_all().await.unwrap(), 2);

        let failed = store.get(&crashing.id).await.unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert!(!failed.error.as_deref().unwrap().is_empty());

        assert_eq!(
            store.get(&fine.id).await.unwrap().status,
            TaskStatus::Completed
        );
    }

    #[tokio::test]
    async fn semantic_failure_is_recorded_as_failed() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = HandlerRegistry::new();
        registry.register("refuse", Arc::new(RefusingHandler));
        let (dispatcher, store) = dispatcher_with(&dir, registry);
        let task = store.add(Task::new("refuse")).await.unwrap();

        dispatcher.process_next().await.unwrap();

        let failed = store.get(&task.id).await.unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("cannot do this"));
    }

    #[tokio::test]
    async fn successful_handler_attaches_result() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = HandlerRegistry::new();
        registry.register("ok", Arc::new(OkHandler));
        let (dispatcher, store) = dispatcher_with(&dir, registry);
        let task = store.add(Task::new("ok")).await.unwrap();

        dispatcher.process_next().await.unwrap();

        let done = store.get(&task.id).await.unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.result.as_ref().unwrap()["message"], "done");
    }
}
