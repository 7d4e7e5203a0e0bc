//! Built-in handlers for the agent's own task types.
//!
//! These are deliberately thin: prompt construction and content generation
//! live behind the `LlmProvider` interface, and anything heavier (applying
//! refactorings, running test suites) belongs to external tooling. The
//! engine only cares that each handler returns an outcome.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::ExecutionContext;
use crate::error::HandlerError;
use crate::handlers::{HandlerOutcome, TaskHandler};
use crate::store::Task;

/// The full set of handlers registered at startup.
pub fn builtin_handlers() -> Vec<(&'static str, Arc<dyn TaskHandler>)> {
    vec![
        ("self_improvement", Arc::new(SelfImprovementHandler)),
        ("code_fix", Arc::new(CodeFixHandler)),
        ("documentation", Arc::new(DocumentationHandler)),
        (
            "analysis",
            Arc::new(GenerativeHandler::new(
                "analysis",
                "Analyze the following aspect of the project and summarize findings",
            )),
        ),
        (
            "code_generation",
            Arc::new(GenerativeHandler::new(
                "code_generation",
                "Generate the code described below",
            )),
        ),
        (
            "refactoring",
            Arc::new(GenerativeHandler::new(
                "refactoring",
                "Propose a refactoring for the following",
            )),
        ),
        (
            "test",
            Arc::new(GenerativeHandler::new(
                "test",
                "Propose tests covering the following",
            )),
        ),
        (
            "planning",
            Arc::new(GenerativeHandler::new(
                "planning",
                "Break the following goal into concrete development steps",
            )),
        ),
        (
            "code_review",
            Arc::new(GenerativeHandler::new(
                "code_review",
                "Review the following change for correctness and style issues",
            )),
        ),
        (
            "query",
            Arc::new(GenerativeHandler::new("query", "Answer the following question")),
        ),
    ]
}

fn task_description(task: &Task) -> &str {
    task.description.as_deref().unwrap_or("(no description)")
}

/// Self-improvement cycle. A `full_cycle` task seeds the next round of
/// follow-up work into the queue; an `error_analysis` task digests recent
/// failures into an avoidance note.
pub struct SelfImprovementHandler;

#[async_trait]
impl TaskHandler for SelfImprovementHandler {
    fn name(&self) -> &str {
        "self_improvement"
    }

    async fn handle(
        &self,
        task: &Task,
        ctx: &ExecutionContext,
    ) -> Result<HandlerOutcome, HandlerError> {
        let improvement_type = task
            .payload
            .get("improvement_type")
            .and_then(|v| v.as_str())
            .unwrap_or("full_cycle");

        match improvement_type {
            "full_cycle" => {
                let followups = vec![
                    Task::new("analysis")
                        .with_description("Collect code metrics to evaluate recent improvements"),
                    Task::new("self_improvement")
                        .with_field("improvement_type", serde_json::json!("error_analysis"))
                        .with_description(
                            "Analyze recent task failures and derive avoidance strategies",
                        ),
                ];
                let created = ctx
                    .store
                    .add_many(followups)
                    .await
                    .map_err(|e| HandlerError::ExecutionFailed {
                        name: self.name().to_string(),
                        reason: e.to_string(),
                    })?;
                tracing::info!(created, "Full cycle seeded follow-up tasks");
                Ok(HandlerOutcome::success(serde_json::json!({
                    "status": "success",
                    "message": "Full self-improvement cycle completed",
                    "tasks_created": created,
                })))
            }
            "error_analysis" => {
                let failures: Vec<String> = ctx
                    .store
                    .snapshot()
                    .await
                    .into_iter()
                    .filter_map(|t| t.error)
                    .take(20)
                    .collect();
                if failures.is_empty() {
                    return Ok(HandlerOutcome::message("No recent failures to analyze"));
                }
                let prompt = format!(
                    "These task failures occurred recently:\n{}\n\n\
                     Summarize the recurring causes and how to avoid them.",
                    failures.join("\n")
                );
                let summary = ctx.llm.generate(&prompt).await?;
                Ok(HandlerOutcome::success(serde_json::json!({
                    "status": "success",
                    "message": "Error analysis completed",
                    "summary": summary,
                })))
            }
            other => Ok(HandlerOutcome::failure(format!(
                "Unknown improvement type '{other}'"
            ))),
        }
    }
}

/// Fixes flagged errors. The payload must carry `error_details`; the
/// handler asks the backend for a suggested fix and records it.
pub struct CodeFixHandler;

#[async_trait]
impl TaskHandler for CodeFixHandler {
    fn name(&self) -> &str {
        "code_fix"
    }

    async fn handle(
        &self,
        task: &Task,
        ctx: &ExecutionContext,
    ) -> Result<HandlerOutcome, HandlerError> {
        let Some(details) = task.payload.get("error_details").and_then(|v| v.as_str()) else {
            return Ok(HandlerOutcome::failure(
                "code_fix task is missing the 'error_details' field",
            ));
        };
        let target = task
            .payload
            .get("target_file")
            .and_then(|v| v.as_str())
            .unwrap_or("(unknown file)");

        let prompt = format!(
            "An error was observed in {target}:\n{details}\n\n\
             Suggest a concrete fix, quoting the code to change."
        );
        let suggestion = ctx.llm.generate(&prompt).await?;
        Ok(HandlerOutcome::success(serde_json::json!({
            "status": "success",
            "message": format!("Fix suggested for {target}"),
            "suggestion": suggestion,
        })))
    }
}

/// Generates a documentation page under `<data-dir>/docs/`.
pub struct DocumentationHandler;

#[async_trait]
impl TaskHandler for DocumentationHandler {
    fn name(&self) -> &str {
        "documentation"
    }

    async fn handle(
        &self,
        task: &Task,
        ctx: &ExecutionContext,
    ) -> Result<HandlerOutcome, HandlerError> {
        let description = task_description(task);
        let prompt = format!("Write a short markdown document: {description}");
        let content = ctx.llm.generate(&prompt).await?;

        let docs_dir = ctx.config.data_dir.join("docs");
        std::fs::create_dir_all(&docs_dir)?;
        let file = docs_dir.join(format!("{}.md", task.id));
        std::fs::write(&file, content)?;

        Ok(HandlerOutcome::success(serde_json::json!({
            "status": "success",
            "message": "Documentation updated",
            "path": file.display().to_string(),
        })))
    }
}

/// Shared shape for the prompt-in/summary-out task types.
pub struct GenerativeHandler {
    name: &'static str,
    instruction: &'static str,
}

impl GenerativeHandler {
    pub fn new(name: &'static str, instruction: &'static str) -> Self {
        Self { name, instruction }
    }
}

#[async_trait]
impl TaskHandler for GenerativeHandler {
    fn name(&self) -> &str {
        self.name
    }

    async fn handle(
        &self,
        task: &Task,
        ctx: &ExecutionContext,
    ) -> Result<HandlerOutcome, HandlerError> {
        let prompt = format!("{}:\n{}", self.instruction, task_description(task));
        let output = ctx.llm.generate(&prompt).await?;
        Ok(HandlerOutcome::success(serde_json::json!({
            "status": "success",
            "message": format!("{} completed", self.name),
            "output": output,
        })))
    }
}
