//! Strategic planner — generates new work when the queue runs dry.
//!
//! Autonomous mode asks the planner for the next batch of tasks; an empty
//! answer means the loop can shut down. The planner is advisory: a
//! malformed model response yields an empty batch, never an error.

use std::sync::Arc;

use serde::Deserialize;

use crate::error::LlmError;
use crate::llm::LlmProvider;
use crate::store::{Task, TaskStats};

/// One planned idea as returned by the model.
#[derive(Debug, Deserialize)]
struct PlannedIdea {
    #[serde(rename = "type", default = "default_idea_type")]
    task_type: String,
    description: String,
    #[serde(default)]
    priority: Option<f64>,
}

fn default_idea_type() -> String {
    "analysis".to_string()
}

/// Plans improvement work from the project's current state.
pub struct StrategicPlanner {
    llm: Arc<dyn LlmProvider>,
}

impl StrategicPlanner {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Ask the backend for the next batch of tasks. A response that cannot
    /// be parsed produces an empty batch with an error log.
    pub async fn propose_tasks(&self, stats: &TaskStats) -> Result<Vec<Task>, LlmError> {
        let prompt = format!(
            "You plan work for an autonomous development agent improving its own \
             codebase. So far it has completed {} tasks and failed {}.\n\
             Propose up to 5 new improvement tasks as a JSON array of objects \
             with keys \"type\", \"description\" and \"priority\" (1-10, lower is \
             more urgent). Valid types: analysis, refactoring, documentation, \
             test, code_review, planning. Respond with the JSON array only.",
            stats.completed, stats.failed
        );
        let response = self.llm.generate(&prompt).await?;
        let cleaned = strip_code_fences(&response);

        let ideas: Vec<PlannedIdea> = match serde_json::from_str(cleaned) {
            Ok(ideas) => ideas,
            Err(e) => {
                tracing::error!(error = %e, "Failed to parse planner response");
                return Ok(Vec::new());
            }
        };

        tracing::info!(count = ideas.len(), "Planner proposed tasks");
        Ok(ideas
            .into_iter()
            .map(|idea| {
                let mut task = Task::new(idea.task_type).with_description(idea.description);
                if let Some(priority) = idea.priority {
                    task = task.with_field("priority", serde_json::json!(priority));
                }
                task
            })
            .collect())
    }
}

/// Strip a surrounding markdown code fence, if present. Models often wrap
/// JSON in ```json fences despite instructions.
fn strip_code_fences(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}
