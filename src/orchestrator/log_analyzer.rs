//! Log analyzer — turns error-level log lines into fix tasks.

use std::collections::HashSet;
use std::path::PathBuf;

use regex::Regex;

use crate::store::Task;

/// Cap on tasks produced by a single scan; a noisy log should not flood
/// the queue.
const MAX_TASKS_PER_SCAN: usize = 20;

/// One-shot scanner over the agent's error log.
pub struct LogAnalyzer {
    log_path: PathBuf,
    pattern: Regex,
}

impl LogAnalyzer {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
            // tracing's fmt layer writes "<timestamp> ERROR <target>: <message>".
            pattern: Regex::new(r"ERROR\s+(?:[\w:]+:\s*)?(.+)").expect("static regex"),
        }
    }

    /// Scan the log and produce deduplicated `code_fix` tasks. A missing
    /// log file is an empty result, not an error.
    pub fn scan(&self) -> std::io::Result<Vec<Task>> {
        if !self.log_path.exists() {
            tracing::warn!(path = %self.log_path.display(), "Error log not found; nothing to analyze");
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.log_path)?;

        let mut seen = HashSet::new();
        let mut tasks = Vec::new();
        for line in content.lines() {
            let Some(captures) = self.pattern.captures(line) else {
                continue;
            };
            let message = captures[1].trim().to_string();
            if message.is_empty() || !seen.insert(message.clone()) {
                continue;
            }
            tasks.push(
                Task::new("code_fix")
                    .with_description(format!("Fix error observed in logs: {message}"))
                    .with_field("error_details", serde_json::json!(message))
                    .with_field("source", serde_json::json!("log_analyzer")),
            );
            if tasks.len() >= MAX_TASKS_PER_SCAN {
                tracing::warn!(
                    limit = MAX_TASKS_PER_SCAN,
                    "Scan hit the task cap; remaining errors left for the next pass"
                );
                break;
            }
        }

        tracing::info!(count = tasks.len(), "Log scan produced fix tasks");
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_and_dedups_error_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("agent_errors.log");
        std::fs::write(
            &log,
            "2026-08-06T10:00:00Z  INFO autodev: started\n\
             2026-08-06T10:00:01Z ERROR autodev::dispatch: handler crashed: oh no\n\
             2026-08-06T10:00:02Z ERROR autodev::dispatch: handler crashed: oh no\n\
             2026-08-06T10:00:03Z ERROR autodev::store: persist failed\n",
        )
        .unwrap();

        let tasks = LogAnalyzer::new(&log).scan().unwrap();
        assert_eq!(tasks.len(), 2);
        assert!(tasks.iter().all(|t| t.task_type == "code_fix"));
        assert!(
            tasks[0]
                .payload
                .get("error_details")
                .unwrap()
                .as_str()
                .unwrap()
                .contains("handler crashed")
        );
    }

    #[test]
    fn missing_log_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let tasks = LogAnalyzer::new(dir.path().join("nope.log")).scan().unwrap();
        assert!(tasks.is_empty());
    }
}
