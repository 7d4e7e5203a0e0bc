//! Priority scheduler for background self-improvement work.
//!
//! Independent of the main queue: improvement ideas accumulate here and
//! only flow into the task store when it has no pending work. Ordering is
//! strictly total — priority, then insertion time, then a monotone
//! sequence counter — so two ideas added in the same instant still pop in
//! a deterministic order.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::store::{Task, TaskStore};

/// A scheduled improvement, ordered by the explicit comparator below.
#[derive(Debug, Clone)]
pub struct PriorityTask {
    /// Lower wins.
    pub priority: f64,
    pub inserted_at: DateTime<Utc>,
    /// Monotone tie-breaker assigned by the scheduler.
    pub seq: u64,
    pub description: String,
}

impl PartialEq for PriorityTask {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PriorityTask {}

impl PartialOrd for PriorityTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PriorityTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| self.inserted_at.cmp(&other.inserted_at))
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Keyword-band scoring for improvement descriptions. Intentionally
/// simple and swappable — the bands matter, not the exact word list.
pub fn classify_priority(description: &str) -> f64 {
    let lower = description.to_lowercase();
    if ["critical", "security", "bug", "fix", "crash"]
        .iter()
        .any(|k| lower.contains(k))
    {
        1.0
    } else if ["performance", "optimiz", "slow"].iter().any(|k| lower.contains(k)) {
        2.0
    } else if ["refactor", "clean", "simplif"].iter().any(|k| lower.contains(k)) {
        3.0
    } else if ["document", "test", "comment", "doc"].iter().any(|k| lower.contains(k)) {
        8.0
    } else {
        5.0
    }
}

/// Min-priority queue of improvement ideas.
pub struct SelfImprovementScheduler {
    heap: BinaryHeap<Reverse<PriorityTask>>,
    next_seq: u64,
    score: fn(&str) -> f64,
}

impl SelfImprovementScheduler {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
            score: classify_priority,
        }
    }

    /// Replace the scoring function.
    pub fn with_scoring(mut self, score: fn(&str) -> f64) -> Self {
        self.score = score;
        self
    }

    /// Schedule an improvement, scoring it from its description.
    pub fn add(&mut self, description: impl Into<String>) -> PriorityTask {
        let description = description.into();
        let priority = (self.score)(&description);
        self.add_with_priority(description, priority)
    }

    /// Schedule an improvement with an explicit priority.
    pub fn add_with_priority(
        &mut self,
        description: impl Into<String>,
        priority: f64,
    ) -> PriorityTask {
        let task = PriorityTask {
            priority,
            inserted_at: Utc::now(),
            seq: self.next_seq,
            description: description.into(),
        };
        self.next_seq += 1;
        tracing::debug!(
            priority,
            description = %task.description,
            "Scheduled improvement"
        );
        self.heap.push(Reverse(task.clone()));
        task
    }

    /// Pop the highest-priority improvement.
    pub fn get_next(&mut self) -> Option<PriorityTask> {
        self.heap.pop().map(|Reverse(t)| t)
    }

    /// The top `n` improvements, best first, without mutating the queue.
    pub fn peek_top(&self, n: usize) -> Vec<PriorityTask> {
        let mut copy = self.heap.clone();
        let mut top = Vec::with_capacity(n.min(copy.len()));
        for _ in 0..n {
            match copy.pop() {
                Some(Reverse(t)) => top.push(t),
                None => break,
            }
        }
        top
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Bridge into the main queue: when the store has no pending work, pop
    /// the next scheduled improvement and enqueue it as a
    /// `self_improvement` task. Skips (and drops) improvements whose
    /// description is already pending — this is where duplicate
    /// accumulation is prevented, since the store itself never dedups.
    ///
    /// Returns the enqueued task, if any.
    pub async fn drain_into(
        &mut self,
        store: &Arc<dyn TaskStore>,
    ) -> Result<Option<Task>, StoreError> {
        if !store.stats().await.is_idle() {
            return Ok(None);
        }
        while let Some(next) = self.get_next() {
            if store.has_pending_description(&next.description).await {
                tracing::debug!(
                    description = %next.description,
                    "Skipping duplicate scheduled improvement"
                );
                continue;
            }
            let task = Task::new("self_improvement")
                .with_description(next.description.clone())
                .with_field("improvement_type", serde_json::json!("full_cycle"))
                .with_field("priority", serde_json::json!(next.priority));
            let added = store.add(task).await?;
            return Ok(Some(added));
        }
        Ok(None)
    }
}

impl Default for SelfImprovementScheduler {
    fn default() -> Self {
        Self::new()
    }
}
