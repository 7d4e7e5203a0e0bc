//! Pull request monitor — reconciles externally-created change proposals.
//!
//! The orchestrator registers every proposal it opens; each daemon poll
//! asks the hosting provider where they stand. Merged proposals are closed
//! and recorded; manually-closed ones are recorded; open ones are left
//! alone. Terminal entries drop out of the active set at the persist that
//! ends the poll — the caller gets the closed count so it can log.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::gitops::{HostingClient, ProposalState};

/// Tracking status of a monitored proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorStatus {
    Open,
    MergedAndClosed,
    MergedButCloseFailed,
    ClosedManually,
}

impl MonitorStatus {
    fn is_terminal(self) -> bool {
        matches!(
            self,
            MonitorStatus::MergedAndClosed | MonitorStatus::ClosedManually
        )
    }
}

/// A change proposal under observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoredProposal {
    pub number: u64,
    pub branch: String,
    pub description: String,
    pub status: MonitorStatus,
    pub created_at: DateTime<Utc>,
}

impl MonitoredProposal {
    pub fn new(number: u64, branch: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            number,
            branch: branch.into(),
            description: description.into(),
            status: MonitorStatus::Open,
            created_at: Utc::now(),
        }
    }
}

/// Tracks proposals in a small JSON file next to the task queue.
pub struct PullRequestMonitor {
    hosting: Arc<dyn HostingClient>,
    path: PathBuf,
    proposals: RwLock<Vec<MonitoredProposal>>,
}

impl PullRequestMonitor {
    /// Open the monitor, loading any previously tracked proposals.
    pub fn open(hosting: Arc<dyn HostingClient>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let proposals = Self::load(&path);
        Self {
            hosting,
            path,
            proposals: RwLock::new(proposals),
        }
    }

    fn load(path: &Path) -> Vec<MonitoredProposal> {
        if !path.exists() {
            return Vec::new();
        }
        match std::fs::read_to_string(path) {
            Ok(content) if content.trim().is_empty() => Vec::new(),
            Ok(content) => match serde_json::from_str(&content) {
                Ok(proposals) => proposals,
                Err(e) => {
                    tracing::error!(
                        path = %path.display(),
                        error = %e,
                        "Failed to parse monitor file; starting with empty tracking"
                    );
                    Vec::new()
                }
            },
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Failed to read monitor file");
                Vec::new()
            }
        }
    }

    fn persist(&self, proposals: &[MonitoredProposal]) {
        match serde_json::to_string_pretty(proposals) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.path, json) {
                    tracing::error!(path = %self.path.display(), error = %e, "Failed to persist monitor file");
                }
            }
            Err(e) => tracing::error!(error = %e, "Failed to serialize monitored proposals"),
        }
    }

    /// Register a newly created proposal for tracking.
    pub async fn add(&self, proposal: MonitoredProposal) {
        let mut proposals = self.proposals.write().await;
        tracing::info!(number = proposal.number, "Added pull request to monitoring");
        proposals.push(proposal);
        self.persist(&proposals);
    }

    /// Currently tracked proposals.
    pub async fn tracked(&self) -> Vec<MonitoredProposal> {
        self.proposals.read().await.clone()
    }

    /// Query every tracked proposal and reconcile its state. Returns the
    /// number of proposals closed by this pass.
    pub async fn check_and_reconcile(&self) -> usize {
        let mut proposals = self.proposals.write().await;
        if proposals.is_empty() {
            return 0;
        }
        tracing::debug!(count = proposals.len(), "Checking monitored pull requests");

        // Status queries are independent reads; fetch them concurrently
        // before mutating anything.
        let states = futures::future::join_all(proposals.iter().map(|p| {
            let hosting = Arc::clone(&self.hosting);
            let number = p.number;
            async move { (number, hosting.pull_request_state(number).await) }
        }))
        .await;
        let states: std::collections::HashMap<u64, _> = states.into_iter().collect();

        let mut closed_count = 0;
        for proposal in proposals.iter_mut() {
            let state = match states.get(&proposal.number) {
                Some(Ok(state)) => *state,
                Some(Err(e)) => {
                    // Unknown state: keep the entry and try again next poll.
                    tracing::warn!(
                        number = proposal.number,
                        error = %e,
                        "Failed to query pull request status; keeping it monitored"
                    );
                    continue;
                }
                None => continue,
            };
            match state {
                ProposalState::Merged => {
                    match self.hosting.close_pull_request(proposal.number).await {
                        Ok(()) => {
                            proposal.status = MonitorStatus::MergedAndClosed;
                            closed_count += 1;
                            tracing::info!(number = proposal.number, "Merged pull request closed");
                        }
                        Err(e) => {
                            // Not silently dropped: the failure stays visible
                            // and the entry stays in the active set.
                            proposal.status = MonitorStatus::MergedButCloseFailed;
                            tracing::warn!(
                                number = proposal.number,
                                error = %e,
                                "Pull request merged but close failed"
                            );
                        }
                    }
                }
                ProposalState::Closed => {
                    proposal.status = MonitorStatus::ClosedManually;
                    tracing::info!(
                        number = proposal.number,
                        "Pull request was closed without merging"
                    );
                }
                ProposalState::Open => {}
            }
        }

        proposals.retain(|p| !p.status.is_terminal());
        self.persist(&proposals);
        closed_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HostingError;
    use crate::gitops::ProposalInfo;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Scripted hosting backend.
    struct FakeHosting {
        states: Mutex<HashMap<u64, ProposalState>>,
        fail_close_for: Option<u64>,
    }

    impl FakeHosting {
        fn with_states(states: &[(u64, ProposalState)]) -> Self {
            Self {
                states: Mutex::new(states.iter().cloned().collect()),
                fail_close_for: None,
            }
        }
    }

    #[async_trait]
    impl HostingClient for FakeHosting {
        async fn create_pull_request(
            &self,
            _title: &str,
            _body: &str,
            _head: &str,
            _base: &str,
        ) -> Result<ProposalInfo, HostingError> {
            Ok(ProposalInfo {
                number: 1,
                url: "http://example/pr/1".to_string(),
            })
        }

        async fn pull_request_state(&self, number: u64) -> Result<ProposalState, HostingError> {
            self.states
                .lock()
                .unwrap()
                .get(&number)
                .copied()
                .ok_or(HostingError::NotFound { number })
        }

        async fn close_pull_request(&self, number: u64) -> Result<(), HostingError> {
            if self.fail_close_for == Some(number) {
                return Err(HostingError::Status {
                    status: 403,
                    body: "forbidden".to_string(),
                });
            }
            self.states
                .lock()
                .unwrap()
                .insert(number, ProposalState::Closed);
            Ok(())
        }
    }

    fn monitor_with(
        dir: &tempfile::TempDir,
        hosting: FakeHosting,
    ) -> PullRequestMonitor {
        PullRequestMonitor::open(Arc::new(hosting), dir.path().join("monitored_prs.json"))
    }

    #[tokio::test]
    async fn merged_proposals_are_closed_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = monitor_with(
            &dir,
            FakeHosting::with_states(&[(7, ProposalState::Merged), (8, ProposalState::Open)]),
        );
        monitor.add(MonitoredProposal::new(7, "branch-7", "first")).await;
        monitor.add(MonitoredProposal::new(8, "branch-8", "second")).await;

        let closed = monitor.check_and_reconcile().await;
        assert_eq!(closed, 1);

        // Only the open proposal remains tracked.
        let tracked = monitor.tracked().await;
        assert_eq!(tracked.len(), 1);
        assert_eq!(tracked[0].number, 8);
        assert_eq!(tracked[0].status, MonitorStatus::Open);
    }

    #[tokio::test]
    async fn close_failure_keeps_the_entry_visible() {
        let dir = tempfile::tempdir().unwrap();
        let mut hosting = FakeHosting::with_states(&[(3, ProposalState::Merged)]);
        hosting.fail_close_for = Some(3);
        let monitor = monitor_with(&dir, hosting);
        monitor.add(MonitoredProposal::new(3, "branch-3", "stuck")).await;

        let closed = monitor.check_and_reconcile().await;
        assert_eq!(closed, 0);

        let tracked = monitor.tracked().await;
        assert_eq!(tracked.len(), 1);
        assert_eq!(tracked[0].status, MonitorStatus::MergedButCloseFailed);
    }

    #[tokio::test]
    async fn manually_closed_proposals_are_recorded_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = monitor_with(&dir, FakeHosting::with_states(&[(5, ProposalState::Closed)]));
        monitor.add(MonitoredProposal::new(5, "branch-5", "abandoned")).await;

        assert_eq!(monitor.check_and_reconcile().await, 0);
        assert!(monitor.tracked().await.is_empty());
    }

    #[tokio::test]
    async fn status_query_failure_leaves_the_entry_monitored() {
        let dir = tempfile::tempdir().unwrap();
        // No scripted state → every query errors with NotFound.
        let monitor = monitor_with(&dir, FakeHosting::with_states(&[]));
        monitor.add(MonitoredProposal::new(9, "branch-9", "flaky")).await;

        assert_eq!(monitor.check_and_reconcile().await, 0);
        assert_eq!(monitor.tracked().await.len(), 1);
    }

    #[tokio::test]
    async fn tracking_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitored_prs.json");
        {
            let monitor = PullRequestMonitor::open(
                Arc::new(FakeHosting::with_states(&[])),
                &path,
            );
            monitor.add(MonitoredProposal::new(11, "branch-11", "persisted")).await;
        }
        let monitor =
            PullRequestMonitor::open(Arc::new(FakeHosting::with_states(&[])), &path);
        assert_eq!(monitor.tracked().await.len(), 1);
        assert_eq!(monitor.tracked().await[0].number, 11);
    }
}
