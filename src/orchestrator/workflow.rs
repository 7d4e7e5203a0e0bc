//! Workflow orchestrator — mode loops and the self-improvement transaction.
//!
//! Everything in this module is best-effort except `self_improve`, which
//! is all-or-nothing: a failure anywhere between branch creation and the
//! final commit restores the original branch and deletes the improvement
//! branch, leaving the repository exactly as it was before the attempt
//! (the initial auto-commit of pre-existing dirty state is kept).

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::config::AgentConfig;
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::gitops::{GitRepo, HostingClient, ProposalInfo};
use crate::monitor::{MonitoredProposal, PullRequestMonitor};
use crate::orchestrator::log_analyzer::LogAnalyzer;
use crate::orchestrator::planner::StrategicPlanner;
use crate::store::{Task, TaskStats, TaskStatus, TaskStore, load_tasks_from_file};

/// What a self-improvement run produced.
#[derive(Debug, Default)]
pub struct ImprovementReport {
    /// Branch the changes live on (`None` in direct mode).
    pub branch: Option<String>,
    /// Tasks drained during the cycle.
    pub processed: usize,
    /// Whether a commit was created.
    pub committed: bool,
    /// Whether the branch was pushed.
    pub pushed: bool,
    /// The opened change proposal, if any.
    pub proposal: Option<ProposalInfo>,
}

/// Drives the dispatch loop and the self-improvement workflow.
pub struct WorkflowOrchestrator {
    config: AgentConfig,
    store: Arc<dyn TaskStore>,
    dispatcher: Dispatcher,
    scheduler: Mutex<crate::schedule::SelfImprovementScheduler>,
    git: Option<GitRepo>,
    hosting: Option<Arc<dyn HostingClient>>,
    monitor: Option<Arc<PullRequestMonitor>>,
    planner: Option<StrategicPlanner>,
}

impl WorkflowOrchestrator {
    pub fn new(config: AgentConfig, store: Arc<dyn TaskStore>, dispatcher: Dispatcher) -> Self {
        Self {
            config,
            store,
            dispatcher,
            scheduler: Mutex::new(crate::schedule::SelfImprovementScheduler::new()),
            git: None,
            hosting: None,
            monitor: None,
            planner: None,
        }
    }

    /// Attach the repository the agent improves.
    pub fn with_git(mut self, git: GitRepo) -> Self {
        self.git = Some(git);
        self
    }

    /// Attach the hosting client and its proposal monitor.
    pub fn with_hosting(
        mut self,
        hosting: Arc<dyn HostingClient>,
        monitor: Arc<PullRequestMonitor>,
    ) -> Self {
        self.hosting = Some(hosting);
        self.monitor = Some(monitor);
        self
    }

    /// Attach the strategic planner used by autonomous mode.
    pub fn with_planner(mut self, planner: StrategicPlanner) -> Self {
        self.planner = Some(planner);
        self
    }

    /// Seed the improvement scheduler with a standing idea.
    pub async fn schedule_improvement(&self, description: &str) {
        self.scheduler.lock().await.add(description);
    }

    // ── agent mode ──────────────────────────────────────────────────────

    /// Drain the queue to empty, loading seed tasks first when it is idle.
    pub async fn run_once(&self) -> Result<TaskStats> {
        tracing::info!("Starting agent run");
        if self.store.stats().await.is_idle() {
            let seeds = load_tasks_from_file(&self.config.tasks_file);
            if seeds.is_empty() {
                tracing::warn!("No tasks to execute");
            } else {
                self.store.add_many(seeds).await.map_err(Error::Store)?;
            }
        }

        loop {
            let processed = self.dispatcher.process_all().await.map_err(Error::Store)?;
            if processed == 0 {
                tracing::info!("Task queue is empty; finishing");
                break;
            }
            tracing::info!(processed, "Processed tasks this cycle; checking for new work");
        }

        let stats = self.store.stats().await;
        tracing::info!(
            completed = stats.completed,
            failed = stats.failed,
            "Agent run finished"
        );
        Ok(stats)
    }

    // ── daemon mode ─────────────────────────────────────────────────────

    /// Poll loop: scheduler bridge, proposal reconciliation, queue drain,
    /// sleep. A failed cycle is logged and the loop continues; only an
    /// interrupt signal stops it, after the current task finishes.
    pub async fn run_daemon(&self) -> Result<()> {
        tracing::info!(
            interval_secs = self.config.check_interval.as_secs(),
            "Starting daemon loop"
        );
        loop {
            if let Err(e) = self.daemon_cycle().await {
                tracing::error!(error = %e, "Daemon cycle failed; continuing");
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.check_interval) => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Interrupt received; shutting down daemon");
                    break;
                }
            }
        }
        Ok(())
    }

    async fn daemon_cycle(&self) -> Result<()> {
        // 1. Feed one scheduled improvement into an idle queue.
        {
            let mut scheduler = self.scheduler.lock().await;
            if let Some(task) = scheduler.drain_into(&self.store).await.map_err(Error::Store)? {
                tracing::info!(
                    description = task.description.as_deref().unwrap_or(""),
                    "Scheduled improvement moved into the queue"
                );
            }
        }

        // 2. Reconcile monitored pull requests.
        if let Some(monitor) = &self.monitor {
            let closed = monitor.check_and_reconcile().await;
            if closed > 0 {
                tracing::info!(closed, "Closed merged pull requests");
            }
        }

        // 3. Drain the main queue.
        let processed = self.dispatcher.process_all().await.map_err(Error::Store)?;
        if processed > 0 {
            tracing::info!(processed, "Processed tasks from the main queue");
        } else {
            tracing::debug!("No active tasks");
        }
        Ok(())
    }

    // ── autonomous mode ─────────────────────────────────────────────────

    /// Generate-and-execute loop: when the queue is idle, ask the planner
    /// for new tasks and stop if it has none; otherwise process one task.
    /// Loop errors back off for a minute instead of exiting.
    pub async fn run_autonomous(&self) -> Result<()> {
        let planner = self
            .planner
            .as_ref()
            .ok_or_else(|| Error::Workflow("autonomous mode requires a planner".to_string()))?;
        tracing::info!("Starting autonomous loop");

        loop {
            let step = async {
                if self.store.stats().await.is_idle() {
                    tracing::info!("Task queue is empty; engaging strategic planner");
                    let stats = self.store.stats().await;
                    let tasks = planner.propose_tasks(&stats).await.map_err(Error::Llm)?;
                    if tasks.is_empty() {
                        tracing::info!("Planner generated no new tasks; shutting down");
                        return Ok::<bool, Error>(false);
                    }
                    let added = self.store.add_many(tasks).await.map_err(Error::Store)?;
                    tracing::info!(added, "Planner added new tasks");
                }
                self.dispatcher.process_next().await.map_err(Error::Store)?;
                Ok(true)
            }
            .await;

            match step {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    tracing::error!(error = %e, "Autonomous loop error; retrying in 60s");
                    tokio::time::sleep(std::time::Duration::from_secs(60)).await;
                }
            }
        }
        Ok(())
    }

    // ── continuous supervisor mode ──────────────────────────────────────

    /// Supervise repeated improvement cycles by delegating each one to a
    /// fresh process of this binary in `auto` mode. Child exit codes are
    /// observed, not fatal; every tenth cycle runs store cleanup.
    pub async fn run_continuous(&self) -> Result<()> {
        let exe = std::env::current_exe()
            .map_err(|e| Error::Workflow(format!("cannot locate own binary: {e}")))?;
        tracing::info!("Starting continuous improvement loop");
        let mut cycle: u64 = 0;

        loop {
            cycle += 1;
            tracing::info!(cycle, "Starting improvement cycle");
            let started = Utc::now();

            let status = tokio::process::Command::new(&exe)
                .arg("--mode")
                .arg("auto")
                .arg("--data-dir")
                .arg(&self.config.data_dir)
                .arg("--repo")
                .arg(&self.config.repo_path)
                .status()
                .await;
            match status {
                Ok(s) if s.success() => tracing::info!(cycle, "Agent cycle completed"),
                Ok(s) => tracing::warn!(cycle, code = s.code(), "Agent cycle exited non-zero"),
                Err(e) => tracing::error!(cycle, error = %e, "Failed to spawn agent cycle"),
            }

            if cycle % 10 == 0 {
                match self
                    .store
                    .cleanup(chrono::Duration::days(3), true)
                    .await
                {
                    Ok(stats) => tracing::info!(removed = stats.removed_count, "Cleaned old tasks"),
                    Err(e) => tracing::warn!(error = %e, "Cleanup failed"),
                }
            }

            let elapsed = (Utc::now() - started).num_seconds();
            tracing::info!(cycle, elapsed_secs = elapsed, "Cycle finished");

            tokio::select! {
                _ = tokio::time::sleep(self.config.check_interval) => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!(cycles = cycle, "Interrupt received; stopping continuous loop");
                    break;
                }
            }
        }
        Ok(())
    }

    // ── log analysis mode ───────────────────────────────────────────────

    /// One-shot: scan the error log and enqueue fix tasks.
    pub async fn analyze_logs(&self) -> Result<usize> {
        let analyzer = LogAnalyzer::new(self.config.error_log_file());
        let tasks = analyzer
            .scan()
            .map_err(|e| Error::Workflow(format!("log scan failed: {e}")))?;
        if tasks.is_empty() {
            return Ok(0);
        }
        let added = self.store.add_many(tasks).await.map_err(Error::Store)?;
        tracing::info!(added, "Log analysis enqueued fix tasks");
        Ok(added)
    }

    // ── self-improvement transaction ────────────────────────────────────

    /// Run one self-improvement attempt.
    ///
    /// In branch mode (`direct == false`) the whole attempt happens on a
    /// fresh `self-improvement-<timestamp>` branch; any error after the
    /// branch exists rolls the repository back to the original branch and
    /// deletes the improvement branch. Direct mode works on the current
    /// branch with no rollback.
    pub async fn self_improve(&self, direct: bool) -> Result<ImprovementReport> {
        let git = self
            .git
            .as_ref()
            .ok_or_else(|| Error::Workflow("no repository configured".to_string()))?;
        tracing::info!(direct, "Starting self-improvement");

        let original_branch = git.current_branch().await.map_err(Error::Git)?;

        // Outstanding user work is committed, never discarded. This commit
        // survives a rollback.
        if !git.is_clean().await.map_err(Error::Git)? {
            tracing::info!("Working tree is dirty; committing outstanding changes first");
            git.add_all().await.map_err(Error::Git)?;
            let msg = format!(
                "auto: snapshot outstanding changes before self-improvement {}",
                Utc::now().format("%Y-%m-%d %H:%M:%S")
            );
            if let Err(e) = git.commit(&msg).await {
                tracing::warn!(error = %e, "Auto-commit failed; continuing");
            }
        }

        let branch = format!("self-improvement-{}", Utc::now().format("%Y%m%d-%H%M%S"));
        if !direct {
            // A branch that cannot be created aborts the attempt before it
            // has any side effects.
            git.create_and_checkout_branch(&branch)
                .await
                .map_err(Error::Git)?;
        }

        match self.improvement_cycle(direct, &branch).await {
            Ok(mut report) => {
                if !direct {
                    git.checkout_branch(&original_branch)
                        .await
                        .map_err(Error::Git)?;
                    report.branch = Some(branch.clone());
                    tracing::info!(
                        %branch,
                        "Self-improvement finished; changes left on the improvement branch"
                    );
                }
                Ok(report)
            }
            Err(e) => {
                tracing::error!(error = %e, "Self-improvement failed");
                if !direct {
                    self.rollback(git, &original_branch, &branch).await;
                }
                Err(e)
            }
        }
    }

    /// Steps 3–4 of the transaction: drain the synthetic cycle task, then
    /// commit/push/propose whatever it changed.
    async fn improvement_cycle(&self, direct: bool, branch: &str) -> Result<ImprovementReport> {
        let git = self
            .git
            .as_ref()
            .ok_or_else(|| Error::Workflow("no repository configured".to_string()))?;

        let cycle_task = self
            .store
            .add(
                Task::new("self_improvement")
                    .with_description("Full self-improvement cycle")
                    .with_field("improvement_type", serde_json::json!("full_cycle")),
            )
            .await
            .map_err(Error::Store)?;

        let processed = self.dispatcher.process_all().await.map_err(Error::Store)?;

        // A failed cycle task means the attempt failed, which in branch
        // mode triggers the rollback.
        let finished = self
            .store
            .get(&cycle_task.id)
            .await
            .ok_or_else(|| Error::Workflow("cycle task vanished from the store".to_string()))?;
        if finished.status == TaskStatus::Failed {
            return Err(Error::Workflow(format!(
                "self-improvement task failed: {}",
                finished.error.unwrap_or_else(|| "unknown error".to_string())
            )));
        }

        let mut report = ImprovementReport {
            processed,
            ..Default::default()
        };

        if git.is_clean().await.map_err(Error::Git)? {
            tracing::info!("No changes to commit after the improvement cycle");
            return Ok(report);
        }

        tracing::info!("Changes detected; committing");
        git.add_all().await.map_err(Error::Git)?;
        git.commit(&format!(
            "feat(self-improve): automated improvements {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S")
        ))
        .await
        .map_err(Error::Git)?;
        report.committed = true;

        if direct {
            return Ok(report);
        }

        // Push and proposal are both optional: without a remote or
        // credentials, the changes stay local and that is a success.
        if !self.config.auto_push {
            tracing::info!("Auto-push disabled; changes kept local");
            return Ok(report);
        }
        match git.push(branch).await {
            Ok(()) => report.pushed = true,
            Err(e) => {
                tracing::warn!(error = %e, "Push failed; keeping changes local");
                return Ok(report);
            }
        }

        if let Some(hosting) = &self.hosting {
            let title = format!("Automated self-improvement {}", Utc::now().format("%Y-%m-%d"));
            let body = "This pull request contains automated improvements generated by autodev.";
            match hosting
                .create_pull_request(&title, body, branch, &self.config.base_branch)
                .await
            {
                Ok(info) => {
                    if let Some(monitor) = &self.monitor {
                        monitor
                            .add(MonitoredProposal::new(info.number, branch, &title))
                            .await;
                    }
                    report.proposal = Some(info);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Pull request creation failed; changes remain on the pushed branch");
                }
            }
        }

        Ok(report)
    }

    /// Restore the pre-attempt state: original branch checked out (dropping
    /// anything the failed cycle left in the tree), improvement branch gone.
    async fn rollback(&self, git: &GitRepo, original_branch: &str, branch: &str) {
        tracing::info!(branch, "Rolling back failed self-improvement");
        if let Err(e) = git.hard_checkout_branch(original_branch).await {
            tracing::error!(error = %e, "Rollback checkout failed; manual intervention needed");
            return;
        }
        if let Err(e) = git.delete_branch(branch).await {
            tracing::error!(error = %e, "Failed to delete improvement branch");
            return;
        }
        tracing::info!(
            original_branch,
            "Rolled back; repository restored to its pre-attempt state"
        );
    }
}
