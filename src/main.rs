use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use autodev::config::{AgentConfig, HostingConfig};
use autodev::context::ExecutionContext;
use autodev::dispatch::{Dispatcher, HandlerRegistry};
use autodev::gitops::{GitHubClient, GitRepo, HostingClient};
use autodev::llm::{LlmBackend, LlmConfig, create_provider};
use autodev::monitor::PullRequestMonitor;
use autodev::orchestrator::{StrategicPlanner, WorkflowOrchestrator};
use autodev::store::{JsonTaskStore, TaskStore};

/// Operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Drain the queue to empty once.
    Agent,
    /// Poll loop with a fixed interval.
    Daemon,
    /// Run the self-improvement transaction on an isolated branch.
    Auto,
    /// Run the self-improvement cycle on the current branch, no rollback.
    SelfImproveDirect,
    /// Generate work via the strategic planner when the queue is empty.
    Autonomous,
    /// Supervise repeated `auto` cycles in child processes.
    Continuous,
    /// Scan the error log once and enqueue fix tasks.
    AnalyzeLogs,
}

#[derive(Parser, Debug)]
#[command(name = "autodev", about = "Self-improving development agent")]
struct Args {
    /// Operating mode.
    #[arg(long, value_enum, default_value = "agent")]
    mode: Mode,

    /// Poll interval in seconds for daemon and continuous modes.
    #[arg(long, default_value_t = 10)]
    interval: u64,

    /// Directory for the queue snapshot, monitor file and logs.
    #[arg(long, default_value = "./data")]
    data_dir: std::path::PathBuf,

    /// Root of the repository the agent improves.
    #[arg(long, default_value = ".")]
    repo: std::path::PathBuf,

    /// Seed tasks file loaded by agent mode when the queue is empty.
    #[arg(long, default_value = "tasks.json")]
    tasks_file: std::path::PathBuf,

    /// Push improvement branches and open pull requests.
    #[arg(long, default_value_t = false)]
    auto_push: bool,

    /// Enable debug logging.
    #[arg(long, default_value_t = false)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_dir = args.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).context("failed to create log directory")?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "agent.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    let default_filter = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    // The generation backend is required; refuse to start without it.
    let api_key = std::env::var("ANTHROPIC_API_KEY").unwrap_or_else(|_| {
        eprintln!("Error: ANTHROPIC_API_KEY not set");
        eprintln!("  export ANTHROPIC_API_KEY=sk-ant-...");
        std::process::exit(1);
    });

    let model = std::env::var("AUTODEV_MODEL")
        .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string());

    let config = AgentConfig {
        data_dir: args.data_dir.clone(),
        repo_path: args.repo.clone(),
        tasks_file: args.tasks_file.clone(),
        check_interval: std::time::Duration::from_secs(args.interval),
        auto_push: args.auto_push,
        model: model.clone(),
        ..Default::default()
    };

    eprintln!("autodev v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Mode: {:?}", args.mode);
    eprintln!("   Model: {}", model);
    eprintln!("   Data: {}", config.data_dir.display());

    let llm = create_provider(&LlmConfig {
        backend: LlmBackend::Anthropic,
        api_key: secrecy::SecretString::from(api_key),
        model,
    })
    .context("failed to create LLM provider")?;

    // ── Task store ──────────────────────────────────────────────────────
    let store: Arc<dyn TaskStore> = Arc::new(
        JsonTaskStore::open(config.queue_file()).context("failed to open task store")?,
    );

    // Crash recovery: anything left in processing by a dead run goes back
    // to pending before the first claim.
    let requeued = store.requeue_stuck().await?;
    if requeued > 0 {
        tracing::info!(requeued, "Returned stuck tasks to pending");
    }

    // ── Dispatch ────────────────────────────────────────────────────────
    let registry = HandlerRegistry::with_builtins();
    let ctx = ExecutionContext::new(llm.clone(), Arc::clone(&store), config.clone());
    let dispatcher = Dispatcher::new(Arc::clone(&store), registry, ctx);

    // ── Version control + hosting (optional) ────────────────────────────
    let git = match GitRepo::open(&config.repo_path, &config.name) {
        Ok(git) => Some(git),
        Err(e) => {
            tracing::warn!(error = %e, "Repository unavailable; self-improvement disabled");
            None
        }
    };

    let hosting: Option<Arc<dyn HostingClient>> = match HostingConfig::from_env() {
        Some(hosting_config) => Some(Arc::new(GitHubClient::new(hosting_config))),
        None => {
            tracing::info!("Hosting credentials not set; running local-only");
            None
        }
    };

    // ── Orchestrator ────────────────────────────────────────────────────
    let mut orchestrator =
        WorkflowOrchestrator::new(config.clone(), Arc::clone(&store), dispatcher);
    if let Some(git) = git {
        orchestrator = orchestrator.with_git(git);
    }
    if let Some(hosting) = hosting {
        let monitor = Arc::new(PullRequestMonitor::open(
            Arc::clone(&hosting),
            config.monitor_file(),
        ));
        orchestrator = orchestrator.with_hosting(hosting, monitor);
    }
    orchestrator = orchestrator.with_planner(StrategicPlanner::new(llm));
    orchestrator
        .schedule_improvement("Run the standard full self-improvement cycle")
        .await;

    match args.mode {
        Mode::Agent => {
            orchestrator.run_once().await?;
        }
        Mode::Daemon => {
            orchestrator.run_daemon().await?;
        }
        Mode::Auto => {
            let report = orchestrator.self_improve(false).await?;
            if let Some(branch) = report.branch {
                tracing::info!(%branch, "Improvements recorded");
            }
        }
        Mode::SelfImproveDirect => {
            orchestrator.self_improve(true).await?;
        }
        Mode::Autonomous => {
            orchestrator.run_autonomous().await?;
        }
        Mode::Continuous => {
            orchestrator.run_continuous().await?;
        }
        Mode::AnalyzeLogs => {
            let added = orchestrator.analyze_logs().await?;
            tracing::info!(added, "Log analysis complete");
        }
    }

    Ok(())
}
