//! autodev — self-improving development agent core.
//!
//! The crate is a task lifecycle engine: a persistent [`store::TaskStore`]
//! holding the work queue, a [`dispatch::Dispatcher`] that executes tasks
//! through registered [`handlers::TaskHandler`]s, a priority-ordered
//! [`schedule::SelfImprovementScheduler`] that feeds background improvement
//! work, and an [`orchestrator::WorkflowOrchestrator`] that runs the mode
//! loops and the branch-isolated self-improvement transaction.

pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod gitops;
pub mod handlers;
pub mod llm;
pub mod monitor;
pub mod orchestrator;
pub mod schedule;
pub mod store;
