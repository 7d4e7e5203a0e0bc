//! Control loops and the self-improvement workflow.

pub mod log_analyzer;
pub mod planner;
pub mod workflow;

pub use log_analyzer::LogAnalyzer;
pub use planner::StrategicPlanner;
pub use workflow::{ImprovementReport, WorkflowOrchestrator};
