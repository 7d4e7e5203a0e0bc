//! Persistent task storage.

pub mod json_store;
pub mod task;
pub mod traits;

pub use json_store::{JsonTaskStore, load_tasks_from_file};
pub use task::{Task, TaskStats, TaskStatus};
pub use traits::{CleanupStats, TaskStore};
