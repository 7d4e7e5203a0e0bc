//! Handler registry — maps task-type strings to handlers.
//!
//! Populated once at startup and immutable afterwards. Registering a type
//! twice keeps the original handler and logs a warning; a surprise
//! overwrite is never possible.

use std::collections::HashMap;
use std::sync::Arc;

use crate::handlers::TaskHandler;

/// Registry of task handlers.
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Create a registry pre-populated with the built-in handlers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for (task_type, handler) in crate::handlers::builtin_handlers() {
            registry.register(task_type, handler);
        }
        registry
    }

    /// Register a handler for a task type. A duplicate registration is a
    /// no-op with a warning.
    pub fn register(&mut self, task_type: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        let task_type = task_type.into();
        if self.handlers.contains_key(&task_type) {
            tracing::warn!(
                task_type = %task_type,
                "Handler already registered for this type; keeping the original"
            );
            return;
        }
        tracing::debug!(task_type = %task_type, handler = handler.name(), "Registered handler");
        self.handlers.insert(task_type, handler);
    }

    /// Resolve a handler for a task type.
    pub fn get(&self, task_type: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(task_type).cloned()
    }

    /// Whether a handler exists for this type.
    pub fn has(&self, task_type: &str) -> bool {
        self.handlers.contains_key(task_type)
    }

    /// All registered task types.
    pub fn task_types(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
