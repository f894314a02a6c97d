/// Handler registry: node-type tag → handler implementation
///
/// A flat table of polymorphic handlers, populated once at startup and
/// read-only during execution, so no locking is needed after initialization.
/// Unknown type tags surface as configuration errors at dispatch time.

use crate::runtime::handler::NodeHandler;
use std::{collections::HashMap, sync::Arc};

/// Process-wide lookup table from node-type identifier to handler
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn NodeHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its type tag. Re-registering a tag replaces
    /// the previous handler; registration happens only during startup.
    pub fn register(&mut self, type_id: impl Into<String>, handler: Arc<dyn NodeHandler>) {
        let type_id = type_id.into();
        tracing::debug!("🧩 Registered node handler: {}", type_id);
        self.handlers.insert(type_id, handler);
    }

    /// Resolve a handler by type tag (lock-free read)
    pub fn resolve(&self, type_id: &str) -> Option<Arc<dyn NodeHandler>> {
        self.handlers.get(type_id).cloned()
    }

    /// Registered type tags, for startup logging and introspection
    pub fn type_ids(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("types", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
