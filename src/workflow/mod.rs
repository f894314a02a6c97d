/// Workflow Management Layer
///
/// Workflow definitions, persistence, and the hot-reload registry:
/// - Type definitions (WorkflowDefinition, NodeSpec, Edge, Run, NodeRun)
/// - SQLite persistence with sqlx
/// - Lock-free hot-reload registry using ArcSwap

// Core workflow and execution-record type definitions
pub mod types;

// SQLite persistence for definitions and variables
pub mod storage;

// Hot-reload registry using ArcSwap for zero-downtime updates
pub mod registry;

// Re-export commonly used types
pub use types::{Edge, NodeRun, NodeSpec, Run, RunStatus, WorkflowDefinition};
