/// Relayflow: workflow-automation engine
///
/// Directed graphs of typed nodes (HTTP calls, database queries, scripts,
/// conditions) executed end-to-end with per-workflow timeout and retry
/// policy, hot-reload definitions and a persisted execution trace.

// Core configuration and setup
pub mod config;

// Workflow management layer - definitions, storage, hot-reload registry
pub mod workflow;

// Runtime execution layer - resolver, coordinator, handlers, recorder
pub mod runtime;

// HTTP API layer - workflow CRUD, run history, triggers
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use runtime::{HandlerContext, HandlerRegistry, NodeFailure, NodeHandler, RunCoordinator};
pub use server::start_server;
pub use workflow::{Edge, NodeRun, NodeSpec, Run, RunStatus, WorkflowDefinition};
