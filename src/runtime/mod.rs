/// Runtime Execution Layer
///
/// The engine proper: graph resolution, run coordination, the handler
/// contract and registry, execution recording, and the trigger-side cron
/// scheduler. Structural validation happens at run time, so a malformed
/// definition fails its run rather than its upload.

// Execution context shared across one run
pub mod context;

// Run coordinator driving batches, retries, timeouts and cancellation
pub mod coordinator;

// Engine error taxonomy (structural errors, node failure classification)
pub mod error;

// Node handler contract
pub mod handler;

// Built-in node handlers (http_request, database_query, script, ...)
pub mod handlers;

// Execution trace persistence
pub mod recorder;

// Node-type → handler lookup
pub mod registry;

// Petgraph-based batch resolver
pub mod resolver;

// Background cron scheduler for scheduled workflows
pub mod scheduler;

// Re-export main types
pub use coordinator::RunCoordinator;
pub use error::{NodeFailure, StructuralError};
pub use handler::{HandlerContext, NodeHandler};
pub use recorder::{ExecutionRecorder, SqliteRecorder};
pub use registry::HandlerRegistry;
pub use scheduler::CronSchedulerService;
