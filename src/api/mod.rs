/// HTTP API Layer
///
/// REST endpoints for workflow management, run history/control and webhook
/// triggers:
/// - Workflow and variable CRUD, manual execution
/// - Run listing, inspection and cancellation
/// - Webhook trigger surface

// Workflow management and manual execution endpoints
pub mod workflows;

// Run history and cancellation endpoints
pub mod runs;

// Webhook trigger endpoints
pub mod webhooks;

// Re-export router builders
pub use runs::create_run_routes;
pub use webhooks::create_webhook_routes;
pub use workflows::create_workflow_routes;
