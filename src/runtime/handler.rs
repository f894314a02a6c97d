/// Node handler contract
///
/// Every node type is a polymorphic implementation of a single capability:
/// take (config, merged input, run-scoped context), produce output data or a
/// classified failure. Handlers are narrow, independently swappable units of
/// glue code. The engine knows nothing about their internals beyond this
/// trait.

use crate::runtime::error::NodeFailure;
use async_trait::async_trait;
use serde_json::Value;
use std::{collections::HashMap, time::Duration};
use uuid::Uuid;

/// Read-only view of the run handed to each handler invocation
///
/// Handlers never write into the shared execution context; they return their
/// output and the coordinator merges it between batches. `remaining_budget`
/// is the wall-clock time left before the run times out; handlers doing
/// their own I/O timeouts should stay within it.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub run_id: Uuid,
    pub workflow_id: String,
    pub node_id: String,
    /// Workflow variables at run start (also merged into the node input)
    pub variables: HashMap<String, Value>,
    /// Time left before the run-level deadline
    pub remaining_budget: Duration,
}

/// The single capability every node-type handler implements
///
/// Contract:
/// - Validate your own config; missing required fields are a
///   `NodeFailure::Configuration`, never a transient error.
/// - The coordinator may invoke you more than once for the same NodeRun under
///   retry; non-idempotent external effects are your own idempotency concern.
/// - Report network/timeout conditions as `NodeFailure::Transient` so the
///   coordinator can apply retry policy.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    async fn execute(
        &self,
        config: &Value,
        input: Value,
        ctx: &HandlerContext,
    ) -> Result<Value, NodeFailure>;
}

/// Convenience for handlers reading required string fields from config
pub fn require_str<'a>(config: &'a Value, key: &str) -> Result<&'a str, NodeFailure> {
    config
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| NodeFailure::config(format!("missing '{key}' parameter")))
}
