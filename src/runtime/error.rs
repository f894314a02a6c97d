/// Engine error taxonomy
///
/// Typed errors for the two decisions the coordinator has to make from a
/// failure: whether a run may start at all (structural errors), and whether a
/// node failure is worth retrying (configuration vs transient). Everything
/// else in the crate propagates plain anyhow errors.

use thiserror::Error;

/// Malformed definition detected by the graph resolver
///
/// A run hit by one of these never dispatches a single node; the coordinator
/// finalizes it as `failed` with the structural reason recorded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StructuralError {
    #[error("workflow graph contains a cycle")]
    CycleDetected,
    #[error("edge references unknown node: {from} -> {to}")]
    DanglingEdge { from: String, to: String },
    #[error("workflow has no entry point (every node has incoming edges)")]
    NoEntryPoint,
}

/// Handler-reported failure, classified for retry policy
///
/// Handlers must report failures with a distinguishable reason: configuration
/// errors (missing/invalid config, unknown node type) are terminal for the
/// node; transient errors (network, I/O, handler-level timeouts) are retried
/// up to the effective retry limit.
#[derive(Debug, Error, Clone)]
pub enum NodeFailure {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("transient error: {0}")]
    Transient(String),
}

impl NodeFailure {
    pub fn config(msg: impl Into<String>) -> Self {
        NodeFailure::Configuration(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        NodeFailure::Transient(msg.into())
    }

    /// Only transient failures are eligible for retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, NodeFailure::Transient(_))
    }
}
