/// Core workflow type definitions
///
/// Defines the structures for workflow definitions, nodes, edges and the
/// execution records (Run / NodeRun) the engine produces. Definitions are
/// serialized to JSON for persistence; execution records map onto the
/// recorder's SQLite tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

fn default_timeout_seconds() -> u64 {
    300
}

fn default_max_retries() -> u32 {
    3
}

/// A complete workflow definition: nodes plus the directed edges between them
///
/// Definitions are stored as JSON in SQLite and are immutable for the duration
/// of a run; the coordinator only ever reads them. Declaration order of
/// `nodes` is significant: it is the tie-break for batch ordering, so two runs
/// of the same definition always dispatch in the same order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Unique workflow identifier (e.g., "wf-enrichment")
    pub id: String,
    /// Human-readable workflow name
    pub name: String,
    /// Nodes in declaration order
    pub nodes: Vec<NodeSpec>,
    /// Directed data-flow edges: (from, to) means "from settles before to starts"
    pub edges: Vec<Edge>,
    /// Wall-clock budget for a whole run; checked before each batch and
    /// enforced as the remaining budget on every handler invocation
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Retry limit for transient node failures (overridable per node)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay between successive retry attempts
    #[serde(default)]
    pub retry_delay_seconds: u64,
    /// Optional cron expression; consumed by the schedule trigger service,
    /// never by the engine itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
}

/// A single typed node in the workflow graph
///
/// The `node_type` string resolves to a handler via the handler registry at
/// dispatch time. `config` is opaque to the engine — each handler validates
/// its own shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Unique node identifier within the definition (e.g., "n1", "fetch-users")
    pub id: String,
    /// Display name recorded on the NodeRun
    #[serde(default)]
    pub name: String,
    /// Handler type tag (e.g., "http_request", "database_query", "script")
    pub node_type: String,
    /// Handler-specific configuration as flexible JSON
    #[serde(default)]
    pub config: Value,
    /// Per-node override of the workflow-level retry limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_override: Option<u32>,
}

/// Directed connection between two nodes
///
/// Edge (from, to) means `from` must settle (successfully or per policy)
/// before `to` starts, and `from`'s output becomes part of `to`'s merged input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// Source node ID
    pub from: String,
    /// Target node ID
    pub to: String,
}

/// In-flight and terminal states of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    Success,
    Failed,
    Cancelled,
    TimedOut,
}

impl RunStatus {
    /// Terminal states are entered exactly once; no NodeRun records are
    /// created after a terminal transition
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Queued | RunStatus::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::TimedOut => "timed_out",
        }
    }
}

/// Per-node execution states within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRunStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

impl NodeRunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeRunStatus::Pending => "pending",
            NodeRunStatus::Running => "running",
            NodeRunStatus::Success => "success",
            NodeRunStatus::Failed => "failed",
            NodeRunStatus::Skipped => "skipped",
        }
    }
}

/// One execution instance of a workflow definition
///
/// Created at trigger time in `queued`, owned exclusively by the run
/// coordinator while executing, read-only once terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub workflow_id: String,
    pub status: RunStatus,
    /// Trigger source: "manual", "webhook" or "schedule"
    pub triggered_by: String,
    /// Workflow-level input supplied by the trigger
    pub input_data: Value,
    /// Serialized execution-context snapshot (node outputs + variables),
    /// persisted at finalization
    pub context_snapshot: Value,
    /// Human-readable reason carried by failed / timed-out / cancelled runs
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

impl Run {
    /// Create a fresh queued run for a definition
    pub fn queued(workflow_id: &str, triggered_by: &str, input_data: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id: workflow_id.to_string(),
            status: RunStatus::Queued,
            triggered_by: triggered_by.to_string(),
            input_data,
            context_snapshot: Value::Null,
            error_message: None,
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
        }
    }

    /// Transition to a terminal status, stamping finish time and duration
    pub fn finalize(&mut self, status: RunStatus, error_message: Option<String>) {
        debug_assert!(status.is_terminal());
        let finished = Utc::now();
        self.status = status;
        self.error_message = error_message;
        self.duration_ms = Some((finished - self.started_at).num_milliseconds());
        self.finished_at = Some(finished);
    }
}

/// One handler invocation record, child of a Run
///
/// Created when the coordinator dispatches (or skips) a node; retries reuse
/// the same record, bumping `attempts` and replacing `error_message`. A node
/// is never given a second `execution_order` slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRun {
    pub id: Uuid,
    pub run_id: Uuid,
    pub node_id: String,
    pub node_name: String,
    /// Monotonic dispatch sequence assigned by the coordinator in batch order
    pub execution_order: u32,
    pub status: NodeRunStatus,
    /// Number of handler invocations so far (1 on first dispatch)
    pub attempts: u32,
    pub input_data: Value,
    pub output_data: Value,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

impl NodeRun {
    /// Create a record in `running` for a node about to be dispatched
    pub fn dispatched(run_id: Uuid, node: &NodeSpec, execution_order: u32, input_data: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id,
            node_id: node.id.clone(),
            node_name: node.name.clone(),
            execution_order,
            status: NodeRunStatus::Running,
            attempts: 0,
            input_data,
            output_data: Value::Null,
            error_message: None,
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
        }
    }

    /// Create an already-final `skipped` record for an unreachable node.
    /// Skipped nodes carry no error text, only the status.
    pub fn skipped(run_id: Uuid, node: &NodeSpec, execution_order: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            run_id,
            node_id: node.id.clone(),
            node_name: node.name.clone(),
            execution_order,
            status: NodeRunStatus::Skipped,
            attempts: 0,
            input_data: Value::Null,
            output_data: Value::Null,
            error_message: None,
            started_at: now,
            finished_at: Some(now),
            duration_ms: Some(0),
        }
    }

    /// Finalize after the handler settled (success or exhausted retries)
    pub fn finalize(&mut self, status: NodeRunStatus, output: Value, error_message: Option<String>) {
        let finished = Utc::now();
        self.status = status;
        self.output_data = output;
        self.error_message = error_message;
        self.duration_ms = Some((finished - self.started_at).num_milliseconds());
        self.finished_at = Some(finished);
    }
}

/// Per-workflow key/value variable merged into every node's input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowVariable {
    pub workflow_id: String,
    pub name: String,
    pub value: Value,
}
