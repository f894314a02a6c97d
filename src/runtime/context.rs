/// Run-scoped execution context
///
/// Mutable state that lives for exactly one run: accumulated node outputs,
/// workflow variables, the wall-clock deadline and the cancellation flag.
/// The coordinator is the sole writer; handlers get a read-only view plus
/// their own isolated output slot (their return value), so concurrent batch
/// members never contend on shared state.

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

/// Mutable, execution-scoped state for one run
#[derive(Debug)]
pub struct ExecutionContext {
    /// Workflow-level input supplied by the trigger
    pub input_data: Value,
    /// Output of every settled node, keyed by node id
    pub node_outputs: HashMap<String, Value>,
    /// Workflow variables resolved once at run start
    pub variables: HashMap<String, Value>,
    /// Run start, anchor for the wall-clock deadline
    pub started_at: DateTime<Utc>,
    /// Hard deadline: started_at + timeout_seconds
    pub deadline: DateTime<Utc>,
    /// External cancellation signal, observed between batches only
    cancel: Arc<AtomicBool>,
}

impl ExecutionContext {
    pub fn new(input_data: Value, variables: HashMap<String, Value>, timeout_seconds: u64) -> Self {
        let started_at = Utc::now();
        Self {
            input_data,
            node_outputs: HashMap::new(),
            variables,
            started_at,
            deadline: started_at + chrono::Duration::seconds(timeout_seconds as i64),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shareable handle the cancel API flips to request cancellation
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Wall-clock budget left before the run must stop dispatching.
    /// Zero once the deadline has passed.
    pub fn remaining_budget(&self) -> Duration {
        (self.deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn deadline_exceeded(&self) -> bool {
        Utc::now() >= self.deadline
    }

    /// Record a settled node's output (coordinator-only, between batches)
    pub fn store_output(&mut self, node_id: &str, output: Value) {
        self.node_outputs.insert(node_id.to_string(), output);
    }

    /// Build the merged input for a node from (a) workflow input fields,
    /// (b) direct predecessor outputs keyed by predecessor id, and
    /// (c) workflow variables. Later layers win on key collision.
    pub fn build_node_input(&self, predecessor_ids: &[String]) -> Value {
        let mut merged = Map::new();

        match &self.input_data {
            Value::Object(fields) => {
                for (key, value) in fields {
                    merged.insert(key.clone(), value.clone());
                }
            }
            Value::Null => {}
            other => {
                // Non-object trigger payloads are nested rather than dropped
                merged.insert("input".to_string(), other.clone());
            }
        }

        for pred_id in predecessor_ids {
            if let Some(output) = self.node_outputs.get(pred_id) {
                merged.insert(pred_id.clone(), output.clone());
            }
        }

        for (name, value) in &self.variables {
            merged.insert(name.clone(), value.clone());
        }

        Value::Object(merged)
    }

    /// Serialized snapshot persisted on the Run at finalization
    pub fn snapshot(&self) -> Value {
        json!({
            "node_outputs": self.node_outputs,
            "variables": self.variables,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merges_input_predecessors_and_variables() {
        let mut variables = HashMap::new();
        variables.insert("region".to_string(), json!("eu-west"));

        let mut ctx = ExecutionContext::new(json!({"user_id": 7}), variables, 300);
        ctx.store_output("fetch", json!({"rows": 3}));

        let merged = ctx.build_node_input(&["fetch".to_string()]);
        assert_eq!(merged["user_id"], json!(7));
        assert_eq!(merged["fetch"], json!({"rows": 3}));
        assert_eq!(merged["region"], json!("eu-west"));
    }

    #[test]
    fn non_object_input_is_nested_under_input_key() {
        let ctx = ExecutionContext::new(json!([1, 2, 3]), HashMap::new(), 300);
        let merged = ctx.build_node_input(&[]);
        assert_eq!(merged["input"], json!([1, 2, 3]));
    }

    #[test]
    fn unsettled_predecessors_are_absent() {
        let ctx = ExecutionContext::new(json!({}), HashMap::new(), 300);
        let merged = ctx.build_node_input(&["never-ran".to_string()]);
        assert!(merged.get("never-ran").is_none());
    }

    #[test]
    fn cancellation_flag_is_shared() {
        let ctx = ExecutionContext::new(json!({}), HashMap::new(), 300);
        let flag = ctx.cancel_flag();
        assert!(!ctx.is_cancelled());
        flag.store(true, Ordering::Relaxed);
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn deadline_tracks_timeout() {
        let ctx = ExecutionContext::new(json!({}), HashMap::new(), 0);
        assert!(ctx.deadline_exceeded());
        assert_eq!(ctx.remaining_budget(), Duration::ZERO);
    }
}
