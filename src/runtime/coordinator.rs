/// Run coordinator: the execution engine proper
///
/// Drives one run end-to-end: resolves the definition into ready batches,
/// dispatches batch members onto a bounded worker pool, applies retry and
/// timeout policy per node, propagates skips past failed paths, and records
/// every state transition. Node-level errors are absorbed here and translated
/// into Run/NodeRun state: callers always get back a terminal Run, never an
/// error.

use crate::runtime::{
    context::ExecutionContext,
    handler::HandlerContext,
    recorder::ExecutionRecorder,
    registry::HandlerRegistry,
    resolver,
};
use crate::workflow::types::{
    NodeRun, NodeRunStatus, NodeSpec, Run, RunStatus, WorkflowDefinition,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::{
    collections::{HashMap, HashSet},
    sync::{atomic::AtomicBool, Arc},
    time::Duration,
};
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinSet;
use uuid::Uuid;

/// How a dispatched node settled, from the coordinator's point of view
enum NodeOutcome {
    Success(Value),
    /// Terminal node failure (configuration, or transient with retries exhausted)
    Failed(String),
    /// The run-level wall-clock budget cut the handler off
    BudgetExhausted(String),
}

/// Effective retry policy for one node, resolved once at dispatch
#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    max_retries: u32,
    retry_delay: Duration,
}

impl RetryPolicy {
    /// Workflow-level policy with the optional per-node override applied
    fn for_node(definition: &WorkflowDefinition, node: &NodeSpec) -> Self {
        Self {
            max_retries: node.retry_override.unwrap_or(definition.max_retries),
            retry_delay: Duration::from_secs(definition.retry_delay_seconds),
        }
    }
}

/// Orchestrates workflow runs against a handler registry and a recorder
///
/// One coordinating task drives each run; nodes within a ready batch execute
/// concurrently on a semaphore-bounded worker pool shared across runs. The
/// coordinator is the sole writer to the execution context; batch results
/// are merged only after the whole batch settles.
pub struct RunCoordinator {
    registry: Arc<HandlerRegistry>,
    recorder: Arc<dyn ExecutionRecorder>,
    workers: Arc<Semaphore>,
    /// Cancellation flags of in-flight runs, keyed by run id
    cancellations: RwLock<HashMap<Uuid, Arc<AtomicBool>>>,
}

impl RunCoordinator {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        recorder: Arc<dyn ExecutionRecorder>,
        worker_concurrency: usize,
    ) -> Self {
        Self {
            registry,
            recorder,
            workers: Arc::new(Semaphore::new(worker_concurrency.max(1))),
            cancellations: RwLock::new(HashMap::new()),
        }
    }

    /// Request cancellation of an in-flight run
    ///
    /// Non-preemptive: the signal is observed between batches, so the current
    /// batch runs to completion (or its own timeout) first. Returns false if
    /// the run is unknown or already terminal.
    pub async fn request_cancel(&self, run_id: Uuid) -> bool {
        let cancellations = self.cancellations.read().await;
        match cancellations.get(&run_id) {
            Some(flag) => {
                flag.store(true, std::sync::atomic::Ordering::Relaxed);
                tracing::info!("🛑 Cancellation requested for run {}", run_id);
                true
            }
            None => false,
        }
    }

    /// Run ids currently owned by this coordinator
    pub async fn active_runs(&self) -> Vec<Uuid> {
        self.cancellations.read().await.keys().copied().collect()
    }

    /// Execute one run of a definition to a terminal state
    ///
    /// Never returns an error: structural problems, node failures, timeouts
    /// and cancellations all land in the returned Run's status and
    /// error_message. Recorder failures are logged and ignored.
    pub async fn run(
        &self,
        definition: &WorkflowDefinition,
        input_data: Value,
        variables: HashMap<String, Value>,
        triggered_by: &str,
    ) -> Run {
        let run = Run::queued(&definition.id, triggered_by, input_data);
        self.execute(run, definition, variables).await
    }

    /// Fire-and-forget variant: returns the run id immediately and drives the
    /// run on a background task. Used by webhook and async-execute triggers.
    pub fn spawn_run(
        self: &Arc<Self>,
        definition: WorkflowDefinition,
        input_data: Value,
        variables: HashMap<String, Value>,
        triggered_by: &str,
    ) -> Uuid {
        let run = Run::queued(&definition.id, triggered_by, input_data);
        let run_id = run.id;

        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            coordinator.execute(run, &definition, variables).await;
        });

        run_id
    }

    async fn execute(
        &self,
        mut run: Run,
        definition: &WorkflowDefinition,
        variables: HashMap<String, Value>,
    ) -> Run {
        tracing::info!(
            "🚀 Starting run {} of workflow '{}' ({} nodes, trigger: {})",
            run.id,
            definition.id,
            definition.nodes.len(),
            run.triggered_by
        );
        self.record_run_created(&run).await;

        // Structural errors mean the run never dispatches a single node.
        let batches = match resolver::resolve(definition) {
            Ok(batches) => batches,
            Err(e) => {
                tracing::warn!("❌ Run {} rejected: {}", run.id, e);
                run.finalize(RunStatus::Failed, Some(e.to_string()));
                self.record_run_updated(&run).await;
                return run;
            }
        };

        let predecessors = resolver::predecessors(definition);
        let node_map: HashMap<&str, &NodeSpec> = definition
            .nodes
            .iter()
            .map(|n| (n.id.as_str(), n))
            .collect();

        let mut ctx =
            ExecutionContext::new(run.input_data.clone(), variables, definition.timeout_seconds);
        self.cancellations
            .write()
            .await
            .insert(run.id, ctx.cancel_flag());

        run.status = RunStatus::Running;
        self.record_run_updated(&run).await;

        let mut next_order: u32 = 0;
        let mut unreachable: HashSet<String> = HashSet::new();
        let mut first_error: Option<String> = None;
        let mut interrupted: Option<RunStatus> = None;

        for (batch_index, batch) in batches.iter().enumerate() {
            // Cancellation and deadline are observed between batches only;
            // in-flight handlers always settle before we get here.
            if ctx.is_cancelled() {
                let remaining: Vec<&str> = batches[batch_index..]
                    .iter()
                    .flatten()
                    .map(String::as_str)
                    .collect();
                self.skip_nodes(&run, &node_map, &remaining, &mut next_order).await;
                interrupted = Some(RunStatus::Cancelled);
                break;
            }
            if ctx.deadline_exceeded() {
                interrupted = Some(RunStatus::TimedOut);
                break;
            }

            tracing::debug!(
                "📍 Run {}: dispatching batch {}/{} ({:?})",
                run.id,
                batch_index + 1,
                batches.len(),
                batch
            );

            let mut in_flight: JoinSet<(String, NodeRun, NodeOutcome)> = JoinSet::new();

            for node_id in batch {
                let node = node_map[node_id.as_str()];
                let preds = &predecessors[node_id];

                // Fail-fast skip propagation: any failed or skipped
                // predecessor makes this node unreachable. Skipped nodes get
                // a record but are never dispatched.
                if preds.iter().any(|p| unreachable.contains(p)) {
                    let node_run = NodeRun::skipped(run.id, node, next_order);
                    next_order += 1;
                    tracing::debug!("⏭️ Run {}: node '{}' skipped (unreachable path)", run.id, node.id);
                    self.record_node_created(&node_run).await;
                    unreachable.insert(node.id.clone());
                    continue;
                }

                let merged_input = ctx.build_node_input(preds);
                let mut node_run =
                    NodeRun::dispatched(run.id, node, next_order, merged_input.clone());
                next_order += 1;
                self.record_node_created(&node_run).await;

                // Unknown node type: immediate configuration failure, never retried.
                let handler = match self.registry.resolve(&node.node_type) {
                    Some(handler) => handler,
                    None => {
                        let reason =
                            format!("unknown node type '{}' (no registered handler)", node.node_type);
                        tracing::warn!("❌ Run {}: node '{}': {}", run.id, node.id, reason);
                        node_run.attempts = 1;
                        node_run.finalize(NodeRunStatus::Failed, Value::Null, Some(reason.clone()));
                        self.record_node_updated(&node_run).await;
                        unreachable.insert(node.id.clone());
                        first_error.get_or_insert(format!("node '{}': {}", node.id, reason));
                        continue;
                    }
                };

                let workers = Arc::clone(&self.workers);
                let recorder = Arc::clone(&self.recorder);
                let policy = RetryPolicy::for_node(definition, node);
                let config = node.config.clone();
                let node_id = node.id.clone();
                let workflow_id = definition.id.clone();
                let variables = ctx.variables.clone();
                let deadline = ctx.deadline;
                let run_id = run.id;

                in_flight.spawn(async move {
                    // Bounded worker pool: the permit caps batch parallelism.
                    // Acquisition only fails on a closed semaphore, which the
                    // coordinator never does; treat it as a node failure
                    // rather than dispatching unbounded.
                    let _permit = match workers.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(e) => {
                            let reason = format!("worker pool unavailable: {e}");
                            node_run.finalize(
                                NodeRunStatus::Failed,
                                Value::Null,
                                Some(reason.clone()),
                            );
                            record_update(&recorder, &node_run).await;
                            return (node_id, node_run, NodeOutcome::Failed(reason));
                        }
                    };
                    let outcome = dispatch_with_retry(
                        handler,
                        config,
                        merged_input,
                        HandlerSeed {
                            run_id,
                            workflow_id,
                            node_id: node_id.clone(),
                            variables,
                        },
                        policy,
                        deadline,
                        recorder,
                        &mut node_run,
                    )
                    .await;
                    (node_id, node_run, outcome)
                });
            }

            // The whole batch settles before the next one is computed, since
            // later batches depend on these outputs.
            let mut budget_exhausted = false;
            while let Some(joined) = in_flight.join_next().await {
                let (node_id, node_run, outcome) = match joined {
                    Ok(settled) => settled,
                    Err(e) => {
                        tracing::error!("❌ Run {}: worker task panicked: {}", run.id, e);
                        first_error.get_or_insert(format!("worker task failed: {e}"));
                        continue;
                    }
                };

                match outcome {
                    NodeOutcome::Success(output) => {
                        tracing::debug!(
                            "✅ Run {}: node '{}' succeeded in {:?} ({} attempt(s))",
                            run.id,
                            node_id,
                            node_run.duration_ms,
                            node_run.attempts
                        );
                        ctx.store_output(&node_id, output);
                    }
                    NodeOutcome::Failed(reason) => {
                        tracing::warn!("❌ Run {}: node '{}' failed: {}", run.id, node_id, reason);
                        unreachable.insert(node_id.clone());
                        first_error.get_or_insert(format!("node '{node_id}': {reason}"));
                    }
                    NodeOutcome::BudgetExhausted(reason) => {
                        tracing::warn!(
                            "⏱️ Run {}: node '{}' cut off by run budget: {}",
                            run.id,
                            node_id,
                            reason
                        );
                        unreachable.insert(node_id.clone());
                        budget_exhausted = true;
                    }
                }
            }

            if budget_exhausted {
                interrupted = Some(RunStatus::TimedOut);
                break;
            }
        }

        let (status, message) = match interrupted {
            Some(RunStatus::Cancelled) => (
                RunStatus::Cancelled,
                Some("cancellation requested".to_string()),
            ),
            Some(RunStatus::TimedOut) => (
                RunStatus::TimedOut,
                Some(format!(
                    "run exceeded its {}s timeout budget",
                    definition.timeout_seconds
                )),
            ),
            _ => match first_error {
                Some(reason) => (RunStatus::Failed, Some(reason)),
                None => (RunStatus::Success, None),
            },
        };

        run.context_snapshot = ctx.snapshot();
        run.finalize(status, message);
        self.record_run_updated(&run).await;
        self.cancellations.write().await.remove(&run.id);

        tracing::info!(
            "🏁 Run {} of '{}' finished: {} in {:?}ms",
            run.id,
            definition.id,
            run.status.as_str(),
            run.duration_ms
        );

        run
    }

    /// Record skipped NodeRuns for every node a cancellation left behind
    async fn skip_nodes(
        &self,
        run: &Run,
        node_map: &HashMap<&str, &NodeSpec>,
        node_ids: &[&str],
        next_order: &mut u32,
    ) {
        for node_id in node_ids {
            let node = node_map[node_id];
            let node_run = NodeRun::skipped(run.id, node, *next_order);
            *next_order += 1;
            self.record_node_created(&node_run).await;
        }
    }

    // Recorder writes are best-effort: an unavailable store is an
    // observability problem, not an execution failure.

    async fn record_run_created(&self, run: &Run) {
        if let Err(e) = self.recorder.create_run(run).await {
            tracing::warn!("⚠️ Failed to record run {} creation: {}", run.id, e);
        }
    }

    async fn record_run_updated(&self, run: &Run) {
        if let Err(e) = self.recorder.update_run(run).await {
            tracing::warn!("⚠️ Failed to record run {} transition: {}", run.id, e);
        }
    }

    async fn record_node_created(&self, node_run: &NodeRun) {
        if let Err(e) = self.recorder.create_node_run(node_run).await {
            tracing::warn!(
                "⚠️ Failed to record node run '{}' creation: {}",
                node_run.node_id,
                e
            );
        }
    }

    async fn record_node_updated(&self, node_run: &NodeRun) {
        if let Err(e) = self.recorder.update_node_run(node_run).await {
            tracing::warn!(
                "⚠️ Failed to record node run '{}' transition: {}",
                node_run.node_id,
                e
            );
        }
    }
}

/// Owned identifiers for building a per-attempt HandlerContext inside a task
struct HandlerSeed {
    run_id: Uuid,
    workflow_id: String,
    node_id: String,
    variables: HashMap<String, Value>,
}

/// Invoke a handler with retry policy under the run's wall-clock deadline
///
/// Every attempt reuses the same NodeRun record: `attempts` is bumped,
/// `error_message` replaced on each failed attempt. Transient failures are
/// retried with the configured delay between attempts; configuration errors
/// are terminal immediately. An attempt that outlives the remaining run
/// budget converts the whole run to `timed_out`.
#[allow(clippy::too_many_arguments)]
async fn dispatch_with_retry(
    handler: Arc<dyn crate::runtime::handler::NodeHandler>,
    config: Value,
    input: Value,
    seed: HandlerSeed,
    policy: RetryPolicy,
    deadline: DateTime<Utc>,
    recorder: Arc<dyn ExecutionRecorder>,
    node_run: &mut NodeRun,
) -> NodeOutcome {
    loop {
        node_run.attempts += 1;

        let remaining = (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        if remaining.is_zero() {
            let reason = "run timeout budget exhausted before attempt".to_string();
            node_run.finalize(NodeRunStatus::Failed, Value::Null, Some(reason.clone()));
            record_update(&recorder, node_run).await;
            return NodeOutcome::BudgetExhausted(reason);
        }

        let ctx = HandlerContext {
            run_id: seed.run_id,
            workflow_id: seed.workflow_id.clone(),
            node_id: seed.node_id.clone(),
            variables: seed.variables.clone(),
            remaining_budget: remaining,
        };

        match tokio::time::timeout(remaining, handler.execute(&config, input.clone(), &ctx)).await {
            // The hard deadline fired mid-handler: this is the run's budget,
            // not a handler-level transient timeout, so no retry.
            Err(_) => {
                let reason = format!(
                    "handler exceeded remaining run budget ({}ms)",
                    remaining.as_millis()
                );
                node_run.finalize(NodeRunStatus::Failed, Value::Null, Some(reason.clone()));
                record_update(&recorder, node_run).await;
                return NodeOutcome::BudgetExhausted(reason);
            }
            Ok(Ok(output)) => {
                node_run.finalize(NodeRunStatus::Success, output.clone(), None);
                record_update(&recorder, node_run).await;
                return NodeOutcome::Success(output);
            }
            Ok(Err(failure)) => {
                let reason = failure.to_string();
                node_run.error_message = Some(reason.clone());
                record_update(&recorder, node_run).await;

                let retries_left = node_run.attempts <= policy.max_retries;
                if failure.is_retryable() && retries_left {
                    tracing::debug!(
                        "🔁 Node '{}' attempt {} failed, retrying in {:?}: {}",
                        seed.node_id,
                        node_run.attempts,
                        policy.retry_delay,
                        reason
                    );
                    tokio::time::sleep(policy.retry_delay).await;
                    continue;
                }

                node_run.finalize(NodeRunStatus::Failed, Value::Null, Some(reason.clone()));
                record_update(&recorder, node_run).await;
                return NodeOutcome::Failed(reason);
            }
        }
    }
}

async fn record_update(recorder: &Arc<dyn ExecutionRecorder>, node_run: &NodeRun) {
    if let Err(e) = recorder.update_node_run(node_run).await {
        tracing::warn!(
            "⚠️ Failed to record node run '{}' transition: {}",
            node_run.node_id,
            e
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::error::NodeFailure;
    use crate::runtime::handler::NodeHandler;
    use crate::workflow::types::Edge;
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// In-memory recorder keeping the latest state of every record
    #[derive(Default)]
    struct MemoryRecorder {
        runs: Mutex<HashMap<Uuid, Run>>,
        node_runs: Mutex<HashMap<Uuid, NodeRun>>,
    }

    impl MemoryRecorder {
        fn node_run(&self, node_id: &str) -> Option<NodeRun> {
            self.node_runs
                .lock()
                .unwrap()
                .values()
                .find(|nr| nr.node_id == node_id)
                .cloned()
        }

        fn node_runs_sorted(&self) -> Vec<NodeRun> {
            let mut all: Vec<NodeRun> = self.node_runs.lock().unwrap().values().cloned().collect();
            all.sort_by_key(|nr| nr.execution_order);
            all
        }
    }

    #[async_trait]
    impl ExecutionRecorder for MemoryRecorder {
        async fn create_run(&self, run: &Run) -> Result<()> {
            self.runs.lock().unwrap().insert(run.id, run.clone());
            Ok(())
        }

        async fn update_run(&self, run: &Run) -> Result<()> {
            self.runs.lock().unwrap().insert(run.id, run.clone());
            Ok(())
        }

        async fn create_node_run(&self, node_run: &NodeRun) -> Result<()> {
            self.node_runs
                .lock()
                .unwrap()
                .insert(node_run.id, node_run.clone());
            Ok(())
        }

        async fn update_node_run(&self, node_run: &NodeRun) -> Result<()> {
            self.node_runs
                .lock()
                .unwrap()
                .insert(node_run.id, node_run.clone());
            Ok(())
        }
    }

    /// Echoes its merged input back as output
    struct Echo;

    #[async_trait]
    impl NodeHandler for Echo {
        async fn execute(
            &self,
            _config: &Value,
            input: Value,
            _ctx: &HandlerContext,
        ) -> Result<Value, NodeFailure> {
            Ok(input)
        }
    }

    /// Fails with a configuration error every time
    struct Misconfigured;

    #[async_trait]
    impl NodeHandler for Misconfigured {
        async fn execute(
            &self,
            _config: &Value,
            _input: Value,
            _ctx: &HandlerContext,
        ) -> Result<Value, NodeFailure> {
            Err(NodeFailure::config("missing 'url' parameter"))
        }
    }

    /// Fails transiently N times, then succeeds
    struct Flaky {
        failures: AtomicU32,
    }

    #[async_trait]
    impl NodeHandler for Flaky {
        async fn execute(
            &self,
            _config: &Value,
            _input: Value,
            _ctx: &HandlerContext,
        ) -> Result<Value, NodeFailure> {
            if self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                if n > 0 { Some(n - 1) } else { None }
            }).is_ok() {
                Err(NodeFailure::transient("connection reset"))
            } else {
                Ok(json!({"recovered": true}))
            }
        }
    }

    /// Sleeps for the configured number of milliseconds, then echoes
    struct Sleepy;

    #[async_trait]
    impl NodeHandler for Sleepy {
        async fn execute(
            &self,
            config: &Value,
            input: Value,
            _ctx: &HandlerContext,
        ) -> Result<Value, NodeFailure> {
            let ms = config.get("ms").and_then(|v| v.as_u64()).unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(input)
        }
    }

    fn node(id: &str, node_type: &str, config: Value) -> NodeSpec {
        NodeSpec {
            id: id.to_string(),
            name: id.to_string(),
            node_type: node_type.to_string(),
            config,
            retry_override: None,
        }
    }

    fn edge(from: &str, to: &str) -> Edge {
        Edge {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    fn diamond(node_type_for_b: &str) -> WorkflowDefinition {
        WorkflowDefinition {
            id: "wf-diamond".to_string(),
            name: "diamond".to_string(),
            nodes: vec![
                node("a", "echo", json!({})),
                node("b", node_type_for_b, json!({})),
                node("c", "echo", json!({})),
                node("d", "echo", json!({})),
            ],
            edges: vec![edge("a", "b"), edge("a", "c"), edge("b", "d"), edge("c", "d")],
            timeout_seconds: 30,
            max_retries: 0,
            retry_delay_seconds: 0,
            schedule: None,
        }
    }

    fn coordinator(recorder: Arc<MemoryRecorder>) -> RunCoordinator {
        let mut registry = HandlerRegistry::new();
        registry.register("echo", Arc::new(Echo));
        registry.register("misconfigured", Arc::new(Misconfigured));
        registry.register("sleepy", Arc::new(Sleepy));
        RunCoordinator::new(Arc::new(registry), recorder, 4)
    }

    #[tokio::test]
    async fn diamond_all_success() {
        let recorder = Arc::new(MemoryRecorder::default());
        let coordinator = coordinator(Arc::clone(&recorder));

        let run = coordinator
            .run(&diamond("echo"), json!({"seed": 1}), HashMap::new(), "manual")
            .await;

        assert_eq!(run.status, RunStatus::Success);
        assert!(run.error_message.is_none());

        let node_runs = recorder.node_runs_sorted();
        assert_eq!(node_runs.len(), 4);
        assert!(node_runs.iter().all(|nr| nr.status == NodeRunStatus::Success));

        // execution_order strictly increasing and batch-shaped:
        // [a] then [b, c] then [d]
        let orders: Vec<u32> = node_runs.iter().map(|nr| nr.execution_order).collect();
        assert_eq!(orders, vec![0, 1, 2, 3]);
        assert_eq!(node_runs[0].node_id, "a");
        assert_eq!(node_runs[3].node_id, "d");
        let middle: HashSet<&str> = node_runs[1..3].iter().map(|nr| nr.node_id.as_str()).collect();
        assert_eq!(middle, HashSet::from(["b", "c"]));
    }

    #[tokio::test]
    async fn downstream_output_sees_predecessors() {
        let recorder = Arc::new(MemoryRecorder::default());
        let coordinator = coordinator(Arc::clone(&recorder));

        let run = coordinator
            .run(&diamond("echo"), json!({"seed": 1}), HashMap::new(), "manual")
            .await;

        // d's merged input carries both predecessor outputs keyed by node id
        let d = recorder.node_run("d").unwrap();
        assert!(d.input_data.get("b").is_some());
        assert!(d.input_data.get("c").is_some());
        assert_eq!(run.context_snapshot["node_outputs"]["a"]["seed"], json!(1));
    }

    #[tokio::test]
    async fn config_failure_skips_downstream() {
        let recorder = Arc::new(MemoryRecorder::default());
        let coordinator = coordinator(Arc::clone(&recorder));

        let run = coordinator
            .run(&diamond("misconfigured"), json!({}), HashMap::new(), "manual")
            .await;

        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.error_message.as_deref().unwrap().contains("node 'b'"));

        let b = recorder.node_run("b").unwrap();
        assert_eq!(b.status, NodeRunStatus::Failed);
        assert_eq!(b.attempts, 1); // configuration errors are never retried
        let c = recorder.node_run("c").unwrap();
        assert_eq!(c.status, NodeRunStatus::Success);
        let d = recorder.node_run("d").unwrap();
        assert_eq!(d.status, NodeRunStatus::Skipped);
        assert!(d.error_message.is_none());
    }

    #[tokio::test]
    async fn unknown_node_type_is_configuration_failure() {
        let recorder = Arc::new(MemoryRecorder::default());
        let coordinator = coordinator(Arc::clone(&recorder));

        let mut def = diamond("echo");
        def.nodes[1].node_type = "does_not_exist".to_string();

        let run = coordinator.run(&def, json!({}), HashMap::new(), "manual").await;

        assert_eq!(run.status, RunStatus::Failed);
        let b = recorder.node_run("b").unwrap();
        assert_eq!(b.status, NodeRunStatus::Failed);
        assert!(b.error_message.as_deref().unwrap().contains("unknown node type"));
        assert_eq!(recorder.node_run("d").unwrap().status, NodeRunStatus::Skipped);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let recorder = Arc::new(MemoryRecorder::default());
        let mut registry = HandlerRegistry::new();
        registry.register("flaky", Arc::new(Flaky { failures: AtomicU32::new(2) }));
        let coordinator = RunCoordinator::new(Arc::new(registry), recorder.clone(), 4);

        let def = WorkflowDefinition {
            id: "wf-flaky".to_string(),
            name: "flaky".to_string(),
            nodes: vec![node("f", "flaky", json!({}))],
            edges: vec![],
            timeout_seconds: 30,
            max_retries: 3,
            retry_delay_seconds: 0,
            schedule: None,
        };

        let run = coordinator.run(&def, json!({}), HashMap::new(), "manual").await;

        assert_eq!(run.status, RunStatus::Success);
        let f = recorder.node_run("f").unwrap();
        assert_eq!(f.status, NodeRunStatus::Success);
        assert_eq!(f.attempts, 3); // two transient failures, then success
    }

    #[tokio::test]
    async fn exhausted_retries_fail_the_run() {
        let recorder = Arc::new(MemoryRecorder::default());
        let mut registry = HandlerRegistry::new();
        // More failures queued than the policy allows
        registry.register("flaky", Arc::new(Flaky { failures: AtomicU32::new(10) }));
        registry.register("echo", Arc::new(Echo));
        let coordinator = RunCoordinator::new(Arc::new(registry), recorder.clone(), 4);

        let def = WorkflowDefinition {
            id: "wf-exhaust".to_string(),
            name: "exhaust".to_string(),
            nodes: vec![node("f", "flaky", json!({})), node("down", "echo", json!({}))],
            edges: vec![edge("f", "down")],
            timeout_seconds: 30,
            max_retries: 2,
            retry_delay_seconds: 0,
            schedule: None,
        };

        let run = coordinator.run(&def, json!({}), HashMap::new(), "manual").await;

        assert_eq!(run.status, RunStatus::Failed);
        let f = recorder.node_run("f").unwrap();
        assert_eq!(f.status, NodeRunStatus::Failed);
        // attempts = first try + max_retries, never more
        assert_eq!(f.attempts, 3);
        assert_eq!(recorder.node_run("down").unwrap().status, NodeRunStatus::Skipped);
    }

    #[tokio::test]
    async fn per_node_retry_override_wins() {
        let recorder = Arc::new(MemoryRecorder::default());
        let mut registry = HandlerRegistry::new();
        registry.register("flaky", Arc::new(Flaky { failures: AtomicU32::new(10) }));
        let coordinator = RunCoordinator::new(Arc::new(registry), recorder.clone(), 4);

        let mut spec = node("f", "flaky", json!({}));
        spec.retry_override = Some(0);
        let def = WorkflowDefinition {
            id: "wf-override".to_string(),
            name: "override".to_string(),
            nodes: vec![spec],
            edges: vec![],
            timeout_seconds: 30,
            max_retries: 5,
            retry_delay_seconds: 0,
            schedule: None,
        };

        let run = coordinator.run(&def, json!({}), HashMap::new(), "manual").await;

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(recorder.node_run("f").unwrap().attempts, 1);
    }

    #[tokio::test]
    async fn retry_delay_spaces_attempts() {
        let recorder = Arc::new(MemoryRecorder::default());
        let mut registry = HandlerRegistry::new();
        registry.register("flaky", Arc::new(Flaky { failures: AtomicU32::new(1) }));
        let coordinator = RunCoordinator::new(Arc::new(registry), recorder.clone(), 4);

        let def = WorkflowDefinition {
            id: "wf-delay".to_string(),
            name: "delay".to_string(),
            nodes: vec![node("f", "flaky", json!({}))],
            edges: vec![],
            timeout_seconds: 30,
            max_retries: 1,
            retry_delay_seconds: 1,
            schedule: None,
        };

        let started = std::time::Instant::now();
        let run = coordinator.run(&def, json!({}), HashMap::new(), "manual").await;
        let elapsed = started.elapsed();

        assert_eq!(run.status, RunStatus::Success);
        assert_eq!(recorder.node_run("f").unwrap().attempts, 2);
        assert!(elapsed >= Duration::from_secs(1), "gap between attempts was {elapsed:?}");
    }

    #[tokio::test]
    async fn slow_handler_times_out_the_run() {
        let recorder = Arc::new(MemoryRecorder::default());
        let coordinator = coordinator(Arc::clone(&recorder));

        let def = WorkflowDefinition {
            id: "wf-slow".to_string(),
            name: "slow".to_string(),
            nodes: vec![
                node("slow", "sleepy", json!({"ms": 5000})),
                node("after", "echo", json!({})),
            ],
            edges: vec![edge("slow", "after")],
            timeout_seconds: 1,
            max_retries: 3,
            retry_delay_seconds: 0,
            schedule: None,
        };

        let run = coordinator.run(&def, json!({}), HashMap::new(), "manual").await;

        assert_eq!(run.status, RunStatus::TimedOut);
        let slow = recorder.node_run("slow").unwrap();
        assert_eq!(slow.status, NodeRunStatus::Failed);
        // budget exhaustion is not retried
        assert_eq!(slow.attempts, 1);
        // no further batches dispatched
        assert!(recorder.node_run("after").is_none());
    }

    #[tokio::test]
    async fn cancellation_between_batches_skips_the_rest() {
        let recorder = Arc::new(MemoryRecorder::default());
        let coordinator = Arc::new(coordinator(Arc::clone(&recorder)));

        let def = WorkflowDefinition {
            id: "wf-cancel".to_string(),
            name: "cancel".to_string(),
            nodes: vec![
                node("first", "sleepy", json!({"ms": 300})),
                node("second", "echo", json!({})),
            ],
            edges: vec![edge("first", "second")],
            timeout_seconds: 30,
            max_retries: 0,
            retry_delay_seconds: 0,
            schedule: None,
        };

        let runner = Arc::clone(&coordinator);
        let handle = tokio::spawn(async move {
            runner.run(&def, json!({}), HashMap::new(), "manual").await
        });

        // Wait for the run to register, then request cancellation while the
        // first batch is still in flight.
        let run_id = loop {
            let active = coordinator.active_runs().await;
            if let Some(&id) = active.first() {
                break id;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        };
        assert!(coordinator.request_cancel(run_id).await);

        let run = handle.await.unwrap();
        assert_eq!(run.status, RunStatus::Cancelled);

        // The in-flight node settled normally; the rest was skipped.
        assert_eq!(recorder.node_run("first").unwrap().status, NodeRunStatus::Success);
        assert_eq!(recorder.node_run("second").unwrap().status, NodeRunStatus::Skipped);
    }

    #[tokio::test]
    async fn structural_error_creates_no_node_runs() {
        let recorder = Arc::new(MemoryRecorder::default());
        let coordinator = coordinator(Arc::clone(&recorder));

        let def = WorkflowDefinition {
            id: "wf-cycle".to_string(),
            name: "cycle".to_string(),
            nodes: vec![node("a", "echo", json!({})), node("b", "echo", json!({}))],
            edges: vec![edge("a", "b"), edge("b", "a")],
            timeout_seconds: 30,
            max_retries: 0,
            retry_delay_seconds: 0,
            schedule: None,
        };

        let run = coordinator.run(&def, json!({}), HashMap::new(), "manual").await;

        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.error_message.as_deref().unwrap().contains("cycle"));
        assert!(recorder.node_runs_sorted().is_empty());
    }

    #[tokio::test]
    async fn variables_reach_node_input() {
        let recorder = Arc::new(MemoryRecorder::default());
        let coordinator = coordinator(Arc::clone(&recorder));

        let def = WorkflowDefinition {
            id: "wf-vars".to_string(),
            name: "vars".to_string(),
            nodes: vec![node("a", "echo", json!({}))],
            edges: vec![],
            timeout_seconds: 30,
            max_retries: 0,
            retry_delay_seconds: 0,
            schedule: None,
        };

        let mut variables = HashMap::new();
        variables.insert("api_base".to_string(), json!("https://internal"));

        let run = coordinator.run(&def, json!({}), variables, "manual").await;

        assert_eq!(run.status, RunStatus::Success);
        let a = recorder.node_run("a").unwrap();
        assert_eq!(a.input_data["api_base"], json!("https://internal"));
        assert_eq!(a.output_data["api_base"], json!("https://internal"));
    }

    #[tokio::test]
    async fn single_permit_serializes_parallel_nodes() {
        let recorder = Arc::new(MemoryRecorder::default());
        let mut registry = HandlerRegistry::new();
        registry.register("sleepy", Arc::new(Sleepy));
        let coordinator = RunCoordinator::new(Arc::new(registry), recorder.clone(), 1);

        let def = WorkflowDefinition {
            id: "wf-pool".to_string(),
            name: "pool".to_string(),
            nodes: vec![
                node("p1", "sleepy", json!({"ms": 100})),
                node("p2", "sleepy", json!({"ms": 100})),
            ],
            edges: vec![],
            timeout_seconds: 30,
            max_retries: 0,
            retry_delay_seconds: 0,
            schedule: None,
        };

        let started = std::time::Instant::now();
        let run = coordinator.run(&def, json!({}), HashMap::new(), "manual").await;

        assert_eq!(run.status, RunStatus::Success);
        // With one permit the second node waits for the first to release it,
        // so the batch takes at least the sum of both sleeps.
        assert!(started.elapsed() >= Duration::from_millis(200));
        let node_runs = recorder.node_runs_sorted();
        assert_eq!(node_runs.len(), 2);
        assert!(node_runs.iter().all(|nr| nr.status == NodeRunStatus::Success));
    }
}
