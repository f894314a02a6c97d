/// Execution recorder: persistence of Run and NodeRun records
///
/// The coordinator writes here at every state transition. Writes are
/// best-effort from the engine's point of view: the coordinator logs recorder
/// failures and keeps executing, so an unavailable store never turns into an
/// execution failure.

use crate::workflow::types::{NodeRun, NodeRunStatus, Run, RunStatus};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{sqlite::SqlitePool, Row};
use uuid::Uuid;

/// Store for execution traces, written at well-defined transition points
#[async_trait]
pub trait ExecutionRecorder: Send + Sync {
    async fn create_run(&self, run: &Run) -> Result<()>;
    async fn update_run(&self, run: &Run) -> Result<()>;
    async fn create_node_run(&self, node_run: &NodeRun) -> Result<()>;
    async fn update_node_run(&self, node_run: &NodeRun) -> Result<()>;
}

/// SQLite-backed recorder, also serving the run-history read queries
///
/// Runs and node runs land in two tables with JSON columns for the I/O
/// snapshots. Same storage idiom as the definition store: indexed lookup
/// fields plus JSON payloads.
#[derive(Debug, Clone)]
pub struct SqliteRecorder {
    pool: SqlitePool,
}

impl SqliteRecorder {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the runs / node_runs tables. Safe to call repeatedly.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                workflow_id TEXT NOT NULL,
                status TEXT NOT NULL,
                triggered_by TEXT NOT NULL,
                input_data JSON NOT NULL,
                context_snapshot JSON NOT NULL,
                error_message TEXT,
                started_at TEXT NOT NULL,
                finished_at TEXT,
                duration_ms INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS node_runs (
                id TEXT PRIMARY KEY,
                run_id TEXT NOT NULL,
                node_id TEXT NOT NULL,
                node_name TEXT NOT NULL,
                execution_order INTEGER NOT NULL,
                status TEXT NOT NULL,
                attempts INTEGER NOT NULL,
                input_data JSON NOT NULL,
                output_data JSON NOT NULL,
                error_message TEXT,
                started_at TEXT NOT NULL,
                finished_at TEXT,
                duration_ms INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_runs_workflow ON runs(workflow_id, started_at)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_node_runs_run ON node_runs(run_id, execution_order)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Most recent runs for a workflow, newest first
    pub async fn list_runs(&self, workflow_id: &str, limit: i64) -> Result<Vec<Run>> {
        let rows = sqlx::query(
            "SELECT * FROM runs WHERE workflow_id = ? ORDER BY started_at DESC LIMIT ?",
        )
        .bind(workflow_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(run_from_row).collect()
    }

    pub async fn get_run(&self, run_id: Uuid) -> Result<Option<Run>> {
        let row = sqlx::query("SELECT * FROM runs WHERE id = ?")
            .bind(run_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(run_from_row).transpose()
    }

    /// Node runs of one run in dispatch order (the execution log)
    pub async fn list_node_runs(&self, run_id: Uuid) -> Result<Vec<NodeRun>> {
        let rows = sqlx::query("SELECT * FROM node_runs WHERE run_id = ? ORDER BY execution_order")
            .bind(run_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(node_run_from_row).collect()
    }
}

#[async_trait]
impl ExecutionRecorder for SqliteRecorder {
    async fn create_run(&self, run: &Run) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO runs
                (id, workflow_id, status, triggered_by, input_data,
                 context_snapshot, error_message, started_at, finished_at, duration_ms)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(run.id.to_string())
        .bind(&run.workflow_id)
        .bind(run.status.as_str())
        .bind(&run.triggered_by)
        .bind(run.input_data.to_string())
        .bind(run.context_snapshot.to_string())
        .bind(&run.error_message)
        .bind(run.started_at.to_rfc3339())
        .bind(run.finished_at.map(|t| t.to_rfc3339()))
        .bind(run.duration_ms)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_run(&self, run: &Run) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE runs SET
                status = ?, context_snapshot = ?, error_message = ?,
                finished_at = ?, duration_ms = ?
            WHERE id = ?
            "#,
        )
        .bind(run.status.as_str())
        .bind(run.context_snapshot.to_string())
        .bind(&run.error_message)
        .bind(run.finished_at.map(|t| t.to_rfc3339()))
        .bind(run.duration_ms)
        .bind(run.id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn create_node_run(&self, node_run: &NodeRun) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO node_runs
                (id, run_id, node_id, node_name, execution_order, status, attempts,
                 input_data, output_data, error_message, started_at, finished_at, duration_ms)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(node_run.id.to_string())
        .bind(node_run.run_id.to_string())
        .bind(&node_run.node_id)
        .bind(&node_run.node_name)
        .bind(node_run.execution_order)
        .bind(node_run.status.as_str())
        .bind(node_run.attempts)
        .bind(node_run.input_data.to_string())
        .bind(node_run.output_data.to_string())
        .bind(&node_run.error_message)
        .bind(node_run.started_at.to_rfc3339())
        .bind(node_run.finished_at.map(|t| t.to_rfc3339()))
        .bind(node_run.duration_ms)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_node_run(&self, node_run: &NodeRun) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE node_runs SET
                status = ?, attempts = ?, output_data = ?, error_message = ?,
                finished_at = ?, duration_ms = ?
            WHERE id = ?
            "#,
        )
        .bind(node_run.status.as_str())
        .bind(node_run.attempts)
        .bind(node_run.output_data.to_string())
        .bind(&node_run.error_message)
        .bind(node_run.finished_at.map(|t| t.to_rfc3339()))
        .bind(node_run.duration_ms)
        .bind(node_run.id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn parse_status(raw: &str) -> RunStatus {
    match raw {
        "queued" => RunStatus::Queued,
        "running" => RunStatus::Running,
        "success" => RunStatus::Success,
        "cancelled" => RunStatus::Cancelled,
        "timed_out" => RunStatus::TimedOut,
        _ => RunStatus::Failed,
    }
}

fn parse_node_status(raw: &str) -> NodeRunStatus {
    match raw {
        "pending" => NodeRunStatus::Pending,
        "running" => NodeRunStatus::Running,
        "success" => NodeRunStatus::Success,
        "skipped" => NodeRunStatus::Skipped,
        _ => NodeRunStatus::Failed,
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn run_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Run> {
    let id: String = row.get("id");
    let status: String = row.get("status");
    let input_data: String = row.get("input_data");
    let context_snapshot: String = row.get("context_snapshot");
    let started_at: String = row.get("started_at");
    let finished_at: Option<String> = row.get("finished_at");

    Ok(Run {
        id: Uuid::parse_str(&id)?,
        workflow_id: row.get("workflow_id"),
        status: parse_status(&status),
        triggered_by: row.get("triggered_by"),
        input_data: serde_json::from_str(&input_data).unwrap_or(Value::Null),
        context_snapshot: serde_json::from_str(&context_snapshot).unwrap_or(Value::Null),
        error_message: row.get("error_message"),
        started_at: parse_timestamp(&started_at),
        finished_at: finished_at.as_deref().map(parse_timestamp),
        duration_ms: row.get("duration_ms"),
    })
}

fn node_run_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<NodeRun> {
    let id: String = row.get("id");
    let run_id: String = row.get("run_id");
    let status: String = row.get("status");
    let input_data: String = row.get("input_data");
    let output_data: String = row.get("output_data");
    let started_at: String = row.get("started_at");
    let finished_at: Option<String> = row.get("finished_at");

    Ok(NodeRun {
        id: Uuid::parse_str(&id)?,
        run_id: Uuid::parse_str(&run_id)?,
        node_id: row.get("node_id"),
        node_name: row.get("node_name"),
        execution_order: row.get("execution_order"),
        status: parse_node_status(&status),
        attempts: row.get("attempts"),
        input_data: serde_json::from_str(&input_data).unwrap_or(Value::Null),
        output_data: serde_json::from_str(&output_data).unwrap_or(Value::Null),
        error_message: row.get("error_message"),
        started_at: parse_timestamp(&started_at),
        finished_at: finished_at.as_deref().map(parse_timestamp),
        duration_ms: row.get("duration_ms"),
    })
}
