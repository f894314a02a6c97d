/// Run history and control API
///
/// Read access to the execution trace (runs and their node runs) and the
/// cancellation endpoint. Cancellation is cooperative: the signal is observed
/// between batches, so in-flight nodes settle first.

use crate::api::workflows::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

pub fn create_run_routes() -> Router<AppState> {
    Router::new()
        .route("/api/workflows/{id}/runs", get(list_runs))
        .route("/api/runs/{run_id}", get(get_run))
        .route("/api/runs/{run_id}/cancel", post(cancel_run))
}

/// GET /api/workflows/{id}/runs?limit=50 (newest first)
async fn list_runs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ListRunsQuery>,
) -> Result<Json<Value>, StatusCode> {
    match state.recorder.list_runs(&id, query.limit).await {
        Ok(runs) => Ok(Json(json!({ "runs": runs }))),
        Err(e) => {
            tracing::error!("Failed to list runs for {}: {}", id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /api/runs/{run_id}: the run plus its node runs in dispatch order
async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<Value>, StatusCode> {
    let run = match state.recorder.get_run(run_id).await {
        Ok(Some(run)) => run,
        Ok(None) => return Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("Failed to get run {}: {}", run_id, e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let node_runs = match state.recorder.list_node_runs(run_id).await {
        Ok(node_runs) => node_runs,
        Err(e) => {
            tracing::error!("Failed to list node runs for {}: {}", run_id, e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    Ok(Json(json!({ "run": run, "node_runs": node_runs })))
}

/// POST /api/runs/{run_id}/cancel
///
/// 404 for an unknown run, 409 for a run already terminal.
async fn cancel_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<Value>, StatusCode> {
    if state.coordinator.request_cancel(run_id).await {
        return Ok(Json(json!({ "message": "Cancellation requested" })));
    }

    // Not in flight: distinguish unknown from already-terminal
    match state.recorder.get_run(run_id).await {
        Ok(Some(run)) if run.status.is_terminal() => Err(StatusCode::CONFLICT),
        Ok(Some(_)) | Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("Failed to look up run {}: {}", run_id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
