/// Webhook trigger endpoints
///
/// Any HTTP request to /webhook/{workflow_id} queues a run with the request
/// body as input data and acknowledges immediately with the run id. Webhook
/// callers never wait for the workflow to finish.

use crate::api::workflows::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::any,
    Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;

pub fn create_webhook_routes() -> Router<AppState> {
    Router::new().route("/webhook/{workflow_id}", any(trigger_webhook))
}

/// ANY /webhook/{workflow_id}
async fn trigger_webhook(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
    body: String,
) -> Result<Json<Value>, StatusCode> {
    tracing::info!("📥 Webhook received for workflow: {}", workflow_id);

    // Empty bodies (e.g. plain GET pings) trigger with an empty object
    let payload: Value = if body.trim().is_empty() {
        json!({})
    } else {
        match serde_json::from_str(&body) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("❌ Invalid JSON payload for webhook {}: {}", workflow_id, e);
                return Err(StatusCode::BAD_REQUEST);
            }
        }
    };

    let Some(definition) = state.registry.get_workflow(&workflow_id) else {
        tracing::warn!("❌ Webhook called for unknown workflow: {}", workflow_id);
        return Err(StatusCode::NOT_FOUND);
    };

    let variables = state
        .storage
        .load_variables(&workflow_id)
        .await
        .unwrap_or_else(|e| {
            tracing::warn!("⚠️ Failed to load variables for '{}': {}", workflow_id, e);
            HashMap::new()
        });

    let run_id = state
        .coordinator
        .spawn_run(definition, payload, variables, "webhook");

    tracing::info!("🚀 Webhook queued run {} for workflow: {}", run_id, workflow_id);
    Ok(Json(json!({ "run_id": run_id, "status": "queued" })))
}
