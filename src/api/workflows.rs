/// Workflow management REST API
///
/// CRUD for workflow definitions and their variables, plus the manual
/// execution trigger. Every definition change is hot-reloaded into the
/// registry and the scheduler, so running executions keep their definition
/// while new triggers pick up the fresh one.

use crate::{
    runtime::{coordinator::RunCoordinator, recorder::SqliteRecorder, scheduler::CronSchedulerService},
    workflow::{
        registry::WorkflowRegistry,
        storage::WorkflowStorage,
        types::{WorkflowDefinition, WorkflowVariable},
    },
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{collections::HashMap, sync::Arc};

/// Application state shared by all routes
#[derive(Clone)]
pub struct AppState {
    pub storage: WorkflowStorage,
    pub registry: Arc<WorkflowRegistry>,
    pub scheduler: Arc<CronSchedulerService>,
    pub coordinator: Arc<RunCoordinator>,
    pub recorder: SqliteRecorder,
}

#[derive(Debug, Serialize)]
pub struct WorkflowResponse {
    pub id: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateWorkflowRequest {
    pub workflow: WorkflowDefinition,
}

/// Request body for the manual execution trigger
#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default)]
    pub input_data: Value,
    /// When false, the run is queued and only its id is returned
    #[serde(default = "default_sync")]
    pub sync: bool,
}

fn default_sync() -> bool {
    true
}

pub fn create_workflow_routes() -> Router<AppState> {
    Router::new()
        .route("/api/workflows", post(create_workflow))
        .route("/api/workflows", get(list_workflows))
        .route("/api/workflows/{id}", get(get_workflow))
        .route("/api/workflows/{id}", put(update_workflow))
        .route("/api/workflows/{id}", delete(delete_workflow))
        .route("/api/workflows/{id}/execute", post(execute_workflow))
        .route("/api/workflows/{id}/variables", get(list_variables))
        .route("/api/workflows/{id}/variables/{name}", put(set_variable))
        .route("/api/workflows/{id}/variables/{name}", delete(delete_variable))
}

/// POST /api/workflows
async fn create_workflow(
    State(state): State<AppState>,
    Json(payload): Json<CreateWorkflowRequest>,
) -> Result<Json<WorkflowResponse>, StatusCode> {
    let workflow = payload.workflow;

    if workflow.id.is_empty() || workflow.name.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    match state.storage.get_workflow(&workflow.id).await {
        Ok(Some(_)) => return Err(StatusCode::CONFLICT),
        Ok(None) => {}
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    }

    persist_and_reload(&state, &workflow).await?;

    tracing::info!("📦 Created workflow: {} ({})", workflow.id, workflow.name);
    Ok(Json(WorkflowResponse {
        id: workflow.id.clone(),
        message: format!("Workflow '{}' created successfully", workflow.name),
    }))
}

/// GET /api/workflows
async fn list_workflows(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    match state.storage.list_workflows().await {
        Ok(workflows) => Ok(Json(json!({ "workflows": workflows }))),
        Err(e) => {
            tracing::error!("Failed to list workflows: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /api/workflows/{id}
async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<WorkflowDefinition>, StatusCode> {
    match state.storage.get_workflow(&id).await {
        Ok(Some(workflow)) => Ok(Json(workflow)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("Failed to get workflow {}: {}", id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// PUT /api/workflows/{id}
async fn update_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<CreateWorkflowRequest>,
) -> Result<Json<WorkflowResponse>, StatusCode> {
    let mut workflow = payload.workflow;
    workflow.id = id.clone();

    if workflow.name.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    match state.storage.get_workflow(&id).await {
        Ok(Some(_)) => {}
        Ok(None) => return Err(StatusCode::NOT_FOUND),
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    }

    persist_and_reload(&state, &workflow).await?;

    tracing::info!("🔄 Updated workflow: {} ({})", workflow.id, workflow.name);
    Ok(Json(WorkflowResponse {
        id: workflow.id.clone(),
        message: format!("Workflow '{}' updated successfully", workflow.name),
    }))
}

/// DELETE /api/workflows/{id}
async fn delete_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    state.scheduler.remove_schedule(&id).await;
    state.registry.remove_workflow(&id);

    match state.storage.delete_workflow(&id).await {
        Ok(true) => {
            tracing::info!("🗑️ Deleted workflow: {}", id);
            Ok(Json(json!({ "message": "Workflow deleted successfully" })))
        }
        Ok(false) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("Failed to delete workflow: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// POST /api/workflows/{id}/execute
///
/// Manual trigger. `sync: true` (default) blocks until the run is terminal
/// and returns the full Run; `sync: false` returns the queued run id right
/// away.
async fn execute_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<ExecuteRequest>,
) -> Result<Json<Value>, StatusCode> {
    let Some(definition) = state.registry.get_workflow(&id) else {
        return Err(StatusCode::NOT_FOUND);
    };

    let variables = state
        .storage
        .load_variables(&id)
        .await
        .unwrap_or_else(|e| {
            tracing::warn!("⚠️ Failed to load variables for '{}': {}", id, e);
            HashMap::new()
        });

    if payload.sync {
        let run = state
            .coordinator
            .run(&definition, payload.input_data, variables, "manual")
            .await;
        Ok(Json(json!({ "run": run })))
    } else {
        let run_id =
            state
                .coordinator
                .spawn_run(definition, payload.input_data, variables, "manual");
        Ok(Json(json!({ "run_id": run_id, "status": "queued" })))
    }
}

/// GET /api/workflows/{id}/variables
async fn list_variables(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    match state.storage.load_variables(&id).await {
        Ok(variables) => Ok(Json(json!({ "variables": variables }))),
        Err(e) => {
            tracing::error!("Failed to load variables for {}: {}", id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// PUT /api/workflows/{id}/variables/{name} — body is the JSON value
async fn set_variable(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
    Json(value): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    let variable = WorkflowVariable {
        workflow_id: id.clone(),
        name: name.clone(),
        value,
    };

    match state.storage.set_variable(&variable).await {
        Ok(()) => Ok(Json(json!({ "message": format!("Variable '{name}' set") }))),
        Err(e) => {
            tracing::error!("Failed to set variable {} on {}: {}", name, id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// DELETE /api/workflows/{id}/variables/{name}
async fn delete_variable(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
) -> Result<Json<Value>, StatusCode> {
    match state.storage.delete_variable(&id, &name).await {
        Ok(true) => Ok(Json(json!({ "message": format!("Variable '{name}' deleted") }))),
        Ok(false) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("Failed to delete variable {} on {}: {}", name, id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Save to storage, then hot-reload registry and scheduler
async fn persist_and_reload(
    state: &AppState,
    workflow: &WorkflowDefinition,
) -> Result<(), StatusCode> {
    if let Err(e) = state.storage.save_workflow(workflow).await {
        tracing::error!("Failed to save workflow: {}", e);
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }

    if let Err(e) = state.registry.reload_workflow(&workflow.id).await {
        tracing::error!("Failed to reload workflow into registry: {}", e);
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }

    if let Err(e) = state.scheduler.add_or_update_schedule(workflow).await {
        tracing::error!("Failed to reload schedule for workflow {}: {}", workflow.id, e);
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }

    Ok(())
}
