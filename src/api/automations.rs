/// Automation management REST API endpoints
///
/// CRUD operations for automation definitions with hot-reload into the
/// registry, plus read endpoints for run records and node logs.
/// Every definition change swaps the registry immediately; a paused or
/// deleted automation stops receiving triggers without a restart.

use crate::{
    automation::{registry::AutomationRegistry, storage::AutomationStorage, Automation},
    runlog::RunLogStorage,
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
use std::sync::Arc;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    /// Automation definition persistence
    pub storage: AutomationStorage,
    /// Hot-reload registry for in-memory automations
    pub registry: Arc<AutomationRegistry>,
    /// Run and node audit records
    pub run_logs: RunLogStorage,
}

/// Response for automation creation/update operations
#[derive(Debug, Serialize)]
pub struct AutomationResponse {
    pub id: String,
    pub message: String,
}

/// Request body for automation creation and update
#[derive(Debug, Deserialize)]
pub struct SaveAutomationRequest {
    pub automation: Automation,
}

/// Create automation management routes
pub fn create_automation_routes() -> Router<AppState> {
    Router::new()
        .route("/api/automations", post(create_automation))
        .route("/api/automations", get(list_automations))
        .route("/api/automations/{id}", get(get_automation))
        .route("/api/automations/{id}", put(update_automation))
        .route("/api/automations/{id}", delete(delete_automation))
        .route("/api/automations/{id}/runs", get(list_runs))
        .route("/api/runs/{run_id}/nodes", get(list_node_logs))
}

/// Create a new automation
///
/// POST /api/automations
/// Body: { "automation": { "id": "...", "team_id": "...", "name": "...",
///         "status": "active", "nodes": [...], "edges": [...] } }
async fn create_automation(
    State(state): State<AppState>,
    Json(payload): Json<SaveAutomationRequest>,
) -> Result<Json<AutomationResponse>, StatusCode> {
    let automation = payload.automation;

    if automation.id.is_empty() || automation.name.is_empty() || automation.team_id.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    match state.storage.get_automation(&automation.id).await {
        Ok(Some(_)) => return Err(StatusCode::CONFLICT),
        Ok(None) => {}
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    }

    if let Err(e) = state.storage.save_automation(&automation).await {
        tracing::error!("Failed to save automation: {}", e);
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }

    if let Err(e) = state.registry.reload_automation(&automation.id).await {
        tracing::error!("Failed to reload automation into registry: {}", e);
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }

    tracing::info!("🔥 Created automation: {} ({})", automation.id, automation.name);

    Ok(Json(AutomationResponse {
        id: automation.id.clone(),
        message: format!("Automation '{}' created successfully", automation.name),
    }))
}

/// List all automations
///
/// GET /api/automations
async fn list_automations(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    match state.storage.list_automations().await {
        Ok(automations) => Ok(Json(json!({ "automations": automations }))),
        Err(e) => {
            tracing::error!("Failed to list automations: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Get a specific automation by ID
///
/// GET /api/automations/:id
async fn get_automation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Automation>, StatusCode> {
    match state.storage.get_automation(&id).await {
        Ok(Some(automation)) => Ok(Json(automation)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("Failed to get automation {}: {}", id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Update an existing automation
///
/// PUT /api/automations/:id
async fn update_automation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<SaveAutomationRequest>,
) -> Result<Json<AutomationResponse>, StatusCode> {
    let mut automation = payload.automation;

    // The URL parameter is authoritative for the id
    automation.id = id.clone();

    if automation.name.is_empty() || automation.team_id.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    match state.storage.get_automation(&id).await {
        Ok(Some(_)) => {}
        Ok(None) => return Err(StatusCode::NOT_FOUND),
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    }

    if let Err(e) = state.storage.save_automation(&automation).await {
        tracing::error!("Failed to update automation: {}", e);
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }

    if let Err(e) = state.registry.reload_automation(&automation.id).await {
        tracing::error!("Failed to reload updated automation into registry: {}", e);
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }

    tracing::info!("🔥 Hot-reloaded automation: {} ({})", automation.id, automation.name);

    Ok(Json(AutomationResponse {
        id: automation.id.clone(),
        message: format!("Automation '{}' updated successfully", automation.name),
    }))
}

/// Delete an automation
///
/// DELETE /api/automations/:id
async fn delete_automation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    if let Err(e) = state.registry.remove_automation(&id).await {
        tracing::error!("Failed to remove automation from registry: {}", e);
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }

    match state.storage.delete_automation(&id).await {
        Ok(true) => {
            tracing::info!("Deleted automation: {}", id);
            Ok(Json(json!({ "message": "Automation deleted successfully" })))
        }
        Ok(false) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("Failed to delete automation: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// List recent runs of an automation
///
/// GET /api/automations/:id/runs
async fn list_runs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    match state.run_logs.list_runs(&id, 50).await {
        Ok(runs) => Ok(Json(json!({ "runs": runs }))),
        Err(e) => {
            tracing::error!("Failed to list runs for automation {}: {}", id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// List the node-level audit trail of one run
///
/// GET /api/runs/:run_id/nodes
async fn list_node_logs(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    match state.run_logs.list_node_logs(&run_id).await {
        Ok(logs) => Ok(Json(json!({ "nodes": logs }))),
        Err(e) => {
            tracing::error!("Failed to list node logs for run {}: {}", run_id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
