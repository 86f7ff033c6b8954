/// Inbound trigger endpoints
///
/// Accepts external events and turns them into automation runs. The
/// request is acknowledged with 202 as soon as the run is dispatched;
/// execution happens on an independent task, and its outcome lands in
/// the run records, never in this response.

use crate::api::automations::AppState;
use crate::automation::{registry::AutomationRegistry, Automation};
use crate::contact::{Contact, ContactStorage};
use crate::messaging::ChannelProfile;
use crate::runtime::ExecutionEngine;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{post, Router},
};
use serde_json::{json, Value};
use std::sync::Arc;

/// Extended application state with the execution engine
#[derive(Clone)]
pub struct TriggerAppState {
    /// Base app state with storage and registry
    pub app_state: AppState,
    /// Execution engine the runs are dispatched on
    pub engine: Arc<ExecutionEngine>,
    /// Contact lookup for payload-identified contacts
    pub contacts: ContactStorage,
    /// Channel identity the dispatched runs send from
    pub profile: ChannelProfile,
}

/// Create trigger routes
pub fn create_trigger_routes() -> Router<TriggerAppState> {
    Router::new().route("/trigger/{automation_id}/{node_id}", post(execute_trigger))
}

/// Start an automation run from an external event
///
/// POST /trigger/{automation_id}/{node_id}
/// Body: arbitrary JSON event payload; "contact_id" or "phone" at the
/// top level binds the acting contact.
async fn execute_trigger(
    State(state): State<TriggerAppState>,
    Path((automation_id, node_id)): Path<(String, String)>,
    body: String,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    tracing::info!("📥 Trigger request received: {}/{}", automation_id, node_id);

    // Parse JSON body manually to handle errors gracefully
    let payload: Value = match serde_json::from_str(&body) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!("❌ Invalid JSON payload for trigger {}: {}", automation_id, e);
            return Err(StatusCode::BAD_REQUEST);
        }
    };

    let automation = resolve_triggerable(&state.app_state.registry, &automation_id)?;

    if !automation.nodes.iter().any(|node| node.id == node_id) {
        tracing::warn!(
            "❌ Trigger called for unknown start node '{}' in automation '{}'",
            node_id,
            automation_id
        );
        return Err(StatusCode::NOT_FOUND);
    }

    let contact = resolve_contact(&state.contacts, &automation.team_id, &payload).await?;
    let contact_id = contact.as_ref().map(|c| c.id.clone());

    tracing::info!(
        "🚀 Dispatching automation '{}' from node '{}' (contact: {})",
        automation_id,
        node_id,
        contact_id.as_deref().unwrap_or("none")
    );

    let engine = Arc::clone(&state.engine);
    let profile = state.profile.clone();
    let start_node_id = node_id.clone();
    tokio::spawn(async move {
        engine
            .execute_automation(&automation, contact, &start_node_id, Some(payload), &profile)
            .await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "automation_id": automation_id,
            "start_node_id": node_id,
            "contact_id": contact_id,
            "message": "Run dispatched"
        })),
    ))
}

/// Resolve an automation that may receive triggers
///
/// Only active automations qualify; a known but paused/draft automation
/// is a conflict, an unknown one is not found.
fn resolve_triggerable(
    registry: &AutomationRegistry,
    automation_id: &str,
) -> Result<Arc<Automation>, StatusCode> {
    if let Some(automation) = registry.get_active_automation(automation_id) {
        return Ok(automation);
    }

    if registry.get_automation(automation_id).is_some() {
        tracing::warn!("❌ Trigger called for non-active automation: {}", automation_id);
        Err(StatusCode::CONFLICT)
    } else {
        tracing::warn!("❌ Trigger called for unknown automation: {}", automation_id);
        Err(StatusCode::NOT_FOUND)
    }
}

/// Bind the acting contact named by the event payload, if any
///
/// "contact_id" wins over "phone"; a payload that names a contact that
/// does not exist is a client error, a payload that names none starts
/// an entity-less run.
async fn resolve_contact(
    contacts: &ContactStorage,
    team_id: &str,
    payload: &Value,
) -> Result<Option<Contact>, StatusCode> {
    if let Some(contact_id) = payload.get("contact_id").and_then(|v| v.as_str()) {
        return match contacts.get_contact(contact_id).await {
            Ok(Some(contact)) => Ok(Some(contact)),
            Ok(None) => {
                tracing::warn!("❌ Trigger payload names unknown contact: {}", contact_id);
                Err(StatusCode::NOT_FOUND)
            }
            Err(e) => {
                tracing::error!("Failed to load contact {}: {}", contact_id, e);
                Err(StatusCode::INTERNAL_SERVER_ERROR)
            }
        };
    }

    if let Some(phone) = payload.get("phone").and_then(|v| v.as_str()) {
        return match contacts.find_by_phone(team_id, phone).await {
            Ok(Some(contact)) => Ok(Some(contact)),
            Ok(None) => {
                tracing::warn!("❌ Trigger payload names unknown phone: {}", phone);
                Err(StatusCode::NOT_FOUND)
            }
            Err(e) => {
                tracing::error!("Failed to look up contact by phone: {}", e);
                Err(StatusCode::INTERNAL_SERVER_ERROR)
            }
        };
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::{storage::AutomationStorage, AutomationStatus};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn registry_with(automations: Vec<Automation>) -> AutomationRegistry {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let storage = AutomationStorage::new(pool);
        storage.init_schema().await.unwrap();
        for automation in &automations {
            storage.save_automation(automation).await.unwrap();
        }

        let registry = AutomationRegistry::new(storage);
        registry.init_from_storage().await.unwrap();
        registry
    }

    fn automation(id: &str, status: AutomationStatus) -> Automation {
        Automation {
            id: id.to_string(),
            team_id: "team-1".to_string(),
            name: "Flow".to_string(),
            status,
            nodes: vec![],
            edges: vec![],
        }
    }

    #[tokio::test]
    async fn triggerable_resolution_splits_conflict_from_not_found() {
        let registry = registry_with(vec![
            automation("active", AutomationStatus::Active),
            automation("paused", AutomationStatus::Paused),
            automation("draft", AutomationStatus::Draft),
        ])
        .await;

        assert_eq!(
            resolve_triggerable(&registry, "active").unwrap().id,
            "active"
        );
        assert_eq!(
            resolve_triggerable(&registry, "paused").unwrap_err(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            resolve_triggerable(&registry, "draft").unwrap_err(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            resolve_triggerable(&registry, "ghost").unwrap_err(),
            StatusCode::NOT_FOUND
        );
    }
}
