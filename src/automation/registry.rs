/// Hot-reload automation registry using ArcSwap
///
/// Provides lock-free, atomic updates to the in-memory automation
/// registry. Each update swaps the entire registry pointer, so concurrent
/// runs keep walking the snapshot they started with while new triggers
/// see the fresh definitions immediately.

use crate::automation::{storage::AutomationStorage, types::{Automation, AutomationStatus}};
use anyhow::Result;
use arc_swap::ArcSwap;
use std::{collections::HashMap, sync::Arc};

/// Lock-free automation registry for hot-reload capabilities
///
/// The registry is the single source of truth for triggerable automations
/// in memory. Paused and draft automations are held too, but lookups for
/// triggering only return active ones.
#[derive(Debug)]
pub struct AutomationRegistry {
    /// Thread-safe atomic pointer to the automation map
    /// Key: automation_id, Value: automation definition
    automations: ArcSwap<HashMap<String, Arc<Automation>>>,

    /// Reference to persistent storage for reload operations
    storage: AutomationStorage,
}

impl AutomationRegistry {
    /// Create new registry instance with storage backend
    pub fn new(storage: AutomationStorage) -> Self {
        Self {
            automations: ArcSwap::new(Arc::new(HashMap::new())),
            storage,
        }
    }

    /// Initialize registry by loading all automations from storage
    ///
    /// Called during application startup to populate the in-memory registry.
    pub async fn init_from_storage(&self) -> Result<()> {
        let stored = self.storage.load_all_automations().await?;
        let map: HashMap<String, Arc<Automation>> = stored
            .into_iter()
            .map(|(id, automation)| (id, Arc::new(automation)))
            .collect();

        self.automations.store(Arc::new(map));

        tracing::info!(
            "Initialized automation registry with {} automations",
            self.automations.load().len()
        );

        Ok(())
    }

    /// Hot-reload a single automation
    ///
    /// Updates or adds an automation using an atomic pointer swap. This
    /// operation is lock-free and does not block concurrent runs.
    pub async fn reload_automation(&self, automation_id: &str) -> Result<()> {
        let automation = self
            .storage
            .get_automation(automation_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Automation not found: {}", automation_id))?;

        let current = self.automations.load();
        let mut next = (**current).clone();
        next.insert(automation_id.to_string(), Arc::new(automation));

        self.automations.store(Arc::new(next));

        tracing::info!("Hot-reloaded automation: {}", automation_id);

        Ok(())
    }

    /// Get an automation by ID regardless of status (lock-free read)
    pub fn get_automation(&self, automation_id: &str) -> Option<Arc<Automation>> {
        self.automations.load().get(automation_id).cloned()
    }

    /// Get an automation for triggering: only active ones qualify
    pub fn get_active_automation(&self, automation_id: &str) -> Option<Arc<Automation>> {
        self.automations
            .load()
            .get(automation_id)
            .filter(|automation| automation.status == AutomationStatus::Active)
            .cloned()
    }

    /// List all registered automation IDs
    pub fn list_automation_ids(&self) -> Vec<String> {
        self.automations.load().keys().cloned().collect()
    }

    /// Remove an automation from the registry
    pub async fn remove_automation(&self, automation_id: &str) -> Result<()> {
        let current = self.automations.load();
        let mut next = (**current).clone();

        if next.remove(automation_id).is_some() {
            self.automations.store(Arc::new(next));
            tracing::info!("Removed automation from registry: {}", automation_id);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::types::{Node, NodeKind};
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn registry_with_storage() -> (AutomationRegistry, AutomationStorage) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let storage = AutomationStorage::new(pool);
        storage.init_schema().await.unwrap();
        (AutomationRegistry::new(storage.clone()), storage)
    }

    fn automation(id: &str, status: AutomationStatus) -> Automation {
        Automation {
            id: id.to_string(),
            team_id: "team-1".to_string(),
            name: "Flow".to_string(),
            status,
            nodes: vec![Node::new("n1", NodeKind::Trigger, "inbound_message", "Start", json!({}))],
            edges: vec![],
        }
    }

    #[tokio::test]
    async fn init_loads_all_stored_automations() {
        let (registry, storage) = registry_with_storage().await;
        storage.save_automation(&automation("a1", AutomationStatus::Active)).await.unwrap();
        storage.save_automation(&automation("a2", AutomationStatus::Draft)).await.unwrap();

        registry.init_from_storage().await.unwrap();

        assert_eq!(registry.list_automation_ids().len(), 2);
        assert!(registry.get_automation("a2").is_some());
    }

    #[tokio::test]
    async fn triggering_lookup_skips_non_active_automations() {
        let (registry, storage) = registry_with_storage().await;
        storage.save_automation(&automation("a1", AutomationStatus::Paused)).await.unwrap();
        registry.init_from_storage().await.unwrap();

        assert!(registry.get_active_automation("a1").is_none());

        let mut resumed = automation("a1", AutomationStatus::Active);
        resumed.name = "Resumed".to_string();
        storage.save_automation(&resumed).await.unwrap();
        registry.reload_automation("a1").await.unwrap();

        let active = registry.get_active_automation("a1").unwrap();
        assert_eq!(active.name, "Resumed");
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let (registry, storage) = registry_with_storage().await;
        storage.save_automation(&automation("a1", AutomationStatus::Active)).await.unwrap();
        registry.init_from_storage().await.unwrap();

        registry.remove_automation("a1").await.unwrap();
        registry.remove_automation("a1").await.unwrap();
        assert!(registry.get_automation("a1").is_none());
    }
}
