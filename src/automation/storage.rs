/// SQLite persistence layer for automation definitions
///
/// Handles automation CRUD in the main SQLite database. Definitions are
/// stored as JSON for flexibility while keeping indexed lookup fields.

use crate::automation::types::{Automation, AutomationStatus};
use anyhow::Result;
use sqlx::{sqlite::SqlitePool, Row};
use std::collections::HashMap;

/// SQLite-based automation storage manager
#[derive(Debug, Clone)]
pub struct AutomationStorage {
    /// SQLite connection pool
    pool: SqlitePool,
}

impl AutomationStorage {
    /// Create new storage instance with database connection
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the automation storage schema
    ///
    /// Safe to call multiple times (uses IF NOT EXISTS).
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS automations (
                id TEXT PRIMARY KEY,
                team_id TEXT NOT NULL,
                name TEXT NOT NULL,
                status TEXT NOT NULL,
                definition JSON NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_automations_team
            ON automations(team_id)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Store a new automation or update an existing one
    ///
    /// Uses UPSERT to handle both create and update atomically and
    /// refreshes the updated_at timestamp.
    pub async fn save_automation(&self, automation: &Automation) -> Result<()> {
        let definition_json = serde_json::to_string(automation)?;
        let status = status_label(automation.status);

        sqlx::query(
            r#"
            INSERT INTO automations (id, team_id, name, status, definition, updated_at)
            VALUES (?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(id) DO UPDATE SET
                team_id = excluded.team_id,
                name = excluded.name,
                status = excluded.status,
                definition = excluded.definition,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&automation.id)
        .bind(&automation.team_id)
        .bind(&automation.name)
        .bind(status)
        .bind(&definition_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Retrieve an automation by ID
    pub async fn get_automation(&self, id: &str) -> Result<Option<Automation>> {
        let row = sqlx::query("SELECT definition FROM automations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let definition_json: String = row.get("definition");
                let automation: Automation = serde_json::from_str(&definition_json)?;
                Ok(Some(automation))
            }
            None => Ok(None),
        }
    }

    /// List all automations with basic metadata
    pub async fn list_automations(&self) -> Result<Vec<AutomationMetadata>> {
        let rows = sqlx::query(
            "SELECT id, team_id, name, status, created_at, updated_at \
             FROM automations ORDER BY updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut automations = Vec::new();
        for row in rows {
            automations.push(AutomationMetadata {
                id: row.get("id"),
                team_id: row.get("team_id"),
                name: row.get("name"),
                status: row.get("status"),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            });
        }

        Ok(automations)
    }

    /// Load all automations for registry initialization
    ///
    /// Returns a map of automation_id -> Automation. Used during startup
    /// and hot-reload operations.
    pub async fn load_all_automations(&self) -> Result<HashMap<String, Automation>> {
        let rows = sqlx::query("SELECT id, definition FROM automations")
            .fetch_all(&self.pool)
            .await?;

        let mut automations = HashMap::new();
        for row in rows {
            let id: String = row.get("id");
            let definition_json: String = row.get("definition");
            let automation: Automation = serde_json::from_str(&definition_json)?;
            automations.insert(id, automation);
        }

        Ok(automations)
    }

    /// Delete an automation by ID
    pub async fn delete_automation(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM automations WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Basic automation metadata for listing operations
#[derive(Debug, serde::Serialize)]
pub struct AutomationMetadata {
    pub id: String,
    pub team_id: String,
    pub name: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Stable column value for an automation status
pub fn status_label(status: AutomationStatus) -> &'static str {
    match status {
        AutomationStatus::Active => "active",
        AutomationStatus::Paused => "paused",
        AutomationStatus::Draft => "draft",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::types::{Edge, Node, NodeKind};
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_storage() -> AutomationStorage {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let storage = AutomationStorage::new(pool);
        storage.init_schema().await.unwrap();
        storage
    }

    fn sample_automation(id: &str) -> Automation {
        Automation {
            id: id.to_string(),
            team_id: "team-1".to_string(),
            name: "Lead follow-up".to_string(),
            status: AutomationStatus::Active,
            nodes: vec![Node::new(
                "n1",
                NodeKind::Action,
                "add_tag",
                "Tag lead",
                json!({"tag": "lead"}),
            )],
            edges: vec![Edge {
                id: "e1".to_string(),
                source: "n1".to_string(),
                source_handle: None,
                target: "n2".to_string(),
            }],
        }
    }

    #[tokio::test]
    async fn save_and_get_round_trip() {
        let storage = memory_storage().await;
        storage.save_automation(&sample_automation("auto-1")).await.unwrap();

        let loaded = storage.get_automation("auto-1").await.unwrap().unwrap();
        assert_eq!(loaded.name, "Lead follow-up");
        assert_eq!(loaded.nodes.len(), 1);
        assert_eq!(loaded.edges[0].target, "n2");
    }

    #[tokio::test]
    async fn upsert_overwrites_existing_definition() {
        let storage = memory_storage().await;
        storage.save_automation(&sample_automation("auto-1")).await.unwrap();

        let mut updated = sample_automation("auto-1");
        updated.name = "Renamed".to_string();
        updated.status = AutomationStatus::Paused;
        storage.save_automation(&updated).await.unwrap();

        let loaded = storage.get_automation("auto-1").await.unwrap().unwrap();
        assert_eq!(loaded.name, "Renamed");
        assert_eq!(loaded.status, AutomationStatus::Paused);

        let listed = storage.list_automations().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, "paused");
    }

    #[tokio::test]
    async fn delete_reports_whether_row_existed() {
        let storage = memory_storage().await;
        storage.save_automation(&sample_automation("auto-1")).await.unwrap();

        assert!(storage.delete_automation("auto-1").await.unwrap());
        assert!(!storage.delete_automation("auto-1").await.unwrap());
        assert!(storage.get_automation("auto-1").await.unwrap().is_none());
    }
}
