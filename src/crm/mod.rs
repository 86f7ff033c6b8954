/// CRM layer - deals and pipeline stages
///
/// Minimal deal pipeline the CRM action handlers operate on. Stages are
/// a reference table owned by the (out-of-scope) editor; deals are
/// created and advanced by automation runs.

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqlitePool, Row};
use uuid::Uuid;

/// A deal attached to a contact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deal {
    /// Unique deal identifier (UUID)
    pub id: String,
    /// Contact the deal belongs to
    pub contact_id: String,
    /// Owning team identifier
    pub team_id: String,
    /// Deal title
    pub title: String,
    /// Current pipeline stage
    pub stage_id: String,
    /// open | won | lost
    pub status: String,
}

/// A pipeline stage reference row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStage {
    pub id: String,
    pub team_id: String,
    pub name: String,
    pub position: i64,
}

/// SQLite-based deal storage manager
#[derive(Debug, Clone)]
pub struct DealStorage {
    /// SQLite connection pool
    pool: SqlitePool,
}

impl DealStorage {
    /// Create new storage instance with database connection
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the deal storage schema
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pipeline_stages (
                id TEXT PRIMARY KEY,
                team_id TEXT NOT NULL,
                name TEXT NOT NULL,
                position INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS deals (
                id TEXT PRIMARY KEY,
                contact_id TEXT NOT NULL,
                team_id TEXT NOT NULL,
                title TEXT NOT NULL,
                stage_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'open',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_deals_contact ON deals(contact_id, status)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Look up a pipeline stage by id
    pub async fn get_stage(&self, stage_id: &str) -> Result<Option<PipelineStage>> {
        let row = sqlx::query("SELECT id, team_id, name, position FROM pipeline_stages WHERE id = ?")
            .bind(stage_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| PipelineStage {
            id: row.get("id"),
            team_id: row.get("team_id"),
            name: row.get("name"),
            position: row.get("position"),
        }))
    }

    /// Insert a pipeline stage (used by fixtures and the editor API)
    pub async fn save_stage(&self, stage: &PipelineStage) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pipeline_stages (id, team_id, name, position)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET name = excluded.name, position = excluded.position
            "#,
        )
        .bind(&stage.id)
        .bind(&stage.team_id)
        .bind(&stage.name)
        .bind(stage.position)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Create an open deal for a contact in the given stage
    pub async fn create_deal(
        &self,
        contact_id: &str,
        team_id: &str,
        title: &str,
        stage_id: &str,
    ) -> Result<Deal> {
        let deal = Deal {
            id: Uuid::new_v4().to_string(),
            contact_id: contact_id.to_string(),
            team_id: team_id.to_string(),
            title: title.to_string(),
            stage_id: stage_id.to_string(),
            status: "open".to_string(),
        };
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO deals (id, contact_id, team_id, title, stage_id, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&deal.id)
        .bind(&deal.contact_id)
        .bind(&deal.team_id)
        .bind(&deal.title)
        .bind(&deal.stage_id)
        .bind(&deal.status)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(deal)
    }

    /// Find the most recent open deal for a contact
    pub async fn find_open_deal(&self, contact_id: &str) -> Result<Option<Deal>> {
        let row = sqlx::query(
            "SELECT id, contact_id, team_id, title, stage_id, status \
             FROM deals WHERE contact_id = ? AND status = 'open' \
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(contact_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| Deal {
            id: row.get("id"),
            contact_id: row.get("contact_id"),
            team_id: row.get("team_id"),
            title: row.get("title"),
            stage_id: row.get("stage_id"),
            status: row.get("status"),
        }))
    }

    /// Move a deal to another pipeline stage
    pub async fn update_deal_stage(&self, deal_id: &str, stage_id: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        sqlx::query("UPDATE deals SET stage_id = ?, updated_at = ? WHERE id = ?")
            .bind(stage_id)
            .bind(&now)
            .bind(deal_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
