/// SQLite persistence layer for message templates
///
/// Templates are authored in the (out-of-scope) editor; the send_template
/// handler only reads them. Bodies may carry {{dotted.path}} placeholders
/// resolved at send time.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqlitePool, Row};

/// A reusable outbound message template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageTemplate {
    /// Unique template identifier
    pub id: String,
    /// Owning team identifier
    pub team_id: String,
    /// Provider-registered template name
    pub name: String,
    /// Template body with optional placeholders
    pub body: String,
}

/// SQLite-based template storage manager
#[derive(Debug, Clone)]
pub struct TemplateStorage {
    /// SQLite connection pool
    pool: SqlitePool,
}

impl TemplateStorage {
    /// Create new storage instance with database connection
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the template storage schema
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS message_templates (
                id TEXT PRIMARY KEY,
                team_id TEXT NOT NULL,
                name TEXT NOT NULL,
                body TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Store a new template or update an existing one
    pub async fn save_template(&self, template: &MessageTemplate) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO message_templates (id, team_id, name, body)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                team_id = excluded.team_id,
                name = excluded.name,
                body = excluded.body
            "#,
        )
        .bind(&template.id)
        .bind(&template.team_id)
        .bind(&template.name)
        .bind(&template.body)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Retrieve a template by ID
    pub async fn get_template(&self, id: &str) -> Result<Option<MessageTemplate>> {
        let row = sqlx::query("SELECT id, team_id, name, body FROM message_templates WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| MessageTemplate {
            id: row.get("id"),
            team_id: row.get("team_id"),
            name: row.get("name"),
            body: row.get("body"),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn template_round_trip() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let storage = TemplateStorage::new(pool);
        storage.init_schema().await.unwrap();

        storage
            .save_template(&MessageTemplate {
                id: "tpl-1".to_string(),
                team_id: "team-1".to_string(),
                name: "welcome".to_string(),
                body: "Hello {{contact.name}}!".to_string(),
            })
            .await
            .unwrap();

        let loaded = storage.get_template("tpl-1").await.unwrap().unwrap();
        assert_eq!(loaded.name, "welcome");
        assert!(loaded.body.contains("{{contact.name}}"));
        assert!(storage.get_template("missing").await.unwrap().is_none());
    }
}
