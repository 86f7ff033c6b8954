/// SQLite persistence layer for contacts
///
/// Tags and custom fields are stored as JSON columns; lookup fields stay
/// relational for indexed access by id, team and phone.

use crate::contact::types::Contact;
use anyhow::Result;
use sqlx::{sqlite::SqlitePool, Row};

/// SQLite-based contact storage manager
#[derive(Debug, Clone)]
pub struct ContactStorage {
    /// SQLite connection pool
    pool: SqlitePool,
}

impl ContactStorage {
    /// Create new storage instance with database connection
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the contact storage schema
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS contacts (
                id TEXT PRIMARY KEY,
                team_id TEXT NOT NULL,
                name TEXT NOT NULL,
                phone TEXT NOT NULL,
                tags JSON NOT NULL DEFAULT '[]',
                custom_fields JSON NOT NULL DEFAULT '{}',
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_contacts_phone ON contacts(team_id, phone)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Store a new contact or update an existing one
    pub async fn save_contact(&self, contact: &Contact) -> Result<()> {
        let tags_json = serde_json::to_string(&contact.tags)?;
        let fields_json = serde_json::to_string(&contact.custom_fields)?;

        sqlx::query(
            r#"
            INSERT INTO contacts (id, team_id, name, phone, tags, custom_fields, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(id) DO UPDATE SET
                team_id = excluded.team_id,
                name = excluded.name,
                phone = excluded.phone,
                tags = excluded.tags,
                custom_fields = excluded.custom_fields,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&contact.id)
        .bind(&contact.team_id)
        .bind(&contact.name)
        .bind(&contact.phone)
        .bind(&tags_json)
        .bind(&fields_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Retrieve a contact by ID
    pub async fn get_contact(&self, id: &str) -> Result<Option<Contact>> {
        let row = sqlx::query(
            "SELECT id, team_id, name, phone, tags, custom_fields FROM contacts WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_contact).transpose()
    }

    /// Retrieve a contact by team and phone number
    ///
    /// Used by the trigger layer to resolve the acting entity from an
    /// inbound message payload.
    pub async fn find_by_phone(&self, team_id: &str, phone: &str) -> Result<Option<Contact>> {
        let row = sqlx::query(
            "SELECT id, team_id, name, phone, tags, custom_fields \
             FROM contacts WHERE team_id = ? AND phone = ?",
        )
        .bind(team_id)
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_contact).transpose()
    }
}

fn row_to_contact(row: sqlx::sqlite::SqliteRow) -> Result<Contact> {
    let tags_json: String = row.get("tags");
    let fields_json: String = row.get("custom_fields");

    Ok(Contact {
        id: row.get("id"),
        team_id: row.get("team_id"),
        name: row.get("name"),
        phone: row.get("phone"),
        tags: serde_json::from_str(&tags_json)?,
        custom_fields: serde_json::from_str(&fields_json)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_storage() -> ContactStorage {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let storage = ContactStorage::new(pool);
        storage.init_schema().await.unwrap();
        storage
    }

    fn sample_contact() -> Contact {
        let mut custom_fields = serde_json::Map::new();
        custom_fields.insert("city".to_string(), json!("Lisbon"));

        Contact {
            id: "c1".to_string(),
            team_id: "team-1".to_string(),
            name: "Ana".to_string(),
            phone: "+351900000001".to_string(),
            tags: vec!["lead".to_string()],
            custom_fields,
        }
    }

    #[tokio::test]
    async fn save_and_get_preserves_tags_and_custom_fields() {
        let storage = memory_storage().await;
        storage.save_contact(&sample_contact()).await.unwrap();

        let loaded = storage.get_contact("c1").await.unwrap().unwrap();
        assert_eq!(loaded.name, "Ana");
        assert!(loaded.has_tag("lead"));
        assert_eq!(loaded.custom_fields.get("city"), Some(&json!("Lisbon")));
    }

    #[tokio::test]
    async fn find_by_phone_scopes_to_team() {
        let storage = memory_storage().await;
        storage.save_contact(&sample_contact()).await.unwrap();

        let found = storage
            .find_by_phone("team-1", "+351900000001")
            .await
            .unwrap();
        assert!(found.is_some());

        let other_team = storage
            .find_by_phone("team-2", "+351900000001")
            .await
            .unwrap();
        assert!(other_team.is_none());
    }

    #[tokio::test]
    async fn upsert_replaces_mutable_fields() {
        let storage = memory_storage().await;
        let mut contact = sample_contact();
        storage.save_contact(&contact).await.unwrap();

        contact.tags.push("customer".to_string());
        storage.save_contact(&contact).await.unwrap();

        let loaded = storage.get_contact("c1").await.unwrap().unwrap();
        assert_eq!(loaded.tags, vec!["lead".to_string(), "customer".to_string()]);
    }
}
