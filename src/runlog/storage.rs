/// SQLite persistence layer for run records and node logs
///
/// Narrow command/query surface consumed by the default lifecycle hooks
/// and by the observability read endpoints.

use crate::runlog::types::{NodeLog, NodeStatus, RunRecord, RunStatus};
use anyhow::Result;
use chrono::Utc;
use sqlx::{sqlite::SqlitePool, Row};
use uuid::Uuid;

/// SQLite-based run/node log storage manager
#[derive(Debug, Clone)]
pub struct RunLogStorage {
    /// SQLite connection pool
    pool: SqlitePool,
}

impl RunLogStorage {
    /// Create new storage instance with database connection
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the run log schema
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS automation_runs (
                id TEXT PRIMARY KEY,
                automation_id TEXT NOT NULL,
                contact_id TEXT,
                team_id TEXT NOT NULL,
                status TEXT NOT NULL,
                details TEXT NOT NULL DEFAULT '',
                started_at TEXT NOT NULL,
                finished_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS automation_node_logs (
                id TEXT PRIMARY KEY,
                run_id TEXT NOT NULL,
                node_id TEXT NOT NULL,
                team_id TEXT NOT NULL,
                status TEXT NOT NULL,
                details TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_runs_automation ON automation_runs(automation_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_node_logs_run ON automation_node_logs(run_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Insert a new run row with status `running` and return its id
    pub async fn create_run(
        &self,
        automation_id: &str,
        contact_id: Option<&str>,
        team_id: &str,
    ) -> Result<String> {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO automation_runs (id, automation_id, contact_id, team_id, status, details, started_at)
            VALUES (?, ?, ?, ?, 'running', '', ?)
            "#,
        )
        .bind(&run_id)
        .bind(automation_id)
        .bind(contact_id)
        .bind(team_id)
        .bind(&started_at)
        .execute(&self.pool)
        .await?;

        Ok(run_id)
    }

    /// Update a run's final status and details
    pub async fn update_run_status(
        &self,
        run_id: &str,
        status: RunStatus,
        details: &str,
    ) -> Result<()> {
        let finished_at = Utc::now().to_rfc3339();

        sqlx::query(
            "UPDATE automation_runs SET status = ?, details = ?, finished_at = ? WHERE id = ?",
        )
        .bind(status.to_string())
        .bind(details)
        .bind(&finished_at)
        .bind(run_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a node log row for a run
    pub async fn insert_node_log(
        &self,
        run_id: &str,
        node_id: &str,
        team_id: &str,
        status: NodeStatus,
        details: &str,
    ) -> Result<()> {
        let log_id = Uuid::new_v4().to_string();
        let created_at = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO automation_node_logs (id, run_id, node_id, team_id, status, details, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&log_id)
        .bind(run_id)
        .bind(node_id)
        .bind(team_id)
        .bind(status.to_string())
        .bind(details)
        .bind(&created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Retrieve a run record by id
    pub async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>> {
        let row = sqlx::query(
            "SELECT id, automation_id, contact_id, team_id, status, details, started_at, finished_at \
             FROM automation_runs WHERE id = ?",
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_run).transpose()
    }

    /// List runs for an automation, newest first
    pub async fn list_runs(&self, automation_id: &str, limit: i64) -> Result<Vec<RunRecord>> {
        let rows = sqlx::query(
            "SELECT id, automation_id, contact_id, team_id, status, details, started_at, finished_at \
             FROM automation_runs WHERE automation_id = ? ORDER BY started_at DESC LIMIT ?",
        )
        .bind(automation_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_run).collect()
    }

    /// List node logs for a run in insertion order
    pub async fn list_node_logs(&self, run_id: &str) -> Result<Vec<NodeLog>> {
        let rows = sqlx::query(
            "SELECT id, run_id, node_id, team_id, status, details, created_at \
             FROM automation_node_logs WHERE run_id = ? ORDER BY created_at ASC, rowid ASC",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        let mut logs = Vec::new();
        for row in rows {
            let status: String = row.get("status");
            let created_at: String = row.get("created_at");
            logs.push(NodeLog {
                id: row.get("id"),
                run_id: row.get("run_id"),
                node_id: row.get("node_id"),
                team_id: row.get("team_id"),
                status: parse_node_status(&status)?,
                details: row.get("details"),
                created_at: chrono::DateTime::parse_from_rfc3339(&created_at)?.with_timezone(&Utc),
            });
        }

        Ok(logs)
    }
}

fn row_to_run(row: sqlx::sqlite::SqliteRow) -> Result<RunRecord> {
    let status: String = row.get("status");
    let started_at: String = row.get("started_at");
    let finished_at: Option<String> = row.get("finished_at");

    Ok(RunRecord {
        id: row.get("id"),
        automation_id: row.get("automation_id"),
        contact_id: row.get("contact_id"),
        team_id: row.get("team_id"),
        status: parse_run_status(&status)?,
        details: row.get("details"),
        started_at: chrono::DateTime::parse_from_rfc3339(&started_at)?.with_timezone(&Utc),
        finished_at: finished_at
            .map(|ts| chrono::DateTime::parse_from_rfc3339(&ts).map(|dt| dt.with_timezone(&Utc)))
            .transpose()?,
    })
}

fn parse_run_status(raw: &str) -> Result<RunStatus> {
    match raw {
        "running" => Ok(RunStatus::Running),
        "success" => Ok(RunStatus::Success),
        "failed" => Ok(RunStatus::Failed),
        other => Err(anyhow::anyhow!("Unknown run status: {}", other)),
    }
}

fn parse_node_status(raw: &str) -> Result<NodeStatus> {
    match raw {
        "success" => Ok(NodeStatus::Success),
        "failed" => Ok(NodeStatus::Failed),
        other => Err(anyhow::anyhow!("Unknown node status: {}", other)),
    }
}
