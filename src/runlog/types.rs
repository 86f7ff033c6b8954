/// Run record and node log type definitions
///
/// Persisted audit rows for an automation run and for each node's
/// outcome. Written only through the lifecycle hooks; the engine never
/// touches these tables directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of an automation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Success => write!(f, "success"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Status of a single node execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Success,
    Failed,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeStatus::Success => write!(f, "success"),
            NodeStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Audit row for one automation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// Unique run identifier (UUID)
    pub id: String,
    /// Automation that was executed
    pub automation_id: String,
    /// Acting contact, when the trigger resolved one
    pub contact_id: Option<String>,
    /// Owning team identifier
    pub team_id: String,
    /// Run status (running until the run finishes)
    pub status: RunStatus,
    /// Free-text outcome details
    pub details: String,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run finished, if it has
    pub finished_at: Option<DateTime<Utc>>,
}

/// Audit row for one node execution within a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeLog {
    /// Unique log identifier (UUID)
    pub id: String,
    /// Parent run identifier
    pub run_id: String,
    /// Node that was executed
    pub node_id: String,
    /// Owning team identifier
    pub team_id: String,
    /// Node outcome
    pub status: NodeStatus,
    /// Free-text outcome details
    pub details: String,
    /// When the node finished
    pub created_at: DateTime<Utc>,
}
