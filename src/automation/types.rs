/// Core automation type definitions
///
/// Defines the graph structures an automation is built from: nodes
/// (triggers, actions, logic) and directed, optionally handle-qualified
/// edges. These types are serialized/deserialized from JSON for
/// persistence and for the editor API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A complete automation definition containing nodes and their connections
///
/// Automations are stored as JSON in SQLite and walked by the execution
/// engine. Node and edge order is irrelevant; identity is by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Automation {
    /// Unique automation identifier (e.g., "auto-welcome")
    pub id: String,
    /// Owning team identifier
    pub team_id: String,
    /// Human-readable automation name
    pub name: String,
    /// Lifecycle status; only active automations are triggerable
    pub status: AutomationStatus,
    /// Nodes in this automation graph
    pub nodes: Vec<Node>,
    /// Directed edges connecting nodes
    pub edges: Vec<Edge>,
}

/// Lifecycle status of an automation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationStatus {
    Active,
    Paused,
    Draft,
}

/// A single step in the automation graph
///
/// Nodes are immutable during a run; only the configuration is read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique node identifier within the automation (e.g., "n1")
    pub id: String,
    /// Node payload: kind, type discriminator, label and configuration
    pub data: NodeData,
}

/// Payload carried by every node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeData {
    /// High-level kind of the node
    pub kind: NodeKind,
    /// Specific type discriminator (e.g., "send_template", "add_tag", "condition")
    ///
    /// Keyed against the action handler registry at execution time.
    #[serde(rename = "type")]
    pub node_type: String,
    /// Display label shown in the editor
    pub label: String,
    /// Type-specific configuration; each handler validates its own fields
    #[serde(default)]
    pub config: Value,
}

/// High-level node categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Entry point matched by the trigger layer; never dispatched to a handler
    Trigger,
    /// Side-effecting step (send message, mutate contact, call webhook, ...)
    Action,
    /// Branching step that selects an output handle
    Logic,
}

/// Directed connection between two nodes
///
/// An optional source handle qualifies the exit of branching nodes
/// ("true"/"false" on a condition, path names on a split). The engine
/// indexes edges by "{source}" or "{source}-{handle}".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// Unique edge identifier
    pub id: String,
    /// Source node ID
    pub source: String,
    /// Named exit on the source node, when the source branches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    /// Target node ID
    pub target: String,
}

impl Node {
    /// Convenience constructor used by tests and fixtures
    pub fn new(id: &str, kind: NodeKind, node_type: &str, label: &str, config: Value) -> Self {
        Self {
            id: id.to_string(),
            data: NodeData {
                kind,
                node_type: node_type.to_string(),
                label: label.to_string(),
                config,
            },
        }
    }
}

impl Edge {
    /// Composite lookup key for this edge ("{source}" or "{source}-{handle}")
    pub fn key(&self) -> String {
        match &self.source_handle {
            Some(handle) => format!("{}-{}", self.source, handle),
            None => self.source.clone(),
        }
    }
}
