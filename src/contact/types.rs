/// Contact type definitions
///
/// The contact is the acting entity an automation run operates on.
/// Handlers may return an updated copy; the engine threads it through
/// the rest of the run.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A contact record (the acting entity of a run)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    /// Unique contact identifier
    pub id: String,
    /// Owning team identifier
    pub team_id: String,
    /// Display name
    pub name: String,
    /// Contact channel identifier (E.164 phone number)
    pub phone: String,
    /// Free-form string tags; order is irrelevant, duplicates are not kept
    #[serde(default)]
    pub tags: Vec<String>,
    /// Open key-value custom fields
    #[serde(default)]
    pub custom_fields: Map<String, Value>,
}

impl Contact {
    /// Whether the contact carries the given tag
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}
