use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use super::device::Device;

/// State string rendered for entities whose source is not available.
pub const STATE_UNAVAILABLE: &str = "unavailable";

/// Rendered state of a single entity.
///
/// Mirrors the shape Home Assistant uses: a string state plus a bag of
/// attributes (device class, unit, friendly name, platform specifics).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EntityState {
    /// Platform the entity belongs to ("sensor", "switch", ...).
    pub platform: String,

    /// Stable identifier, unique across restarts.
    pub unique_id: String,

    pub state: String,

    pub available: bool,

    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl EntityState {
    /// Attribute lookup shorthand.
    pub fn attribute(&self, key: &str) -> Option<&serde_json::Value> {
        self.attributes.get(key)
    }
}

/// How loudly an issue should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Warning,
    Error,
}

/// A persistent, non-fatal advisory raised by an integration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub domain: String,
    pub issue_id: String,
    pub severity: IssueSeverity,
    pub message: String,
}

/// Centralized snapshot of the entire engine state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct State {
    pub entities: BTreeMap<String, EntityState>,
    pub devices: BTreeMap<String, Device>,
    pub issues: Vec<Issue>,
}

impl State {
    pub fn entity(&self, entity_id: &str) -> Option<&EntityState> {
        self.entities.get(entity_id)
    }
}
