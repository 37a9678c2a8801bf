//! Inventory snapshot type

use serde::{Deserialize, Serialize};

use super::state::InventoryContents;

/// Full-inventory capture used as a rollback anchor
///
/// Self-contained: `contents` is the whole inventory at `timestamp`, never a
/// delta against an earlier snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySnapshot {
    /// Row id, 0 until persisted
    #[serde(default)]
    pub id: i64,
    #[serde(rename = "ts")]
    pub timestamp: i64,
    pub actor_id: String,
    pub actor_name: String,
    pub contents: InventoryContents,
}

impl InventorySnapshot {
    pub fn new(
        timestamp: i64,
        actor_id: impl Into<String>,
        actor_name: impl Into<String>,
        contents: InventoryContents,
    ) -> Self {
        Self {
            id: 0,
            timestamp,
            actor_id: actor_id.into(),
            actor_name: actor_name.into(),
            contents,
        }
    }
}
