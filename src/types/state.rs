//! Opaque block/item state descriptors

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Material name used for the empty state
pub const AIR: &str = "air";

/// Serialized block or item descriptor: type + quantity + metadata blob
///
/// The audit log never interprets `metadata`; it is carried verbatim from
/// the host and written back on rollback/restore.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct State {
    pub material: String,
    #[serde(default)]
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metadata: Vec<u8>,
}

impl State {
    pub fn new(material: impl Into<String>, quantity: u32) -> Self {
        Self {
            material: material.into(),
            quantity,
            metadata: Vec::new(),
        }
    }

    /// A placed block (quantity 1)
    pub fn block(material: impl Into<String>) -> Self {
        Self::new(material, 1)
    }

    /// An item stack
    pub fn item(material: impl Into<String>, quantity: u32) -> Self {
        Self::new(material, quantity)
    }

    /// The empty state (air block / empty slot)
    pub fn air() -> Self {
        Self::new(AIR, 0)
    }

    pub fn with_metadata(mut self, metadata: Vec<u8>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn is_air(&self) -> bool {
        self.material == AIR || (self.quantity == 0 && self.metadata.is_empty())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

impl Default for State {
    fn default() -> Self {
        Self::air()
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_air() {
            write!(f, "{}", AIR)
        } else if self.quantity > 1 {
            write!(f, "{} x{}", self.material, self.quantity)
        } else {
            write!(f, "{}", self.material)
        }
    }
}

/// Full inventory contents: slot index → state
///
/// Slots not present are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InventoryContents(pub BTreeMap<u32, State>);

impl InventoryContents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, slot: u32) -> Option<&State> {
        self.0.get(&slot)
    }

    pub fn set(&mut self, slot: u32, state: State) {
        self.0.insert(slot, state);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &State)> {
        self.0.iter().map(|(slot, state)| (*slot, state))
    }
}

impl FromIterator<(u32, State)> for InventoryContents {
    fn from_iter<T: IntoIterator<Item = (u32, State)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_json_roundtrip_keeps_metadata() {
        let state = State::item("diamond_sword", 1).with_metadata(vec![1, 2, 3]);
        let json = state.to_json().unwrap();
        assert_eq!(State::from_json(&json).unwrap(), state);
    }

    #[test]
    fn test_air_omits_metadata_field() {
        let json = State::air().to_json().unwrap();
        assert!(!json.contains("metadata"));
        assert!(State::from_json(&json).unwrap().is_air());
    }

    #[test]
    fn test_inventory_contents_integer_keys() {
        let contents: InventoryContents = vec![(0, State::item("stone", 64)), (8, State::item("torch", 3))]
            .into_iter()
            .collect();
        let json = serde_json::to_string(&contents).unwrap();
        let back: InventoryContents = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get(8), Some(&State::item("torch", 3)));
        assert_eq!(back.len(), 2);
    }
}
