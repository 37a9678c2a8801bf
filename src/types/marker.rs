//! Rollback scope, window and marker types

use std::fmt;

use serde::{Deserialize, Serialize};

use super::event::EventCategory;
use super::position::Region;
use crate::error::ScopeError;

/// Closed-open time interval `[start, end)` in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: i64,
    pub end: i64,
}

impl Window {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// The trailing `duration_ms` up to and including `now`
    pub fn last(duration_ms: i64, now: i64) -> Self {
        Self {
            start: now.saturating_sub(duration_ms),
            end: now.saturating_add(1),
        }
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        self.start <= timestamp && timestamp < self.end
    }

    /// A zero-width window matches nothing
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn duration_ms(&self) -> i64 {
        self.end.saturating_sub(self.start)
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Actor and spatial constraints for a query, rollback or restore
///
/// At least one of `region` or `actors` must be set. Inventory events carry
/// no coordinate, so they are only matched when the scope has no region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<Region>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actors: Vec<String>,
    pub categories: Vec<EventCategory>,
}

impl Scope {
    /// Everything that happened inside a region, by anyone
    pub fn region(region: Region) -> Self {
        Self {
            region: Some(region),
            actors: Vec::new(),
            categories: EventCategory::ALL.to_vec(),
        }
    }

    /// Everything one actor did, anywhere
    pub fn actor(actor_id: impl Into<String>) -> Self {
        Self {
            region: None,
            actors: vec![actor_id.into()],
            categories: EventCategory::ALL.to_vec(),
        }
    }

    /// Restrict to the given categories
    pub fn only(mut self, categories: &[EventCategory]) -> Self {
        self.categories = categories.to_vec();
        self
    }

    /// Categories that can actually match under this scope
    pub fn effective_categories(&self) -> Vec<EventCategory> {
        self.categories
            .iter()
            .copied()
            .filter(|c| c.is_spatial() || self.region.is_none())
            .collect()
    }

    pub fn validate(&self) -> Result<(), ScopeError> {
        if self.region.is_none() && self.actors.is_empty() {
            return Err(ScopeError::NoScope);
        }
        if self.effective_categories().is_empty() {
            return Err(ScopeError::NoCategories);
        }
        Ok(())
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.region, self.actors.is_empty()) {
            (Some(region), true) => write!(f, "region {}", region),
            (Some(region), false) => write!(f, "{} in {}", self.actors.join(","), region),
            (None, _) => write!(f, "actors {}", self.actors.join(",")),
        }
    }
}

/// Record of a completed rollback, consumed by restore
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackMarker {
    /// Row id, 0 until persisted
    pub id: i64,
    pub created_at: i64,
    pub issuer_id: String,
    pub scope: Scope,
    pub window: Window,
    pub applied_count: usize,
    pub skipped_count: usize,
    /// Sequence ids of every event the rollback undid
    pub event_ids: Vec<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restored_at: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BlockPos;

    #[test]
    fn test_window_is_closed_open() {
        let window = Window::new(0, 1000);
        assert!(window.contains(0));
        assert!(window.contains(999));
        assert!(!window.contains(1000));
        assert!(Window::new(5, 5).is_empty());
    }

    #[test]
    fn test_window_last_includes_now() {
        let window = Window::last(3_600_000, 10_000_000);
        assert!(window.contains(10_000_000));
        assert!(window.contains(10_000_000 - 3_600_000));
        assert!(!window.contains(10_000_000 - 3_600_001));
    }

    #[test]
    fn test_scope_requires_region_or_actor() {
        let scope = Scope {
            region: None,
            actors: Vec::new(),
            categories: EventCategory::ALL.to_vec(),
        };
        assert!(matches!(scope.validate(), Err(ScopeError::NoScope)));
        assert!(Scope::actor("u1").validate().is_ok());
    }

    #[test]
    fn test_region_scope_drops_inventory_category() {
        let region = Region::new("world", BlockPos::new(0, 0, 0), BlockPos::new(1, 1, 1));
        let scope = Scope::region(region.clone());
        assert_eq!(
            scope.effective_categories(),
            vec![EventCategory::Block, EventCategory::Container]
        );

        let inventory_only = Scope::region(region).only(&[EventCategory::Inventory]);
        assert!(matches!(inventory_only.validate(), Err(ScopeError::NoCategories)));
    }
}
