//! Per-actor inspection state
//!
//! Staff mark two corners to select a region for region-scoped lookups and
//! rollbacks, and can toggle an inspect mode in which clicking a block runs
//! a point lookup. State lives only as long as the actor's session.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::types::{Location, Region};

/// Which selection corner is being set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corner {
    A,
    B,
}

#[derive(Debug, Clone, Default)]
struct Session {
    corner_a: Option<Location>,
    corner_b: Option<Location>,
    inspecting: bool,
}

/// Inspection sessions of every connected actor
#[derive(Debug, Default)]
pub struct InspectionSessions {
    sessions: RwLock<HashMap<String, Session>>,
}

impl InspectionSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_corner(&self, actor_id: &str, corner: Corner, location: Location) {
        let mut sessions = self.sessions.write();
        let session = sessions.entry(actor_id.to_string()).or_default();
        match corner {
            Corner::A => session.corner_a = Some(location),
            Corner::B => session.corner_b = Some(location),
        }
    }

    /// The selected region, once both corners are set in the same world
    pub fn selection(&self, actor_id: &str) -> Option<Region> {
        let sessions = self.sessions.read();
        let session = sessions.get(actor_id)?;
        match (&session.corner_a, &session.corner_b) {
            (Some(a), Some(b)) if a.world == b.world => Some(Region::new(a.world.clone(), a.pos, b.pos)),
            _ => None,
        }
    }

    /// Flip inspect mode, returning the new setting
    pub fn toggle_inspect(&self, actor_id: &str) -> bool {
        let mut sessions = self.sessions.write();
        let session = sessions.entry(actor_id.to_string()).or_default();
        session.inspecting = !session.inspecting;
        session.inspecting
    }

    pub fn is_inspecting(&self, actor_id: &str) -> bool {
        self.sessions
            .read()
            .get(actor_id)
            .map(|s| s.inspecting)
            .unwrap_or(false)
    }

    /// Drop everything held for an actor (disconnect)
    pub fn clear(&self, actor_id: &str) {
        self.sessions.write().remove(actor_id);
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BlockPos;

    #[test]
    fn test_selection_needs_both_corners_in_one_world() {
        let sessions = InspectionSessions::new();
        sessions.set_corner("staff", Corner::A, Location::new("world", BlockPos::new(10, 70, -5)));
        assert!(sessions.selection("staff").is_none());

        sessions.set_corner("staff", Corner::B, Location::new("nether", BlockPos::new(0, 60, 5)));
        assert!(sessions.selection("staff").is_none());

        sessions.set_corner("staff", Corner::B, Location::new("world", BlockPos::new(0, 60, 5)));
        let region = sessions.selection("staff").unwrap();
        assert_eq!(region.min, BlockPos::new(0, 60, -5));
        assert_eq!(region.max, BlockPos::new(10, 70, 5));
    }

    #[test]
    fn test_toggle_and_clear() {
        let sessions = InspectionSessions::new();
        assert!(!sessions.is_inspecting("staff"));
        assert!(sessions.toggle_inspect("staff"));
        assert!(sessions.is_inspecting("staff"));
        assert!(!sessions.toggle_inspect("staff"));

        sessions.toggle_inspect("staff");
        sessions.clear("staff");
        assert!(!sessions.is_inspecting("staff"));
        assert!(sessions.is_empty());
    }
}
