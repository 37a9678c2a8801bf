//! Host world access
//!
//! Rollback and restore never touch the host directly; they read and write
//! through a [`WorldPort`] supplied by the embedding application. Writes are
//! only issued from the context that owns the port (the host's primary
//! thread), in bounded batches.

use std::collections::{HashMap, HashSet};

use crate::error::ApplyError;
use crate::types::{InventoryContents, State, Target};

/// Read/write access to live world state
pub trait WorldPort {
    /// Current state at `target`
    fn get(&self, target: &Target) -> Result<State, ApplyError>;

    /// Overwrite the state at `target`
    fn set(&mut self, target: &Target, state: &State) -> Result<(), ApplyError>;

    /// Full inventory of an actor
    fn inventory(&self, actor_id: &str) -> Result<InventoryContents, ApplyError>;
}

/// In-memory world, used by tests and the CLI demo
///
/// Unset targets read as air. Targets can be marked as rejecting writes and
/// whole worlds as unloaded to exercise failure accounting.
#[derive(Debug, Default, Clone)]
pub struct MemoryWorld {
    states: HashMap<Target, State>,
    rejected: HashSet<Target>,
    unloaded: HashSet<String>,
    writes: usize,
}

impl MemoryWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a state without counting it as a write
    pub fn insert(&mut self, target: Target, state: State) {
        self.states.insert(target, state);
    }

    pub fn with(mut self, target: Target, state: State) -> Self {
        self.insert(target, state);
        self
    }

    /// State at `target`, air if never set
    pub fn state(&self, target: &Target) -> State {
        self.states.get(target).cloned().unwrap_or_default()
    }

    /// Make every write to `target` fail
    pub fn reject(&mut self, target: Target) {
        self.rejected.insert(target);
    }

    /// Mark a world as unloaded; reads and writes there fail
    pub fn unload(&mut self, world: impl Into<String>) {
        self.unloaded.insert(world.into());
    }

    /// Successful `set` calls so far
    pub fn writes(&self) -> usize {
        self.writes
    }

    fn check_loaded(&self, target: &Target) -> Result<(), ApplyError> {
        match target {
            Target::Block { world, .. } | Target::Container { world, .. } if self.unloaded.contains(world) => {
                Err(ApplyError::Unloaded(target.clone()))
            }
            _ => Ok(()),
        }
    }
}

impl WorldPort for MemoryWorld {
    fn get(&self, target: &Target) -> Result<State, ApplyError> {
        self.check_loaded(target)?;
        Ok(self.state(target))
    }

    fn set(&mut self, target: &Target, state: &State) -> Result<(), ApplyError> {
        self.check_loaded(target)?;
        if self.rejected.contains(target) {
            return Err(ApplyError::Rejected {
                target: target.clone(),
                reason: "protected".to_string(),
            });
        }
        self.states.insert(target.clone(), state.clone());
        self.writes += 1;
        Ok(())
    }

    fn inventory(&self, actor_id: &str) -> Result<InventoryContents, ApplyError> {
        Ok(self
            .states
            .iter()
            .filter_map(|(target, state)| match target {
                Target::Inventory { actor_id: owner, slot } if owner == actor_id && !state.is_air() => {
                    Some((*slot, state.clone()))
                }
                _ => None,
            })
            .collect())
    }
}
