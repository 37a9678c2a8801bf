//! Data types for the world audit log
//!
//! This module contains the core data structures shared by the store, the
//! recorder and the rollback/restore engines.

mod event;
mod marker;
mod position;
mod snapshot;
mod state;
mod target;

pub use event::{Action, ChangeEvent, EventCategory, Mutation};
pub use marker::{RollbackMarker, Scope, Window};
pub use position::{BlockPos, Location, Region};
pub use snapshot::InventorySnapshot;
pub use state::{InventoryContents, State, AIR};
pub use target::Target;

/// Milliseconds in one day, used by retention
pub const MS_PER_DAY: i64 = 86_400_000;
