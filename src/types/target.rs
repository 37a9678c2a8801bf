//! Addressable world-state keys

use std::fmt;

use serde::{Deserialize, Serialize};

use super::position::BlockPos;

/// One independently writable piece of world state
///
/// Rollback and restore group events by target; the world port reads and
/// writes by target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Target {
    Block { world: String, pos: BlockPos },
    Container { world: String, pos: BlockPos, slot: u32 },
    Inventory { actor_id: String, slot: u32 },
}

impl Target {
    pub fn block(world: impl Into<String>, pos: BlockPos) -> Self {
        Target::Block {
            world: world.into(),
            pos,
        }
    }

    pub fn container(world: impl Into<String>, pos: BlockPos, slot: u32) -> Self {
        Target::Container {
            world: world.into(),
            pos,
            slot,
        }
    }

    pub fn inventory(actor_id: impl Into<String>, slot: u32) -> Self {
        Target::Inventory {
            actor_id: actor_id.into(),
            slot,
        }
    }

    pub fn is_inventory(&self) -> bool {
        matches!(self, Target::Inventory { .. })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Block { world, pos } => write!(f, "{}@{}", world, pos),
            Target::Container { world, pos, slot } => write!(f, "{}@{}#{}", world, pos, slot),
            Target::Inventory { actor_id, slot } => write!(f, "inv:{}#{}", actor_id, slot),
        }
    }
}
