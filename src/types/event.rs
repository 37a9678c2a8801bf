//! Change event types for the audit log
//!
//! Every recorded mutation is an immutable [`ChangeEvent`]. The action is a
//! closed enum whose payload fixes which of coordinate/slot are present, so a
//! block event can never be written without a coordinate and an inventory
//! event can never carry one.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::position::BlockPos;
use super::state::State;
use super::target::Target;

/// Storage category of an event; each has its own table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Block,
    Container,
    Inventory,
}

impl EventCategory {
    pub const ALL: [EventCategory; 3] = [
        EventCategory::Block,
        EventCategory::Container,
        EventCategory::Inventory,
    ];

    /// Backing table name
    pub fn table(&self) -> &'static str {
        match self {
            EventCategory::Block => "block_events",
            EventCategory::Container => "container_events",
            EventCategory::Inventory => "inventory_events",
        }
    }

    /// Whether events in this category carry a world coordinate
    pub fn is_spatial(&self) -> bool {
        !matches!(self, EventCategory::Inventory)
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventCategory::Block => write!(f, "block"),
            EventCategory::Container => write!(f, "container"),
            EventCategory::Inventory => write!(f, "inventory"),
        }
    }
}

/// What happened, with the coordinate/slot shape fixed per variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    /// A block was placed at a coordinate
    BlockPlace { at: BlockPos },
    /// A block was broken at a coordinate
    BlockBreak { at: BlockPos },
    /// A slot of a container block changed
    ContainerSlotChange { at: BlockPos, slot: u32 },
    /// A slot of the actor's own inventory changed
    InventorySlotChange { slot: u32 },
    /// The actor picked an item up into a slot
    Pickup { slot: u32 },
    /// The actor dropped an item out of a slot
    Drop { slot: u32 },
}

impl Action {
    /// Stable name persisted in the `action` column
    pub fn kind(&self) -> &'static str {
        match self {
            Action::BlockPlace { .. } => "block_place",
            Action::BlockBreak { .. } => "block_break",
            Action::ContainerSlotChange { .. } => "container_slot_change",
            Action::InventorySlotChange { .. } => "inventory_slot_change",
            Action::Pickup { .. } => "pickup",
            Action::Drop { .. } => "drop",
        }
    }

    pub fn category(&self) -> EventCategory {
        match self {
            Action::BlockPlace { .. } | Action::BlockBreak { .. } => EventCategory::Block,
            Action::ContainerSlotChange { .. } => EventCategory::Container,
            Action::InventorySlotChange { .. } | Action::Pickup { .. } | Action::Drop { .. } => {
                EventCategory::Inventory
            }
        }
    }

    pub fn coordinate(&self) -> Option<BlockPos> {
        match self {
            Action::BlockPlace { at } | Action::BlockBreak { at } => Some(*at),
            Action::ContainerSlotChange { at, .. } => Some(*at),
            _ => None,
        }
    }

    pub fn slot(&self) -> Option<u32> {
        match self {
            Action::ContainerSlotChange { slot, .. }
            | Action::InventorySlotChange { slot }
            | Action::Pickup { slot }
            | Action::Drop { slot } => Some(*slot),
            _ => None,
        }
    }

    /// Rebuild an action from its persisted columns
    ///
    /// Fails on an unknown kind or when the coordinate/slot shape does not
    /// match the kind.
    pub fn from_parts(kind: &str, at: Option<BlockPos>, slot: Option<u32>) -> Result<Action, String> {
        let action = match (kind, at, slot) {
            ("block_place", Some(at), None) => Action::BlockPlace { at },
            ("block_break", Some(at), None) => Action::BlockBreak { at },
            ("container_slot_change", Some(at), Some(slot)) => Action::ContainerSlotChange { at, slot },
            ("inventory_slot_change", None, Some(slot)) => Action::InventorySlotChange { slot },
            ("pickup", None, Some(slot)) => Action::Pickup { slot },
            ("drop", None, Some(slot)) => Action::Drop { slot },
            (
                "block_place" | "block_break" | "container_slot_change" | "inventory_slot_change"
                | "pickup" | "drop",
                _,
                _,
            ) => {
                return Err(format!(
                    "action '{}' has mismatched coordinate/slot ({:?}, {:?})",
                    kind, at, slot
                ))
            }
            _ => return Err(format!("unknown action kind '{}'", kind)),
        };
        Ok(action)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// An immutable, persisted record of one mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Store-assigned, strictly increasing across all categories
    #[serde(rename = "seq")]
    pub sequence_id: i64,

    /// Milliseconds since the Unix epoch
    #[serde(rename = "ts")]
    pub timestamp: i64,

    pub actor_id: String,
    pub actor_name: String,
    pub world: String,
    pub action: Action,
    pub before: State,
    pub after: State,

    /// Set while a live rollback marker has undone this event
    #[serde(default)]
    pub rolled_back: bool,
}

impl ChangeEvent {
    pub fn category(&self) -> EventCategory {
        self.action.category()
    }

    pub fn coordinate(&self) -> Option<BlockPos> {
        self.action.coordinate()
    }

    pub fn slot(&self) -> Option<u32> {
        self.action.slot()
    }

    /// The world-state key this event mutated
    pub fn target(&self) -> Target {
        match self.action {
            Action::BlockPlace { at } | Action::BlockBreak { at } => Target::Block {
                world: self.world.clone(),
                pos: at,
            },
            Action::ContainerSlotChange { at, slot } => Target::Container {
                world: self.world.clone(),
                pos: at,
                slot,
            },
            Action::InventorySlotChange { slot } | Action::Pickup { slot } | Action::Drop { slot } => {
                Target::Inventory {
                    actor_id: self.actor_id.clone(),
                    slot,
                }
            }
        }
    }

    /// Total order used when timestamps collide
    pub fn order_key(&self) -> (i64, i64) {
        (self.timestamp, self.sequence_id)
    }
}

/// A mutation handed over by the trigger layer
///
/// Becomes a [`ChangeEvent`] once stamped with a capture time and persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub actor_id: String,
    pub actor_name: String,
    pub world: String,
    pub action: Action,
    pub before: State,
    pub after: State,
    /// Capture time; stamped by the recorder when absent
    pub timestamp: Option<i64>,
}

impl Mutation {
    pub fn new(
        actor_id: impl Into<String>,
        actor_name: impl Into<String>,
        world: impl Into<String>,
        action: Action,
        before: State,
        after: State,
    ) -> Self {
        Self {
            actor_id: actor_id.into(),
            actor_name: actor_name.into(),
            world: world.into(),
            action,
            before,
            after,
            timestamp: None,
        }
    }

    /// Fix the capture time instead of letting the recorder stamp it
    pub fn at(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Convert into an unsequenced event, stamping `now` if no time was set
    pub fn into_event(self, now: i64) -> ChangeEvent {
        ChangeEvent {
            sequence_id: 0,
            timestamp: self.timestamp.unwrap_or(now),
            actor_id: self.actor_id,
            actor_name: self.actor_name,
            world: self.world,
            action: self.action,
            before: self.before,
            after: self.after,
            rolled_back: false,
        }
    }
}
