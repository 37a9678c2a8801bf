//! Grouping events by target and choosing what to write back

use std::collections::BTreeMap;

use crate::types::{ChangeEvent, State, Target};

/// One write the apply phase will issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedWrite {
    pub target: Target,
    /// State to write
    pub state: State,
    /// What the world should hold right now if nobody touched it since;
    /// `None` skips the drift check
    pub expected: Option<State>,
    /// Events this write covers; flagged/unflagged only if the write lands
    pub event_ids: Vec<i64>,
}

/// Edges of one target's history inside the collected set
#[derive(Debug, Clone)]
pub(crate) struct TargetHistory {
    first_key: (i64, i64),
    pub(crate) first_before: State,
    last_key: (i64, i64),
    pub(crate) last_after: State,
    pub(crate) event_ids: Vec<i64>,
}

impl TargetHistory {
    fn new(event: &ChangeEvent) -> Self {
        Self {
            first_key: event.order_key(),
            first_before: event.before.clone(),
            last_key: event.order_key(),
            last_after: event.after.clone(),
            event_ids: vec![event.sequence_id],
        }
    }

    fn add(&mut self, event: &ChangeEvent) {
        let key = event.order_key();
        if key < self.first_key {
            self.first_key = key;
            self.first_before = event.before.clone();
        }
        if key > self.last_key {
            self.last_key = key;
            self.last_after = event.after.clone();
        }
        self.event_ids.push(event.sequence_id);
    }
}

/// Collected events keyed by the piece of world state they mutated
///
/// Events may arrive in any order; only the (timestamp, sequence id) order
/// decides which is earliest or latest per target.
#[derive(Debug, Default)]
pub(crate) struct EventGroups {
    groups: BTreeMap<Target, TargetHistory>,
    matched: usize,
}

impl EventGroups {
    pub(crate) fn add(&mut self, event: &ChangeEvent) {
        self.matched += 1;
        match self.groups.get_mut(&event.target()) {
            Some(history) => history.add(event),
            None => {
                self.groups.insert(event.target(), TargetHistory::new(event));
            }
        }
    }

    /// Events added so far
    pub(crate) fn matched(&self) -> usize {
        self.matched
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Split off inventory groups, keyed by actor then slot
    pub(crate) fn take_inventory(&mut self) -> BTreeMap<String, BTreeMap<u32, TargetHistory>> {
        let mut by_actor: BTreeMap<String, BTreeMap<u32, TargetHistory>> = BTreeMap::new();
        let inventory: Vec<Target> = self.groups.keys().filter(|t| t.is_inventory()).cloned().collect();

        for target in inventory {
            if let (Some(history), Target::Inventory { actor_id, slot }) = (self.groups.remove(&target), target) {
                by_actor.entry(actor_id).or_default().insert(slot, history);
            }
        }
        by_actor
    }

    /// Undo: earliest `before` per target, expecting the latest `after`
    pub(crate) fn into_rollback_writes(self) -> Vec<PlannedWrite> {
        self.groups
            .into_iter()
            .map(|(target, history)| PlannedWrite {
                target,
                state: history.first_before,
                expected: Some(history.last_after),
                event_ids: history.event_ids,
            })
            .collect()
    }

    /// Redo: latest `after` per target, expecting the earliest `before`
    pub(crate) fn into_restore_writes(self) -> Vec<PlannedWrite> {
        self.groups
            .into_iter()
            .map(|(target, history)| PlannedWrite {
                target,
                state: history.last_after,
                expected: Some(history.first_before),
                event_ids: history.event_ids,
            })
            .collect()
    }
}
