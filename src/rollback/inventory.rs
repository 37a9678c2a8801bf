//! Inventory rollback
//!
//! Slot-level undo alone can leave an inventory in a state that never
//! existed when items moved between slots. When a full snapshot exists
//! before the window, the whole inventory is rebuilt from it:
//!
//! 1. start from the snapshot contents
//! 2. replay the latest `after` per slot of live events between the
//!    snapshot and the window start
//! 3. override every slot touched in the window with its earliest
//!    in-window `before`
//!
//! Untouched slots are only written when nothing changed them since the
//! window start; a later change is newer than the window and stays.
//! Without a snapshot only the touched slots are written.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::StoreResult;
use crate::event_store::{EventFilter, EventStore};
use crate::types::{EventCategory, InventoryContents, State, Target, Window};

use super::plan::{PlannedWrite, TargetHistory};

/// Writes restoring one actor's inventory to its state at `window.start`
pub(crate) fn plan_inventory(
    store: &EventStore,
    actor_id: &str,
    window: Window,
    touched: BTreeMap<u32, TargetHistory>,
) -> StoreResult<Vec<PlannedWrite>> {
    let Some(snapshot) = store.latest_snapshot_before(actor_id, window.start)? else {
        tracing::debug!(actor_id, slots = touched.len(), "No inventory snapshot, rolling back touched slots");
        return Ok(touched_slot_writes(actor_id, touched));
    };

    let mut contents = replay_gap(store, actor_id, snapshot.timestamp, window.start, snapshot.contents)?;
    let changed_since = slots_changed_since(store, actor_id, window.start)?;
    let mut writes = Vec::with_capacity(contents.len() + touched.len());

    for (slot, history) in touched {
        contents.0.remove(&slot);
        writes.push(PlannedWrite {
            target: Target::inventory(actor_id, slot),
            state: history.first_before,
            expected: Some(history.last_after),
            event_ids: history.event_ids,
        });
    }
    for (slot, state) in contents.0 {
        if changed_since.contains(&slot) {
            tracing::debug!(actor_id, slot, "Slot changed after the window, leaving it");
            continue;
        }
        writes.push(PlannedWrite {
            target: Target::inventory(actor_id, slot),
            state,
            expected: None,
            event_ids: Vec::new(),
        });
    }
    writes.sort_by(|a, b| a.target.cmp(&b.target));

    tracing::debug!(
        actor_id,
        snapshot_id = snapshot.id,
        snapshot_time = snapshot.timestamp,
        slots = writes.len(),
        "Rebuilding inventory from snapshot"
    );
    Ok(writes)
}

fn touched_slot_writes(actor_id: &str, touched: BTreeMap<u32, TargetHistory>) -> Vec<PlannedWrite> {
    touched
        .into_iter()
        .map(|(slot, history)| PlannedWrite {
            target: Target::inventory(actor_id, slot),
            state: history.first_before,
            expected: Some(history.last_after),
            event_ids: history.event_ids,
        })
        .collect()
}

/// Slots with a live event at or after `since`
fn slots_changed_since(store: &EventStore, actor_id: &str, since: i64) -> StoreResult<BTreeSet<u32>> {
    let filter = EventFilter {
        actors: vec![actor_id.to_string()],
        since,
        categories: vec![EventCategory::Inventory],
        ..Default::default()
    }
    .rolled_back(false);

    let mut slots = BTreeSet::new();
    for event in store.query(filter) {
        if let Some(slot) = event?.slot() {
            slots.insert(slot);
        }
    }
    Ok(slots)
}

/// Apply the latest `after` per slot of live events in `[from, until)`
fn replay_gap(
    store: &EventStore,
    actor_id: &str,
    from: i64,
    until: i64,
    mut contents: InventoryContents,
) -> StoreResult<InventoryContents> {
    let filter = EventFilter {
        actors: vec![actor_id.to_string()],
        since: from,
        until: Some(until),
        categories: vec![EventCategory::Inventory],
        ..Default::default()
    }
    .rolled_back(false);

    let mut latest: BTreeMap<u32, ((i64, i64), State)> = BTreeMap::new();
    for event in store.query(filter) {
        let event = event?;
        let Some(slot) = event.slot() else { continue };
        let key = event.order_key();
        match latest.get(&slot) {
            Some((seen, _)) if *seen > key => {}
            _ => {
                latest.insert(slot, (key, event.after));
            }
        }
    }

    for (slot, (_, state)) in latest {
        contents.set(slot, state);
    }
    Ok(contents)
}
