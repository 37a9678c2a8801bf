//! Retention purge
//!
//! Deletes every row older than a cutoff from each category, plus inventory
//! snapshots and rollback markers. Purge is actor-agnostic and runs behind
//! the write side of the purge gate, so it waits for in-flight rollback and
//! restore collection to finish.

use rusqlite::params;

use crate::error::StoreResult;
use crate::types::{EventCategory, MS_PER_DAY};
use crate::utils::now_millis;

use super::store::EventStore;

/// Rows deleted per category by one purge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeCounts {
    pub block: usize,
    pub container: usize,
    pub inventory: usize,
    pub snapshots: usize,
    pub markers: usize,
}

impl PurgeCounts {
    /// Change events removed, all categories
    pub fn events(&self) -> usize {
        self.block + self.container + self.inventory
    }

    pub fn total(&self) -> usize {
        self.events() + self.snapshots + self.markers
    }
}

/// Cutoff for a retention of `retention_days` as of `now`
pub fn retention_cutoff(retention_days: u32, now: i64) -> i64 {
    now.saturating_sub(retention_days as i64 * MS_PER_DAY)
}

impl EventStore {
    /// Delete everything older than `retention_days` days
    pub fn purge(&self, retention_days: u32) -> StoreResult<PurgeCounts> {
        self.purge_at(retention_days, now_millis())
    }

    /// [`purge`](Self::purge) with an explicit "now"
    pub fn purge_at(&self, retention_days: u32, now: i64) -> StoreResult<PurgeCounts> {
        self.purge_before(retention_cutoff(retention_days, now))
    }

    /// Delete every row with `time < cutoff`
    pub fn purge_before(&self, cutoff: i64) -> StoreResult<PurgeCounts> {
        let _gate = self.inner.purge_gate.write();
        let mut guard = self.inner.writer.lock();
        let tx = guard.conn.transaction()?;

        let mut counts = PurgeCounts::default();
        for category in EventCategory::ALL {
            let deleted = tx.execute(
                &format!("DELETE FROM {} WHERE time < ?1", category.table()),
                params![cutoff],
            )?;
            match category {
                EventCategory::Block => counts.block = deleted,
                EventCategory::Container => counts.container = deleted,
                EventCategory::Inventory => counts.inventory = deleted,
            }
        }

        counts.snapshots = tx.execute("DELETE FROM inventory_snapshots WHERE time < ?1", params![cutoff])?;

        tx.execute(
            "DELETE FROM rollback_marker_events
             WHERE marker_id IN (SELECT id FROM rollback_markers WHERE time < ?1)",
            params![cutoff],
        )?;
        counts.markers = tx.execute("DELETE FROM rollback_markers WHERE time < ?1", params![cutoff])?;

        tx.commit()?;

        tracing::info!(
            cutoff,
            block = counts.block,
            container = counts.container,
            inventory = counts.inventory,
            snapshots = counts.snapshots,
            markers = counts.markers,
            "Purged expired audit rows"
        );

        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Action, BlockPos, InventorySnapshot, Mutation, State};

    const NOW: i64 = 100 * MS_PER_DAY;

    fn event(ts: i64, action: Action) -> crate::types::ChangeEvent {
        Mutation::new("u", "U", "world", action, State::air(), State::block("stone"))
            .at(ts)
            .into_event(0)
    }

    #[test]
    fn test_purge_removes_exactly_rows_before_cutoff() {
        let store = EventStore::open_in_memory().unwrap();
        let cutoff = retention_cutoff(7, NOW);
        let at = BlockPos::new(0, 0, 0);

        store
            .append_batch(&[
                event(cutoff - 1, Action::BlockPlace { at }),
                event(cutoff, Action::BlockPlace { at }),
                event(cutoff - 10, Action::ContainerSlotChange { at, slot: 0 }),
                event(cutoff - 10, Action::Pickup { slot: 0 }),
                event(NOW, Action::Pickup { slot: 0 }),
            ])
            .unwrap();
        store
            .save_snapshot(&InventorySnapshot::new(cutoff - 1, "u", "U", Default::default()))
            .unwrap();

        let counts = store.purge_at(7, NOW).unwrap();
        assert_eq!(
            counts,
            PurgeCounts {
                block: 1,
                container: 1,
                inventory: 1,
                snapshots: 1,
                markers: 0
            }
        );
        assert_eq!(counts.events(), 3);

        // the row exactly at the cutoff survives
        assert_eq!(store.query_by_location("world", at, 0).unwrap().len(), 1);

        let again = store.purge_at(7, NOW).unwrap();
        assert_eq!(again.total(), 0);
    }

    #[test]
    fn test_retention_cutoff_arithmetic() {
        assert_eq!(retention_cutoff(1, MS_PER_DAY * 3), MS_PER_DAY * 2);
        assert_eq!(retention_cutoff(0, 42), 42);
    }

    #[test]
    fn test_purge_waits_for_collection_guard() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;
        use std::time::Duration;

        let store = EventStore::open_in_memory().unwrap();
        store
            .append(&event(1, Action::BlockPlace { at: BlockPos::new(0, 0, 0) }))
            .unwrap();

        let guard = store.purge_gate();
        let finished = Arc::new(AtomicBool::new(false));
        let handle = {
            let store = store.clone();
            let finished = Arc::clone(&finished);
            std::thread::spawn(move || {
                let counts = store.purge_before(NOW).unwrap();
                finished.store(true, Ordering::SeqCst);
                counts
            })
        };

        std::thread::sleep(Duration::from_millis(100));
        assert!(!finished.load(Ordering::SeqCst));
        // collection still sees the row
        assert_eq!(store.query_by_actor("u", 0, 10).unwrap().len(), 1);

        drop(guard);
        let counts = handle.join().unwrap();
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(counts.block, 1);
    }
}
