//! Rollback marker persistence
//!
//! A marker and the rolled-back flags of its events are written in one
//! transaction, so a marker never exists without its events being flagged
//! and vice versa. Restore clears the flags and stamps the marker the same
//! way.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{StoreError, StoreResult};
use crate::types::{RollbackMarker, Scope, Window};

use super::store::{update_rolled_back, EventStore};

type MarkerRow = (i64, i64, String, String, i64, i64, i64, i64, Option<i64>);

const MARKER_COLUMNS: &str =
    "id, time, issuer_id, scope, window_start, window_end, applied, skipped, restored_at";

fn marker_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MarkerRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

fn load_marker(conn: &Connection, row: MarkerRow) -> StoreResult<RollbackMarker> {
    let (id, time, issuer_id, scope, start, end, applied, skipped, restored_at) = row;
    let scope: Scope = serde_json::from_str(&scope).map_err(|e| StoreError::Corrupt {
        table: "rollback_markers",
        id,
        reason: e.to_string(),
    })?;

    let mut stmt = conn.prepare_cached(
        "SELECT sequence_id FROM rollback_marker_events WHERE marker_id = ?1 ORDER BY sequence_id",
    )?;
    let event_ids = stmt
        .query_map(params![id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;

    Ok(RollbackMarker {
        id,
        created_at: time,
        issuer_id,
        scope,
        window: Window::new(start, end),
        applied_count: applied.max(0) as usize,
        skipped_count: skipped.max(0) as usize,
        event_ids,
        restored_at,
    })
}

impl EventStore {
    /// Persist a marker and flag its events rolled back, atomically
    ///
    /// Returns the new marker id.
    pub fn commit_rollback(&self, marker: &RollbackMarker) -> StoreResult<i64> {
        let scope = serde_json::to_string(&marker.scope)?;

        let mut guard = self.inner.writer.lock();
        let tx = guard.conn.transaction()?;

        tx.execute(
            "INSERT INTO rollback_markers
                (time, issuer_id, scope, window_start, window_end, applied, skipped)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                marker.created_at,
                marker.issuer_id,
                scope,
                marker.window.start,
                marker.window.end,
                marker.applied_count as i64,
                marker.skipped_count as i64,
            ],
        )?;
        let marker_id = tx.last_insert_rowid();

        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO rollback_marker_events (marker_id, sequence_id) VALUES (?1, ?2)",
            )?;
            for id in &marker.event_ids {
                stmt.execute(params![marker_id, id])?;
            }
        }
        update_rolled_back(&tx, &marker.event_ids, true)?;

        tx.commit()?;
        Ok(marker_id)
    }

    /// Clear the rolled-back flag on `event_ids`, stamping the marker
    /// restored when `restored_at` is given
    pub fn commit_restore(&self, marker_id: i64, event_ids: &[i64], restored_at: Option<i64>) -> StoreResult<()> {
        let mut guard = self.inner.writer.lock();
        let tx = guard.conn.transaction()?;

        update_rolled_back(&tx, event_ids, false)?;
        if let Some(restored_at) = restored_at {
            tx.execute(
                "UPDATE rollback_markers SET restored_at = ?2 WHERE id = ?1",
                params![marker_id, restored_at],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Load one marker with its event set
    pub fn marker(&self, id: i64) -> StoreResult<Option<RollbackMarker>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM rollback_markers WHERE id = ?1", MARKER_COLUMNS);
            let row = conn.query_row(&sql, params![id], marker_row).optional()?;
            row.map(|row| load_marker(conn, row)).transpose()
        })
    }

    /// Most recent markers, newest first
    pub fn recent_markers(&self, limit: usize) -> StoreResult<Vec<RollbackMarker>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM rollback_markers ORDER BY id DESC LIMIT ?1",
                MARKER_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![limit], marker_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(|row| load_marker(conn, row)).collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Action, BlockPos, EventCategory, Mutation, State};

    fn marker(event_ids: Vec<i64>) -> RollbackMarker {
        RollbackMarker {
            id: 0,
            created_at: 5_000,
            issuer_id: "staff".to_string(),
            scope: Scope::actor("u-alice").only(&[EventCategory::Block]),
            window: Window::new(0, 1_000),
            applied_count: event_ids.len(),
            skipped_count: 0,
            event_ids,
            restored_at: None,
        }
    }

    fn seed(store: &EventStore) -> Vec<i64> {
        let events: Vec<_> = (0..3)
            .map(|i| {
                Mutation::new(
                    "u-alice",
                    "Alice",
                    "world",
                    Action::BlockBreak { at: BlockPos::new(i, 0, 0) },
                    State::block("stone"),
                    State::air(),
                )
                .at(i as i64)
                .into_event(0)
            })
            .collect();
        store.append_batch(&events).unwrap()
    }

    #[test]
    fn test_commit_rollback_flags_events_and_roundtrips_marker() {
        let store = EventStore::open_in_memory().unwrap();
        let ids = seed(&store);

        let id = store.commit_rollback(&marker(ids[..2].to_vec())).unwrap();
        let loaded = store.marker(id).unwrap().unwrap();

        assert_eq!(loaded.event_ids, ids[..2].to_vec());
        assert_eq!(loaded.scope, Scope::actor("u-alice").only(&[EventCategory::Block]));
        assert_eq!(loaded.window, Window::new(0, 1_000));
        assert!(loaded.restored_at.is_none());

        let flags: Vec<bool> = store
            .events_by_ids(&ids)
            .unwrap()
            .iter()
            .map(|e| e.rolled_back)
            .collect();
        assert_eq!(flags, vec![true, true, false]);
    }

    #[test]
    fn test_commit_restore_clears_flags_and_stamps_marker() {
        let store = EventStore::open_in_memory().unwrap();
        let ids = seed(&store);
        let id = store.commit_rollback(&marker(ids.clone())).unwrap();

        store.commit_restore(id, &ids, Some(9_000)).unwrap();

        assert_eq!(store.marker(id).unwrap().unwrap().restored_at, Some(9_000));
        assert!(store.events_by_ids(&ids).unwrap().iter().all(|e| !e.rolled_back));
    }

    #[test]
    fn test_recent_markers_newest_first() {
        let store = EventStore::open_in_memory().unwrap();
        let ids = seed(&store);
        let first = store.commit_rollback(&marker(vec![ids[0]])).unwrap();
        let second = store.commit_rollback(&marker(vec![ids[1]])).unwrap();

        let markers = store.recent_markers(10).unwrap();
        assert_eq!(markers.iter().map(|m| m.id).collect::<Vec<_>>(), vec![second, first]);
        assert!(store.marker(999).unwrap().is_none());
    }
}
