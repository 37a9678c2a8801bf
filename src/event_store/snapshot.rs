//! Inventory snapshot persistence
//!
//! Snapshots are full-inventory captures stored as one JSON document per
//! row. They anchor inventory rollback: the latest snapshot before a window
//! gives the base inventory that in-window slot edits are replayed onto.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{StoreError, StoreResult};
use crate::types::{InventoryContents, InventorySnapshot};

use super::store::EventStore;

type SnapshotRow = (i64, i64, String, String, String);

fn decode_snapshot(row: SnapshotRow) -> StoreResult<InventorySnapshot> {
    let (id, time, actor_id, actor_name, contents) = row;
    let contents: InventoryContents = serde_json::from_str(&contents).map_err(|e| StoreError::Corrupt {
        table: "inventory_snapshots",
        id,
        reason: e.to_string(),
    })?;
    Ok(InventorySnapshot {
        id,
        timestamp: time,
        actor_id,
        actor_name,
        contents,
    })
}

pub(super) fn insert_snapshot(conn: &Connection, snapshot: &InventorySnapshot) -> StoreResult<i64> {
    let contents = serde_json::to_string(&snapshot.contents)?;
    conn.execute(
        "INSERT INTO inventory_snapshots (time, actor_id, actor_name, contents)
         VALUES (?1, ?2, ?3, ?4)",
        params![snapshot.timestamp, snapshot.actor_id, snapshot.actor_name, contents],
    )?;
    Ok(conn.last_insert_rowid())
}

impl EventStore {
    /// Persist a snapshot, returning its row id
    pub fn save_snapshot(&self, snapshot: &InventorySnapshot) -> StoreResult<i64> {
        self.with_conn(|conn| insert_snapshot(conn, snapshot))
    }

    /// Most recent snapshot of `actor_id` taken strictly before `time`
    pub fn latest_snapshot_before(&self, actor_id: &str, time: i64) -> StoreResult<Option<InventorySnapshot>> {
        let row: Option<SnapshotRow> = self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, time, actor_id, actor_name, contents
                     FROM inventory_snapshots
                     WHERE actor_id = ?1 AND time < ?2
                     ORDER BY time DESC, id DESC
                     LIMIT 1",
                    params![actor_id, time],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
                )
                .optional()?;
            Ok(row)
        })?;

        row.map(decode_snapshot).transpose()
    }

    /// Snapshots of one actor, newest first
    pub fn snapshots_for(&self, actor_id: &str, limit: usize) -> StoreResult<Vec<InventorySnapshot>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<SnapshotRow> = self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT id, time, actor_id, actor_name, contents
                 FROM inventory_snapshots
                 WHERE actor_id = ?1
                 ORDER BY time DESC, id DESC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![actor_id, limit], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        rows.into_iter().map(decode_snapshot).collect()
    }
}
