//! Event Store - indexed persistence of change events
//!
//! One SQLite connection behind a mutex is the serialized write path shared
//! by the recorder, lookups, rollback queries and purge. Sequence ids are
//! assigned here, under that mutex, so they are strictly increasing across
//! all three event tables.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};

use crate::config::AuditConfig;
use crate::error::{StoreError, StoreResult};
use crate::types::{Action, BlockPos, ChangeEvent, EventCategory, InventorySnapshot, State};

use super::schema;
use super::snapshot::insert_snapshot;

/// SQLite's host-parameter limit is well above this; keeps IN lists bounded
pub(super) const ID_CHUNK: usize = 500;

pub(super) struct Writer {
    pub(super) conn: Connection,
    /// Next sequence id to hand out
    pub(super) next_sequence: i64,
}

pub(super) struct StoreInner {
    pub(super) writer: Mutex<Writer>,
    /// Rollback/restore collection holds a read guard; purge takes the write side
    pub(super) purge_gate: RwLock<()>,
    pub(super) path: Option<PathBuf>,
    pub(super) page_size: usize,
}

/// Durable, indexed store for change events, inventory snapshots and
/// rollback markers
///
/// Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct EventStore {
    pub(super) inner: Arc<StoreInner>,
}

impl EventStore {
    /// Open or create the database described by `config`
    pub fn open(config: &AuditConfig) -> StoreResult<Self> {
        let path = config.database_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )?;

        let store = Self::from_connection(conn, Some(path.clone()), config.page_size)?;
        tracing::info!(
            path = %path.display(),
            next_sequence = store.next_sequence(),
            "Event store opened"
        );
        Ok(store)
    }

    /// Private in-memory store, mostly for tests
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::from_connection(conn, None, AuditConfig::default().page_size)
    }

    fn from_connection(mut conn: Connection, path: Option<PathBuf>, page_size: usize) -> StoreResult<Self> {
        schema::run_migrations(&mut conn)?;

        // purge can delete the newest rows, so the persisted high-water mark
        // wins over whatever ids survive
        let (high_water, max_id): (i64, Option<i64>) = conn.query_row(
            "SELECT
                (SELECT value FROM sequence_state WHERE name = 'events'),
                (SELECT MAX(m) FROM (
                    SELECT MAX(id) AS m FROM block_events
                    UNION ALL SELECT MAX(id) FROM container_events
                    UNION ALL SELECT MAX(id) FROM inventory_events
                ))",
            [],
            |row| Ok((row.get::<_, Option<i64>>(0)?.unwrap_or(0), row.get(1)?)),
        )?;

        Ok(Self {
            inner: Arc::new(StoreInner {
                writer: Mutex::new(Writer {
                    conn,
                    next_sequence: high_water.max(max_id.unwrap_or(0)) + 1,
                }),
                purge_gate: RwLock::new(()),
                path,
                page_size: page_size.max(1),
            }),
        })
    }

    /// Database file path, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    /// Rows fetched per cursor page
    pub fn page_size(&self) -> usize {
        self.inner.page_size
    }

    /// The sequence id the next appended event will receive
    pub fn next_sequence(&self) -> i64 {
        self.inner.writer.lock().next_sequence
    }

    /// Hold off purge while the guard lives
    ///
    /// Rollback and restore take this for their whole collection phase so a
    /// concurrent purge cannot delete rows out from under a live cursor.
    pub fn purge_gate(&self) -> RwLockReadGuard<'_, ()> {
        self.inner.purge_gate.read()
    }

    /// Run `f` with the shared connection
    pub(super) fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T>,
    {
        let writer = self.inner.writer.lock();
        f(&writer.conn)
    }

    /// Append one event, returning its assigned sequence id
    pub fn append(&self, event: &ChangeEvent) -> StoreResult<i64> {
        let ids = self.append_batch(std::slice::from_ref(event))?;
        ids.into_iter()
            .next()
            .ok_or_else(|| StoreError::Unavailable("append produced no id".to_string()))
    }

    /// Append events in one transaction, in order
    ///
    /// The `sequence_id` on the input is ignored; the returned ids are the
    /// ones assigned. Either every event is written or none is.
    pub fn append_batch(&self, events: &[ChangeEvent]) -> StoreResult<Vec<i64>> {
        self.append_records(events, &[])
    }

    /// Append events and inventory snapshots in one transaction
    ///
    /// On error nothing is written and no sequence id is consumed, so the
    /// caller can retry the same records.
    pub fn append_records(&self, events: &[ChangeEvent], snapshots: &[InventorySnapshot]) -> StoreResult<Vec<i64>> {
        if events.is_empty() && snapshots.is_empty() {
            return Ok(Vec::new());
        }

        let mut guard = self.inner.writer.lock();
        let Writer { conn, next_sequence } = &mut *guard;

        let tx = conn.transaction()?;
        let mut ids = Vec::with_capacity(events.len());
        let mut seq = *next_sequence;

        for event in events {
            insert_event(&tx, seq, event)?;
            ids.push(seq);
            seq += 1;
        }
        if !events.is_empty() {
            tx.execute(
                "UPDATE sequence_state SET value = ?1 WHERE name = 'events'",
                params![seq - 1],
            )?;
        }
        for snapshot in snapshots {
            insert_snapshot(&tx, snapshot)?;
        }

        tx.commit()?;
        *next_sequence = seq;

        Ok(ids)
    }

    /// Block and container events at one coordinate since `since`, newest first
    pub fn query_by_location(&self, world: &str, pos: BlockPos, since: i64) -> StoreResult<Vec<ChangeEvent>> {
        let sql = format!(
            "SELECT {block} FROM block_events
                 WHERE world = ?1 AND x = ?2 AND y = ?3 AND z = ?4 AND time >= ?5
             UNION ALL
             SELECT {container} FROM container_events
                 WHERE world = ?1 AND x = ?2 AND y = ?3 AND z = ?4 AND time >= ?5
             ORDER BY time DESC, id DESC",
            block = select_columns(EventCategory::Block),
            container = select_columns(EventCategory::Container),
        );

        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            let raws = stmt
                .query_map(params![world, pos.x, pos.y, pos.z, since], RawEvent::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            raws.into_iter().map(RawEvent::decode).collect()
        })
    }

    /// Everything one actor did since `since`, newest first, at most `limit`
    pub fn query_by_actor(&self, actor_id: &str, since: i64, limit: usize) -> StoreResult<Vec<ChangeEvent>> {
        let sql = format!(
            "SELECT {block} FROM block_events WHERE actor_id = ?1 AND time >= ?2
             UNION ALL
             SELECT {container} FROM container_events WHERE actor_id = ?1 AND time >= ?2
             UNION ALL
             SELECT {inventory} FROM inventory_events WHERE actor_id = ?1 AND time >= ?2
             ORDER BY time DESC, id DESC
             LIMIT ?3",
            block = select_columns(EventCategory::Block),
            container = select_columns(EventCategory::Container),
            inventory = select_columns(EventCategory::Inventory),
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            let raws = stmt
                .query_map(params![actor_id, since, limit], RawEvent::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            raws.into_iter().map(RawEvent::decode).collect()
        })
    }

    /// Load events by sequence id, ordered by (time, id)
    ///
    /// Ids that no longer exist (purged) are silently absent.
    pub fn events_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<ChangeEvent>> {
        let mut events = Vec::with_capacity(ids.len());

        self.with_conn(|conn| {
            for chunk in ids.chunks(ID_CHUNK) {
                let placeholders = placeholders(chunk.len());
                for category in EventCategory::ALL {
                    let sql = format!(
                        "SELECT {} FROM {} WHERE id IN ({})",
                        select_columns(category),
                        category.table(),
                        placeholders
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    let raws = stmt
                        .query_map(params_from_iter(chunk.iter()), RawEvent::from_row)?
                        .collect::<rusqlite::Result<Vec<_>>>()?;
                    for raw in raws {
                        events.push(raw.decode()?);
                    }
                }
            }
            Ok(())
        })?;

        events.sort_by_key(ChangeEvent::order_key);
        Ok(events)
    }

    /// Set or clear the rolled-back flag on the given events
    pub fn set_rolled_back(&self, ids: &[i64], rolled_back: bool) -> StoreResult<usize> {
        let mut guard = self.inner.writer.lock();
        let tx = guard.conn.transaction()?;
        let updated = update_rolled_back(&tx, ids, rolled_back)?;
        tx.commit()?;
        Ok(updated)
    }
}

fn insert_event(conn: &Connection, seq: i64, event: &ChangeEvent) -> StoreResult<()> {
    let before = event.before.to_json()?;
    let after = event.after.to_json()?;

    match event.action {
        Action::BlockPlace { at } | Action::BlockBreak { at } => {
            let mut stmt = conn.prepare_cached(
                "INSERT INTO block_events
                    (id, time, actor_id, actor_name, world, x, y, z, action, before_state, after_state, rolled_back)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            )?;
            stmt.execute(params![
                seq,
                event.timestamp,
                event.actor_id,
                event.actor_name,
                event.world,
                at.x,
                at.y,
                at.z,
                event.action.kind(),
                before,
                after,
                event.rolled_back,
            ])?;
        }
        Action::ContainerSlotChange { at, slot } => {
            let mut stmt = conn.prepare_cached(
                "INSERT INTO container_events
                    (id, time, actor_id, actor_name, world, x, y, z, slot, action, before_state, after_state, rolled_back)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            )?;
            stmt.execute(params![
                seq,
                event.timestamp,
                event.actor_id,
                event.actor_name,
                event.world,
                at.x,
                at.y,
                at.z,
                slot,
                event.action.kind(),
                before,
                after,
                event.rolled_back,
            ])?;
        }
        Action::InventorySlotChange { slot } | Action::Pickup { slot } | Action::Drop { slot } => {
            let mut stmt = conn.prepare_cached(
                "INSERT INTO inventory_events
                    (id, time, actor_id, actor_name, world, slot, action, before_state, after_state, rolled_back)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            stmt.execute(params![
                seq,
                event.timestamp,
                event.actor_id,
                event.actor_name,
                event.world,
                slot,
                event.action.kind(),
                before,
                after,
                event.rolled_back,
            ])?;
        }
    }

    Ok(())
}

pub(super) fn update_rolled_back(conn: &Connection, ids: &[i64], rolled_back: bool) -> StoreResult<usize> {
    let mut updated = 0;
    for chunk in ids.chunks(ID_CHUNK) {
        let mut values: Vec<Value> = Vec::with_capacity(chunk.len() + 1);
        values.push(Value::Integer(rolled_back as i64));
        values.extend(chunk.iter().map(|id| Value::Integer(*id)));

        for category in EventCategory::ALL {
            let sql = format!(
                "UPDATE {} SET rolled_back = ?1 WHERE id IN ({})",
                category.table(),
                numbered_placeholders(2, chunk.len())
            );
            updated += conn.execute(&sql, params_from_iter(values.iter()))?;
        }
    }
    Ok(updated)
}

/// `?, ?, ?` for an IN list
pub(super) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// `?first, ?first+1, ...` for an IN list following numbered parameters
pub(super) fn numbered_placeholders(first: usize, n: usize) -> String {
    (first..first + n)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Column list shared by every category so results can be UNIONed
pub(super) fn select_columns(category: EventCategory) -> &'static str {
    match category {
        EventCategory::Block => {
            "id, time, actor_id, actor_name, world, x, y, z, NULL AS slot, action, before_state, after_state, rolled_back, 'block_events' AS source"
        }
        EventCategory::Container => {
            "id, time, actor_id, actor_name, world, x, y, z, slot, action, before_state, after_state, rolled_back, 'container_events' AS source"
        }
        EventCategory::Inventory => {
            "id, time, actor_id, actor_name, world, NULL AS x, NULL AS y, NULL AS z, slot, action, before_state, after_state, rolled_back, 'inventory_events' AS source"
        }
    }
}

/// A row as read from SQLite, before its JSON and action are decoded
pub(super) struct RawEvent {
    id: i64,
    time: i64,
    actor_id: String,
    actor_name: String,
    world: String,
    x: Option<i32>,
    y: Option<i32>,
    z: Option<i32>,
    slot: Option<u32>,
    action: String,
    before: String,
    after: String,
    rolled_back: bool,
    source: String,
}

impl RawEvent {
    pub(super) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            time: row.get(1)?,
            actor_id: row.get(2)?,
            actor_name: row.get(3)?,
            world: row.get(4)?,
            x: row.get(5)?,
            y: row.get(6)?,
            z: row.get(7)?,
            slot: row.get(8)?,
            action: row.get(9)?,
            before: row.get(10)?,
            after: row.get(11)?,
            rolled_back: row.get(12)?,
            source: row.get(13)?,
        })
    }

    pub(super) fn id(&self) -> i64 {
        self.id
    }

    pub(super) fn decode(self) -> StoreResult<ChangeEvent> {
        let table = match self.source.as_str() {
            "block_events" => EventCategory::Block.table(),
            "container_events" => EventCategory::Container.table(),
            _ => EventCategory::Inventory.table(),
        };
        let id = self.id;
        let corrupt = move |reason: String| StoreError::Corrupt { table, id, reason };

        let at = match (self.x, self.y, self.z) {
            (Some(x), Some(y), Some(z)) => Some(BlockPos::new(x, y, z)),
            _ => None,
        };
        let action = Action::from_parts(&self.action, at, self.slot).map_err(corrupt)?;
        let before = State::from_json(&self.before).map_err(|e| corrupt(format!("before_state: {}", e)))?;
        let after = State::from_json(&self.after).map_err(|e| corrupt(format!("after_state: {}", e)))?;

        Ok(ChangeEvent {
            sequence_id: self.id,
            timestamp: self.time,
            actor_id: self.actor_id,
            actor_name: self.actor_name,
            world: self.world,
            action,
            before,
            after,
            rolled_back: self.rolled_back,
        })
    }
}
