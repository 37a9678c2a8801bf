//! Event Store Statistics
//!
//! Provides statistics about the event store including:
//! - Row counts by category
//! - Rolled-back event count
//! - Storage size information

use std::collections::BTreeMap;

use crate::error::StoreResult;
use crate::types::EventCategory;

use super::store::EventStore;

/// Statistics about the Event Store
#[derive(Debug, Clone, Default)]
pub struct EventStoreStats {
    /// Events per category
    pub events_by_category: BTreeMap<EventCategory, usize>,
    /// Events currently undone by a live rollback marker
    pub rolled_back_events: usize,
    pub snapshot_count: usize,
    pub marker_count: usize,
    /// Oldest and newest event timestamps
    pub oldest_event: Option<i64>,
    pub newest_event: Option<i64>,
    /// Size of the database file in bytes (0 for in-memory stores)
    pub database_size: u64,
}

impl EventStoreStats {
    /// Calculate total events
    pub fn total_events(&self) -> usize {
        self.events_by_category.values().sum()
    }

    /// Database size with a binary unit, two decimals above bytes
    pub fn format_size(bytes: u64) -> String {
        const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

        if bytes < 1024 {
            return format!("{} B", bytes);
        }
        let mut value = bytes as f64 / 1024.0;
        let mut unit = 0;
        while value >= 1024.0 && unit + 1 < UNITS.len() {
            value /= 1024.0;
            unit += 1;
        }
        format!("{:.2} {}", value, UNITS[unit])
    }
}

fn count(conn: &rusqlite::Connection, sql: &str) -> rusqlite::Result<usize> {
    let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
    Ok(n.max(0) as usize)
}

impl EventStore {
    /// Collect row counts and sizes
    pub fn stats(&self) -> StoreResult<EventStoreStats> {
        let mut stats = self.with_conn(|conn| {
            let mut stats = EventStoreStats::default();

            for category in EventCategory::ALL {
                let table = category.table();
                stats
                    .events_by_category
                    .insert(category, count(conn, &format!("SELECT COUNT(*) FROM {}", table))?);
                stats.rolled_back_events += count(
                    conn,
                    &format!("SELECT COUNT(*) FROM {} WHERE rolled_back = 1", table),
                )?;

                let (oldest, newest): (Option<i64>, Option<i64>) = conn.query_row(
                    &format!("SELECT MIN(time), MAX(time) FROM {}", table),
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?;
                stats.oldest_event = match (stats.oldest_event, oldest) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                };
                stats.newest_event = match (stats.newest_event, newest) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    (a, b) => a.or(b),
                };
            }

            stats.snapshot_count = count(conn, "SELECT COUNT(*) FROM inventory_snapshots")?;
            stats.marker_count = count(conn, "SELECT COUNT(*) FROM rollback_markers")?;
            Ok(stats)
        })?;

        if let Some(path) = self.path() {
            stats.database_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        }

        Ok(stats)
    }
}
