//! Versioned schema migrations
//!
//! Each migration runs exactly once and is tracked in `schema_migrations`.

use rusqlite::{params, Connection};

use crate::utils::now_millis;

/// A schema migration with a version number, name, and SQL to execute
pub struct Migration {
    /// Unique version number (migrations run in order)
    pub version: i64,
    pub name: &'static str,
    pub sql: &'static str,
}

/// All migrations in order. New migrations go at the end.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_block_events",
        sql: r#"
            CREATE TABLE IF NOT EXISTS block_events (
                id INTEGER PRIMARY KEY,
                time INTEGER NOT NULL,
                actor_id TEXT NOT NULL,
                actor_name TEXT NOT NULL,
                world TEXT NOT NULL,
                x INTEGER NOT NULL,
                y INTEGER NOT NULL,
                z INTEGER NOT NULL,
                action TEXT NOT NULL,
                before_state TEXT NOT NULL,
                after_state TEXT NOT NULL,
                rolled_back INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_block_events_location ON block_events(world, x, y, z);
            CREATE INDEX IF NOT EXISTS idx_block_events_actor ON block_events(actor_id);
            CREATE INDEX IF NOT EXISTS idx_block_events_time ON block_events(time);
        "#,
    },
    Migration {
        version: 2,
        name: "create_container_events",
        sql: r#"
            CREATE TABLE IF NOT EXISTS container_events (
                id INTEGER PRIMARY KEY,
                time INTEGER NOT NULL,
                actor_id TEXT NOT NULL,
                actor_name TEXT NOT NULL,
                world TEXT NOT NULL,
                x INTEGER NOT NULL,
                y INTEGER NOT NULL,
                z INTEGER NOT NULL,
                slot INTEGER NOT NULL,
                action TEXT NOT NULL,
                before_state TEXT NOT NULL,
                after_state TEXT NOT NULL,
                rolled_back INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_container_events_location ON container_events(world, x, y, z);
            CREATE INDEX IF NOT EXISTS idx_container_events_actor ON container_events(actor_id);
            CREATE INDEX IF NOT EXISTS idx_container_events_time ON container_events(time);
        "#,
    },
    Migration {
        version: 3,
        name: "create_inventory_events",
        sql: r#"
            CREATE TABLE IF NOT EXISTS inventory_events (
                id INTEGER PRIMARY KEY,
                time INTEGER NOT NULL,
                actor_id TEXT NOT NULL,
                actor_name TEXT NOT NULL,
                world TEXT NOT NULL,
                slot INTEGER NOT NULL,
                action TEXT NOT NULL,
                before_state TEXT NOT NULL,
                after_state TEXT NOT NULL,
                rolled_back INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_inventory_events_slot ON inventory_events(actor_id, slot);
            CREATE INDEX IF NOT EXISTS idx_inventory_events_actor ON inventory_events(actor_id);
            CREATE INDEX IF NOT EXISTS idx_inventory_events_time ON inventory_events(time);
        "#,
    },
    Migration {
        version: 4,
        name: "create_inventory_snapshots",
        sql: r#"
            CREATE TABLE IF NOT EXISTS inventory_snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                time INTEGER NOT NULL,
                actor_id TEXT NOT NULL,
                actor_name TEXT NOT NULL,
                contents TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_inventory_snapshots_actor_time ON inventory_snapshots(actor_id, time);
            CREATE INDEX IF NOT EXISTS idx_inventory_snapshots_time ON inventory_snapshots(time);
        "#,
    },
    Migration {
        version: 5,
        name: "create_rollback_markers",
        sql: r#"
            CREATE TABLE IF NOT EXISTS rollback_markers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                time INTEGER NOT NULL,
                issuer_id TEXT NOT NULL,
                scope TEXT NOT NULL,
                window_start INTEGER NOT NULL,
                window_end INTEGER NOT NULL,
                applied INTEGER NOT NULL,
                skipped INTEGER NOT NULL,
                restored_at INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_rollback_markers_time ON rollback_markers(time);
            CREATE TABLE IF NOT EXISTS rollback_marker_events (
                marker_id INTEGER NOT NULL,
                sequence_id INTEGER NOT NULL,
                PRIMARY KEY (marker_id, sequence_id),
                FOREIGN KEY (marker_id) REFERENCES rollback_markers(id) ON DELETE CASCADE
            );
        "#,
    },
    Migration {
        version: 6,
        name: "create_sequence_state",
        sql: r#"
            CREATE TABLE IF NOT EXISTS sequence_state (
                name TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            );
            INSERT OR IGNORE INTO sequence_state (name, value)
                SELECT 'events', COALESCE(MAX(m), 0) FROM (
                    SELECT MAX(id) AS m FROM block_events
                    UNION ALL SELECT MAX(id) FROM container_events
                    UNION ALL SELECT MAX(id) FROM inventory_events
                );
        "#,
    },
];

fn ensure_migrations_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at INTEGER NOT NULL
        );",
    )
}

fn applied_versions(conn: &Connection) -> rusqlite::Result<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations ORDER BY version")?;
    let versions = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(versions)
}

/// Apply every pending migration, each in its own transaction
pub fn run_migrations(conn: &mut Connection) -> rusqlite::Result<()> {
    ensure_migrations_table(conn)?;
    let applied = applied_versions(conn)?;

    for migration in MIGRATIONS {
        if applied.contains(&migration.version) {
            continue;
        }

        tracing::debug!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );

        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql).map_err(|e| {
            tracing::error!(version = migration.version, name = migration.name, error = %e, "Migration failed");
            e
        })?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            params![migration.version, migration.name, now_millis()],
        )?;
        tx.commit()?;
    }

    Ok(())
}
