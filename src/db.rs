// ==========================================
// Hierarchy Recon - SQLite connection setup
// ==========================================
// - every connection gets the same PRAGMAs (foreign keys, busy timeout)
// - init_schema creates the tables idempotently and records schema_version
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;
use tracing::{info, warn};

/// Default busy_timeout (ms)
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// schema_version this code expects
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// Apply connection-level PRAGMAs.
///
/// foreign_keys and busy_timeout are per connection, so every open goes through here.
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// Open a SQLite connection with the shared configuration applied.
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// Read schema_version (None when the table does not exist yet).
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// Create all tables if missing.
///
/// Nested node parts (flags, mappings, formulas, metadata) live in JSON TEXT columns;
/// `seq` keeps insertion order, which breaks sort_order ties on export.
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version     INTEGER NOT NULL PRIMARY KEY,
            applied_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS project (
            project_id  TEXT NOT NULL PRIMARY KEY,
            name        TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS hierarchy_node (
            seq                 INTEGER PRIMARY KEY AUTOINCREMENT,
            id                  TEXT NOT NULL UNIQUE,
            project_id          TEXT NOT NULL REFERENCES project(project_id) ON DELETE CASCADE,
            hierarchy_id        TEXT NOT NULL,
            name                TEXT NOT NULL,
            description         TEXT,
            parent_id           TEXT,
            is_root             INTEGER NOT NULL DEFAULT 1,
            level_path          TEXT NOT NULL DEFAULT '[]',
            level_sort_orders   TEXT NOT NULL DEFAULT '[]',
            sort_order          INTEGER NOT NULL DEFAULT 0,
            flags               TEXT NOT NULL,
            custom_flags        TEXT NOT NULL DEFAULT '{}',
            source_mappings     TEXT NOT NULL DEFAULT '[]',
            formula_config      TEXT,
            filter_config       TEXT,
            xref_key            INTEGER,
            metadata            TEXT NOT NULL DEFAULT '{}',
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL,
            UNIQUE (project_id, hierarchy_id)
        );

        CREATE INDEX IF NOT EXISTS idx_hierarchy_node_project
            ON hierarchy_node (project_id, seq);
        CREATE INDEX IF NOT EXISTS idx_hierarchy_node_parent
            ON hierarchy_node (parent_id);

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id    TEXT NOT NULL,
            key         TEXT NOT NULL,
            value       TEXT NOT NULL,
            updated_at  TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );
        "#,
    )?;

    match read_schema_version(conn)? {
        Some(v) if v == CURRENT_SCHEMA_VERSION => {}
        Some(v) => {
            warn!(
                found = v,
                expected = CURRENT_SCHEMA_VERSION,
                "schema_version mismatch, running without migration"
            );
        }
        None => {}
    }

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    info!(version = CURRENT_SCHEMA_VERSION, "schema ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_schema_version_absent_before_init() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), None);
    }
}
