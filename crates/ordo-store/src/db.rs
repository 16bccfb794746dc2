//! SQLite schema and connection setup.
//!
//! Two tables. `records` holds every versioned entity, keyed by
//! (table_name, id). `audit_log` is append-only; its `seq` column is the
//! storage engine's insertion order and is the authoritative ordering of
//! entries for a record.

use std::time::Duration;

use rusqlite::{Connection, OpenFlags, Result as SqliteResult};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};

pub(crate) const SCHEMA: &str = r#"
-- Versioned entities (payload is a JSON document)
CREATE TABLE IF NOT EXISTS records (
    table_name TEXT NOT NULL,
    id TEXT NOT NULL,
    version INTEGER NOT NULL CHECK (version >= 1),
    payload TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (table_name, id)
);

-- Audit log (append-only, immutable)
CREATE TABLE IF NOT EXISTS audit_log (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    table_name TEXT NOT NULL,
    record_id TEXT NOT NULL,
    action TEXT NOT NULL CHECK (action IN ('CREATED', 'UPDATED', 'DELETED')),
    old_data TEXT,
    new_data TEXT,
    changed_fields TEXT,
    changed_by TEXT NOT NULL,
    changed_at INTEGER NOT NULL,
    ip_address TEXT,
    user_agent TEXT
);
CREATE INDEX IF NOT EXISTS idx_audit_record ON audit_log(record_id, seq);
CREATE INDEX IF NOT EXISTS idx_audit_table ON audit_log(table_name, changed_at);

CREATE TRIGGER IF NOT EXISTS audit_log_no_update BEFORE UPDATE ON audit_log
BEGIN
    SELECT RAISE(ABORT, 'audit_log is append-only');
END;
CREATE TRIGGER IF NOT EXISTS audit_log_no_delete BEFORE DELETE ON audit_log
BEGIN
    SELECT RAISE(ABORT, 'audit_log is append-only');
END;
"#;

/// SQLite integers are signed; refuse values past `i64::MAX`.
pub(crate) fn to_sql_int(value: u64, column: &'static str) -> StoreResult<i64> {
    i64::try_from(value).map_err(|_| StoreError::OutOfRange { column, value })
}

pub(crate) fn from_sql_int(value: i64, column: &'static str) -> StoreResult<u64> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {column}: {value}")))
}

/// Open the configured database and make sure the schema exists.
pub(crate) fn open_connection(config: &StoreConfig) -> SqliteResult<Connection> {
    let conn = if config.is_in_memory() {
        Connection::open_in_memory()?
    } else {
        Connection::open(&config.database)?
    };

    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    if config.foreign_keys {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    }
    if config.wal && !config.is_in_memory() {
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    }
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

/// Open an existing database for reading. Never creates the file.
///
/// An in-memory database has nothing to read, so it gets the normal setup.
pub(crate) fn open_read_only(config: &StoreConfig) -> StoreResult<Connection> {
    if config.is_in_memory() {
        return Ok(open_connection(config)?);
    }

    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let conn = Connection::open_with_flags(&config.database, flags)?;
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;

    let tables: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master
         WHERE type = 'table' AND name IN ('records', 'audit_log')",
        [],
        |row| row.get(0),
    )?;
    if tables != 2 {
        return Err(StoreError::Corrupt(format!(
            "{} is not an ordo database",
            config.database.display()
        )));
    }
    Ok(conn)
}
