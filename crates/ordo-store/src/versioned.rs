//! Optimistic concurrency for versioned records.
//!
//! A record starts at version 1. Each accepted write bumps the version by
//! exactly one, in the same statement that replaces the payload:
//!
//! ```sql
//! UPDATE records SET version = :expected + 1, payload = ...
//!  WHERE table_name = ... AND id = ... AND version = :expected
//! ```
//!
//! Zero affected rows means someone else got there first. The functions here
//! all run inside a caller-owned transaction; committing or rolling back is
//! the caller's business.

use rusqlite::{OptionalExtension, Transaction, params};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use ordo_types::{RecordId, Timestamp};

use crate::db::{from_sql_int, to_sql_int};
use crate::error::{OptimisticLockError, StoreError, StoreResult};

/// An entity with its version and typed payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VersionedEntity<T> {
    pub id: RecordId,
    pub version: u64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub payload: T,
}

/// A `records` row with the payload still as JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: RecordId,
    pub version: u64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub payload: Value,
}

impl StoredRecord {
    /// The JSON document written to the audit log for this row.
    pub fn snapshot(&self) -> StoreResult<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn into_entity<T: DeserializeOwned>(self) -> StoreResult<VersionedEntity<T>> {
        Ok(VersionedEntity {
            id: self.id,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
            payload: serde_json::from_value(self.payload)?,
        })
    }
}

pub(crate) const SELECT_COLUMNS: &str = "id, version, payload, created_at, updated_at";

/// Columns of a `records` row, in `SELECT_COLUMNS` order.
pub(crate) type RawRecord = (String, i64, String, i64, i64);

pub(crate) fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

pub(crate) fn decode_record(raw: RawRecord) -> StoreResult<StoredRecord> {
    let (id, version, payload, created_at, updated_at) = raw;
    Ok(StoredRecord {
        id: RecordId::parse(&id)?,
        version: from_sql_int(version, "version")?,
        payload: serde_json::from_str(&payload)?,
        created_at: Timestamp::from_millis(from_sql_int(created_at, "created_at")?),
        updated_at: Timestamp::from_millis(from_sql_int(updated_at, "updated_at")?),
    })
}

/// Insert a brand-new record at version 1.
pub fn insert(tx: &Transaction<'_>, table: &str, record: &StoredRecord) -> StoreResult<()> {
    debug_assert_eq!(record.version, 1);
    tx.execute(
        "INSERT INTO records (table_name, id, version, payload, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            table,
            record.id.to_string(),
            to_sql_int(record.version, "version")?,
            serde_json::to_string(&record.payload)?,
            to_sql_int(record.created_at.as_millis(), "created_at")?,
            to_sql_int(record.updated_at.as_millis(), "updated_at")?,
        ],
    )?;
    Ok(())
}

/// Read the current row inside the transaction.
pub fn read(tx: &Transaction<'_>, table: &str, id: RecordId) -> StoreResult<Option<StoredRecord>> {
    let raw = tx
        .query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM records WHERE table_name = ?1 AND id = ?2"),
            params![table, id.to_string()],
            row_to_record,
        )
        .optional()?;
    raw.map(decode_record).transpose()
}

/// Read the row and check it is at `expected_version`.
pub fn read_expecting(
    tx: &Transaction<'_>,
    table: &str,
    id: RecordId,
    expected_version: u64,
) -> StoreResult<StoredRecord> {
    let current = read(tx, table, id)?.ok_or_else(|| StoreError::NotFound {
        table: table.to_string(),
        id,
    })?;
    if current.version != expected_version {
        return Err(conflict(table, id, expected_version, current.version));
    }
    Ok(current)
}

/// Conditionally replace the payload, advancing the version by one.
///
/// Returns the new version. An `expected_version` no stored row can hold
/// (past `i64::MAX`) is reported like any other stale version.
pub fn compare_and_swap(
    tx: &Transaction<'_>,
    table: &str,
    id: RecordId,
    expected_version: u64,
    payload: &Value,
    updated_at: Timestamp,
) -> StoreResult<u64> {
    let Ok(expected) = i64::try_from(expected_version) else {
        return Err(lost_race(tx, table, id, expected_version));
    };
    let next = expected.checked_add(1).ok_or_else(|| StoreError::VersionOverflow {
        table: table.to_string(),
        id,
    })?;
    let changed = tx.execute(
        "UPDATE records SET version = ?1, payload = ?2, updated_at = ?3
         WHERE table_name = ?4 AND id = ?5 AND version = ?6",
        params![
            next,
            serde_json::to_string(payload)?,
            to_sql_int(updated_at.as_millis(), "updated_at")?,
            table,
            id.to_string(),
            expected,
        ],
    )?;
    if changed == 0 {
        return Err(lost_race(tx, table, id, expected_version));
    }
    from_sql_int(next, "version")
}

/// Conditionally delete the row at `expected_version`.
pub fn compare_and_delete(
    tx: &Transaction<'_>,
    table: &str,
    id: RecordId,
    expected_version: u64,
) -> StoreResult<()> {
    let Ok(expected) = i64::try_from(expected_version) else {
        return Err(lost_race(tx, table, id, expected_version));
    };
    let changed = tx.execute(
        "DELETE FROM records WHERE table_name = ?1 AND id = ?2 AND version = ?3",
        params![table, id.to_string(), expected],
    )?;
    if changed == 0 {
        return Err(lost_race(tx, table, id, expected_version));
    }
    Ok(())
}

fn conflict(table: &str, id: RecordId, expected: u64, actual: u64) -> StoreError {
    OptimisticLockError {
        table: table.to_string(),
        id,
        expected,
        actual,
    }
    .into()
}

/// Work out why a conditional write touched nothing.
fn lost_race(tx: &Transaction<'_>, table: &str, id: RecordId, expected: u64) -> StoreError {
    match read(tx, table, id) {
        Ok(Some(current)) => conflict(table, id, expected, current.version),
        Ok(None) => StoreError::NotFound {
            table: table.to_string(),
            id,
        },
        Err(e) => e,
    }
}
