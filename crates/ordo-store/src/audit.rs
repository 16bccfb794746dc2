//! Append-only audit capture.
//!
//! [`AuditRecorder::record`] writes through the same transaction as the
//! mutation it describes. An insert failure surfaces as
//! [`StoreError::AuditWrite`] and the caller drops the transaction, so the
//! mutation and its entry land together or not at all.

use std::sync::Arc;

use rusqlite::{Connection, OptionalExtension, Transaction, params};
use serde_json::Value;

use ordo_types::{
    AuditAction, AuditContext, AuditEntry, AuditId, Clock, IdGenerator, IdMode, RecordId,
    Timestamp, changed_fields,
};

use crate::db::{from_sql_int, to_sql_int};
use crate::error::{StoreError, StoreResult};

/// One mutation to record. Snapshots must match `action`.
#[derive(Clone, Debug)]
pub struct AuditEvent<'a> {
    pub action: AuditAction,
    pub table_name: &'a str,
    pub record_id: RecordId,
    pub old_state: Option<Value>,
    pub new_state: Option<Value>,
}

/// Mints entry identities and appends entries.
pub struct AuditRecorder {
    generator: IdGenerator<Arc<dyn Clock>>,
    mode: IdMode,
}

impl AuditRecorder {
    pub fn new(clock: Arc<dyn Clock>, mode: IdMode) -> Self {
        Self {
            generator: IdGenerator::with_clock(clock),
            mode,
        }
    }

    /// Append the entry for one mutation. Never updates existing rows.
    ///
    /// `changed_at` never goes backwards for a record: if the clock has
    /// stepped back since the last entry, the previous time is reused.
    pub fn record(
        &self,
        tx: &Transaction<'_>,
        event: AuditEvent<'_>,
        ctx: &AuditContext,
    ) -> StoreResult<AuditId> {
        if !event.action.accepts(event.old_state.as_ref(), event.new_state.as_ref()) {
            return Err(StoreError::AuditShape(event.action));
        }

        let id = AuditId::generate(&self.generator, self.mode)?;
        let now = self.generator.clock().now_millis()?;
        let last: Option<i64> = tx
            .query_row(
                "SELECT changed_at FROM audit_log WHERE record_id = ?1 ORDER BY seq DESC LIMIT 1",
                params![event.record_id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::AuditWrite)?;
        let changed_at = match last {
            Some(prev) => now.max(from_sql_int(prev, "changed_at")?),
            None => now,
        };

        let fields = match (&event.action, &event.old_state, &event.new_state) {
            (AuditAction::Updated, Some(old), Some(new)) => Some(payload_changes(old, new)),
            _ => None,
        };

        tx.execute(
            "INSERT INTO audit_log (
                id, table_name, record_id, action, old_data, new_data,
                changed_fields, changed_by, changed_at, ip_address, user_agent
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                id.to_string(),
                event.table_name,
                event.record_id.to_string(),
                event.action.as_str(),
                event.old_state.as_ref().map(Value::to_string),
                event.new_state.as_ref().map(Value::to_string),
                fields.as_ref().map(|f| Value::from(f.clone()).to_string()),
                ctx.actor,
                to_sql_int(changed_at, "changed_at")?,
                ctx.ip_address,
                ctx.user_agent,
            ],
        )
        .map_err(StoreError::AuditWrite)?;

        tracing::debug!(
            audit_id = %id,
            table = event.table_name,
            record_id = %event.record_id,
            action = %event.action,
            actor = %ctx.actor,
            "audit entry appended"
        );
        Ok(id)
    }
}

/// Changed fields between two record snapshots, compared on the payload.
///
/// `version` and `updated_at` change on every update, so they are left out.
fn payload_changes(old: &Value, new: &Value) -> Vec<String> {
    match (old.get("payload"), new.get("payload")) {
        (Some(a), Some(b)) => changed_fields(a, b),
        _ => changed_fields(old, new),
    }
}

// ============================================================================
// Read side
// ============================================================================

const ENTRY_COLUMNS: &str = "id, table_name, record_id, action, old_data, new_data, \
    changed_fields, changed_by, changed_at, ip_address, user_agent";

struct EntryRow {
    id: String,
    table_name: String,
    record_id: String,
    action: String,
    old_data: Option<String>,
    new_data: Option<String>,
    changed_fields: Option<String>,
    changed_by: String,
    changed_at: i64,
    ip_address: Option<String>,
    user_agent: Option<String>,
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntryRow> {
    Ok(EntryRow {
        id: row.get(0)?,
        table_name: row.get(1)?,
        record_id: row.get(2)?,
        action: row.get(3)?,
        old_data: row.get(4)?,
        new_data: row.get(5)?,
        changed_fields: row.get(6)?,
        changed_by: row.get(7)?,
        changed_at: row.get(8)?,
        ip_address: row.get(9)?,
        user_agent: row.get(10)?,
    })
}

fn decode(row: EntryRow) -> StoreResult<AuditEntry> {
    let action = AuditAction::from_str(&row.action)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown audit action {:?}", row.action)))?;
    let json = |s: Option<String>| -> StoreResult<Option<Value>> {
        s.map(|s| serde_json::from_str(&s)).transpose().map_err(Into::into)
    };
    let changed_fields = row
        .changed_fields
        .map(|s| serde_json::from_str::<Vec<String>>(&s))
        .transpose()?;

    Ok(AuditEntry {
        id: AuditId::parse(&row.id)?,
        table_name: row.table_name,
        record_id: RecordId::parse(&row.record_id)?,
        action,
        old_data: json(row.old_data)?,
        new_data: json(row.new_data)?,
        changed_fields,
        changed_by: row.changed_by,
        changed_at: Timestamp::from_millis(from_sql_int(row.changed_at, "changed_at")?),
        ip_address: row.ip_address,
        user_agent: row.user_agent,
    })
}

/// Every entry for one record, in mutation order.
pub fn history(conn: &Connection, record_id: RecordId) -> StoreResult<Vec<AuditEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENTRY_COLUMNS} FROM audit_log WHERE record_id = ?1 ORDER BY seq"
    ))?;
    let rows = stmt.query_map(params![record_id.to_string()], map_row)?;
    rows.map(|r| decode(r?)).collect()
}

/// Entries for a table at or after `since`, in insertion order.
pub fn table_history(
    conn: &Connection,
    table: &str,
    since: Option<Timestamp>,
) -> StoreResult<Vec<AuditEntry>> {
    let since = since.map_or(Ok(0), |t| to_sql_int(t.as_millis(), "changed_at"))?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENTRY_COLUMNS} FROM audit_log
         WHERE table_name = ?1 AND changed_at >= ?2 ORDER BY seq"
    ))?;
    let rows = stmt.query_map(params![table, since], map_row)?;
    rows.map(|r| decode(r?)).collect()
}
