//! The composed mutation API.
//!
//! Every write goes through one immediate-mode SQLite transaction that does
//! three things in order: compare-and-swap on the record's version, write the
//! payload, append the audit entry. If any step fails the transaction is
//! dropped without commit, which rolls it back, and nothing is visible.
//!
//! # Concurrency Model
//!
//! - One `Connection` per `Store`, behind a parking_lot mutex
//! - `BEGIN IMMEDIATE` takes the write lock up front, so two stores (or
//!   processes) on the same file serialize their writes and the loser of a
//!   race sees the winner's version
//! - No retries: a stale `expected_version` comes back as
//!   [`StoreError::Conflict`]

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{Connection, TransactionBehavior, params};
use serde::Serialize;
use serde::de::DeserializeOwned;

use ordo_types::{
    AuditAction, AuditContext, AuditEntry, Clock, IdGenerator, RecordId, SystemClock, Timestamp,
};

use crate::audit::{self, AuditEvent, AuditRecorder};
use crate::config::StoreConfig;
use crate::db::{open_connection, open_read_only};
use crate::error::{StoreError, StoreResult};
use crate::versioned::{
    self, SELECT_COLUMNS, StoredRecord, VersionedEntity, decode_record, row_to_record,
};

/// Versioned, audited record storage on SQLite.
pub struct Store {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
    generator: IdGenerator<Arc<dyn Clock>>,
    recorder: AuditRecorder,
    config: StoreConfig,
}

impl Store {
    /// Open or create a database at the given path with default settings.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        Self::from_config(StoreConfig::at(path.as_ref()))
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> StoreResult<Self> {
        Self::from_config(StoreConfig::in_memory())
    }

    pub fn from_config(config: StoreConfig) -> StoreResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Use `clock` for identities and timestamps instead of the system clock.
    pub fn with_clock(config: StoreConfig, clock: Arc<dyn Clock>) -> StoreResult<Self> {
        let conn = open_connection(&config)?;
        Ok(Self::assemble(conn, config, clock))
    }

    /// Open an existing database for reads only.
    ///
    /// Fails instead of creating a file when `config.database` does not exist
    /// or holds no ordo schema. Mutations on the result fail.
    pub fn open_read_only(config: StoreConfig) -> StoreResult<Self> {
        let conn = open_read_only(&config)?;
        Ok(Self::assemble(conn, config, Arc::new(SystemClock)))
    }

    fn assemble(conn: Connection, config: StoreConfig, clock: Arc<dyn Clock>) -> Self {
        tracing::info!(
            database = %config.database.display(),
            id_mode = %config.id_mode,
            "record store opened"
        );
        Self {
            conn: Mutex::new(conn),
            generator: IdGenerator::with_clock(clock.clone()),
            recorder: AuditRecorder::new(clock.clone(), config.id_mode),
            clock,
            config,
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Insert `payload` as a new record at version 1, with its CREATED entry.
    pub fn create<T>(
        &self,
        table: &str,
        payload: T,
        ctx: &AuditContext,
    ) -> StoreResult<VersionedEntity<T>>
    where
        T: Serialize,
    {
        let id = RecordId::generate(&self.generator, self.config.id_mode)?;
        let now = Timestamp::from_millis(self.clock.now_millis()?);
        let record = StoredRecord {
            id,
            version: 1,
            created_at: now,
            updated_at: now,
            payload: serde_json::to_value(&payload)?,
        };

        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        versioned::insert(&tx, table, &record)?;
        self.recorder.record(
            &tx,
            AuditEvent {
                action: AuditAction::Created,
                table_name: table,
                record_id: id,
                old_state: None,
                new_state: Some(record.snapshot()?),
            },
            ctx,
        )?;
        tx.commit()?;

        tracing::debug!(table, id = %id, actor = %ctx.actor, "record created");
        Ok(VersionedEntity {
            id,
            version: 1,
            created_at: now,
            updated_at: now,
            payload,
        })
    }

    /// Apply `mutator` if the record is still at `expected_version`.
    ///
    /// On a version mismatch the mutator never runs and nothing is written.
    pub fn update<T, F>(
        &self,
        table: &str,
        id: RecordId,
        expected_version: u64,
        mutator: F,
        ctx: &AuditContext,
    ) -> StoreResult<VersionedEntity<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut T),
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = versioned::read_expecting(&tx, table, id, expected_version)
            .inspect_err(|e| log_rejected(table, id, e))?;
        let old_state = current.snapshot()?;
        let mut entity: VersionedEntity<T> = current.into_entity()?;

        mutator(&mut entity.payload);
        let payload = serde_json::to_value(&entity.payload)?;
        let now = Timestamp::from_millis(self.clock.now_millis()?);

        let version = versioned::compare_and_swap(&tx, table, id, expected_version, &payload, now)?;
        entity.version = version;
        entity.updated_at = now;

        let new_state = StoredRecord {
            id,
            version,
            created_at: entity.created_at,
            updated_at: now,
            payload,
        }
        .snapshot()?;
        self.recorder
            .record(
                &tx,
                AuditEvent {
                    action: AuditAction::Updated,
                    table_name: table,
                    record_id: id,
                    old_state: Some(old_state),
                    new_state: Some(new_state),
                },
                ctx,
            )
            .inspect_err(|e| tracing::warn!(table, id = %id, error = %e, "update rolled back"))?;
        tx.commit()?;

        tracing::debug!(table, id = %id, version, actor = %ctx.actor, "record updated");
        Ok(entity)
    }

    /// Remove the record if it is still at `expected_version`.
    ///
    /// Returns the final state, which is also the DELETED entry's old_data.
    pub fn delete(
        &self,
        table: &str,
        id: RecordId,
        expected_version: u64,
        ctx: &AuditContext,
    ) -> StoreResult<StoredRecord> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = versioned::read_expecting(&tx, table, id, expected_version)
            .inspect_err(|e| log_rejected(table, id, e))?;
        versioned::compare_and_delete(&tx, table, id, expected_version)?;
        self.recorder
            .record(
                &tx,
                AuditEvent {
                    action: AuditAction::Deleted,
                    table_name: table,
                    record_id: id,
                    old_state: Some(current.snapshot()?),
                    new_state: None,
                },
                ctx,
            )
            .inspect_err(|e| tracing::warn!(table, id = %id, error = %e, "delete rolled back"))?;
        tx.commit()?;

        tracing::debug!(table, id = %id, actor = %ctx.actor, "record deleted");
        Ok(current)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn get<T: DeserializeOwned>(
        &self,
        table: &str,
        id: RecordId,
    ) -> StoreResult<Option<VersionedEntity<T>>> {
        self.get_raw(table, id)?.map(StoredRecord::into_entity).transpose()
    }

    pub fn get_raw(&self, table: &str, id: RecordId) -> StoreResult<Option<StoredRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM records WHERE table_name = ?1 AND id = ?2"
        ))?;
        let mut rows = stmt.query_map(params![table, id.to_string()], row_to_record)?;
        match rows.next() {
            Some(raw) => Ok(Some(decode_record(raw?)?)),
            None => Ok(None),
        }
    }

    /// Up to `limit` records with IDs after `after`, in ID order.
    ///
    /// ID order tracks creation time, so this is a creation-time cursor.
    pub fn list_page<T: DeserializeOwned>(
        &self,
        table: &str,
        after: Option<RecordId>,
        limit: usize,
    ) -> StoreResult<Vec<VersionedEntity<T>>> {
        // canonical lowercase hex compares in the same order as the raw bytes
        let cursor = after.map(|id| id.to_string()).unwrap_or_default();
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM records
             WHERE table_name = ?1 AND id > ?2 ORDER BY id LIMIT ?3"
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![table, cursor, limit], row_to_record)?;
        rows.map(|raw| decode_record(raw?)?.into_entity()).collect()
    }

    /// Audit entries for one record, in mutation order.
    pub fn history(&self, record_id: RecordId) -> StoreResult<Vec<AuditEntry>> {
        audit::history(&self.conn.lock(), record_id)
    }

    pub fn table_history(
        &self,
        table: &str,
        since: Option<Timestamp>,
    ) -> StoreResult<Vec<AuditEntry>> {
        audit::table_history(&self.conn.lock(), table, since)
    }
}

fn log_rejected(table: &str, id: RecordId, err: &StoreError) {
    match err {
        StoreError::Conflict(c) => tracing::warn!(
            table,
            id = %id,
            expected = c.expected,
            actual = c.actual,
            "stale version, write rejected"
        ),
        other => tracing::debug!(table, id = %id, error = %other, "write rejected"),
    }
}
