//! Error types for the record store.

use thiserror::Error;

use ordo_types::{AuditAction, GenerationError, InvalidIdentifierError, RecordId};

/// A compare-and-swap lost: the stored version moved past what the caller read.
///
/// Expected under contention. The caller re-reads and decides whether to retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("version conflict on {table}/{id}: expected {expected}, found {actual}")]
pub struct OptimisticLockError {
    pub table: String,
    pub id: RecordId,
    pub expected: u64,
    pub actual: u64,
}

/// Errors from store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("payload serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Identity could not be minted. Fatal for the mutation.
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("{table}/{id} not found")]
    NotFound { table: String, id: RecordId },

    #[error(transparent)]
    Conflict(#[from] OptimisticLockError),

    /// The record's version counter is at SQLite's integer limit.
    #[error("{table}/{id} cannot advance past version {max}", max = i64::MAX)]
    VersionOverflow { table: String, id: RecordId },

    #[error("{column} value {value} does not fit an SQLite integer")]
    OutOfRange { column: &'static str, value: u64 },

    /// The audit append failed; the enclosing mutation was rolled back.
    #[error("audit write failed, mutation rolled back: {0}")]
    AuditWrite(#[source] rusqlite::Error),

    /// Snapshots handed to the recorder don't match the action.
    #[error("audit snapshots do not match action {0}")]
    AuditShape(AuditAction),

    /// A stored row failed to decode.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error(transparent)]
    InvalidIdentifier(#[from] InvalidIdentifierError),
}

impl StoreError {
    /// True for the recoverable version-mismatch outcome.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }

    pub fn as_conflict(&self) -> Option<&OptimisticLockError> {
        match self {
            StoreError::Conflict(c) => Some(c),
            _ => None,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
