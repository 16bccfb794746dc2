//! # ordo-store
//!
//! Versioned records with transactional audit capture, on SQLite.
//!
//! A mutation is one explicit call, not a side effect of a write:
//!
//! ```text
//! create  → mint RecordId → insert @ v1           → append CREATED ┐
//! update  → check version → CAS payload, v+1      → append UPDATED ├ one transaction
//! delete  → check version → conditional delete    → append DELETED ┘
//! ```
//!
//! Stale versions come back as [`StoreError::Conflict`]; callers re-read and
//! decide whether to retry. A failed audit append rolls back the mutation.

pub mod audit;
pub mod config;
mod db;
pub mod error;
pub mod store;
pub mod versioned;

pub use audit::{AuditEvent, AuditRecorder};
pub use config::{ConfigError, StoreConfig};
pub use error::{OptimisticLockError, StoreError, StoreResult};
pub use store::Store;
pub use versioned::{StoredRecord, VersionedEntity};
