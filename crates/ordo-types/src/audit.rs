//! Audit log vocabulary.
//!
//! An [`AuditEntry`] is an immutable before/after record of one mutation.
//! The snapshot pattern is fixed per action:
//!
//! | action  | old_data | new_data |
//! |---------|----------|----------|
//! | CREATED | absent   | present  |
//! | UPDATED | present  | present  |
//! | DELETED | present  | absent   |

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::EnumString;

use crate::ids::{AuditId, RecordId};
use crate::timestamp::Timestamp;

/// Kind of mutation an audit entry describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(ascii_case_insensitive)]
pub enum AuditAction {
    #[strum(serialize = "CREATED", serialize = "INSERT")]
    Created,
    #[strum(serialize = "UPDATED", serialize = "UPDATE")]
    Updated,
    #[strum(serialize = "DELETED", serialize = "DELETE")]
    Deleted,
}

impl AuditAction {
    /// Parse from string (case-insensitive). Accepts SQL verbs as aliases.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Created => "CREATED",
            AuditAction::Updated => "UPDATED",
            AuditAction::Deleted => "DELETED",
        }
    }

    /// Whether (old_data, new_data) must be present for this action.
    pub fn snapshot_shape(&self) -> (bool, bool) {
        match self {
            AuditAction::Created => (false, true),
            AuditAction::Updated => (true, true),
            AuditAction::Deleted => (true, false),
        }
    }

    /// Check a pair of snapshots against [`Self::snapshot_shape`].
    pub fn accepts(&self, old: Option<&Value>, new: Option<&Value>) -> bool {
        self.snapshot_shape() == (old.is_some(), new.is_some())
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Who is making a change, and from where.
///
/// Supplied by the application layer on every mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub actor: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl AuditContext {
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn with_ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn with_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }
}

/// One row of the audit log, as persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditId,
    pub table_name: String,
    pub record_id: RecordId,
    pub action: AuditAction,
    pub old_data: Option<Value>,
    pub new_data: Option<Value>,
    /// Top-level fields that differ; only set for UPDATED.
    pub changed_fields: Option<Vec<String>>,
    pub changed_by: String,
    pub changed_at: Timestamp,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Top-level keys whose values differ between two object snapshots.
///
/// Keys present on only one side count as changed. Non-object snapshots have
/// no fields; they yield `["$"]` if unequal, empty otherwise.
pub fn changed_fields(old: &Value, new: &Value) -> Vec<String> {
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => {
            let keys: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
            keys.into_iter()
                .filter(|k| a.get(*k) != b.get(*k))
                .cloned()
                .collect()
        }
        _ if old != new => vec!["$".to_string()],
        _ => Vec::new(),
    }
}
