//! Recovering creation time from a UUIDv7.

use serde::{Deserialize, Serialize};

use crate::error::InvalidIdentifierError;

/// Milliseconds since the Unix epoch.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    pub const fn as_millis(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Read the 48-bit big-endian `unix_ts_ms` field.
///
/// Rejects anything whose version nibble is not 7; the leading bits of a v4
/// or nil UUID are not a time.
pub fn extract_timestamp(id: &uuid::Uuid) -> Result<Timestamp, InvalidIdentifierError> {
    let b = id.as_bytes();
    let version = b[6] >> 4;
    if version != 7 {
        return Err(InvalidIdentifierError::WrongVersion { id: *id, found: version });
    }

    let mut ms = [0u8; 8];
    ms[2..].copy_from_slice(&b[..6]);
    Ok(Timestamp(u64::from_be_bytes(ms)))
}

/// Parse canonical (or simple hex) text, then extract.
pub fn extract_timestamp_str(s: &str) -> Result<Timestamp, InvalidIdentifierError> {
    let id = uuid::Uuid::parse_str(s)?;
    extract_timestamp(&id)
}
