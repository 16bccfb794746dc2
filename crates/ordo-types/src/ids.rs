//! Typed identifiers for records and audit entries.
//!
//! Both wrap a UUIDv7 minted by [`IdGenerator`]. They display as canonical
//! lowercase hyphenated UUID text, which is also the form stored in the
//! database. The `short()` form (first 8 hex chars) is for log lines only,
//! never a lookup key.
//!
//! Raw 128-bit ordering of two IDs follows their embedded millisecond
//! timestamps, so `Ord` doubles as "created before" for IDs minted at least a
//! millisecond apart.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::{GenerationError, InvalidIdentifierError};
use crate::generator::{IdGenerator, IdMode};
use crate::timestamp::{Timestamp, extract_timestamp};

/// Identity of a versioned entity row.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(uuid::Uuid);

/// Identity of one audit log entry.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditId(uuid::Uuid);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_typed_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Mint a fresh ID in the given mode.
            pub fn generate<C: Clock>(
                generator: &IdGenerator<C>,
                mode: IdMode,
            ) -> Result<Self, GenerationError> {
                generator.generate(mode).map(Self)
            }

            /// When this ID was minted, per its embedded timestamp.
            pub fn timestamp(&self) -> Result<Timestamp, InvalidIdentifierError> {
                extract_timestamp(&self.0)
            }

            /// First 8 hex characters, which is the leading slice of the timestamp.
            pub fn short(&self) -> String {
                self.0.as_simple().to_string()[..8].to_string()
            }

            /// Full 32-character hex string (no hyphens).
            pub fn to_hex(&self) -> String {
                self.0.as_simple().to_string()
            }

            pub fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }

            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }

            pub fn from_bytes(b: [u8; 16]) -> Self {
                Self(uuid::Uuid::from_bytes(b))
            }

            /// Try to reconstruct from a byte slice (must be exactly 16 bytes).
            pub fn try_from_slice(b: &[u8]) -> Option<Self> {
                <[u8; 16]>::try_from(b).ok().map(Self::from_bytes)
            }

            /// Parse canonical UUID text or 32-char hex.
            pub fn parse(s: &str) -> Result<Self, InvalidIdentifierError> {
                Ok(Self(uuid::Uuid::parse_str(s)?))
            }

            /// All-zero sentinel. Never minted by a generator.
            pub fn nil() -> Self {
                Self(uuid::Uuid::nil())
            }

            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }
        }

        impl From<uuid::Uuid> for $T {
            fn from(u: uuid::Uuid) -> Self {
                Self(u)
            }
        }

        impl From<$T> for uuid::Uuid {
            fn from(id: $T) -> uuid::Uuid {
                id.0
            }
        }

        impl std::str::FromStr for $T {
            type Err = InvalidIdentifierError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                // Canonical 8-4-4-4-12 lowercase form
                write!(f, "{}", self.0.as_hyphenated())
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.short())
            }
        }
    };
}

impl_typed_id!(RecordId, "RecordId");
impl_typed_id!(AuditId, "AuditId");

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::clock::FixedClock;

    fn record_id() -> RecordId {
        RecordId::generate(&IdGenerator::system(), IdMode::Standard).unwrap()
    }

    #[test]
    fn test_display_is_canonical_lowercase() {
        let id = record_id();
        let text = id.to_string();
        assert_eq!(text.len(), 36);
        let groups: Vec<usize> = text.split('-').map(str::len).collect();
        assert_eq!(groups, vec![8, 4, 4, 4, 12]);
        assert_eq!(text, text.to_lowercase());
        assert_eq!(&text[14..15], "7");
    }

    #[test]
    fn test_parse_roundtrip() {
        let id = record_id();
        assert_eq!(RecordId::parse(&id.to_string()).unwrap(), id);
        assert_eq!(RecordId::parse(&id.to_hex()).unwrap(), id);
        assert_eq!(id.to_string().parse::<RecordId>().unwrap(), id);
    }

    #[test]
    fn test_try_from_slice() {
        let id = record_id();
        assert_eq!(RecordId::try_from_slice(id.as_bytes()), Some(id));
        assert_eq!(RecordId::try_from_slice(&[0u8; 15]), None);
        assert_eq!(RecordId::try_from_slice(&[0u8; 17]), None);
    }

    #[test]
    fn test_debug_shows_type_and_short() {
        let id = record_id();
        let debug = format!("{:?}", id);
        assert_eq!(debug, format!("RecordId({})", id.short()));
        assert!(format!("{:?}", AuditId::nil()).starts_with("AuditId("));
    }

    #[test]
    fn test_serde_is_canonical_string() {
        let id = record_id();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        let parsed: RecordId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_timestamp_from_fixed_clock() {
        let generator = IdGenerator::with_clock(FixedClock::from_millis(1_700_000_000_000));
        let id = AuditId::generate(&generator, IdMode::Precise).unwrap();
        assert_eq!(id.timestamp().unwrap().as_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_nil_has_no_timestamp() {
        assert!(RecordId::nil().is_nil());
        assert!(RecordId::nil().timestamp().is_err());
    }

    #[test]
    fn test_ids_a_millisecond_apart_are_ordered() {
        let generator = IdGenerator::system();
        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(RecordId::generate(&generator, IdMode::Standard).unwrap());
            thread::sleep(Duration::from_millis(2));
        }
        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].timestamp().unwrap() <= pair[1].timestamp().unwrap());
        }
    }

    #[test]
    fn test_hundred_thousand_mixed_ids_are_unique() {
        let generator = IdGenerator::system();
        let mut seen = HashSet::with_capacity(100_000);
        for i in 0..100_000 {
            let mode = if i % 2 == 0 { IdMode::Standard } else { IdMode::Precise };
            assert!(seen.insert(RecordId::generate(&generator, mode).unwrap()));
        }
        assert_eq!(seen.len(), 100_000);
    }
}
