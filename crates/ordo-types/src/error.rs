//! Error types for identifier generation and decoding.

use thiserror::Error;

/// The clock or entropy source could not produce an identifier.
///
/// Fatal for the caller's operation. Nothing in this crate retries.
#[derive(Error, Debug)]
pub enum GenerationError {
    /// System time reads as earlier than 1970-01-01.
    #[error("system clock reads before the Unix epoch")]
    ClockBeforeEpoch,

    /// The millisecond timestamp does not fit in the 48-bit field.
    #[error("timestamp {0}ms does not fit in 48 bits")]
    ClockOverflow(u64),

    /// The OS random source failed.
    #[error("entropy source unavailable: {0}")]
    Entropy(#[from] rand::Error),
}

/// An identifier could not be decoded as a UUIDv7.
#[derive(Error, Debug)]
pub enum InvalidIdentifierError {
    /// Version nibble is something other than 7.
    #[error("identifier {id} is version {found}, expected 7")]
    WrongVersion { id: uuid::Uuid, found: u8 },

    /// Text did not parse as a UUID at all.
    #[error("malformed identifier: {0}")]
    Malformed(#[from] uuid::Error),
}
