//! UUIDv7 construction.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                          unix_ts_ms                           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |          unix_ts_ms           |  ver  |        rand_a         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |var|                        rand_b                             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                            rand_b                             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Standard mode fills all of `rand_a` with randomness. Precise mode puts the
//! microsecond offset into the current millisecond (0..=999, 10 bits) in the
//! high bits of `rand_a` and keeps the low 2 bits random. That is a sampled
//! clock value, not a counter: two processes minting in the same millisecond
//! interleave arbitrarily, and even within one process the order is only
//! as good as the clock's microsecond resolution.

use std::str::FromStr;

use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::clock::{Clock, SystemClock};
use crate::error::GenerationError;

/// Largest value the 48-bit `unix_ts_ms` field can hold.
pub const MAX_TIMESTAMP_MS: u64 = (1 << 48) - 1;

/// Which flavor of `rand_a` to produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum IdMode {
    /// Millisecond timestamp, fully random `rand_a`. Normal write rates.
    #[default]
    Standard,
    /// Sub-millisecond offset in `rand_a`. Bulk creation.
    Precise,
}

impl IdMode {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IdMode::Standard => "standard",
            IdMode::Precise => "precise",
        }
    }
}

impl std::fmt::Display for IdMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Mints UUIDv7 values from a clock and the OS random source.
#[derive(Clone, Debug, Default)]
pub struct IdGenerator<C = SystemClock> {
    clock: C,
}

impl IdGenerator<SystemClock> {
    /// Generator backed by the system wall clock.
    pub fn system() -> Self {
        Self { clock: SystemClock }
    }
}

impl<C: Clock> IdGenerator<C> {
    pub fn with_clock(clock: C) -> Self {
        Self { clock }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Millisecond-precision identifier with a fully random `rand_a`.
    pub fn generate_standard(&self) -> Result<uuid::Uuid, GenerationError> {
        let ms = checked_millis(self.clock.now_millis()?)?;
        let mut random = [0u8; 10];
        OsRng.try_fill_bytes(&mut random)?;
        Ok(uuid::Uuid::from_bytes(encode(ms, None, random)))
    }

    /// Identifier whose `rand_a` high bits carry the microsecond offset.
    pub fn generate_precise(&self) -> Result<uuid::Uuid, GenerationError> {
        let now = self.clock.now()?;
        let ms = checked_millis(now.as_millis() as u64)?;
        let sub_ms = (now.subsec_micros() % 1000) as u16;
        let mut random = [0u8; 10];
        OsRng.try_fill_bytes(&mut random)?;
        Ok(uuid::Uuid::from_bytes(encode(ms, Some(sub_ms), random)))
    }

    pub fn generate(&self, mode: IdMode) -> Result<uuid::Uuid, GenerationError> {
        match mode {
            IdMode::Standard => self.generate_standard(),
            IdMode::Precise => self.generate_precise(),
        }
    }
}

/// [`IdGenerator::generate_standard`] on the system clock.
pub fn generate_standard() -> Result<uuid::Uuid, GenerationError> {
    IdGenerator::system().generate_standard()
}

/// [`IdGenerator::generate_precise`] on the system clock.
pub fn generate_precise() -> Result<uuid::Uuid, GenerationError> {
    IdGenerator::system().generate_precise()
}

fn checked_millis(ms: u64) -> Result<u64, GenerationError> {
    if ms > MAX_TIMESTAMP_MS {
        return Err(GenerationError::ClockOverflow(ms));
    }
    Ok(ms)
}

/// Lay out the 16 bytes: timestamp, random tail, optional sub-ms offset,
/// then the fixed version and variant bits.
pub(crate) fn encode(unix_ts_ms: u64, sub_ms: Option<u16>, random: [u8; 10]) -> [u8; 16] {
    let mut bytes = [0u8; 16];
    bytes[..6].copy_from_slice(&unix_ts_ms.to_be_bytes()[2..]);
    bytes[6..].copy_from_slice(&random);

    if let Some(micros) = sub_ms {
        // 10-bit offset above 2 random bits fills the 12-bit rand_a
        let rand_a = (micros.min(999) << 2) | (u16::from(bytes[7]) & 0b11);
        bytes[6] = (rand_a >> 8) as u8;
        bytes[7] = rand_a as u8;
    }

    bytes[6] = (bytes[6] & 0x0f) | 0x70;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    bytes
}

/// Recover the sub-millisecond offset a precise-mode identifier carries.
///
/// Meaningless for standard-mode identifiers (it reads random bits).
pub fn precise_offset_micros(id: &uuid::Uuid) -> u16 {
    let b = id.as_bytes();
    let rand_a = (u16::from(b[6] & 0x0f) << 8) | u16::from(b[7]);
    rand_a >> 2
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::clock::FixedClock;

    #[test]
    fn test_encode_layout() {
        let bytes = encode(0x0123_4567_89ab, None, [0xff; 10]);
        assert_eq!(&bytes[..6], &[0x01, 0x23, 0x45, 0x67, 0x89, 0xab]);
        assert_eq!(bytes[6] >> 4, 0b0111);
        assert_eq!(bytes[8] >> 6, 0b10);
        // untouched random bits survive
        assert_eq!(bytes[6] & 0x0f, 0x0f);
        assert_eq!(bytes[8] & 0x3f, 0x3f);
        assert_eq!(&bytes[9..], &[0xff; 7]);
    }

    #[test]
    fn test_encode_clears_random_bits_under_fixed_fields() {
        let bytes = encode(0, None, [0x00; 10]);
        assert_eq!(bytes[6], 0x70);
        assert_eq!(bytes[8], 0x80);
    }

    #[test]
    fn test_uuid_crate_agrees_on_version_and_variant() {
        let id = IdGenerator::system().generate_standard().unwrap();
        assert_eq!(id.get_version_num(), 7);
        assert_eq!(id.get_variant(), uuid::Variant::RFC4122);

        let id = IdGenerator::system().generate_precise().unwrap();
        assert_eq!(id.get_version_num(), 7);
        assert_eq!(id.get_variant(), uuid::Variant::RFC4122);
    }

    #[test]
    fn test_precise_offset_is_recoverable() {
        // 1700000000000 ms + 437 us
        let clock = FixedClock::from_micros(1_700_000_000_000_437);
        let id = IdGenerator::with_clock(clock).generate_precise().unwrap();
        assert_eq!(precise_offset_micros(&id), 437);
        assert_eq!(id.get_version_num(), 7);
    }

    #[test]
    fn test_precise_orders_within_one_millisecond() {
        let early = IdGenerator::with_clock(FixedClock::from_micros(1_700_000_000_000_100))
            .generate_precise()
            .unwrap();
        let late = IdGenerator::with_clock(FixedClock::from_micros(1_700_000_000_000_900))
            .generate_precise()
            .unwrap();
        assert!(early < late);
    }

    #[test]
    fn test_precise_max_offset_fits_rand_a() {
        let clock = FixedClock::from_micros(1_700_000_000_000_999);
        let id = IdGenerator::with_clock(clock).generate_precise().unwrap();
        assert_eq!(precise_offset_micros(&id), 999);
        assert_eq!(id.as_bytes()[6] >> 4, 0b0111);
    }

    #[test]
    fn test_timestamp_overflow_is_rejected() {
        let clock = FixedClock::from_millis(MAX_TIMESTAMP_MS + 1);
        let err = IdGenerator::with_clock(clock).generate_standard().unwrap_err();
        assert!(matches!(err, GenerationError::ClockOverflow(_)));
    }

    #[test]
    fn test_max_timestamp_is_accepted() {
        let clock = FixedClock::from_millis(MAX_TIMESTAMP_MS);
        let id = IdGenerator::with_clock(clock).generate_standard().unwrap();
        assert_eq!(&id.as_bytes()[..6], &[0xff; 6]);
    }

    #[test]
    fn test_same_millisecond_ids_are_unique() {
        let generator = IdGenerator::with_clock(FixedClock::from_millis(1_700_000_000_000));
        let ids: HashSet<_> = (0..1000)
            .map(|_| generator.generate_standard().unwrap())
            .collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!(IdMode::from_str("precise"), Some(IdMode::Precise));
        assert_eq!(IdMode::from_str("STANDARD"), Some(IdMode::Standard));
        assert_eq!(IdMode::from_str("counter"), None);
        assert_eq!(IdMode::default(), IdMode::Standard);
    }
}
