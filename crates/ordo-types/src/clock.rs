//! Wall-clock seam for identifier generation and audit timestamps.
//!
//! The generator assumes a roughly monotonic clock. Backward jumps are not
//! corrected: identifiers minted after a jump sort before ones minted just
//! prior to it, so ordering is correct only up to clock skew.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::GenerationError;

/// A source of "now" as a duration since the Unix epoch.
pub trait Clock: Send + Sync {
    /// Current time since the Unix epoch.
    fn now(&self) -> Result<Duration, GenerationError>;

    /// Current time truncated to whole milliseconds.
    fn now_millis(&self) -> Result<u64, GenerationError> {
        Ok(self.now()?.as_millis() as u64)
    }
}

/// The operating system wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Result<Duration, GenerationError> {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| GenerationError::ClockBeforeEpoch)
    }
}

/// A clock pinned to one instant. Used in tests and replays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedClock(Duration);

impl FixedClock {
    pub fn from_millis(ms: u64) -> Self {
        Self(Duration::from_millis(ms))
    }

    pub fn from_micros(us: u64) -> Self {
        Self(Duration::from_micros(us))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Result<Duration, GenerationError> {
        Ok(self.0)
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now(&self) -> Result<Duration, GenerationError> {
        (**self).now()
    }
}
