//! Identity and audit vocabulary for ordo.
//!
//! Leaf crate with no internal dependencies. Everything a data-access layer
//! needs to name a record and describe a change to it:
//!
//! | Type              | Purpose                                           |
//! |-------------------|---------------------------------------------------|
//! | [`IdGenerator`]   | Mints UUIDv7 values (standard / precise)          |
//! | [`RecordId`]      | Identity of a versioned entity                    |
//! | [`AuditId`]       | Identity of an audit entry                        |
//! | [`Timestamp`]     | Unix milliseconds, recovered from an ID           |
//! | [`Clock`]         | Wall-clock seam (system or fixed)                 |
//! | [`AuditEntry`]    | Immutable before/after record of one mutation     |
//! | [`AuditContext`]  | Actor identity plus request metadata              |

pub mod audit;
pub mod clock;
pub mod error;
pub mod generator;
pub mod ids;
pub mod timestamp;

pub use audit::{AuditAction, AuditContext, AuditEntry, changed_fields};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{GenerationError, InvalidIdentifierError};
pub use generator::{
    IdGenerator, IdMode, MAX_TIMESTAMP_MS, generate_precise, generate_standard,
    precise_offset_micros,
};
pub use ids::{AuditId, RecordId};
pub use timestamp::{Timestamp, extract_timestamp, extract_timestamp_str};
