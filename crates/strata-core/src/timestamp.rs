//! Hybrid logical timestamps.
//!
//! The cluster's timestamp oracle issues 64-bit hybrid timestamps: the
//! physical wall-clock milliseconds occupy the high 46 bits and an 18-bit
//! logical counter disambiguates timestamps allocated within the same
//! millisecond. The physical component is recoverable, which lets control
//! planes convert oracle timestamps back into wall-clock durations for
//! timeout arithmetic.

use chrono::{DateTime, Utc};

/// A 64-bit hybrid logical timestamp issued by the timestamp oracle.
pub type Timestamp = u64;

/// Number of low bits reserved for the logical counter.
pub const LOGICAL_BITS: u32 = 18;

const LOGICAL_MASK: u64 = (1 << LOGICAL_BITS) - 1;

/// Composes a hybrid timestamp from a wall-clock instant and a logical
/// counter value.
///
/// Instants before the epoch clamp to physical time zero.
#[must_use]
pub fn compose_ts(physical: DateTime<Utc>, logical: u32) -> Timestamp {
    let millis = physical.timestamp_millis().max(0);
    #[allow(clippy::cast_sign_loss)] // clamped to non-negative above
    let millis = millis as u64;
    (millis << LOGICAL_BITS) | (u64::from(logical) & LOGICAL_MASK)
}

/// Composes a hybrid timestamp from the current wall clock with a zero
/// logical component.
#[must_use]
pub fn compose_now() -> Timestamp {
    compose_ts(Utc::now(), 0)
}

/// Splits a hybrid timestamp into its wall-clock instant and logical counter.
///
/// Physical components outside chrono's representable range collapse to the
/// epoch; in particular the low sentinel values used by control planes parse
/// to `1970-01-01T00:00:00Z`.
#[must_use]
pub fn parse_ts(ts: Timestamp) -> (DateTime<Utc>, u32) {
    let millis = ts >> LOGICAL_BITS;
    #[allow(clippy::cast_possible_truncation)] // masked to 18 bits
    let logical = (ts & LOGICAL_MASK) as u32;
    let physical = i64::try_from(millis)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or(DateTime::UNIX_EPOCH);
    (physical, logical)
}

/// Returns the wall-clock instant encoded in a hybrid timestamp.
#[must_use]
pub fn physical_time(ts: Timestamp) -> DateTime<Utc> {
    parse_ts(ts).0
}
