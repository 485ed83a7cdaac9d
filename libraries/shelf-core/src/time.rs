//! Timestamp utilities
//!
//! Every timestamp Shelf persists is stored as microseconds since the Unix
//! epoch. Filesystem mtimes carry nanoseconds on most platforms, so values are
//! truncated to microseconds before they are compared against stored ones.

use chrono::{DateTime, Utc};
use std::time::SystemTime;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    truncate_to_micros(Utc::now())
}

/// Microseconds since the Unix epoch
pub fn to_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

/// Inverse of [`to_micros`]; `None` when out of chrono's range
pub fn from_micros(micros: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
}

/// Drop sub-microsecond precision
pub fn truncate_to_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    from_micros(to_micros(ts)).unwrap_or(ts)
}

/// Convert a filesystem timestamp, truncated to microseconds
pub fn from_system_time(ts: SystemTime) -> DateTime<Utc> {
    truncate_to_micros(DateTime::<Utc>::from(ts))
}

/// The Unix epoch, used as the watermark of an empty store
pub fn epoch() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH
}
