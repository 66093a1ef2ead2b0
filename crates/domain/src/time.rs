//! Time and timestamp helpers.

use chrono::{DateTime, Utc};

/// UTC timestamp used for motion tracking, command stamps, and registry writes.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Render a timestamp as fractional unix seconds (`"1721561234.123456"`),
/// the format used in the SenML `t` field.
#[must_use]
pub fn unix_seconds(ts: Timestamp) -> String {
    format!("{}.{:06}", ts.timestamp(), ts.timestamp_subsec_micros())
}

/// Render a timestamp the way the registry stores `lastUpdate`.
#[must_use]
pub fn registry_stamp(ts: Timestamp) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}
