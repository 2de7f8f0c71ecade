//! Time bucket helpers
//!
//! Time buckets are timestamps coarsened to a fixed granularity and encoded as
//! decimal integers, e.g. minute bucket `202401011230` for 2024-01-01 12:30 UTC.

use chrono::{DateTime, Datelike, Timelike, Utc};

/// Convert milliseconds since Unix epoch to DateTime<Utc>
pub fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_else(|| {
        tracing::warn!(millis, "Invalid timestamp, using epoch");
        DateTime::UNIX_EPOCH
    })
}

/// Minute bucket (`yyyyMMddHHmm`) for an epoch-millis timestamp
pub fn minute_time_bucket(millis: i64) -> i64 {
    let dt = millis_to_datetime(millis);
    i64::from(dt.year()) * 100_000_000
        + i64::from(dt.month()) * 1_000_000
        + i64::from(dt.day()) * 10_000
        + i64::from(dt.hour()) * 100
        + i64::from(dt.minute())
}
