//! Time and timestamp utilities

use chrono::Utc;

/// Current Unix timestamp in seconds
pub fn current_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Client timestamp corrected by the offset learned from the collector
pub fn adjusted_timestamp(server_offset: i64) -> i64 {
    current_timestamp() + server_offset
}

/// Offset to add to local time so it matches the collector's clock.
///
/// Offsets under ten seconds are treated as clock noise and ignored.
pub fn server_time_offset(server_ts: i64, local_ts: i64) -> i64 {
    let offset = server_ts - local_ts;
    if offset.abs() < 10 {
        0
    } else {
        offset
    }
}
