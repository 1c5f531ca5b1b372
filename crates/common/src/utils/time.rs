use std::time::{SystemTime, UNIX_EPOCH};

/// Current Unix timestamp in seconds
pub fn current_timestamp_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Expiry timestamp `duration_secs` from now (negative values lie in the past)
pub fn calculate_expiry(duration_secs: i64) -> i64 {
    current_timestamp_secs() + duration_secs
}
