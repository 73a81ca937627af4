use chrono::{SecondsFormat, Utc};

/// Milliseconds since the Unix epoch; clamps to zero before 1970.
pub fn current_unix_timestamp_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default()
}

/// Seconds since the Unix epoch, as sent in OAuth `oauth_timestamp`.
pub fn current_unix_timestamp() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or_default()
}

/// Returns the current UTC time as `YYYY-MM-DDTHH:MM:SSZ`, the shape GitHub
/// expects for `last_read_at`.
pub fn current_rfc3339_utc() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
