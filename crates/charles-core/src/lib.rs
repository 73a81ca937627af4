//! Foundational low-level utilities shared across Charles crates.
//!
//! Provides time helpers used for log lines and notification checkpoints, and
//! a size-rotated NDJSON appender used by the action ledger.

pub mod log_rotation;
pub mod time_utils;

pub use log_rotation::{append_line_with_rotation, LogRotationPolicy};
pub use time_utils::{current_rfc3339_utc, current_unix_timestamp, current_unix_timestamp_ms};
