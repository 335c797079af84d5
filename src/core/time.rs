//! Shared timestamp helpers for rows, envelopes and audit events.

use chrono::{SecondsFormat, Utc};
use std::time::Instant;
use ulid::Ulid;

/// Current wall-clock time as fractional unix-epoch seconds.
///
/// Rows store timestamps in this form so that exports carry them verbatim.
pub fn now_epoch() -> f64 {
    let now = Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1_000_000.0
}

/// Current UTC time as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn new_event_id() -> String {
    Ulid::new().to_string()
}

/// Milliseconds elapsed since `started`, rounded to two decimals.
pub fn elapsed_ms(started: Instant) -> f64 {
    let ms = started.elapsed().as_secs_f64() * 1000.0;
    (ms * 100.0).round() / 100.0
}

/// Accept an imported timestamp when it is a finite, non-negative number.
pub fn epoch_or_now(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() && v >= 0.0 => v,
        _ => now_epoch(),
    }
}
