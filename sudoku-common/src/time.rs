//! Time parsing helpers
//!
//! Two non-standard textual formats enter the system: the solve time printed
//! by the puzzle app (`MM:SS`) and the EXIF-style capture timestamp Drive
//! reports for images (`YYYY:MM:DD HH:MM:SS`).

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

use crate::error::ValidationError;

/// Literal format Drive uses for `imageMediaMetadata.time`
pub const EXIF_TIMESTAMP_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Parse a `MM:SS` solve time into whole seconds.
///
/// Minutes are unbounded (a slow solve reads `75:02`). Both components must be
/// non-empty runs of ASCII digits.
pub fn parse_solve_time(value: &str) -> Result<u32, ValidationError> {
    let invalid = || ValidationError::InvalidSolveTime(value.to_string());

    let (minutes, seconds) = value.trim().split_once(':').ok_or_else(invalid)?;
    let minutes = parse_digits(minutes).ok_or_else(invalid)?;
    let seconds = parse_digits(seconds).ok_or_else(invalid)?;

    minutes
        .checked_mul(60)
        .and_then(|m| m.checked_add(seconds))
        .ok_or_else(invalid)
}

fn parse_digits(part: &str) -> Option<u32> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

/// Parse Drive's `YYYY:MM:DD HH:MM:SS` capture timestamp.
pub fn parse_exif_timestamp(value: &str) -> Result<NaiveDateTime, ValidationError> {
    NaiveDateTime::parse_from_str(value.trim(), EXIF_TIMESTAMP_FORMAT).map_err(|e| {
        ValidationError::InvalidTimestamp {
            value: value.to_string(),
            reason: e.to_string(),
        }
    })
}

/// Capture timestamps carry no zone; they are stored as UTC.
pub fn naive_as_utc(value: NaiveDateTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&value)
}
