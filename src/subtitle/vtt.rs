//! WebVTT cue timestamp shifting.
//!
//! Timestamps come in two shapes, `HH:MM:SS.mmm` and `MM:SS.mmm`. Shifting keeps
//! the input's shape: hour-form stays hour-form, minute-form reports total minutes
//! (so `59:59.000` shifted by a second becomes `60:00.000`, not `01:00:00.000`).
//! Results never go below zero; each timestamp is clamped on its own.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use thiserror::Error;

static TIMESTAMP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:(\d{2}):)?(\d{2}):(\d{2})\.(\d{3})").expect("timestamp pattern is valid")
});

static FULL_TIMESTAMP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(\d{2}):)?(\d{2}):(\d{2})\.(\d{3})$").expect("timestamp pattern is valid")
});

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TimestampError {
    #[error("malformed WebVTT timestamp: {0:?}")]
    Malformed(String),
    #[error("offset must be a finite number of seconds, got {0}")]
    InvalidOffset(f64),
}

/// Shift a single `HH:MM:SS.mmm` or `MM:SS.mmm` timestamp by `offset_seconds`.
pub fn shift_timestamp(timestamp: &str, offset_seconds: f64) -> Result<String, TimestampError> {
    let offset_ms = offset_to_millis(offset_seconds)?;
    let caps = FULL_TIMESTAMP_RE
        .captures(timestamp)
        .ok_or_else(|| TimestampError::Malformed(timestamp.to_string()))?;
    Ok(shift_captures(&caps, offset_ms))
}

/// Shift every timestamp-shaped substring of a WebVTT document.
///
/// Everything else (headers, cue identifiers, payload text, STYLE blocks) is left
/// byte-for-byte intact.
pub fn shift_vtt(vtt_text: &str, offset_seconds: f64) -> Result<String, TimestampError> {
    let offset_ms = offset_to_millis(offset_seconds)?;
    if offset_ms == 0 {
        return Ok(vtt_text.to_string());
    }
    Ok(TIMESTAMP_RE
        .replace_all(vtt_text, |caps: &Captures| shift_captures(caps, offset_ms))
        .into_owned())
}

fn offset_to_millis(offset_seconds: f64) -> Result<i64, TimestampError> {
    if !offset_seconds.is_finite() {
        return Err(TimestampError::InvalidOffset(offset_seconds));
    }
    Ok((offset_seconds * 1000.0).round() as i64)
}

fn digits(caps: &Captures, group: usize) -> i64 {
    // Groups only ever match ASCII digits.
    caps.get(group)
        .map(|m| m.as_str().bytes().fold(0, |acc, b| acc * 10 + i64::from(b - b'0')))
        .unwrap_or(0)
}

fn shift_captures(caps: &Captures, offset_ms: i64) -> String {
    let has_hours = caps.get(1).is_some();
    let total_ms = digits(caps, 1) * 3_600_000
        + digits(caps, 2) * 60_000
        + digits(caps, 3) * 1_000
        + digits(caps, 4);

    let shifted = total_ms.saturating_add(offset_ms).max(0);
    let millis = shifted % 1_000;
    let total_seconds = shifted / 1_000;
    let seconds = total_seconds % 60;
    let total_minutes = total_seconds / 60;

    if has_hours {
        format!(
            "{:02}:{:02}:{:02}.{:03}",
            total_minutes / 60,
            total_minutes % 60,
            seconds,
            millis
        )
    } else {
        format!("{:02}:{:02}.{:03}", total_minutes, seconds, millis)
    }
}
