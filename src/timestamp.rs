// Timestamp grammar: `HH:MM:SS.mmm` (hours unbounded, minutes and seconds
// below 60, three millisecond digits) or bare decimal seconds (`12`, `12.5`).

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

static CLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{2,}):(\d{2}):(\d{2})\.(\d{3})$").expect("clock timestamp pattern")
});

static DECIMAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.?\d*$").expect("decimal timestamp pattern"));

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimestampError {
    #[error("Timestamp cannot be empty")]
    Empty,

    #[error("Invalid timestamp format. Use HH:MM:SS.mmm or decimal seconds")]
    InvalidFormat,

    #[error("Invalid time values (minutes/seconds must be < 60)")]
    InvalidTimeValues,

    #[error("Start time must be less than end time")]
    StartNotBeforeEnd,
}

/// Parse a timestamp into seconds.
pub fn parse_timestamp(timestamp: &str) -> Result<f64, TimestampError> {
    if timestamp.is_empty() {
        return Err(TimestampError::Empty);
    }

    if let Some(caps) = CLOCK_RE.captures(timestamp) {
        let field = |i: usize| caps[i].parse::<u64>().map_err(|_| TimestampError::InvalidFormat);
        let hours = field(1)?;
        let minutes = field(2)?;
        let seconds = field(3)?;
        let millis = field(4)?;

        if minutes >= 60 || seconds >= 60 {
            return Err(TimestampError::InvalidTimeValues);
        }

        let total_millis = hours
            .checked_mul(3_600_000)
            .and_then(|h| h.checked_add(minutes * 60_000 + seconds * 1_000 + millis))
            .ok_or(TimestampError::InvalidFormat)?;
        return Ok(total_millis as f64 / 1000.0);
    }

    if DECIMAL_RE.is_match(timestamp) {
        return timestamp
            .parse::<f64>()
            .map_err(|_| TimestampError::InvalidFormat);
    }

    Err(TimestampError::InvalidFormat)
}

/// Check a timestamp without converting it.
pub fn validate_timestamp(timestamp: &str) -> Result<(), TimestampError> {
    parse_timestamp(timestamp).map(|_| ())
}

/// Parse both ends of a range, requiring `start < end`.
pub fn validate_time_range(start: &str, end: &str) -> Result<(f64, f64), TimestampError> {
    let start_seconds = parse_timestamp(start)?;
    let end_seconds = parse_timestamp(end)?;

    if start_seconds >= end_seconds {
        return Err(TimestampError::StartNotBeforeEnd);
    }

    Ok((start_seconds, end_seconds))
}

/// Convert a timestamp to seconds, `None` when it does not parse.
pub fn timestamp_to_seconds(timestamp: &str) -> Option<f64> {
    parse_timestamp(timestamp).ok()
}

/// Format seconds as `HH:MM:SS.mmm`.
pub fn format_timestamp(seconds: f64) -> String {
    let total_millis = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_millis / 3_600_000;
    let minutes = (total_millis % 3_600_000) / 60_000;
    let secs = (total_millis % 60_000) / 1_000;
    let millis = total_millis % 1_000;

    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, secs, millis)
}

/// Format seconds as an ffmpeg argument (`-ss` / `-t`).
pub fn format_seconds_arg(seconds: f64) -> String {
    format!("{:.3}", seconds.max(0.0))
}
