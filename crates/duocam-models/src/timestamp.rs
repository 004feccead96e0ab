//! Game start/end times.
//!
//! Users give the kick-off and final whistle as wall-clock offsets into
//! camera A's recording, e.g. `00:12:30`. Accepted forms are `HH:MM:SS`,
//! `MM:SS` and `SS`, each with optional fractional seconds.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Seconds in a `HH:MM:SS`, `MM:SS` or `SS` timestamp.
///
/// ```
/// use duocam_models::timestamp::parse_timestamp;
/// assert_eq!(parse_timestamp("01:30:00").unwrap(), 5400.0);
/// assert_eq!(parse_timestamp("05:30").unwrap(), 330.0);
/// assert_eq!(parse_timestamp("90").unwrap(), 90.0);
/// ```
pub fn parse_timestamp(text: &str) -> Result<f64, TimestampError> {
    const UNITS: [&str; 3] = ["hours", "minutes", "seconds"];

    let text = text.trim();
    if text.is_empty() {
        return Err(TimestampError::Empty);
    }
    let fields: Vec<&str> = text.split(':').collect();
    let Some(skipped) = UNITS.len().checked_sub(fields.len()) else {
        return Err(TimestampError::InvalidFormat(text.to_string()));
    };

    fields
        .iter()
        .zip(&UNITS[skipped..])
        .try_fold(0.0, |acc, (field, unit)| {
            let value = field
                .parse::<f64>()
                .map_err(|_| TimestampError::InvalidValue(*unit, field.to_string()))?;
            if value.is_sign_negative() || !value.is_finite() {
                return Err(TimestampError::Negative);
            }
            Ok(acc * 60.0 + value)
        })
}

/// `HH:MM:SS`, or `HH:MM:SS.mmm` when there is a fractional part.
pub fn format_seconds(seconds: f64) -> String {
    let millis = (seconds.max(0.0) * 1000.0).round() as u64;
    let (whole, frac) = (millis / 1000, millis % 1000);
    let clock = format!("{:02}:{:02}:{:02}", whole / 3600, whole / 60 % 60, whole % 60);
    if frac == 0 {
        clock
    } else {
        format!("{clock}.{frac:03}")
    }
}

/// Optional user-requested window on camera A's unsynchronized timeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TimeRange {
    /// Start in seconds (None = from the beginning)
    pub start: Option<f64>,
    /// End in seconds (None = until the end of the overlap)
    pub end: Option<f64>,
}

impl TimeRange {
    pub fn new(start: Option<f64>, end: Option<f64>) -> Result<Self, TimestampError> {
        if let (Some(start), Some(end)) = (start, end) {
            if start >= end {
                return Err(TimestampError::StartNotBeforeEnd);
            }
        }
        Ok(Self { start, end })
    }

    /// Parse optional start/end strings.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self, TimestampError> {
        let start = start.map(parse_timestamp).transpose()?;
        let end = end.map(parse_timestamp).transpose()?;
        Self::new(start, end)
    }

    /// Whether the user asked for any cut at all.
    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// Timestamp parsing/validation error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimestampError {
    #[error("Timestamp cannot be empty")]
    Empty,

    #[error("Timestamp cannot be negative")]
    Negative,

    #[error("Invalid {0} value: {1}")]
    InvalidValue(&'static str, String),

    #[error("Invalid timestamp format '{0}'. Use HH:MM:SS, MM:SS or SS")]
    InvalidFormat(String),

    #[error("Start time must be before end time")]
    StartNotBeforeEnd,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_forms() {
        assert_eq!(parse_timestamp("00:00:00").unwrap(), 0.0);
        assert_eq!(parse_timestamp("01:30:45").unwrap(), 5445.0);
        assert_eq!(parse_timestamp("53:53").unwrap(), 3233.0);
        assert_eq!(parse_timestamp(" 90 ").unwrap(), 90.0);
        assert!((parse_timestamp("00:00:30.500").unwrap() - 30.5).abs() < 1e-9);
    }

    #[test]
    fn test_parse_timestamp_errors() {
        assert_eq!(parse_timestamp(""), Err(TimestampError::Empty));
        assert!(matches!(parse_timestamp("abc"), Err(TimestampError::InvalidValue("seconds", _))));
        assert!(matches!(parse_timestamp("x:10"), Err(TimestampError::InvalidValue("minutes", _))));
        assert!(matches!(parse_timestamp("1:2:3:4"), Err(TimestampError::InvalidFormat(_))));
        assert_eq!(parse_timestamp("-5"), Err(TimestampError::Negative));
        assert_eq!(parse_timestamp("1:-5"), Err(TimestampError::Negative));
    }

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(0.0), "00:00:00");
        assert_eq!(format_seconds(3661.0), "01:01:01");
        assert_eq!(format_seconds(1.5), "00:00:01.500");
        assert_eq!(format_seconds(-3.0), "00:00:00");
        assert_eq!(format_seconds(59.9996), "00:01:00");
    }

    #[test]
    fn test_time_range() {
        let range = TimeRange::parse(Some("00:01:00"), Some("00:02:00")).unwrap();
        assert_eq!(range.start, Some(60.0));
        assert_eq!(range.end, Some(120.0));
        assert!(!range.is_unbounded());

        assert!(TimeRange::parse(None, None).unwrap().is_unbounded());
        assert_eq!(
            TimeRange::parse(Some("2:00"), Some("1:00")),
            Err(TimestampError::StartNotBeforeEnd)
        );
    }
}
