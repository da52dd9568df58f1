//! Parsing of record timestamps.
//!
//! Converts the time field text into epoch milliseconds according to the
//! configured [`TimeFormat`]. Patterns are chrono strftime strings; a pattern
//! without an offset is interpreted as UTC.

use crate::config::TimeFormat;
use crate::error::DateParseError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Parses time field values into epoch milliseconds.
#[derive(Debug, Clone)]
pub struct TimeParser {
  format: TimeFormat,
}

impl TimeParser {
  /// Creates a parser for the given format.
  pub fn new(format: TimeFormat) -> Self {
    Self { format }
  }

  /// The format this parser accepts.
  pub fn format(&self) -> &TimeFormat {
    &self.format
  }

  /// Parses `value` into milliseconds since the Unix epoch.
  pub fn parse_ms(&self, value: &str) -> Result<i64, DateParseError> {
    let trimmed = value.trim();
    let parsed = match &self.format {
      TimeFormat::Epoch => parse_epoch(trimmed, 1000),
      TimeFormat::EpochMs => parse_epoch(trimmed, 1),
      TimeFormat::Pattern(pattern) => parse_pattern(trimmed, pattern),
    };
    parsed.ok_or_else(|| DateParseError {
      value: value.to_string(),
      format: self.format.to_string(),
    })
  }
}

/// Parses an integral or fractional epoch number scaled to milliseconds.
fn parse_epoch(value: &str, scale: i64) -> Option<i64> {
  if let Ok(whole) = value.parse::<i64>() {
    return whole.checked_mul(scale);
  }
  let fractional = value.parse::<f64>().ok()?;
  let ms = (fractional * scale as f64).round();
  if ms.is_finite() && ms >= i64::MIN as f64 && ms <= i64::MAX as f64 {
    Some(ms as i64)
  } else {
    None
  }
}

fn parse_pattern(value: &str, pattern: &str) -> Option<i64> {
  if let Ok(datetime) = DateTime::parse_from_str(value, pattern) {
    return Some(datetime.timestamp_millis());
  }
  if let Ok(naive) = NaiveDateTime::parse_from_str(value, pattern) {
    return Some(Utc.from_utc_datetime(&naive).timestamp_millis());
  }
  let date = NaiveDate::parse_from_str(value, pattern).ok()?;
  Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?).timestamp_millis())
}
