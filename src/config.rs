//! Configuration for an ingestion session.
//!
//! Two pieces of configuration drive a write session:
//!
//! - [`AnalysisConfig`]: which fields the downstream analysis needs, the
//!   bucket span that defines diagnostic buckets, and the latency window that
//!   bounds how far out of order records may arrive.
//! - [`DataDescription`]: where the timestamp lives in each record and how to
//!   parse it.
//!
//! Both are plain values built once before a session starts. They can be
//! assembled with the `with_*` builders or deserialized from JSON through
//! [`IngestConfig::from_json_str`]. Durations are whole seconds when
//! serialized.
//!
//! # Example
//!
//! ```rust
//! use ingestweave::config::{AnalysisConfig, DataDescription, TimeFormat};
//! use std::time::Duration;
//!
//! let analysis = AnalysisConfig::new(vec!["value".to_string()])
//!   .with_bucket_span(Duration::from_secs(60))
//!   .with_latency(Duration::from_secs(2));
//! let description = DataDescription::default().with_time_format(TimeFormat::EpochMs);
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

const DEFAULT_BUCKET_SPAN: Duration = Duration::from_secs(300);
const DEFAULT_TIME_FIELD: &str = "time";
const DEFAULT_SPARSITY_THRESHOLD: f64 = 2.0;
const DEFAULT_BASELINE_WINDOW: usize = 10;
const DEFAULT_MAX_PARSE_ERRORS: usize = 100;

/// How the time field of each record is encoded.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TimeFormat {
  /// Seconds since the Unix epoch; fractional seconds are accepted.
  #[default]
  Epoch,
  /// Milliseconds since the Unix epoch.
  EpochMs,
  /// A chrono strftime pattern such as `%Y-%m-%dT%H:%M:%S%z`.
  Pattern(String),
}

impl From<String> for TimeFormat {
  fn from(value: String) -> Self {
    match value.as_str() {
      "epoch" => TimeFormat::Epoch,
      "epoch_ms" => TimeFormat::EpochMs,
      _ => TimeFormat::Pattern(value),
    }
  }
}

impl From<TimeFormat> for String {
  fn from(value: TimeFormat) -> Self {
    value.to_string()
  }
}

impl fmt::Display for TimeFormat {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TimeFormat::Epoch => f.write_str("epoch"),
      TimeFormat::EpochMs => f.write_str("epoch_ms"),
      TimeFormat::Pattern(pattern) => f.write_str(pattern),
    }
  }
}

/// Describes where the timestamp lives and how it is formatted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataDescription {
  /// Name (dotted path) of the time field.
  pub time_field: String,
  /// Encoding of the time field.
  pub time_format: TimeFormat,
}

impl Default for DataDescription {
  fn default() -> Self {
    Self {
      time_field: DEFAULT_TIME_FIELD.to_string(),
      time_format: TimeFormat::Epoch,
    }
  }
}

impl DataDescription {
  /// Sets the time field name.
  pub fn with_time_field(mut self, time_field: impl Into<String>) -> Self {
    self.time_field = time_field.into();
    self
  }

  /// Sets the time format.
  pub fn with_time_format(mut self, time_format: TimeFormat) -> Self {
    self.time_format = time_format;
    self
  }
}

/// Analysis settings that shape the record stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
  /// Fields the analysis needs, in output column order (dotted paths).
  pub fields: Vec<String>,
  /// Span of one analysis bucket.
  #[serde(with = "duration_secs")]
  pub bucket_span: Duration,
  /// How far behind the latest record a record may arrive and still be used.
  #[serde(with = "duration_secs")]
  pub latency: Duration,
  /// Natural-log gap between baseline and bucket count above which a bucket is sparse.
  pub sparsity_threshold: f64,
  /// Number of recent normal buckets averaged into the density baseline.
  pub baseline_window: usize,
  /// Token errors tolerated while resynchronising one malformed record.
  pub max_parse_errors: usize,
}

impl Default for AnalysisConfig {
  fn default() -> Self {
    Self {
      fields: Vec::new(),
      bucket_span: DEFAULT_BUCKET_SPAN,
      latency: Duration::ZERO,
      sparsity_threshold: DEFAULT_SPARSITY_THRESHOLD,
      baseline_window: DEFAULT_BASELINE_WINDOW,
      max_parse_errors: DEFAULT_MAX_PARSE_ERRORS,
    }
  }
}

impl AnalysisConfig {
  /// Creates a config analysing the given fields with default spans.
  pub fn new(fields: Vec<String>) -> Self {
    Self {
      fields,
      ..Self::default()
    }
  }

  /// Sets the bucket span.
  pub fn with_bucket_span(mut self, bucket_span: Duration) -> Self {
    self.bucket_span = bucket_span;
    self
  }

  /// Sets the latency window.
  pub fn with_latency(mut self, latency: Duration) -> Self {
    self.latency = latency;
    self
  }

  /// Sets the sparsity threshold used by bucket diagnostics.
  pub fn with_sparsity_threshold(mut self, threshold: f64) -> Self {
    self.sparsity_threshold = threshold;
    self
  }

  /// Sets how many normal buckets feed the density baseline.
  pub fn with_baseline_window(mut self, window: usize) -> Self {
    self.baseline_window = window;
    self
  }

  /// Sets the decoder's error budget per malformed record.
  pub fn with_max_parse_errors(mut self, max_parse_errors: usize) -> Self {
    self.max_parse_errors = max_parse_errors;
    self
  }

  /// Bucket span in milliseconds.
  pub fn bucket_span_ms(&self) -> i64 {
    duration_ms(self.bucket_span)
  }

  /// Latency window in milliseconds.
  pub fn latency_ms(&self) -> i64 {
    duration_ms(self.latency)
  }

  /// Checks the config for values no session could run with.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.bucket_span_ms() <= 0 {
      return Err(ConfigError::ZeroBucketSpan);
    }
    if self.baseline_window == 0 {
      return Err(ConfigError::ZeroBaselineWindow);
    }
    if !(self.sparsity_threshold.is_finite() && self.sparsity_threshold > 0.0) {
      return Err(ConfigError::InvalidSparsityThreshold(
        self.sparsity_threshold,
      ));
    }
    for field in &self.fields {
      validate_field_name(field)?;
    }
    Ok(())
  }
}

fn duration_ms(duration: Duration) -> i64 {
  i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

fn validate_field_name(name: &str) -> Result<(), ConfigError> {
  if name.is_empty() || name.split('.').any(str::is_empty) {
    return Err(ConfigError::InvalidFieldName(name.to_string()));
  }
  Ok(())
}

/// Ordered output columns: the time field followed by the analysis fields.
///
/// Immutable once built. Duplicate field names, including an analysis field
/// equal to the time field, are collapsed to their first occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
  time_field: String,
  fields: Vec<String>,
}

impl FieldSchema {
  /// Builds a schema from a time field and analysis fields.
  pub fn new(time_field: impl Into<String>, fields: &[String]) -> Result<Self, ConfigError> {
    let time_field = time_field.into();
    if time_field.is_empty() {
      return Err(ConfigError::EmptyTimeField);
    }
    validate_field_name(&time_field)?;

    let mut deduped: Vec<String> = Vec::with_capacity(fields.len());
    for field in fields {
      validate_field_name(field)?;
      if *field != time_field && !deduped.contains(field) {
        deduped.push(field.clone());
      }
    }
    Ok(Self {
      time_field,
      fields: deduped,
    })
  }

  /// Builds the schema a write session uses for the given configs.
  pub fn from_config(
    analysis: &AnalysisConfig,
    description: &DataDescription,
  ) -> Result<Self, ConfigError> {
    Self::new(description.time_field.clone(), &analysis.fields)
  }

  /// Name of the time field.
  pub fn time_field(&self) -> &str {
    &self.time_field
  }

  /// Analysis fields, excluding the time field, in output order.
  pub fn fields(&self) -> &[String] {
    &self.fields
  }

  /// Number of columns in a data row, including the control field.
  pub fn column_count(&self) -> usize {
    self.fields.len() + 2
  }
}

/// Complete configuration for a session, as read from JSON.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
  /// Analysis settings.
  pub analysis: AnalysisConfig,
  /// Data description.
  pub data_description: DataDescription,
}

impl IngestConfig {
  /// Parses and validates a JSON configuration document.
  pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
    let config: IngestConfig =
      serde_json::from_str(json).map_err(|e| ConfigError::Malformed(e.to_string()))?;
    config.validate()?;
    Ok(config)
  }

  /// Validates both halves of the configuration.
  pub fn validate(&self) -> Result<(), ConfigError> {
    self.analysis.validate()?;
    FieldSchema::from_config(&self.analysis, &self.data_description)?;
    Ok(())
  }

  /// Builds the field schema this config describes.
  pub fn schema(&self) -> Result<FieldSchema, ConfigError> {
    FieldSchema::from_config(&self.analysis, &self.data_description)
  }
}

/// Serializes a [`Duration`] as whole seconds.
mod duration_secs {
  use serde::{Deserialize, Deserializer, Serializer};
  use std::time::Duration;

  pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_secs())
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_secs)
  }
}
