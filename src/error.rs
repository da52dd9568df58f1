//! # Error Handling
//!
//! Errors raised while ingesting a record stream.
//!
//! Ingestion distinguishes three classes of problem:
//!
//! - **Per-record**: a missing field, an array-valued field or an unparseable
//!   timestamp. These are counted by the writer and never surface as errors.
//!   [`DateParseError`] exists so the time parser can say what went wrong, but
//!   the writer absorbs it.
//! - **Recoverable stream**: a malformed unit the decoder can skip while still
//!   finding the next record boundary. Counted, never surfaced.
//! - **Fatal**: the decoder cannot find any further record boundary. The write
//!   fails with [`IngestError::Parse`] and the caller must restart the input.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = IngestError> = std::result::Result<T, E>;

/// Error returned by a write session.
#[derive(Error, Debug)]
pub enum IngestError {
  /// The input could not be resynchronised to another record boundary.
  #[error("malformed input at byte {offset}: {message}")]
  Parse {
    /// Byte offset into the input where decoding gave up.
    offset: u64,
    /// Description of the failure.
    message: String,
  },
  /// Reading the underlying input failed.
  #[error("i/o error reading input: {0}")]
  Io(#[from] std::io::Error),
  /// The supplied configuration is unusable.
  #[error(transparent)]
  Config(#[from] ConfigError),
}

impl IngestError {
  /// Creates a fatal parse error at the given byte offset.
  pub fn parse(offset: u64, message: impl Into<String>) -> Self {
    Self::Parse {
      offset,
      message: message.into(),
    }
  }

  /// Returns `true` if this is a fatal decode failure.
  pub fn is_parse(&self) -> bool {
    matches!(self, Self::Parse { .. })
  }
}

/// Configuration validation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
  /// Bucket span must be at least one second.
  #[error("bucket span must be greater than zero")]
  ZeroBucketSpan,
  /// No analysis fields and no time field were configured.
  #[error("time field name must not be empty")]
  EmptyTimeField,
  /// An analysis field has an empty name or an empty path segment.
  #[error("invalid field name '{0}'")]
  InvalidFieldName(String),
  /// The diagnostics baseline window cannot be empty.
  #[error("baseline window must hold at least one bucket")]
  ZeroBaselineWindow,
  /// The sparsity threshold must be a positive, finite number.
  #[error("sparsity threshold must be positive, got {0}")]
  InvalidSparsityThreshold(f64),
  /// Serialized configuration could not be read.
  #[error("invalid configuration: {0}")]
  Malformed(String),
}

/// A timestamp string that does not match the configured time format.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot parse timestamp '{value}' as {format}")]
pub struct DateParseError {
  /// The text that failed to parse.
  pub value: String,
  /// Human readable name of the expected format.
  pub format: String,
}
