//! # ingestweave
//!
//! Ordered, latency-tolerant record ingestion for a downstream analysis
//! process.
//!
//! ingestweave turns a stream of semi-structured input records into a
//! strictly time-ordered stream of fixed-schema rows. Records may arrive out
//! of order by up to a configured latency window; anything later is counted
//! and dropped. Alongside the rows, the accepted timestamps are bucketed and
//! each bucket is classified as normal, empty or sparse for diagnostics.
//!
//! ## Pipeline
//!
//! ```text
//! RecordDecoder -> FieldExtractor -> LatencyBuffer -> RecordSink
//!                                          |
//!                                          +-> DataCountsReporter
//!                                          +-> BucketDiagnostics
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use ingestweave::config::{AnalysisConfig, DataDescription};
//! use ingestweave::reporter::InMemoryDataCountsReporter;
//! use ingestweave::sink::VecRecordSink;
//! use ingestweave::writer::OrderedRecordWriter;
//! use std::time::Duration;
//!
//! let analysis = AnalysisConfig::new(vec!["value".to_string()])
//!   .with_latency(Duration::from_secs(2));
//! let mut writer = OrderedRecordWriter::new(
//!   VecRecordSink::new(),
//!   InMemoryDataCountsReporter::new(),
//!   analysis,
//!   DataDescription::default(),
//! )?;
//! writer.write_header();
//! let summary = writer.write_json(&br#"{"time":"2","value":"2.0"}{"time":"1","value":"1.0"}"#[..])?;
//! assert_eq!(summary.records_written, 2);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Documentation enforcement - treat missing docs as errors
#![deny(missing_docs)]

/// Session configuration and the output field schema.
pub mod config;
/// Record decoders, including the tolerant JSON decoder.
pub mod decode;
/// Empty and sparse bucket classification.
pub mod diagnostics;
/// Error types.
pub mod error;
/// Dotted-path field extraction.
pub mod extract;
/// Reordering buffer for late records.
pub mod latency;
/// Counts and diagnostics reporting.
pub mod reporter;
/// Downstream process sinks.
pub mod sink;
/// Time field parsing.
pub mod time_format;
/// Decoded record values.
pub mod value;
/// The ordered record writer.
pub mod writer;

pub use config::{AnalysisConfig, DataDescription, FieldSchema, IngestConfig, TimeFormat};
pub use decode::{JsonRecordDecoder, RecordDecoder, RecordIter};
pub use diagnostics::{BucketDiagnostics, DiagnosticsCounters};
pub use error::{ConfigError, DateParseError, IngestError, Result};
pub use reporter::{DataCountsReporter, DiagnosticsSink, InMemoryDataCountsReporter};
pub use sink::{LengthEncodedRecordSink, RecordSink, VecRecordSink};
pub use value::{FieldValue, RawRecord};
pub use writer::{OrderedRecordWriter, WriteSummary, WriterState};

#[cfg(test)]
mod decode_test;
#[cfg(test)]
mod diagnostics_test;
