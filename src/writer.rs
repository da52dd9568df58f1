//! # Ordered Record Writer
//!
//! Drives one write session: decode → extract → buffer → emit.
//!
//! ## Session lifecycle
//!
//! ```text
//! AwaitingFirst --first accepted record--> Streaming --end of input--> Finished
//! ```
//!
//! - Each record's time field is parsed first. A record whose time cannot be
//!   parsed is dropped and reported as a date parse error.
//! - A record with time `t < max_time_seen - latency` is out of order: it is
//!   reported with its lateness in buckets and dropped.
//! - Every other record enters the [`LatencyBuffer`] and is emitted, oldest
//!   first, once its time is at or behind the late-arrival threshold. With a
//!   zero latency window this is immediate pass-through.
//! - At end of input the buffer is drained, missing fields and bucket
//!   diagnostics are reported, and the reporter is finished exactly once.
//!
//! A fatal decode error aborts the session: rows already emitted stand,
//! buffered rows are discarded, and the reporter is not finished.
//!
//! ## Row layout
//!
//! Header: time field name, analysis field names, then `"."`. Data rows: time
//! in epoch seconds, analysis field values, then an empty control field.

use crate::config::{AnalysisConfig, DataDescription, FieldSchema};
use crate::decode::{JsonRecordDecoder, RecordDecoder};
use crate::diagnostics::{BucketDiagnostics, DiagnosticsCounters};
use crate::error::{ConfigError, Result};
use crate::extract::{FieldExtractor, Resolution};
use crate::latency::LatencyBuffer;
use crate::reporter::DataCountsReporter;
use crate::sink::RecordSink;
use crate::time_format::TimeParser;
use crate::value::RawRecord;
use serde::Serialize;
use std::io::Read;
use tracing::{debug, error, info, trace};

/// Name of the trailing control column in the header row.
pub const CONTROL_FIELD_NAME: &str = ".";

/// Where a write session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriterState {
  /// No record has been accepted yet.
  #[default]
  AwaitingFirst,
  /// At least one record has been accepted.
  Streaming,
  /// The input has been fully processed.
  Finished,
}

/// Outcome of a completed write session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
  /// Records produced by the decoder.
  pub records_read: u64,
  /// Records emitted to the sink.
  pub records_written: u64,
  /// Records dropped for arriving too late.
  pub out_of_order: u64,
  /// Records dropped for an unparseable timestamp.
  pub date_parse_errors: u64,
  /// Analysis fields missing from accepted records.
  pub missing_fields: u64,
  /// Malformed units the decoder skipped or truncated.
  pub malformed_records: u64,
  /// Latest emitted record time in epoch milliseconds.
  pub latest_record_time_ms: Option<i64>,
  /// Bucket diagnostics for the session.
  pub diagnostics: DiagnosticsCounters,
}

/// Per-session mutable state.
struct Session {
  max_time_seen: Option<i64>,
  latest_this_session: Option<i64>,
  buffer: LatencyBuffer<Vec<String>>,
  bucket: Option<(i64, u64)>,
  diagnostics: BucketDiagnostics,
  summary: WriteSummary,
}

/// Writes an ordered, latency-tolerant record stream to a [`RecordSink`].
///
/// # Example
///
/// ```rust
/// use ingestweave::config::{AnalysisConfig, DataDescription};
/// use ingestweave::reporter::InMemoryDataCountsReporter;
/// use ingestweave::sink::VecRecordSink;
/// use ingestweave::writer::OrderedRecordWriter;
///
/// let analysis = AnalysisConfig::new(vec!["value".to_string()]);
/// let mut writer = OrderedRecordWriter::new(
///   VecRecordSink::new(),
///   InMemoryDataCountsReporter::new(),
///   analysis,
///   DataDescription::default(),
/// )
/// .unwrap();
/// writer.write_header();
/// writer
///   .write_json(&br#"{"time":"1","value":"1.0"}"#[..])
///   .unwrap();
/// assert_eq!(writer.sink().records()[1], vec!["1", "1.0", ""]);
/// ```
pub struct OrderedRecordWriter<S: RecordSink, R: DataCountsReporter> {
  sink: S,
  reporter: R,
  analysis: AnalysisConfig,
  extractor: FieldExtractor,
  time_parser: TimeParser,
  state: WriterState,
}

impl<S: RecordSink, R: DataCountsReporter> OrderedRecordWriter<S, R> {
  /// Creates a writer after validating the configuration.
  pub fn new(
    sink: S,
    reporter: R,
    analysis: AnalysisConfig,
    description: DataDescription,
  ) -> std::result::Result<Self, ConfigError> {
    analysis.validate()?;
    let schema = FieldSchema::from_config(&analysis, &description)?;
    Ok(Self {
      sink,
      reporter,
      extractor: FieldExtractor::new(schema),
      time_parser: TimeParser::new(description.time_format),
      analysis,
      state: WriterState::AwaitingFirst,
    })
  }

  /// The output schema.
  pub fn schema(&self) -> &FieldSchema {
    self.extractor.schema()
  }

  /// Lifecycle state of the current or last session.
  pub fn state(&self) -> WriterState {
    self.state
  }

  /// The downstream sink.
  pub fn sink(&self) -> &S {
    &self.sink
  }

  /// Mutable access to the downstream sink.
  pub fn sink_mut(&mut self) -> &mut S {
    &mut self.sink
  }

  /// The counts reporter.
  pub fn reporter(&self) -> &R {
    &self.reporter
  }

  /// Consumes the writer, returning its sink and reporter.
  pub fn into_parts(self) -> (S, R) {
    (self.sink, self.reporter)
  }

  /// Writes the header row. Call once before the first session.
  pub fn write_header(&mut self) {
    let schema = self.extractor.schema();
    let mut header = Vec::with_capacity(schema.column_count());
    header.push(schema.time_field().to_string());
    header.extend(schema.fields().iter().cloned());
    header.push(CONTROL_FIELD_NAME.to_string());
    self.sink.write_record(&header);
  }

  /// Runs a session over concatenated JSON objects read from `reader`.
  pub fn write_json<In: Read>(&mut self, reader: In) -> Result<WriteSummary> {
    let mut decoder =
      JsonRecordDecoder::new(reader).with_max_parse_errors(self.analysis.max_parse_errors);
    self.write(&mut decoder)
  }

  /// Runs a session over every record `decoder` yields.
  pub fn write<D: RecordDecoder>(&mut self, decoder: &mut D) -> Result<WriteSummary> {
    self.reporter.start_new_incremental_count();
    self.state = WriterState::AwaitingFirst;

    let mut session = Session {
      max_time_seen: self.reporter.latest_record_time_ms(),
      latest_this_session: None,
      buffer: LatencyBuffer::new(),
      bucket: None,
      diagnostics: BucketDiagnostics::new(&self.analysis),
      summary: WriteSummary::default(),
    };
    debug!(
      latency_ms = self.analysis.latency_ms(),
      bucket_span_ms = self.analysis.bucket_span_ms(),
      "starting write session"
    );

    loop {
      match decoder.next_record() {
        Ok(Some(record)) => self.accept(&mut session, &record),
        Ok(None) => break,
        Err(e) => {
          error!(
            error = %e,
            written = session.summary.records_written,
            discarded = session.buffer.len(),
            "write session aborted"
          );
          return Err(e);
        }
      }
    }

    session.summary.malformed_records = decoder.malformed_records();
    Ok(self.finish(session))
  }

  fn accept(&mut self, session: &mut Session, record: &RawRecord) {
    session.summary.records_read += 1;
    let extraction = self.extractor.extract(record);

    let time_text = match &extraction.time {
      Resolution::Resolved(text) => text.as_str(),
      Resolution::Missing | Resolution::NotScalar => "",
    };
    let time_ms = match self.time_parser.parse_ms(time_text) {
      Ok(t) => t,
      Err(e) => {
        debug!(error = %e, "dropping record with unparseable time");
        session.summary.date_parse_errors += 1;
        self
          .reporter
          .report_date_parse_error(extraction.input_field_count);
        return;
      }
    };

    if self.state == WriterState::AwaitingFirst {
      self.state = WriterState::Streaming;
    }

    let latency_ms = self.analysis.latency_ms();
    if let Some(max_seen) = session.max_time_seen {
      if time_ms < max_seen.saturating_sub(latency_ms) {
        self.reject_out_of_order(session, time_ms, max_seen);
        return;
      }
    }

    let max_seen = session.max_time_seen.map_or(time_ms, |m| m.max(time_ms));
    session.max_time_seen = Some(max_seen);
    session.latest_this_session = Some(
      session
        .latest_this_session
        .map_or(time_ms, |l| l.max(time_ms)),
    );
    session.summary.missing_fields += extraction.missing_fields;

    let schema = self.extractor.schema();
    let mut row = Vec::with_capacity(schema.column_count());
    row.push(time_ms.div_euclid(1000).to_string());
    row.extend(extraction.values);
    row.push(String::new());
    session.buffer.insert(time_ms, row);

    for (time, row) in session.buffer.drain_ready(max_seen.saturating_sub(latency_ms)) {
      self.emit(session, time, &row);
    }
  }

  fn reject_out_of_order(&mut self, session: &mut Session, time_ms: i64, max_seen: i64) {
    let span = self.analysis.bucket_span_ms();
    let buckets_late = (max_seen.div_euclid(span) - time_ms.div_euclid(span)).max(0) as u64;
    trace!(time_ms, max_seen, buckets_late, "dropping out of order record");
    session.summary.out_of_order += 1;
    self.reporter.report_out_of_order_record(buckets_late);

    if session.latest_this_session.map_or(true, |l| time_ms > l) {
      session.latest_this_session = Some(time_ms);
      self.reporter.report_latest_time_incremental_stats(time_ms);
    }
  }

  fn emit(&mut self, session: &mut Session, time_ms: i64, row: &[String]) {
    self.sink.write_record(row);

    let span = self.analysis.bucket_span_ms();
    let index = time_ms.div_euclid(span);
    let count = match session.bucket {
      Some((current, count)) if current == index => count + 1,
      _ => 1,
    };
    session.bucket = Some((index, count));
    self
      .reporter
      .report_record_written(count, index.saturating_mul(span));
    session.diagnostics.check_record(time_ms);

    session.summary.records_written += 1;
    session.summary.latest_record_time_ms = Some(
      session
        .summary
        .latest_record_time_ms
        .map_or(time_ms, |l| l.max(time_ms)),
    );
  }

  fn finish(&mut self, mut session: Session) -> WriteSummary {
    for (time, row) in session.buffer.drain_all() {
      self.emit(&mut session, time, &row);
    }
    self.sink.flush();

    self
      .reporter
      .report_missing_fields(session.summary.missing_fields);
    session.diagnostics.flush();
    session.summary.diagnostics = *session.diagnostics.counters();
    self
      .reporter
      .report_bucket_diagnostics(&session.summary.diagnostics);
    if let Some(latest) = session.summary.latest_record_time_ms {
      self.reporter.report_latest_record_time(latest);
    }
    self.reporter.finish_reporting();
    self.state = WriterState::Finished;

    let summary = session.summary;
    info!(
      read = summary.records_read,
      written = summary.records_written,
      out_of_order = summary.out_of_order,
      date_parse_errors = summary.date_parse_errors,
      missing_fields = summary.missing_fields,
      malformed = summary.malformed_records,
      "write session finished"
    );
    summary
  }
}
