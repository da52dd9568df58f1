//! Counts and diagnostics reporting.
//!
//! The writer reports every counted event through [`DataCountsReporter`], one
//! call per event, and publishes the bucket diagnostics at the end of each
//! session. Readers observe diagnostics through [`DiagnosticsSink`].
//!
//! [`InMemoryDataCountsReporter`] keeps everything in process, with a running
//! total across sessions and an incremental view of the current session.

use crate::diagnostics::DiagnosticsCounters;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Receives the counted events of a write session.
pub trait DataCountsReporter {
  /// Starts a fresh incremental count for a new session.
  fn start_new_incremental_count(&mut self);

  /// A record was emitted; `count_in_bucket` includes it.
  fn report_record_written(&mut self, count_in_bucket: u64, bucket_start_ms: i64);

  /// A record arrived too late and was dropped.
  fn report_out_of_order_record(&mut self, buckets_late: u64);

  /// Total analysis fields found missing in the session.
  fn report_missing_fields(&mut self, total: u64);

  /// A record's timestamp could not be parsed; `input_field_count` excludes the time field.
  fn report_date_parse_error(&mut self, input_field_count: u64);

  /// A dropped record was newer than anything else seen this session.
  fn report_latest_time_incremental_stats(&mut self, epoch_ms: i64);

  /// Latest emitted record time of the session.
  fn report_latest_record_time(&mut self, _epoch_ms: i64) {}

  /// Final bucket diagnostics of the session.
  fn report_bucket_diagnostics(&mut self, _counters: &DiagnosticsCounters) {}

  /// The session has ended.
  fn finish_reporting(&mut self);

  /// Latest record time from earlier sessions, if known.
  fn latest_record_time_ms(&self) -> Option<i64> {
    None
  }
}

/// Read-only view of bucket diagnostics.
pub trait DiagnosticsSink {
  /// Buckets closed so far, empty ones included.
  fn bucket_count(&self) -> u64;
  /// Buckets that held no records.
  fn empty_bucket_count(&self) -> u64;
  /// Buckets with anomalously few records.
  fn sparse_bucket_count(&self) -> u64;
  /// Start of the most recent empty bucket.
  fn latest_empty_bucket_time(&self) -> Option<DateTime<Utc>>;
  /// Start of the most recent sparse bucket.
  fn latest_sparse_bucket_time(&self) -> Option<DateTime<Utc>>;
}

pub(crate) fn to_datetime(epoch_ms: i64) -> Option<DateTime<Utc>> {
  Utc.timestamp_millis_opt(epoch_ms).single()
}

/// Counters tracked by [`InMemoryDataCountsReporter`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataCounts {
  /// Records written to the analysis process.
  pub processed_record_count: u64,
  /// Records dropped for arriving too late.
  pub out_of_order_timestamp_count: u64,
  /// Records dropped for an unparseable timestamp.
  pub invalid_date_count: u64,
  /// Analysis fields missing from written records.
  pub missing_field_count: u64,
  /// Non-time input fields seen on records rejected for their timestamp.
  pub input_field_count: u64,
  /// Latest written record time.
  pub latest_record_time: Option<DateTime<Utc>>,
  /// Diagnostic buckets closed.
  pub bucket_count: u64,
  /// Empty diagnostic buckets.
  pub empty_bucket_count: u64,
  /// Sparse diagnostic buckets.
  pub sparse_bucket_count: u64,
  /// Start of the latest empty bucket.
  pub latest_empty_bucket_time: Option<DateTime<Utc>>,
  /// Start of the latest sparse bucket.
  pub latest_sparse_bucket_time: Option<DateTime<Utc>>,
}

impl DataCounts {
  /// Records read from the input, whatever their fate.
  pub fn input_record_count(&self) -> u64 {
    self.processed_record_count + self.out_of_order_timestamp_count + self.invalid_date_count
  }

  fn merge_diagnostics(&mut self, counters: &DiagnosticsCounters) {
    self.bucket_count += counters.bucket_count();
    self.empty_bucket_count += counters.empty_bucket_count();
    self.sparse_bucket_count += counters.sparse_bucket_count();
    self.latest_empty_bucket_time = self
      .latest_empty_bucket_time
      .max(counters.latest_empty_bucket_time());
    self.latest_sparse_bucket_time = self
      .latest_sparse_bucket_time
      .max(counters.latest_sparse_bucket_time());
  }
}

/// In-process reporter keeping total and per-session counts.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDataCountsReporter {
  total: DataCounts,
  incremental: DataCounts,
  written_per_bucket: BTreeMap<i64, u64>,
  out_of_order_by_lateness: BTreeMap<u64, u64>,
  latest_time_incremental: Option<i64>,
  sessions_started: u64,
  sessions_finished: u64,
}

impl InMemoryDataCountsReporter {
  /// Creates a reporter with zeroed counts.
  pub fn new() -> Self {
    Self::default()
  }

  /// Counts across every session.
  pub fn total(&self) -> &DataCounts {
    &self.total
  }

  /// Counts for the current (or last) session.
  pub fn incremental(&self) -> &DataCounts {
    &self.incremental
  }

  /// Highest running count reported per bucket start time.
  pub fn written_per_bucket(&self) -> &BTreeMap<i64, u64> {
    &self.written_per_bucket
  }

  /// Dropped records keyed by how many buckets late they were.
  pub fn out_of_order_by_lateness(&self) -> &BTreeMap<u64, u64> {
    &self.out_of_order_by_lateness
  }

  /// Latest time reported through incremental stats, if any.
  pub fn latest_time_incremental(&self) -> Option<i64> {
    self.latest_time_incremental
  }

  /// Number of sessions started.
  pub fn sessions_started(&self) -> u64 {
    self.sessions_started
  }

  /// Number of sessions finished.
  pub fn sessions_finished(&self) -> u64 {
    self.sessions_finished
  }

  fn both(&mut self, f: impl Fn(&mut DataCounts)) {
    f(&mut self.total);
    f(&mut self.incremental);
  }
}

impl DataCountsReporter for InMemoryDataCountsReporter {
  fn start_new_incremental_count(&mut self) {
    self.incremental = DataCounts::default();
    self.sessions_started += 1;
  }

  fn report_record_written(&mut self, count_in_bucket: u64, bucket_start_ms: i64) {
    self.both(|c| c.processed_record_count += 1);
    let slot = self.written_per_bucket.entry(bucket_start_ms).or_default();
    *slot = (*slot).max(count_in_bucket);
  }

  fn report_out_of_order_record(&mut self, buckets_late: u64) {
    self.both(|c| c.out_of_order_timestamp_count += 1);
    *self.out_of_order_by_lateness.entry(buckets_late).or_default() += 1;
  }

  fn report_missing_fields(&mut self, total: u64) {
    self.both(|c| c.missing_field_count += total);
  }

  fn report_date_parse_error(&mut self, input_field_count: u64) {
    self.both(|c| {
      c.invalid_date_count += 1;
      c.input_field_count += input_field_count;
    });
  }

  fn report_latest_time_incremental_stats(&mut self, epoch_ms: i64) {
    self.latest_time_incremental = Some(epoch_ms);
  }

  fn report_latest_record_time(&mut self, epoch_ms: i64) {
    let time = to_datetime(epoch_ms);
    self.both(|c| c.latest_record_time = c.latest_record_time.max(time));
  }

  fn report_bucket_diagnostics(&mut self, counters: &DiagnosticsCounters) {
    self.both(|c| c.merge_diagnostics(counters));
  }

  fn finish_reporting(&mut self) {
    self.sessions_finished += 1;
    let counts = &self.incremental;
    info!(
      processed = counts.processed_record_count,
      out_of_order = counts.out_of_order_timestamp_count,
      invalid_dates = counts.invalid_date_count,
      missing_fields = counts.missing_field_count,
      buckets = counts.bucket_count,
      empty_buckets = counts.empty_bucket_count,
      sparse_buckets = counts.sparse_bucket_count,
      "finished reporting data counts"
    );
  }

  fn latest_record_time_ms(&self) -> Option<i64> {
    self.total.latest_record_time.map(|t| t.timestamp_millis())
  }
}

impl DiagnosticsSink for InMemoryDataCountsReporter {
  fn bucket_count(&self) -> u64 {
    self.total.bucket_count
  }

  fn empty_bucket_count(&self) -> u64 {
    self.total.empty_bucket_count
  }

  fn sparse_bucket_count(&self) -> u64 {
    self.total.sparse_bucket_count
  }

  fn latest_empty_bucket_time(&self) -> Option<DateTime<Utc>> {
    self.total.latest_empty_bucket_time
  }

  fn latest_sparse_bucket_time(&self) -> Option<DateTime<Utc>> {
    self.total.latest_sparse_bucket_time
  }
}
