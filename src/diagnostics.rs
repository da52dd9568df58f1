//! # Bucket Diagnostics
//!
//! Classifies fixed-span time buckets of the accepted record stream as
//! normal, empty or sparse.
//!
//! ## Behavior
//!
//! - Bucket index is `floor(t / bucket_span)`, aligned to the epoch.
//! - One bucket is open at a time. A record in a later bucket closes it, and
//!   every bucket skipped in between is closed as **empty**.
//! - A closed, non-empty bucket is **sparse** when
//!   `ln(baseline) - ln(count) > sparsity_threshold`, where `baseline` is the
//!   mean count of the most recent normal buckets (at most `baseline_window`
//!   of them). Without a baseline, a bucket cannot be sparse. Sparse and empty
//!   buckets never feed the baseline.
//! - [`flush`](BucketDiagnostics::flush) closes the open bucket without a
//!   sparsity check: the final bucket of a stream may be incomplete.
//!
//! Timestamps must be non-decreasing. A timestamp in an already closed
//! bucket is ignored with a warning.

use crate::config::AnalysisConfig;
use crate::reporter::{to_datetime, DiagnosticsSink};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Counters produced by [`BucketDiagnostics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticsCounters {
  bucket_count: u64,
  empty_bucket_count: u64,
  sparse_bucket_count: u64,
  latest_empty_bucket_ms: Option<i64>,
  latest_sparse_bucket_ms: Option<i64>,
}

impl DiagnosticsCounters {
  /// Start of the latest empty bucket in epoch milliseconds.
  pub fn latest_empty_bucket_ms(&self) -> Option<i64> {
    self.latest_empty_bucket_ms
  }

  /// Start of the latest sparse bucket in epoch milliseconds.
  pub fn latest_sparse_bucket_ms(&self) -> Option<i64> {
    self.latest_sparse_bucket_ms
  }
}

impl DiagnosticsSink for DiagnosticsCounters {
  fn bucket_count(&self) -> u64 {
    self.bucket_count
  }

  fn empty_bucket_count(&self) -> u64 {
    self.empty_bucket_count
  }

  fn sparse_bucket_count(&self) -> u64 {
    self.sparse_bucket_count
  }

  fn latest_empty_bucket_time(&self) -> Option<DateTime<Utc>> {
    self.latest_empty_bucket_ms.and_then(to_datetime)
  }

  fn latest_sparse_bucket_time(&self) -> Option<DateTime<Utc>> {
    self.latest_sparse_bucket_ms.and_then(to_datetime)
  }
}

#[derive(Debug, Clone, Copy)]
struct OpenBucket {
  index: i64,
  count: u64,
}

/// Streaming classifier of bucket density.
#[derive(Debug, Clone)]
pub struct BucketDiagnostics {
  bucket_span_ms: i64,
  sparsity_threshold: f64,
  baseline_window: usize,
  open: Option<OpenBucket>,
  last_closed: Option<i64>,
  baseline: VecDeque<u64>,
  counters: DiagnosticsCounters,
}

impl BucketDiagnostics {
  /// Creates diagnostics using the config's bucket span and calibration.
  pub fn new(config: &AnalysisConfig) -> Self {
    Self {
      bucket_span_ms: config.bucket_span_ms().max(1),
      sparsity_threshold: config.sparsity_threshold,
      baseline_window: config.baseline_window.max(1),
      open: None,
      last_closed: None,
      baseline: VecDeque::with_capacity(config.baseline_window.max(1)),
      counters: DiagnosticsCounters::default(),
    }
  }

  /// Counters as of the last call.
  pub fn counters(&self) -> &DiagnosticsCounters {
    &self.counters
  }

  fn bucket_start(&self, index: i64) -> i64 {
    index.saturating_mul(self.bucket_span_ms)
  }

  /// Records one accepted timestamp.
  pub fn check_record(&mut self, timestamp_ms: i64) {
    let index = timestamp_ms.div_euclid(self.bucket_span_ms);
    match self.open {
      Some(open) if open.index == index => {
        self.open = Some(OpenBucket {
          count: open.count + 1,
          ..open
        });
      }
      Some(open) if index > open.index => {
        self.close(open, true);
        self.close_empty_until(index);
        self.open = Some(OpenBucket { index, count: 1 });
      }
      Some(open) => {
        warn!(
          timestamp_ms,
          open_bucket = open.index,
          "ignoring timestamp older than the open bucket"
        );
      }
      None => match self.last_closed {
        Some(closed) if index <= closed => {
          warn!(
            timestamp_ms,
            closed_bucket = closed,
            "ignoring timestamp in an already closed bucket"
          );
        }
        Some(_) => {
          self.close_empty_until(index);
          self.open = Some(OpenBucket { index, count: 1 });
        }
        None => self.open = Some(OpenBucket { index, count: 1 }),
      },
    }
  }

  /// Closes the open bucket without judging its sparsity.
  pub fn flush(&mut self) {
    if let Some(open) = self.open.take() {
      self.close(open, false);
    }
  }

  /// Closes every bucket strictly between the last closed one and `index` as empty.
  fn close_empty_until(&mut self, index: i64) {
    let Some(closed) = self.last_closed else {
      return;
    };
    let gap = index.saturating_sub(closed).saturating_sub(1);
    if gap > 0 {
      let gap = gap as u64;
      self.counters.bucket_count += gap;
      self.counters.empty_bucket_count += gap;
      self.counters.latest_empty_bucket_ms = Some(self.bucket_start(index - 1));
      debug!(
        first = closed + 1,
        last = index - 1,
        "closed empty buckets"
      );
    }
    self.last_closed = Some(index - 1);
  }

  fn close(&mut self, bucket: OpenBucket, judge_sparsity: bool) {
    self.counters.bucket_count += 1;
    self.last_closed = Some(bucket.index);

    if judge_sparsity && self.is_sparse(bucket.count) {
      let start = self.bucket_start(bucket.index);
      debug!(bucket_start_ms = start, count = bucket.count, "sparse bucket");
      self.counters.sparse_bucket_count += 1;
      self.counters.latest_sparse_bucket_ms = Some(start);
      return;
    }

    if self.baseline.len() == self.baseline_window {
      self.baseline.pop_front();
    }
    self.baseline.push_back(bucket.count);
  }

  fn is_sparse(&self, count: u64) -> bool {
    if self.baseline.is_empty() || count == 0 {
      return false;
    }
    let mean = self.baseline.iter().sum::<u64>() as f64 / self.baseline.len() as f64;
    mean.ln() - (count as f64).ln() > self.sparsity_threshold
  }
}
