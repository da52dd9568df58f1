//! # Bucket Diagnostics Test Suite
//!
//! Runs fixed timestamp sequences through [`BucketDiagnostics`] with a 60
//! second bucket span and checks the resulting counters.
//!
//! - Regular streams produce no anomalies.
//! - Gaps close the skipped buckets as empty.
//! - Low-density buckets are sparse, except the bucket still open at flush.
//! - Identical input from a fresh state yields identical counters.

use crate::config::AnalysisConfig;
use crate::diagnostics::{BucketDiagnostics, DiagnosticsCounters};
use crate::reporter::DiagnosticsSink;
use chrono::{TimeZone, Utc};
use std::time::Duration;

fn diagnostics() -> BucketDiagnostics {
  let config = AnalysisConfig::new(vec!["field".to_string()])
    .with_bucket_span(Duration::from_secs(60));
  BucketDiagnostics::new(&config)
}

/// Sends `how_many` records spread over `[min, max)`, as a steady feed would.
fn send_many(d: &mut BucketDiagnostics, min: i64, max: i64, how_many: i64) {
  let range = max - min;
  for i in 0..how_many {
    d.check_record(min + i % range);
  }
}

fn finish(mut d: BucketDiagnostics) -> DiagnosticsCounters {
  d.flush();
  *d.counters()
}

#[test]
fn test_regular_stream_has_no_anomalies() {
  let mut d = diagnostics();
  for t in (70_000..=610_000).step_by(60_000) {
    d.check_record(t);
  }

  let c = finish(d);
  assert_eq!(c.bucket_count(), 10);
  assert_eq!(c.empty_bucket_count(), 0);
  assert_eq!(c.sparse_bucket_count(), 0);
  assert_eq!(c.latest_sparse_bucket_time(), None);
  assert_eq!(c.latest_empty_bucket_time(), None);
}

#[test]
fn test_empty_buckets() {
  let mut d = diagnostics();
  for t in [10_000, 70_000, 190_000, 250_000, 310_000, 370_000, 490_000, 550_000] {
    d.check_record(t);
  }

  let c = finish(d);
  assert_eq!(c.bucket_count(), 10);
  assert_eq!(c.empty_bucket_count(), 2);
  assert_eq!(c.sparse_bucket_count(), 0);
  assert_eq!(c.latest_sparse_bucket_time(), None);
  assert_eq!(
    c.latest_empty_bucket_time(),
    Utc.timestamp_millis_opt(420_000).single()
  );
}

#[test]
fn test_empty_buckets_start_later() {
  let mut d = diagnostics();
  for t in [
    1_110_000, 1_170_000, 1_290_000, 1_350_000, 1_410_000, 1_470_000, 1_590_000, 1_650_000,
  ] {
    d.check_record(t);
  }

  let c = finish(d);
  assert_eq!(c.bucket_count(), 10);
  assert_eq!(c.empty_bucket_count(), 2);
  assert_eq!(c.sparse_bucket_count(), 0);
  assert_eq!(c.latest_empty_bucket_ms(), Some(1_500_000));
}

#[test]
fn test_two_records_then_long_gap() {
  // Buckets 1..=8 are skipped between the first bucket and bucket 9.
  let mut d = diagnostics();
  d.check_record(1_000);
  d.check_record(2_000);
  d.check_record(550_000);

  let c = finish(d);
  assert_eq!(c.bucket_count(), 10);
  assert_eq!(c.empty_bucket_count(), 8);
  assert_eq!(c.latest_empty_bucket_ms(), Some(480_000));
}

#[test]
fn test_sparse_buckets() {
  let mut d = diagnostics();
  send_many(&mut d, 10_000, 69_000, 1000);
  send_many(&mut d, 70_000, 129_000, 1200);
  // sparse
  send_many(&mut d, 130_000, 189_000, 1);
  send_many(&mut d, 190_000, 249_000, 1100);
  send_many(&mut d, 250_000, 309_000, 1300);
  send_many(&mut d, 310_000, 369_000, 1050);
  send_many(&mut d, 370_000, 429_000, 1022);
  // sparse
  send_many(&mut d, 430_000, 489_000, 10);
  send_many(&mut d, 490_000, 549_000, 1333);
  send_many(&mut d, 550_000, 609_000, 1400);

  let c = finish(d);
  assert_eq!(c.bucket_count(), 10);
  assert_eq!(c.empty_bucket_count(), 0);
  assert_eq!(c.sparse_bucket_count(), 2);
  assert_eq!(c.latest_sparse_bucket_ms(), Some(420_000));
  assert_eq!(c.latest_empty_bucket_time(), None);
}

#[test]
fn test_sparse_last_bucket_is_not_reported() {
  let mut d = diagnostics();
  send_many(&mut d, 10_000, 69_000, 1000);
  send_many(&mut d, 70_000, 129_000, 1200);
  send_many(&mut d, 130_000, 189_000, 1);
  send_many(&mut d, 190_000, 249_000, 1100);
  send_many(&mut d, 250_000, 309_000, 1300);
  send_many(&mut d, 310_000, 369_000, 1050);
  send_many(&mut d, 370_000, 429_000, 1022);
  send_many(&mut d, 430_000, 489_000, 1400);
  send_many(&mut d, 490_000, 549_000, 1333);
  send_many(&mut d, 550_000, 609_000, 10);

  let c = finish(d);
  assert_eq!(c.bucket_count(), 10);
  assert_eq!(c.sparse_bucket_count(), 1);
  assert_eq!(c.latest_sparse_bucket_ms(), Some(120_000));
}

#[test]
fn test_sparse_second_to_last_bucket_is_reported() {
  let mut d = diagnostics();
  send_many(&mut d, 10_000, 69_000, 1000);
  send_many(&mut d, 70_000, 129_000, 1200);
  send_many(&mut d, 130_000, 189_000, 1);
  send_many(&mut d, 190_000, 249_000, 1100);
  send_many(&mut d, 250_000, 309_000, 1300);
  send_many(&mut d, 310_000, 369_000, 1050);
  send_many(&mut d, 370_000, 429_000, 1022);
  send_many(&mut d, 430_000, 489_000, 1400);
  send_many(&mut d, 490_000, 549_000, 9);
  send_many(&mut d, 550_000, 609_000, 10);

  let c = finish(d);
  assert_eq!(c.bucket_count(), 10);
  assert_eq!(c.empty_bucket_count(), 0);
  assert_eq!(c.sparse_bucket_count(), 2);
  assert_eq!(c.latest_sparse_bucket_ms(), Some(480_000));
}

#[test]
fn test_mixed_empty_and_sparse_buckets() {
  let mut d = diagnostics();
  send_many(&mut d, 10_000, 69_000, 1000);
  send_many(&mut d, 70_000, 129_000, 1200);
  send_many(&mut d, 130_000, 189_000, 1);
  send_many(&mut d, 250_000, 309_000, 1300);
  send_many(&mut d, 310_000, 369_000, 1050);
  send_many(&mut d, 370_000, 429_000, 1022);
  send_many(&mut d, 430_000, 489_000, 10);
  send_many(&mut d, 550_000, 609_000, 1400);

  let c = finish(d);
  assert_eq!(c.bucket_count(), 10);
  assert_eq!(c.sparse_bucket_count(), 2);
  assert_eq!(c.latest_sparse_bucket_ms(), Some(420_000));
  assert_eq!(c.empty_bucket_count(), 2);
  assert_eq!(c.latest_empty_bucket_ms(), Some(480_000));
}

#[test]
fn test_longer_outage() {
  let mut d = diagnostics();
  for t in [10_000, 70_000, 190_000, 250_000, 310_000, 370_000, 490_000, 550_000] {
    d.check_record(t);
  }
  // 98 empty buckets
  d.check_record(6_490_000);

  let c = finish(d);
  assert_eq!(c.bucket_count(), 109);
  assert_eq!(c.empty_bucket_count(), 100);
  assert_eq!(c.sparse_bucket_count(), 0);
  assert_eq!(c.latest_empty_bucket_ms(), Some(6_420_000));
}

#[test]
fn test_first_bucket_is_never_sparse() {
  let mut d = diagnostics();
  d.check_record(0);
  send_many(&mut d, 60_000, 119_000, 1000);

  let c = finish(d);
  assert_eq!(c.bucket_count(), 2);
  assert_eq!(c.sparse_bucket_count(), 0);
}

#[test]
fn test_flush_alone_never_counts_empty() {
  let mut d = diagnostics();
  d.check_record(5_000);
  d.flush();
  d.flush();

  let c = *d.counters();
  assert_eq!(c.bucket_count(), 1);
  assert_eq!(c.empty_bucket_count(), 0);
}

#[test]
fn test_empty_stream() {
  let c = finish(diagnostics());
  assert_eq!(c, DiagnosticsCounters::default());
}

#[test]
fn test_older_timestamp_is_ignored() {
  let mut d = diagnostics();
  d.check_record(130_000);
  d.check_record(10_000);

  let c = finish(d);
  assert_eq!(c.bucket_count(), 1);
  assert_eq!(c.empty_bucket_count(), 0);
}

#[test]
fn test_records_after_flush_fill_the_gap() {
  let mut d = diagnostics();
  d.check_record(10_000);
  d.flush();
  d.check_record(190_000);

  let c = finish(d);
  assert_eq!(c.bucket_count(), 4);
  assert_eq!(c.empty_bucket_count(), 2);
  assert_eq!(c.latest_empty_bucket_ms(), Some(120_000));
}

#[test]
fn test_custom_threshold_flags_moderate_drop() {
  let config = AnalysisConfig::new(vec![])
    .with_bucket_span(Duration::from_secs(60))
    .with_sparsity_threshold(0.5);
  let mut d = BucketDiagnostics::new(&config);
  send_many(&mut d, 0, 59_000, 100);
  send_many(&mut d, 60_000, 119_000, 40);
  send_many(&mut d, 120_000, 179_000, 100);

  let c = finish(d);
  assert_eq!(c.sparse_bucket_count(), 1);
  assert_eq!(c.latest_sparse_bucket_ms(), Some(60_000));
}

#[test]
fn test_rerun_is_deterministic() {
  let timestamps: Vec<i64> = (0..5_000).map(|i| i * 97 + (i % 7) * 1_000).collect();
  let mut sorted = timestamps.clone();
  sorted.sort_unstable();

  let run = |ts: &[i64]| {
    let mut d = diagnostics();
    for t in ts {
      d.check_record(*t);
    }
    finish(d)
  };
  assert_eq!(run(&sorted), run(&sorted));
}

#[test]
fn test_huge_gap_closes_in_one_step() {
  // an epoch-ms value read as epoch seconds lands ~2.8e10 buckets ahead
  let mut d = diagnostics();
  d.check_record(0);
  d.check_record(1_700_000_000_000_000);

  let c = finish(d);
  assert_eq!(c.bucket_count(), 28_333_333_334);
  assert_eq!(c.empty_bucket_count(), 28_333_333_332);
  assert_eq!(c.latest_empty_bucket_ms(), Some(1_699_999_999_920_000));
  assert_eq!(c.sparse_bucket_count(), 0);
}

#[test]
fn test_gap_across_full_timestamp_range() {
  let mut d = diagnostics();
  d.check_record(i64::MIN);
  d.check_record(i64::MAX);

  let first = i64::MIN.div_euclid(60_000);
  let last = i64::MAX.div_euclid(60_000);
  let c = finish(d);
  assert_eq!(c.bucket_count(), (last - first + 1) as u64);
  assert_eq!(c.empty_bucket_count(), (last - first - 1) as u64);
  assert_eq!(c.latest_empty_bucket_ms(), Some((last - 1) * 60_000));
}
