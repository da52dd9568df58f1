//! Latency buffer.
//!
//! Holds accepted records that may still be overtaken by a late arrival and
//! releases them in time order once they fall behind the late-arrival
//! threshold (`max_time_seen - latency`).
//!
//! Records are keyed by `(time, arrival sequence)` so that equal timestamps
//! keep their arrival order.

use std::collections::BTreeMap;

/// Ordered holding area for records awaiting emission.
#[derive(Debug, Clone)]
pub struct LatencyBuffer<T> {
  entries: BTreeMap<(i64, u64), T>,
  next_seq: u64,
}

impl<T> Default for LatencyBuffer<T> {
  fn default() -> Self {
    Self {
      entries: BTreeMap::new(),
      next_seq: 0,
    }
  }
}

impl<T> LatencyBuffer<T> {
  /// Creates an empty buffer.
  pub fn new() -> Self {
    Self::default()
  }

  /// Buffers `item` under `time`.
  pub fn insert(&mut self, time: i64, item: T) {
    self.entries.insert((time, self.next_seq), item);
    self.next_seq += 1;
  }

  /// Removes and returns, oldest first, every item with time `<= threshold`.
  pub fn drain_ready(&mut self, threshold: i64) -> Vec<(i64, T)> {
    let pending = match threshold.checked_add(1) {
      Some(bound) => self.entries.split_off(&(bound, 0)),
      None => BTreeMap::new(),
    };
    let ready = std::mem::replace(&mut self.entries, pending);
    ready.into_iter().map(|((time, _), item)| (time, item)).collect()
  }

  /// Removes and returns everything, oldest first.
  pub fn drain_all(&mut self) -> Vec<(i64, T)> {
    self.drain_ready(i64::MAX)
  }

  /// Time of the oldest buffered item.
  pub fn oldest_time(&self) -> Option<i64> {
    self.entries.keys().next().map(|(time, _)| *time)
  }

  /// Number of buffered items.
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  /// Returns `true` if nothing is buffered.
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}
