//! Downstream process sinks.
//!
//! The writer hands every emitted row, header included, to a [`RecordSink`].
//! A sink has no return channel into the writer; sinks that can fail keep the
//! failure themselves and expose it to their owner.

use std::io::{self, Write};
use tracing::error;

/// Receives ordered field vectors bound for the analysis process.
pub trait RecordSink {
  /// Writes one row.
  fn write_record(&mut self, record: &[String]);

  /// Flushes buffered rows, if the sink buffers.
  fn flush(&mut self) {}
}

impl<S: RecordSink + ?Sized> RecordSink for &mut S {
  fn write_record(&mut self, record: &[String]) {
    (**self).write_record(record);
  }

  fn flush(&mut self) {
    (**self).flush();
  }
}

/// Collects rows in memory.
#[derive(Debug, Clone, Default)]
pub struct VecRecordSink {
  records: Vec<Vec<String>>,
}

impl VecRecordSink {
  /// Creates an empty sink.
  pub fn new() -> Self {
    Self::default()
  }

  /// Rows written so far.
  pub fn records(&self) -> &[Vec<String>] {
    &self.records
  }

  /// Consumes the sink, returning its rows.
  pub fn into_records(self) -> Vec<Vec<String>> {
    self.records
  }
}

impl RecordSink for VecRecordSink {
  fn write_record(&mut self, record: &[String]) {
    self.records.push(record.to_vec());
  }
}

/// Writes rows in the length-encoded framing read by the analysis process.
///
/// Each row is a big-endian `i32` field count followed, per field, by a
/// big-endian `i32` byte length and the field's UTF-8 bytes. The first I/O
/// error is latched; later rows are dropped until [`take_error`](Self::take_error)
/// clears it.
#[derive(Debug)]
pub struct LengthEncodedRecordSink<W: Write> {
  writer: W,
  error: Option<io::Error>,
  buf: Vec<u8>,
}

impl<W: Write> LengthEncodedRecordSink<W> {
  /// Wraps a writer.
  pub fn new(writer: W) -> Self {
    Self {
      writer,
      error: None,
      buf: Vec::new(),
    }
  }

  /// Returns and clears the latched I/O error.
  pub fn take_error(&mut self) -> Option<io::Error> {
    self.error.take()
  }

  /// Returns `true` if a write has failed.
  pub fn has_error(&self) -> bool {
    self.error.is_some()
  }

  /// Consumes the sink, returning the writer.
  pub fn into_inner(self) -> W {
    self.writer
  }

  fn encode(&mut self, record: &[String]) -> io::Result<()> {
    self.buf.clear();
    self.buf.extend_from_slice(&encode_len(record.len())?);
    for field in record {
      self.buf.extend_from_slice(&encode_len(field.len())?);
      self.buf.extend_from_slice(field.as_bytes());
    }
    self.writer.write_all(&self.buf)
  }

  fn latch(&mut self, result: io::Result<()>) {
    if let Err(e) = result {
      error!(error = %e, "failed to write record to analysis process");
      self.error = Some(e);
    }
  }
}

fn encode_len(len: usize) -> io::Result<[u8; 4]> {
  i32::try_from(len)
    .map(i32::to_be_bytes)
    .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "field too large to length-encode"))
}

impl<W: Write> RecordSink for LengthEncodedRecordSink<W> {
  fn write_record(&mut self, record: &[String]) {
    if self.error.is_some() {
      return;
    }
    let result = self.encode(record);
    self.latch(result);
  }

  fn flush(&mut self) {
    if self.error.is_some() {
      return;
    }
    let result = self.writer.flush();
    self.latch(result);
  }
}
