//! Field extraction.
//!
//! Resolves the schema's dotted field paths against a [`RawRecord`] and
//! produces the ordered string values the downstream process expects.
//!
//! ## Resolution rules
//!
//! - A scalar resolves to its string form (`null` becomes the empty string).
//! - An array resolves to the empty string and is *not* reported missing.
//! - An absent path segment, a scalar where the path continues, or a mapping
//!   where the path ends resolves to the empty string and *is* reported missing.
//!
//! Keys that literally contain dots are honoured: at every level the longest
//! unresolved remainder is tried as a key before splitting it further.

use crate::config::FieldSchema;
use crate::value::{FieldValue, RawRecord};
use std::collections::BTreeMap;

/// Outcome of resolving one dotted path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
  /// The path led to a scalar.
  Resolved(String),
  /// The path does not lead to a value.
  Missing,
  /// The path led to an array.
  NotScalar,
}

impl Resolution {
  /// The column value for this resolution.
  pub fn into_value(self) -> String {
    match self {
      Resolution::Resolved(value) => value,
      Resolution::Missing | Resolution::NotScalar => String::new(),
    }
  }

  /// Returns `true` if the field counts as missing.
  pub fn is_missing(&self) -> bool {
    matches!(self, Resolution::Missing)
  }
}

/// Resolves `path` against a record.
pub fn resolve(record: &RawRecord, path: &str) -> Resolution {
  resolve_in(record.fields(), path)
}

fn resolve_in(map: &BTreeMap<String, FieldValue>, path: &str) -> Resolution {
  if let Some(value) = map.get(path) {
    return leaf(value);
  }
  for (dot, _) in path.match_indices('.') {
    let (head, rest) = (&path[..dot], &path[dot + 1..]);
    match map.get(head) {
      Some(FieldValue::Object(inner)) => return resolve_in(inner, rest),
      Some(FieldValue::Array(_)) => return Resolution::NotScalar,
      Some(_) => return Resolution::Missing,
      None => continue,
    }
  }
  Resolution::Missing
}

fn leaf(value: &FieldValue) -> Resolution {
  match value {
    FieldValue::Array(_) => Resolution::NotScalar,
    FieldValue::Object(_) => Resolution::Missing,
    scalar => scalar
      .as_scalar()
      .map_or(Resolution::Missing, Resolution::Resolved),
  }
}

/// The fields pulled out of one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
  /// Resolution of the time field.
  pub time: Resolution,
  /// One value per analysis field, in schema order.
  pub values: Vec<String>,
  /// Number of analysis fields that were missing.
  pub missing_fields: u64,
  /// Number of top-level input fields other than the time field.
  pub input_field_count: u64,
}

/// Extracts schema fields from decoded records.
#[derive(Debug, Clone)]
pub struct FieldExtractor {
  schema: FieldSchema,
}

impl FieldExtractor {
  /// Creates an extractor for the given schema.
  pub fn new(schema: FieldSchema) -> Self {
    Self { schema }
  }

  /// The schema this extractor follows.
  pub fn schema(&self) -> &FieldSchema {
    &self.schema
  }

  /// Extracts the time field and every analysis field from `record`.
  pub fn extract(&self, record: &RawRecord) -> Extraction {
    let time = resolve(record, self.schema.time_field());
    let mut missing_fields = 0;
    let values = self
      .schema
      .fields()
      .iter()
      .map(|field| {
        let resolution = resolve(record, field);
        if resolution.is_missing() {
          missing_fields += 1;
        }
        resolution.into_value()
      })
      .collect();

    let has_time_key = record.get(self.schema.time_field()).is_some();
    let input_field_count = (record.len() - usize::from(has_time_key)) as u64;

    Extraction {
      time,
      values,
      missing_fields,
      input_field_count,
    }
  }
}
