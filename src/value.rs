//! Decoded record values.
//!
//! A [`RawRecord`] is the transient, decoded form of one input unit: a mapping
//! from keys to [`FieldValue`]s, where values nest arbitrarily. Numbers keep
//! their source text so that `1.0` reaches the downstream process as `1.0`.

use std::collections::BTreeMap;

/// A value inside a decoded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
  /// JSON `null`.
  Null,
  /// A boolean.
  Bool(bool),
  /// A number, as written in the input.
  Number(String),
  /// A string.
  String(String),
  /// A nested mapping.
  Object(BTreeMap<String, FieldValue>),
  /// An array. Arrays are never extracted as field values.
  Array(Vec<FieldValue>),
}

impl FieldValue {
  /// Returns the scalar rendering of this value, or `None` for containers.
  pub fn as_scalar(&self) -> Option<String> {
    match self {
      FieldValue::Null => Some(String::new()),
      FieldValue::Bool(b) => Some(b.to_string()),
      FieldValue::Number(n) => Some(n.clone()),
      FieldValue::String(s) => Some(s.clone()),
      FieldValue::Object(_) | FieldValue::Array(_) => None,
    }
  }
}

impl From<&str> for FieldValue {
  fn from(value: &str) -> Self {
    FieldValue::String(value.to_string())
  }
}

impl From<String> for FieldValue {
  fn from(value: String) -> Self {
    FieldValue::String(value)
  }
}

impl From<serde_json::Value> for FieldValue {
  fn from(value: serde_json::Value) -> Self {
    match value {
      serde_json::Value::Null => FieldValue::Null,
      serde_json::Value::Bool(b) => FieldValue::Bool(b),
      serde_json::Value::Number(n) => FieldValue::Number(n.to_string()),
      serde_json::Value::String(s) => FieldValue::String(s),
      serde_json::Value::Array(items) => {
        FieldValue::Array(items.into_iter().map(FieldValue::from).collect())
      }
      serde_json::Value::Object(map) => FieldValue::Object(
        map
          .into_iter()
          .map(|(k, v)| (k, FieldValue::from(v)))
          .collect(),
      ),
    }
  }
}

/// One decoded input record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
  fields: BTreeMap<String, FieldValue>,
}

impl RawRecord {
  /// Creates an empty record.
  pub fn new() -> Self {
    Self::default()
  }

  /// Inserts a top-level field, replacing any previous value for the key.
  pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
    self.fields.insert(key.into(), value.into());
  }

  /// Builder form of [`insert`](Self::insert).
  pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
    self.insert(key, value);
    self
  }

  /// Looks up a top-level key.
  pub fn get(&self, key: &str) -> Option<&FieldValue> {
    self.fields.get(key)
  }

  /// Top-level fields.
  pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
    &self.fields
  }

  /// Number of top-level fields.
  pub fn len(&self) -> usize {
    self.fields.len()
  }

  /// Returns `true` if the record has no fields.
  pub fn is_empty(&self) -> bool {
    self.fields.is_empty()
  }
}

impl From<BTreeMap<String, FieldValue>> for RawRecord {
  fn from(fields: BTreeMap<String, FieldValue>) -> Self {
    Self { fields }
  }
}

impl TryFrom<serde_json::Value> for RawRecord {
  type Error = serde_json::Value;

  /// Converts a JSON object; any other JSON value is handed back unchanged.
  fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
    match value {
      serde_json::Value::Object(map) => Ok(Self {
        fields: map
          .into_iter()
          .map(|(k, v)| (k, FieldValue::from(v)))
          .collect(),
      }),
      other => Err(other),
    }
  }
}
