//! # Record Decoder Test Suite
//!
//! Tests for [`JsonRecordDecoder`] and [`RecordIter`]: well formed input,
//! recovery from malformed records and skipped garbage, and fatal errors.

use crate::decode::{JsonRecordDecoder, RecordDecoder, RecordIter};
use crate::error::IngestError;
use crate::value::{FieldValue, RawRecord};
use std::collections::BTreeMap;

fn decode_all(input: &str) -> (Vec<RawRecord>, u64) {
  let mut decoder = JsonRecordDecoder::new(input.as_bytes());
  let mut records = Vec::new();
  while let Some(record) = decoder.next_record().unwrap() {
    records.push(record);
  }
  (records, decoder.malformed_records())
}

fn string(s: &str) -> FieldValue {
  FieldValue::String(s.to_string())
}

#[test]
fn test_concatenated_objects() {
  let (records, malformed) =
    decode_all(r#"{"time":"1","value":"1.0"}{"time":"2","value":"2.0"}"#);

  assert_eq!(records.len(), 2);
  assert_eq!(records[0].get("time"), Some(&string("1")));
  assert_eq!(records[1].get("value"), Some(&string("2.0")));
  assert_eq!(malformed, 0);
}

#[test]
fn test_whitespace_and_newlines_between_objects() {
  let (records, _) = decode_all("\n  {\"a\": 1}\n\n\t{\"a\": 2}\n");
  assert_eq!(records.len(), 2);
}

#[test]
fn test_empty_input() {
  let (records, malformed) = decode_all("");
  assert!(records.is_empty());
  assert_eq!(malformed, 0);
}

#[test]
fn test_numbers_keep_source_text() {
  let (records, _) = decode_all(r#"{"a": 1.0, "b": -2e3, "c": 10}"#);
  let r = &records[0];
  assert_eq!(r.get("a"), Some(&FieldValue::Number("1.0".to_string())));
  assert_eq!(r.get("b"), Some(&FieldValue::Number("-2e3".to_string())));
  assert_eq!(r.get("c"), Some(&FieldValue::Number("10".to_string())));
}

#[test]
fn test_literals_and_nesting() {
  let (records, _) =
    decode_all(r#"{"t": true, "f": false, "n": null, "o": {"x": [1, {"y": "z"}]}}"#);
  let r = &records[0];
  assert_eq!(r.get("t"), Some(&FieldValue::Bool(true)));
  assert_eq!(r.get("f"), Some(&FieldValue::Bool(false)));
  assert_eq!(r.get("n"), Some(&FieldValue::Null));

  let mut inner = BTreeMap::new();
  inner.insert("y".to_string(), string("z"));
  let mut outer = BTreeMap::new();
  outer.insert(
    "x".to_string(),
    FieldValue::Array(vec![
      FieldValue::Number("1".to_string()),
      FieldValue::Object(inner),
    ]),
  );
  assert_eq!(r.get("o"), Some(&FieldValue::Object(outer)));
}

#[test]
fn test_empty_containers() {
  let (records, _) = decode_all(r#"{"a": [], "b": {}}{}"#);
  assert_eq!(records[0].get("a"), Some(&FieldValue::Array(vec![])));
  assert_eq!(records[0].get("b"), Some(&FieldValue::Object(BTreeMap::new())));
  assert!(records[1].is_empty());
}

#[test]
fn test_string_escapes() {
  let (records, _) = decode_all(r#"{"s": "a\"b\\c\/d\ne\tfé😀"}"#);
  assert_eq!(records[0].get("s"), Some(&string("a\"b\\c/d\ne\tfé😀")));
}

#[test]
fn test_recovers_from_missing_comma() {
  let (records, malformed) = decode_all(concat!(
    r#"{"time":"1", "value":"1.0"}"#,
    r#"{"time":"2" "value":"2.0"}"#,
    r#"{"time":"3", "value":"3.0"}"#,
  ));

  assert_eq!(records.len(), 3);
  assert_eq!(records[1], RawRecord::new().with("time", "2"));
  assert_eq!(records[2].get("value"), Some(&string("3.0")));
  assert_eq!(malformed, 1);
}

#[test]
fn test_recovery_keeps_nested_fields_read_so_far() {
  let (records, malformed) = decode_all(concat!(
    r#"{"time":"2", "nested":{"value":"2.0"} "foo":"bar"}"#,
    r#"{"time":"3"}"#,
  ));

  assert_eq!(records.len(), 2);
  let mut nested = BTreeMap::new();
  nested.insert("value".to_string(), string("2.0"));
  assert_eq!(
    records[0],
    RawRecord::new()
      .with("time", "2")
      .with("nested", FieldValue::Object(nested))
  );
  assert!(records[0].get("foo").is_none());
  assert_eq!(malformed, 1);
}

#[test]
fn test_recovery_from_error_inside_nested_object() {
  let (records, _) = decode_all(concat!(
    r#"{"time":"2", "nested":{"value" "2.0", "more":{"x":1}}, "after":"a"}"#,
    r#"{"time":"3"}"#,
  ));

  assert_eq!(records.len(), 2);
  assert_eq!(records[0].get("time"), Some(&string("2")));
  assert!(records[0].get("after").is_none());
  assert_eq!(records[1].get("time"), Some(&string("3")));
}

#[test]
fn test_lexical_error_inside_object_recovers() {
  let (records, malformed) = decode_all(r#"{"time":"1", "bad": nope}{"time":"2"}"#);

  assert_eq!(records.len(), 2);
  assert_eq!(records[0], RawRecord::new().with("time", "1"));
  assert_eq!(malformed, 1);
}

#[test]
fn test_skips_garbage_between_objects() {
  let (records, malformed) = decode_all(r#"{"a":"1"} 42 "junk" ] {"a":"2"} trailing"#);

  assert_eq!(records.len(), 2);
  assert_eq!(records[1].get("a"), Some(&string("2")));
  assert_eq!(malformed, 2);
}

#[test]
fn test_truncated_record_is_fatal() {
  let mut decoder = JsonRecordDecoder::new(r#"{"time":"1", "value":"2.0"}{"time"#.as_bytes());

  assert!(decoder.next_record().unwrap().is_some());
  let err = decoder.next_record().unwrap_err();
  assert!(err.is_parse());
}

#[test]
fn test_end_of_input_inside_record_is_fatal() {
  let mut decoder = JsonRecordDecoder::new(r#"{"time":"1", "value":"#.as_bytes());
  match decoder.next_record() {
    Err(IngestError::Parse { offset, .. }) => assert!(offset > 0),
    other => panic!("expected parse error, got {:?}", other),
  }
}

#[test]
fn test_error_budget_exhausted_is_fatal() {
  let input = format!(r#"{{"a" "b" {}}}"#, "@ ".repeat(10));
  let mut decoder = JsonRecordDecoder::new(input.as_bytes()).with_max_parse_errors(3);

  assert!(decoder.next_record().unwrap_err().is_parse());
}

#[test]
fn test_error_budget_not_exhausted_recovers() {
  let input = format!(r#"{{"a":"1" "b" {}}}{{"a":"2"}}"#, "@ ".repeat(2));
  let mut decoder = JsonRecordDecoder::new(input.as_bytes()).with_max_parse_errors(10);

  let first = decoder.next_record().unwrap().unwrap();
  assert_eq!(first.get("a"), Some(&string("1")));
  let second = decoder.next_record().unwrap().unwrap();
  assert_eq!(second.get("a"), Some(&string("2")));
}

#[test]
fn test_offset_tracks_consumed_bytes() {
  let input = r#"{"a":"1"}"#;
  let mut decoder = JsonRecordDecoder::new(input.as_bytes());
  decoder.next_record().unwrap();
  assert_eq!(decoder.offset(), input.len() as u64);
}

#[test]
fn test_record_iter() {
  let records = vec![
    RawRecord::new().with("time", "1"),
    RawRecord::new().with("time", "2"),
  ];
  let mut decoder = RecordIter::new(records.clone());

  assert_eq!(decoder.next_record().unwrap(), Some(records[0].clone()));
  assert_eq!(decoder.next_record().unwrap(), Some(records[1].clone()));
  assert_eq!(decoder.next_record().unwrap(), None);
  assert_eq!(decoder.malformed_records(), 0);
}

#[test]
fn test_invalid_escape_skips_only_its_record() {
  let (records, malformed) =
    decode_all(r#"{"v":"a\x"}{"time":"2","v":"ok"}{"time":"3"}"#);

  assert_eq!(records.len(), 3);
  assert!(records[0].is_empty());
  assert_eq!(records[1].get("v"), Some(&string("ok")));
  assert_eq!(records[2].get("time"), Some(&string("3")));
  assert_eq!(malformed, 1);
}

#[test]
fn test_invalid_unicode_escape_keeps_earlier_fields() {
  let (records, malformed) =
    decode_all(r#"{"time":"1","v":"\u12x4","w":"x"}{"time":"2"}"#);

  assert_eq!(records.len(), 2);
  assert_eq!(records[0], RawRecord::new().with("time", "1"));
  assert_eq!(records[1].get("time"), Some(&string("2")));
  assert_eq!(malformed, 1);
}

#[test]
fn test_unicode_escapes_and_surrogate_pairs() {
  let (records, _) = decode_all(r#"{"s":"\u00e9\ud83d\ude00"}"#);
  assert_eq!(records[0].get("s"), Some(&string("é😀")));
}

#[test]
fn test_invalid_number_is_malformed() {
  let (records, malformed) = decode_all(r#"{"time":"1","n":01}{"time":"2"}"#);

  assert_eq!(records.len(), 2);
  assert_eq!(records[0], RawRecord::new().with("time", "1"));
  assert_eq!(malformed, 1);
}
