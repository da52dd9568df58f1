//! # Record Decoding
//!
//! The writer pulls records through the [`RecordDecoder`] trait, one at a
//! time, until end of input. Two implementations are provided:
//!
//! - [`JsonRecordDecoder`]: lazily decodes concatenated JSON objects from any
//!   [`Read`], recovering from malformed records where it can.
//! - [`RecordIter`]: adapts an iterator of already decoded [`RawRecord`]s.
//!
//! ## Recovery
//!
//! When a syntax error occurs inside an object, the fields read so far are
//! kept. The decoder then consumes tokens until every object and array that
//! was open at the error point has been closed, and hands back the partial
//! record. Garbage between top-level objects is skipped. Both cases count
//! towards [`RecordDecoder::malformed_records`].
//!
//! Decoding fails with [`IngestError::Parse`] only when no further record
//! boundary can be found: the input ends while resynchronising, or the error
//! budget for a single resynchronisation is exhausted.

use crate::error::{IngestError, Result};
use crate::value::{FieldValue, RawRecord};
use std::collections::BTreeMap;
use std::io::{self, BufReader, Read};
use tracing::{error, warn};

/// Source of decoded records for a write session.
pub trait RecordDecoder {
  /// Returns the next record, `Ok(None)` at end of input, or a fatal error.
  fn next_record(&mut self) -> Result<Option<RawRecord>>;

  /// Number of malformed units skipped or truncated so far.
  fn malformed_records(&self) -> u64 {
    0
  }
}

/// Decoder over an iterator of already decoded records.
#[derive(Debug, Clone)]
pub struct RecordIter<I> {
  inner: I,
}

impl<I> RecordIter<I>
where
  I: Iterator<Item = RawRecord>,
{
  /// Wraps an iterator of records.
  pub fn new(inner: impl IntoIterator<IntoIter = I>) -> Self {
    Self {
      inner: inner.into_iter(),
    }
  }
}

impl<I> RecordDecoder for RecordIter<I>
where
  I: Iterator<Item = RawRecord>,
{
  fn next_record(&mut self) -> Result<Option<RawRecord>> {
    Ok(self.inner.next())
  }
}

const DEFAULT_MAX_PARSE_ERRORS: usize = 100;

#[derive(Debug, Clone, PartialEq)]
enum Token {
  ObjectStart,
  ObjectEnd,
  ArrayStart,
  ArrayEnd,
  Colon,
  Comma,
  Str(String),
  Num(String),
  Bool(bool),
  Null,
}

impl Token {
  /// Nesting change caused by this token.
  fn depth_delta(&self) -> i64 {
    match self {
      Token::ObjectStart | Token::ArrayStart => 1,
      Token::ObjectEnd | Token::ArrayEnd => -1,
      _ => 0,
    }
  }
}

#[derive(Debug)]
enum LexError {
  Io(io::Error),
  Syntax { offset: u64, message: String },
}

type Lexed = std::result::Result<Option<Token>, LexError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObjectState {
  KeyOrEnd,
  Key,
  Colon,
  Value,
  CommaOrEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArrayState {
  ValueOrEnd,
  Value,
  CommaOrEnd,
}

#[derive(Debug)]
enum Frame {
  Object {
    map: BTreeMap<String, FieldValue>,
    key: Option<String>,
    state: ObjectState,
  },
  Array {
    items: Vec<FieldValue>,
    state: ArrayState,
  },
}

impl Frame {
  fn object() -> Self {
    Frame::Object {
      map: BTreeMap::new(),
      key: None,
      state: ObjectState::KeyOrEnd,
    }
  }

  fn array() -> Self {
    Frame::Array {
      items: Vec::new(),
      state: ArrayState::ValueOrEnd,
    }
  }

  fn expects_value(&self) -> bool {
    match self {
      Frame::Object { state, .. } => *state == ObjectState::Value,
      Frame::Array { state, .. } => matches!(state, ArrayState::Value | ArrayState::ValueOrEnd),
    }
  }

  /// Stores a completed child value. Returns `false` if the frame had no slot for it.
  fn attach(&mut self, value: FieldValue) -> bool {
    match self {
      Frame::Object { map, key, state } => match key.take() {
        Some(k) => {
          map.insert(k, value);
          *state = ObjectState::CommaOrEnd;
          true
        }
        None => false,
      },
      Frame::Array { items, state } => {
        items.push(value);
        *state = ArrayState::CommaOrEnd;
        true
      }
    }
  }

  fn into_value(self) -> FieldValue {
    match self {
      Frame::Object { map, .. } => FieldValue::Object(map),
      Frame::Array { items, .. } => FieldValue::Array(items),
    }
  }
}

/// Result of feeding one token to the frame stack.
enum Step {
  Continue,
  Complete(BTreeMap<String, FieldValue>),
  Unexpected(Token),
}

/// Lazily decodes a stream of concatenated JSON objects.
///
/// # Example
///
/// ```rust
/// use ingestweave::decode::{JsonRecordDecoder, RecordDecoder};
///
/// let input = br#"{"time":"1","value":"1.0"} {"time":"2","value":"2.0"}"#;
/// let mut decoder = JsonRecordDecoder::new(&input[..]);
/// let first = decoder.next_record().unwrap().unwrap();
/// assert_eq!(first.len(), 2);
/// ```
pub struct JsonRecordDecoder<R: Read> {
  bytes: io::Bytes<BufReader<R>>,
  peeked: Option<u8>,
  offset: u64,
  max_parse_errors: usize,
  malformed: u64,
}

impl<R: Read> JsonRecordDecoder<R> {
  /// Creates a decoder reading from `reader`.
  pub fn new(reader: R) -> Self {
    Self {
      bytes: BufReader::new(reader).bytes(),
      peeked: None,
      offset: 0,
      max_parse_errors: DEFAULT_MAX_PARSE_ERRORS,
      malformed: 0,
    }
  }

  /// Sets how many token errors one resynchronisation may absorb.
  pub fn with_max_parse_errors(mut self, max_parse_errors: usize) -> Self {
    self.max_parse_errors = max_parse_errors.max(1);
    self
  }

  /// Bytes consumed so far.
  pub fn offset(&self) -> u64 {
    self.offset
  }

  fn peek_byte(&mut self) -> io::Result<Option<u8>> {
    if self.peeked.is_none() {
      self.peeked = self.bytes.next().transpose()?;
    }
    Ok(self.peeked)
  }

  fn next_byte(&mut self) -> io::Result<Option<u8>> {
    let byte = match self.peeked.take() {
      Some(b) => Some(b),
      None => self.bytes.next().transpose()?,
    };
    if byte.is_some() {
      self.offset += 1;
    }
    Ok(byte)
  }

  fn syntax(&self, message: impl Into<String>) -> LexError {
    LexError::Syntax {
      offset: self.offset,
      message: message.into(),
    }
  }

  fn next_token(&mut self) -> Lexed {
    loop {
      match self.peek_byte().map_err(LexError::Io)? {
        Some(b) if b.is_ascii_whitespace() => {
          self.next_byte().map_err(LexError::Io)?;
        }
        Some(_) => break,
        None => return Ok(None),
      }
    }

    let Some(byte) = self.next_byte().map_err(LexError::Io)? else {
      return Ok(None);
    };
    let token = match byte {
      b'{' => Token::ObjectStart,
      b'}' => Token::ObjectEnd,
      b'[' => Token::ArrayStart,
      b']' => Token::ArrayEnd,
      b':' => Token::Colon,
      b',' => Token::Comma,
      b'"' => Token::Str(self.lex_string()?),
      b'-' | b'0'..=b'9' => Token::Num(self.lex_number(byte)?),
      b if b.is_ascii_alphabetic() => self.lex_literal(byte)?,
      other => {
        return Err(self.syntax(format!(
          "unexpected character '{}'",
          char::from(other).escape_default()
        )))
      }
    };
    Ok(Some(token))
  }

  /// Reads a string literal through its closing quote, then decodes it.
  ///
  /// A bad escape is reported only after the closing quote has been consumed,
  /// so recovery resumes at the token that follows the string.
  fn lex_string(&mut self) -> std::result::Result<String, LexError> {
    let mut raw = vec![b'"'];
    loop {
      let Some(byte) = self.next_byte().map_err(LexError::Io)? else {
        return Err(self.syntax("unterminated string"));
      };
      raw.push(byte);
      match byte {
        b'"' => break,
        b'\\' => {
          let Some(escaped) = self.next_byte().map_err(LexError::Io)? else {
            return Err(self.syntax("unterminated string"));
          };
          raw.push(escaped);
        }
        _ => {}
      }
    }
    serde_json::from_slice::<String>(&raw)
      .map_err(|e| self.syntax(format!("invalid string literal: {}", e)))
  }

  fn lex_number(&mut self, first: u8) -> std::result::Result<String, LexError> {
    let mut text = String::from(char::from(first));
    while let Some(b) = self.peek_byte().map_err(LexError::Io)? {
      if b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-') {
        text.push(char::from(b));
        self.next_byte().map_err(LexError::Io)?;
      } else {
        break;
      }
    }
    if serde_json::from_str::<serde_json::Number>(&text).is_err() {
      return Err(self.syntax(format!("invalid number '{}'", text)));
    }
    Ok(text)
  }

  fn lex_literal(&mut self, first: u8) -> std::result::Result<Token, LexError> {
    let mut text = String::from(char::from(first));
    while let Some(b) = self.peek_byte().map_err(LexError::Io)? {
      if b.is_ascii_alphabetic() {
        text.push(char::from(b));
        self.next_byte().map_err(LexError::Io)?;
      } else {
        break;
      }
    }
    match text.as_str() {
      "true" => Ok(Token::Bool(true)),
      "false" => Ok(Token::Bool(false)),
      "null" => Ok(Token::Null),
      _ => Err(self.syntax(format!("unrecognized literal '{}'", text))),
    }
  }

  fn feed(stack: &mut Vec<Frame>, token: Token) -> Step {
    let Some(top) = stack.last_mut() else {
      return Step::Unexpected(token);
    };

    if top.expects_value() {
      let value = match token {
        Token::ObjectStart => {
          stack.push(Frame::object());
          return Step::Continue;
        }
        Token::ArrayStart => {
          stack.push(Frame::array());
          return Step::Continue;
        }
        Token::Str(s) => FieldValue::String(s),
        Token::Num(n) => FieldValue::Number(n),
        Token::Bool(b) => FieldValue::Bool(b),
        Token::Null => FieldValue::Null,
        Token::ArrayEnd
          if matches!(
            top,
            Frame::Array {
              state: ArrayState::ValueOrEnd,
              ..
            }
          ) =>
        {
          return Self::close(stack);
        }
        other => return Step::Unexpected(other),
      };
      top.attach(value);
      return Step::Continue;
    }

    match top {
      Frame::Object { key, state, .. } => match (*state, token) {
        (ObjectState::KeyOrEnd | ObjectState::Key, Token::Str(k)) => {
          *key = Some(k);
          *state = ObjectState::Colon;
          Step::Continue
        }
        (ObjectState::Colon, Token::Colon) => {
          *state = ObjectState::Value;
          Step::Continue
        }
        (ObjectState::CommaOrEnd, Token::Comma) => {
          *state = ObjectState::Key;
          Step::Continue
        }
        (ObjectState::KeyOrEnd | ObjectState::CommaOrEnd, Token::ObjectEnd) => Self::close(stack),
        (_, other) => Step::Unexpected(other),
      },
      Frame::Array { state, .. } => match (*state, token) {
        (ArrayState::CommaOrEnd, Token::Comma) => {
          *state = ArrayState::Value;
          Step::Continue
        }
        (ArrayState::CommaOrEnd, Token::ArrayEnd) => Self::close(stack),
        (_, other) => Step::Unexpected(other),
      },
    }
  }

  /// Pops the top frame and hands its value to the parent.
  fn close(stack: &mut Vec<Frame>) -> Step {
    let Some(frame) = stack.pop() else {
      return Step::Continue;
    };
    match stack.last_mut() {
      Some(parent) => {
        parent.attach(frame.into_value());
        Step::Continue
      }
      None => match frame.into_value() {
        FieldValue::Object(map) => Step::Complete(map),
        _ => Step::Complete(BTreeMap::new()),
      },
    }
  }

  /// Collapses a partially read frame stack into the root mapping.
  fn fold(mut stack: Vec<Frame>) -> BTreeMap<String, FieldValue> {
    while let Some(frame) = stack.pop() {
      match stack.last_mut() {
        Some(parent) => {
          parent.attach(frame.into_value());
        }
        None => {
          if let FieldValue::Object(map) = frame.into_value() {
            return map;
          }
        }
      }
    }
    BTreeMap::new()
  }

  /// Consumes tokens until `depth` open containers have been closed.
  fn resynchronise(&mut self, mut depth: i64, first_error: String) -> Result<()> {
    let mut errors = 1usize;
    warn!(
      offset = self.offset,
      error = %first_error,
      "attempting to recover from malformed JSON data"
    );
    while depth > 0 {
      match self.next_token() {
        Ok(Some(token)) => depth += token.depth_delta(),
        Ok(None) => {
          error!(offset = self.offset, "failed to recover from malformed JSON data");
          return Err(IngestError::parse(
            self.offset,
            "end of input while resynchronising to the next record",
          ));
        }
        Err(LexError::Io(e)) => return Err(IngestError::Io(e)),
        Err(LexError::Syntax { .. }) => {
          errors += 1;
          if errors > self.max_parse_errors {
            error!(
              offset = self.offset,
              errors, "failed to recover from malformed JSON data"
            );
            return Err(IngestError::parse(
              self.offset,
              format!("gave up after {} consecutive parse errors", errors),
            ));
          }
        }
      }
    }
    Ok(())
  }

  fn read_object(&mut self) -> Result<RawRecord> {
    let mut stack = vec![Frame::object()];
    loop {
      let failure = match self.next_token() {
        Ok(Some(token)) => match Self::feed(&mut stack, token) {
          Step::Continue => continue,
          Step::Complete(map) => return Ok(RawRecord::from(map)),
          Step::Unexpected(token) => {
            let depth = stack.len() as i64 + token.depth_delta();
            (depth, format!("unexpected token {:?}", token))
          }
        },
        Ok(None) => {
          error!(offset = self.offset, "input ended inside a record");
          return Err(IngestError::parse(self.offset, "unexpected end of input inside a record"));
        }
        Err(LexError::Io(e)) => return Err(IngestError::Io(e)),
        Err(LexError::Syntax { offset, message }) => {
          (stack.len() as i64, format!("{} at byte {}", message, offset))
        }
      };

      let (depth, message) = failure;
      self.resynchronise(depth, message)?;
      self.malformed += 1;
      return Ok(RawRecord::from(Self::fold(stack)));
    }
  }
}

impl<R: Read> RecordDecoder for JsonRecordDecoder<R> {
  fn next_record(&mut self) -> Result<Option<RawRecord>> {
    let mut skipping = false;
    loop {
      match self.next_token() {
        Ok(Some(Token::ObjectStart)) => {
          if skipping {
            self.malformed += 1;
          }
          return self.read_object().map(Some);
        }
        Ok(Some(_)) | Err(LexError::Syntax { .. }) => {
          if !skipping {
            warn!(offset = self.offset, "skipping data outside of a JSON object");
          }
          skipping = true;
        }
        Ok(None) => {
          if skipping {
            self.malformed += 1;
          }
          return Ok(None);
        }
        Err(LexError::Io(e)) => return Err(IngestError::Io(e)),
      }
    }
  }

  fn malformed_records(&self) -> u64 {
    self.malformed
  }
}
