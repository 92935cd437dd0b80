//! The typed value model: `Value`, `Key`, and the parsing rules that give the
//! protocol its meaning. `crate::format` renders the same types back out, and
//! deliberately shares no logic with this module beyond the `Value` type
//! itself — see the module doc there for why.

use serde_derive::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CResult, Error};

/// A tagged union over the four value kinds the protocol knows about. `Nil`
/// is a sentinel: `parse_value` refuses to produce it from a `SET`, but it is
/// a legitimate `GET` result for a missing key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Integer(i64),
    Boolean(bool),
    String(String),
    Nil,
}

/// A validated key: a UTF-8 string that is neither a bare decimal-digit run
/// nor one of the reserved tokens `TRUE`/`FALSE`/`NIL`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Key(String);

impl Key {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Deref for Key {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}

fn is_decimal_digit_run(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_reserved_token(s: &str) -> bool {
    matches!(s, "TRUE" | "FALSE" | "NIL")
}

/// Validates `text` as a key: rejects `^[0-9]+$` and the reserved tokens
/// `TRUE`/`FALSE`/`NIL`; everything else is accepted.
pub fn parse_key(text: &str) -> CResult<Key> {
    if is_decimal_digit_run(text) || is_reserved_token(text) {
        return Err(Error::InvalidKey(text.to_string()));
    }
    Ok(Key(text.to_string()))
}

/// Parses a value token in priority order: `NIL` is rejected, `TRUE`/`FALSE`
/// become booleans, a bare digit run becomes an integer, a leading `"`
/// requires a matching trailing `"` (stripped and unescaped), and anything
/// else is a raw string.
pub fn parse_value(text: &str) -> CResult<Value> {
    if text == "NIL" {
        return Err(Error::NilValue);
    }
    if text == "TRUE" {
        return Ok(Value::Boolean(true));
    }
    if text == "FALSE" {
        return Ok(Value::Boolean(false));
    }
    if is_decimal_digit_run(text) {
        // Canonicalized through i64 parsing; a digit run this long is not a
        // realistic input, but an overflow should still be a clean error
        // rather than a panic.
        let n: i64 = text
            .parse()
            .map_err(|_| Error::Serialization(format!("integer literal out of range: {text}")))?;
        return Ok(Value::Integer(n));
    }
    if let Some(rest) = text.strip_prefix('"') {
        if rest.ends_with('"') && rest.len() >= 1 {
            let inner = &rest[..rest.len() - 1];
            return Ok(Value::String(inner.replace("\\\"", "\"")));
        }
        return Err(Error::UnclosedString);
    }
    Ok(Value::String(text.to_string()))
}
