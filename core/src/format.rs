//! The response formatter: renders an `Outcome` or an `Error` into the exact
//! wire text the protocol expects. This module owns every quoting decision;
//! nothing upstream pre-quotes a string.

use crate::command::Outcome;
use crate::error::{CResult, Error};
use crate::value::Value;

fn needs_quoting(s: &str) -> bool {
    s.contains(' ')
        || s.bytes().all(|b| b.is_ascii_digit()) && !s.is_empty()
        || matches!(s, "TRUE" | "FALSE" | "NIL")
        || s.contains('"')
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\\\""))
}

/// Renders a single `Value` using the wire's quoting rules: quote whenever a
/// bare token would otherwise be ambiguous with another type.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Nil => "NIL".to_string(),
        Value::Boolean(true) => "TRUE".to_string(),
        Value::Boolean(false) => "FALSE".to_string(),
        Value::Integer(n) => n.to_string(),
        Value::String(s) if needs_quoting(s) => quote(s),
        Value::String(s) => s.clone(),
    }
}

/// Renders the successful outcome of one command.
pub fn format_success(outcome: &Outcome) -> String {
    match outcome {
        Outcome::SetResult { old, new } => {
            format!("{} {}", render_value(old), render_value(new))
        }
        Outcome::Ok => "OK".to_string(),
        Outcome::Value(value) => render_value(value),
    }
}

/// Renders `ERR "<message>"`, escaping inner quotes the same way value
/// strings are escaped.
pub fn format_error(err: &Error) -> String {
    format!("ERR {}", quote(&err.to_string()))
}

/// The single entry point transports call: renders whichever branch of the
/// `Result` executing a command produced.
pub fn format(result: &CResult<Outcome>) -> String {
    match result {
        Ok(outcome) => format_success(outcome),
        Err(err) => format_error(err),
    }
}
