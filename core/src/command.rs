//! The command processor: tokenizes a command line, validates it against
//! the value model, and dispatches to the transaction engine or the storage
//! engine.

use crate::error::{CResult, Error};
use crate::transaction::TransactionEngine;
use crate::value::{self, Value};

/// The typed result of executing one command: either a SET's before/after
/// pair, a single value (GET, including `Nil` for a miss), or the literal
/// `"OK"` that BEGIN/COMMIT/ROLLBACK return.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    SetResult { old: Value, new: Value },
    Value(Value),
    Ok,
}

/// Splits `text` into at most three tokens on the first two ASCII spaces,
/// so that `SET k "hello world"` tokenizes as `["SET", "k", "\"hello
/// world\""]` — the third token is handed to the value parser unchanged.
fn tokenize(text: &str) -> Vec<&str> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let mut tokens = Vec::with_capacity(3);
    let mut rest = text;
    for _ in 0..2 {
        match rest.find(' ') {
            Some(idx) => {
                tokens.push(&rest[..idx]);
                rest = &rest[idx + 1..];
            }
            None => break,
        }
    }
    tokens.push(rest);
    tokens
}

/// Parses `text` and executes it against `engine` on behalf of `client`,
/// exactly the two-call interface external transports use
/// (`parse_and_execute` / `crate::format::format`).
pub fn parse_and_execute(engine: &TransactionEngine, text: &str, client: &str) -> CResult<Outcome> {
    let tokens = tokenize(text);

    match tokens.as_slice() {
        ["SET", key, val] => {
            let key = value::parse_key(key)?;
            let new_value = value::parse_value(val)?;
            let (old, new) = if engine.in_transaction(client) {
                engine.set(client, key.as_str(), new_value)?
            } else {
                engine.storage().set(key.as_str(), new_value)?
            };
            Ok(Outcome::SetResult {
                old: old.unwrap_or(Value::Nil),
                new,
            })
        }
        ["GET", key] => {
            let key = value::parse_key(key)?;
            let found = if engine.in_transaction(client) {
                engine.get(client, key.as_str())?
            } else {
                engine.storage().get(key.as_str())?
            };
            Ok(Outcome::Value(found.unwrap_or(Value::Nil)))
        }
        ["BEGIN"] => {
            engine.begin(client)?;
            Ok(Outcome::Ok)
        }
        ["COMMIT"] => {
            engine.commit(client)?;
            Ok(Outcome::Ok)
        }
        ["ROLLBACK"] => {
            engine.rollback(client)?;
            Ok(Outcome::Ok)
        }
        _ => Err(Error::InvalidCommand),
    }
}
