//! `txkv-core` is the core of a persistent, transactional key-value store
//! exposing a line-oriented text command protocol: the command lexer and
//! value-type model, the durable single-file storage engine, the per-client
//! optimistic-concurrency transaction engine, and the response formatter.
//!
//! This crate has no networking and no process supervision — a transport
//! (see the `txkv-server` binary in this workspace) is expected to read a
//! command line and a client id from the wire, call [`parse_and_execute`],
//! and hand the result to [`format`].
//!
//! ## Getting started
//!
//! ```rust
//! use tempfile::tempdir;
//! use txkv_core::{Database, format};
//!
//! let dir = tempdir().unwrap();
//! let db = Database::open(dir.path()).unwrap();
//!
//! let result = db.parse_and_execute("SET greeting \"hello world\"", "client-1");
//! assert_eq!(format(&result), "NIL \"hello world\"");
//!
//! let result = db.parse_and_execute("GET greeting", "client-1");
//! assert_eq!(format(&result), "\"hello world\"");
//! ```

pub mod command;
pub mod error;
pub mod format;
pub mod storage;
pub mod transaction;
pub mod value;

pub use command::{parse_and_execute, Outcome};
pub use error::{CResult, Error};
pub use format::format;
pub use storage::Storage;
pub use transaction::TransactionEngine;
pub use value::{parse_key, parse_value, Key, Value};

use std::path::Path;

/// A convenience facade bundling a [`Storage`] and the [`TransactionEngine`]
/// that sits in front of it, rooted at a single data directory. This is the
/// type most callers reach for; `Storage`/`TransactionEngine` remain public
/// for callers that want to wire the pieces together differently.
pub struct Database {
    engine: TransactionEngine,
}

impl Database {
    /// Opens a database rooted at `dir`, creating `storage.dat` and the
    /// `transactions/` subdirectory on first use.
    pub fn open(dir: impl AsRef<Path>) -> CResult<Self> {
        let dir = dir.as_ref();
        let storage = Storage::open(dir)?;
        let engine = TransactionEngine::open(storage, dir.join("transactions"))?;
        Ok(Self { engine })
    }

    /// Parses and executes one command line on behalf of `client`. This is
    /// the first of the two calls an external transport needs; the second
    /// is [`format`].
    pub fn parse_and_execute(&self, text: &str, client: &str) -> CResult<Outcome> {
        command::parse_and_execute(&self.engine, text, client)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn end_to_end_through_the_database_facade() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();

        let result = db.parse_and_execute("SET number_key 42", "c");
        assert_eq!(format(&result), "NIL 42");

        let result = db.parse_and_execute("GET number_key", "c");
        assert_eq!(format(&result), "42");

        let result = db.parse_and_execute("SET bool_key TRUE", "c");
        assert_eq!(format(&result), "NIL TRUE");
        let result = db.parse_and_execute("SET bool_key FALSE", "c");
        assert_eq!(format(&result), "TRUE FALSE");
    }

    #[test]
    fn atomicity_failure_on_a_conflicting_commit() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();

        assert_eq!(
            format(&db.parse_and_execute("SET atomic_key initial", "A")),
            "NIL initial"
        );
        assert_eq!(format(&db.parse_and_execute("BEGIN", "A")), "OK");
        assert_eq!(
            format(&db.parse_and_execute("GET atomic_key", "A")),
            "initial"
        );
        assert_eq!(
            format(&db.parse_and_execute("SET atomic_key modified", "B")),
            "initial modified"
        );
        assert_eq!(
            format(&db.parse_and_execute("COMMIT", "A")),
            "ERR \"Atomicity failure (atomic_key)\""
        );
    }

    #[test]
    fn invalid_key_nil_value_and_bare_commit_errors() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();

        assert_eq!(
            format(&db.parse_and_execute("SET 123 value", "c")),
            "ERR \"Value 123 is not valid as key\""
        );
        assert_eq!(
            format(&db.parse_and_execute("SET test_key NIL", "c")),
            "ERR \"Cannot SET key to NIL\""
        );
        assert_eq!(
            format(&db.parse_and_execute("COMMIT", "c")),
            "ERR \"no_transaction\""
        );
    }
}
