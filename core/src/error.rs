//! Error type shared by every component of the core: the value model, the
//! storage engine, the transaction engine, the command processor, and the
//! response formatter all return `CResult<T>`.
//!
//! `Display` renders the exact message text the wire protocol expects (see
//! `crate::format`), so a caller never has to special-case how an error
//! prints versus how it is wrapped in `ERR "..."`.

use std::fmt;

pub type CResult<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// Empty input, an unknown verb, or the wrong number of tokens.
    InvalidCommand,
    /// `key` failed `parse_key`'s validation rules.
    InvalidKey(String),
    /// `SET key NIL`.
    NilValue,
    /// A value token started with `"` but never found a closing quote.
    UnclosedString,
    /// `BEGIN` while already in a transaction.
    AlreadyInTransaction,
    /// `COMMIT` with no transaction active for the client.
    NoTransaction,
    /// `ROLLBACK` with no transaction active for the client.
    NoActiveTransaction,
    /// Commit-time read-set validation failed on the named key.
    AtomicityFailure(String),
    /// The store or a transaction file could not be read or written.
    Io(std::io::Error),
    /// The on-disk map or transaction record could not be (de)serialized.
    Serialization(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidCommand => write!(f, "Invalid command"),
            Error::InvalidKey(key) => write!(f, "Value {key} is not valid as key"),
            Error::NilValue => write!(f, "Cannot SET key to NIL"),
            Error::UnclosedString => write!(f, "Unclosed string"),
            Error::AlreadyInTransaction => write!(f, "Already in transaction"),
            Error::NoTransaction => write!(f, "no_transaction"),
            Error::NoActiveTransaction => write!(f, "No active transaction"),
            Error::AtomicityFailure(key) => write!(f, "Atomicity failure ({key})"),
            Error::Io(err) => write!(f, "{err}"),
            Error::Serialization(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<Box<bincode::ErrorKind>> for Error {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        Error::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn renders_the_exact_wire_messages() {
        assert_eq!(Error::InvalidCommand.to_string(), "Invalid command");
        assert_eq!(
            Error::InvalidKey("123".into()).to_string(),
            "Value 123 is not valid as key"
        );
        assert_eq!(Error::NilValue.to_string(), "Cannot SET key to NIL");
        assert_eq!(Error::UnclosedString.to_string(), "Unclosed string");
        assert_eq!(
            Error::AlreadyInTransaction.to_string(),
            "Already in transaction"
        );
        assert_eq!(Error::NoTransaction.to_string(), "no_transaction");
        assert_eq!(
            Error::NoActiveTransaction.to_string(),
            "No active transaction"
        );
        assert_eq!(
            Error::AtomicityFailure("atomic_key".into()).to_string(),
            "Atomicity failure (atomic_key)"
        );
    }
}
