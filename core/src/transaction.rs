//! The transaction engine: per-client read/write sets, persisted on disk,
//! with optimistic read-set validation at commit rather than full MVCC —
//! a transaction only ever conflicts with writes to keys it actually read.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_derive::{Deserialize, Serialize};

use crate::error::{CResult, Error};
use crate::storage::Storage;
use crate::value::Value;

/// One client's transaction record: the values observed at first read, the
/// pending writes, and a reserved (never populated) pre-image map for a
/// future rollback-to-snapshot feature.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub reads: HashMap<String, Option<Value>>,
    pub writes: HashMap<String, Value>,
    pub original_values: HashMap<String, Option<Value>>,
}

/// Coordinates per-client transaction state against a single `Storage`.
/// Active records live in memory, guarded by a mutex, and are mirrored to
/// `transactions/<client-id>.transaction` after every mutating operation so
/// a restart can recover which clients were mid-transaction.
pub struct TransactionEngine {
    storage: Storage,
    dir: PathBuf,
    active: Mutex<HashMap<String, TransactionRecord>>,
}

impl TransactionEngine {
    /// Opens the transaction engine over `storage`, recovering any
    /// previously persisted per-client records from `dir`.
    pub fn open(storage: Storage, dir: impl AsRef<Path>) -> CResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut active = HashMap::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("transaction") {
                continue;
            }
            let Some(client) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let bytes = fs::read(&path)?;
            match bincode::deserialize::<TransactionRecord>(&bytes) {
                Ok(record) => {
                    active.insert(client.to_string(), record);
                }
                Err(err) => {
                    log::warn!("dropping unreadable transaction record for {client}: {err}");
                }
            }
        }

        Ok(Self {
            storage,
            dir,
            active: Mutex::new(active),
        })
    }

    fn record_path(&self, client: &str) -> PathBuf {
        self.dir.join(format!("{client}.transaction"))
    }

    fn persist(&self, client: &str, record: &TransactionRecord) -> CResult<()> {
        let bytes = bincode::serialize(record)?;
        fs::write(self.record_path(client), bytes)?;
        Ok(())
    }

    fn remove_persisted(&self, client: &str) -> CResult<()> {
        match fs::remove_file(self.record_path(client)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// `true` iff `client` currently has an active transaction.
    pub fn in_transaction(&self, client: &str) -> bool {
        self.active.lock().unwrap().contains_key(client)
    }

    pub fn begin(&self, client: &str) -> CResult<()> {
        let mut active = self.active.lock().unwrap();
        if active.contains_key(client) {
            return Err(Error::AlreadyInTransaction);
        }
        active.insert(client.to_string(), TransactionRecord::default());
        drop(active);
        self.persist(client, &TransactionRecord::default())
    }

    /// Reads `key` within `client`'s transaction: returns the pending write
    /// if there is one, otherwise reads through to storage and records the
    /// observed value as the first-read snapshot (unless that key was
    /// already written by this transaction).
    pub fn get(&self, client: &str, key: &str) -> CResult<Option<Value>> {
        let mut active = self.active.lock().unwrap();
        let record = active.get_mut(client).ok_or(Error::NoTransaction)?;

        if let Some(value) = record.writes.get(key) {
            return Ok(Some(value.clone()));
        }

        if !record.reads.contains_key(key) {
            let observed = self.storage.get(key)?;
            record.reads.insert(key.to_string(), observed.clone());
            let snapshot = record.clone();
            drop(active);
            self.persist(client, &snapshot)?;
            return Ok(observed);
        }

        Ok(record.reads.get(key).cloned().flatten())
    }

    /// Records a pending write within `client`'s transaction. `old` is the
    /// value currently committed in storage, read fresh — not the
    /// transaction's own read or write set.
    pub fn set(&self, client: &str, key: &str, value: Value) -> CResult<(Option<Value>, Value)> {
        let old = self.storage.get(key)?;

        let mut active = self.active.lock().unwrap();
        let record = active.get_mut(client).ok_or(Error::NoTransaction)?;
        record.writes.insert(key.to_string(), value.clone());
        let snapshot = record.clone();
        drop(active);

        self.persist(client, &snapshot)?;
        Ok((old, value))
    }

    /// Validates the read set against the current committed state; if every
    /// observed key still matches, applies the write set and destroys the
    /// transaction record. On validation failure the record is *retained*
    /// so the client must explicitly `ROLLBACK` rather than losing its
    /// pending writes to an implicit retry.
    pub fn commit(&self, client: &str) -> CResult<()> {
        let record = {
            let active = self.active.lock().unwrap();
            active.get(client).cloned().ok_or(Error::NoTransaction)?
        };

        for (key, observed) in &record.reads {
            let current = self.storage.get(key)?;
            if &current != observed {
                return Err(Error::AtomicityFailure(key.clone()));
            }
        }

        for (key, value) in record.writes {
            self.storage.set(&key, value)?;
        }

        self.active.lock().unwrap().remove(client);
        self.remove_persisted(client)
    }

    pub fn rollback(&self, client: &str) -> CResult<()> {
        let mut active = self.active.lock().unwrap();
        if active.remove(client).is_none() {
            return Err(Error::NoActiveTransaction);
        }
        drop(active);
        self.remove_persisted(client)
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn engine() -> (tempfile::TempDir, TransactionEngine) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path().join("store")).unwrap();
        let engine = TransactionEngine::open(storage, dir.path().join("transactions")).unwrap();
        (dir, engine)
    }

    #[test]
    fn begin_twice_fails() {
        let (_dir, engine) = engine();
        engine.begin("a").unwrap();
        assert!(matches!(engine.begin("a"), Err(Error::AlreadyInTransaction)));
    }

    #[test]
    fn commit_without_transaction_fails() {
        let (_dir, engine) = engine();
        assert!(matches!(engine.commit("a"), Err(Error::NoTransaction)));
    }

    #[test]
    fn rollback_without_transaction_fails() {
        let (_dir, engine) = engine();
        assert!(matches!(engine.rollback("a"), Err(Error::NoActiveTransaction)));
    }

    #[test]
    fn writes_are_visible_to_their_own_transaction_before_commit() {
        let (_dir, engine) = engine();
        engine.begin("a").unwrap();
        engine.set("a", "k", Value::Integer(1)).unwrap();
        assert_eq!(engine.get("a", "k").unwrap(), Some(Value::Integer(1)));
    }

    #[test]
    fn commit_makes_writes_visible_outside_the_transaction() {
        let (_dir, engine) = engine();
        engine.begin("a").unwrap();
        engine.set("a", "k", Value::Integer(1)).unwrap();
        assert_eq!(engine.storage().get("k").unwrap(), None);
        engine.commit("a").unwrap();
        assert_eq!(engine.storage().get("k").unwrap(), Some(Value::Integer(1)));
        assert!(!engine.in_transaction("a"));
    }

    #[test]
    fn concurrent_writer_invalidates_a_read_set_member() {
        let (_dir, engine) = engine();
        engine.storage().set("k", Value::String("initial".into())).unwrap();

        engine.begin("a").unwrap();
        assert_eq!(
            engine.get("a", "k").unwrap(),
            Some(Value::String("initial".into()))
        );

        // Client B writes directly to storage, simulating a non-transactional commit.
        engine.storage().set("k", Value::String("modified".into())).unwrap();

        match engine.commit("a") {
            Err(Error::AtomicityFailure(key)) => assert_eq!(key, "k"),
            other => panic!("expected atomicity failure, got {other:?}"),
        }
        // The record survives a failed commit; the client must roll back explicitly.
        assert!(engine.in_transaction("a"));
        engine.rollback("a").unwrap();
        assert!(!engine.in_transaction("a"));
    }

    #[test]
    fn disjoint_concurrent_transactions_both_succeed() {
        let (_dir, engine) = engine();
        engine.begin("a").unwrap();
        engine.begin("b").unwrap();
        engine.set("a", "k1", Value::Integer(1)).unwrap();
        engine.set("b", "k2", Value::Integer(2)).unwrap();
        engine.commit("a").unwrap();
        engine.commit("b").unwrap();
        assert_eq!(engine.storage().get("k1").unwrap(), Some(Value::Integer(1)));
        assert_eq!(engine.storage().get("k2").unwrap(), Some(Value::Integer(2)));
    }

    #[test]
    fn transaction_records_survive_reopening_the_engine() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path().join("store")).unwrap();
        {
            let engine =
                TransactionEngine::open(storage, dir.path().join("transactions")).unwrap();
            engine.begin("a").unwrap();
            engine.set("a", "k", Value::Integer(1)).unwrap();
        }

        let storage = Storage::open(dir.path().join("store")).unwrap();
        let reopened = TransactionEngine::open(storage, dir.path().join("transactions")).unwrap();
        assert!(reopened.in_transaction("a"));
        assert_eq!(reopened.get("a", "k").unwrap(), Some(Value::Integer(1)));
    }
}
