//! The durable storage engine: a single binary file holding a
//! `bincode`-serialized `HashMap<String, Value>`, guarded by a sentinel-file
//! lock: exclusive acquisition is a create-if-not-exists on a lock file
//! living alongside the data file, not an OS advisory lock.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{CResult, Error};
use crate::value::Value;

const LOCK_BACKOFF: Duration = Duration::from_millis(10);
const LOCK_WARN_AFTER: Duration = Duration::from_secs(1);

/// A durable key/value store backed by a single file, with exclusive access
/// enforced by a sentinel lock file living alongside it.
pub struct Storage {
    data_path: PathBuf,
    lock_path: PathBuf,
}

impl Storage {
    /// Opens (or creates the directory for) a store rooted at `dir`. Does
    /// not touch the data file until the first operation.
    pub fn open(dir: impl AsRef<Path>) -> CResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        Ok(Self {
            data_path: dir.join("storage.dat"),
            lock_path: dir.join("storage.lock"),
        })
    }

    /// Acquires the sentinel lock, runs `f` with the whole-store map, writes
    /// the (possibly mutated) map back, and releases the lock on every exit
    /// path (success, error, or panic unwind via the guard's `Drop`).
    fn with_exclusive_map<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, Value>) -> CResult<T>,
    ) -> CResult<T> {
        let _guard = self.acquire_lock();
        let mut map = self.read_map();
        let result = f(&mut map)?;
        self.write_map(&map)?;
        Ok(result)
    }

    /// Acquires the sentinel lock, runs `f` with a read-only view of the
    /// map, and releases the lock without ever rewriting `storage.dat` — a
    /// lookup can never fail with a write I/O error, and it never disturbs
    /// the data file's mtime or inode.
    fn with_shared_map<T>(&self, f: impl FnOnce(&HashMap<String, Value>) -> T) -> T {
        let _guard = self.acquire_lock();
        let map = self.read_map();
        f(&map)
    }

    fn acquire_lock(&self) -> LockGuard<'_> {
        let start = Instant::now();
        let mut warned = false;
        loop {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.lock_path)
            {
                Ok(_) => return LockGuard { path: &self.lock_path },
                Err(_) => {
                    if !warned && start.elapsed() > LOCK_WARN_AFTER {
                        log::warn!(
                            "storage lock at {:?} has been held for over {:?}; a prior holder \
                             may have crashed without releasing it",
                            self.lock_path,
                            LOCK_WARN_AFTER
                        );
                        warned = true;
                    }
                    thread::sleep(LOCK_BACKOFF);
                }
            }
        }
    }

    /// I/O failures on read are mapped to an empty store rather than
    /// propagated, so a missing or corrupt data file behaves like a fresh
    /// one instead of making every operation fail.
    fn read_map(&self) -> HashMap<String, Value> {
        match fs::read(&self.data_path) {
            Ok(bytes) if !bytes.is_empty() => bincode::deserialize(&bytes).unwrap_or_else(|err| {
                log::warn!("storage file is corrupt, treating as empty: {err}");
                HashMap::new()
            }),
            Ok(_) => HashMap::new(),
            Err(err) => {
                log::warn!("could not read storage file, treating as empty: {err}");
                HashMap::new()
            }
        }
    }

    /// Writes `map` so a crash never leaves `storage.dat` half-written: the
    /// new image lands in a sibling temp file first, then an atomic rename
    /// replaces the old one.
    fn write_map(&self, map: &HashMap<String, Value>) -> CResult<()> {
        let bytes = bincode::serialize(map)?;
        let tmp_path = self.data_path.with_extension("dat.tmp");
        fs::write(&tmp_path, bytes)?;
        fs::rename(&tmp_path, &self.data_path)?;
        Ok(())
    }

    /// Reads the current value for `key`, or `None` if it has never been set.
    pub fn get(&self, key: &str) -> CResult<Option<Value>> {
        Ok(self.with_shared_map(|map| map.get(key).cloned()))
    }

    /// Sets `key` to `value`, returning the previous value (if any) and the
    /// value just stored.
    pub fn set(&self, key: &str, value: Value) -> CResult<(Option<Value>, Value)> {
        self.with_exclusive_map(|map| {
            let old = map.insert(key.to_string(), value.clone());
            Ok((old, value))
        })
    }
}

struct LockGuard<'a> {
    path: &'a Path,
}

impl<'a> Drop for LockGuard<'a> {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(self.path) {
            log::error!("failed to release storage lock at {:?}: {err}", self.path);
        }
    }
}
