use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Where committed entries are written.
#[derive(Debug)]
enum Backend {
    /// Nothing survives the process.
    Memory,
    /// The whole map is rewritten to this JSON file on every commit.
    JsonFile(PathBuf),
}

#[derive(Debug)]
struct Inner {
    entries: BTreeMap<String, Value>,
    backend: Backend,
}

impl Inner {
    /// Apply staged writes and persist them. The in-memory map is only
    /// replaced once the backend has accepted the new state.
    fn commit(&mut self, staged: BTreeMap<String, Option<Value>>) -> Result<()> {
        let mut entries = self.entries.clone();
        for (key, value) in staged {
            match value {
                Some(value) => entries.insert(key, value),
                None => entries.remove(&key),
            };
        }
        if let Backend::JsonFile(path) = &self.backend {
            let tmp = path.with_extension("tmp");
            fs::write(&tmp, serde_json::to_vec_pretty(&entries)?)?;
            fs::rename(&tmp, path)?;
        }
        self.entries = entries;
        Ok(())
    }
}

/// A durable key-value store of JSON values.
///
/// All access goes through [`Store::transaction`], which holds the store lock
/// for the whole closure: reads see a consistent snapshot, and writes are
/// staged and only committed if the closure returns `Ok`.
#[derive(Debug, Clone)]
pub struct Store {
    inner: Arc<Mutex<Inner>>,
}

impl Store {
    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::with_backend(BTreeMap::new(), Backend::Memory)
    }

    /// Open (or create on first commit) a store backed by a JSON file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };
        debug!("Opened store {} with {} entries", path.display(), entries.len());
        Ok(Self::with_backend(entries, Backend::JsonFile(path)))
    }

    fn with_backend(entries: BTreeMap<String, Value>, backend: Backend) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner { entries, backend })),
        }
    }

    /// The file this store persists to, if any.
    pub fn path(&self) -> Option<PathBuf> {
        match &self.lock().backend {
            Backend::Memory => None,
            Backend::JsonFile(path) => Some(path.clone()),
        }
    }

    /// Run `f` as a single atomic transaction.
    pub fn transaction<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Txn<'_>) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let mut inner = self.lock();
        let mut txn = Txn {
            entries: &inner.entries,
            staged: BTreeMap::new(),
        };
        let output = f(&mut txn)?;
        let staged = txn.staged;
        if !staged.is_empty() {
            trace!("Committing {} staged writes", staged.len());
            inner.commit(staged)?;
        }
        Ok(output)
    }

    // A panic inside a transaction never leaves half-applied state behind,
    // since writes are staged, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A view of the store inside a transaction.
pub struct Txn<'a> {
    entries: &'a BTreeMap<String, Value>,
    staged: BTreeMap<String, Option<Value>>,
}

impl Txn<'_> {
    /// Read a raw value, seeing this transaction's own writes.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self.staged.get(key) {
            Some(staged) => staged.as_ref(),
            None => self.entries.get(key),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// All live keys starting with `prefix`, in order.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut keys: BTreeSet<&String> = self
            .entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key)
            .collect();
        for (key, value) in self.staged.range(prefix.to_string()..) {
            if !key.starts_with(prefix) {
                break;
            }
            if value.is_some() {
                keys.insert(key);
            } else {
                keys.remove(key);
            }
        }
        keys.into_iter().cloned().collect()
    }

    pub fn put(&mut self, key: impl Into<String>, value: Value) {
        self.staged.insert(key.into(), Some(value));
    }

    /// Remove a key, returning whether it existed.
    pub fn remove(&mut self, key: &str) -> bool {
        let existed = self.contains(key);
        if existed {
            self.staged.insert(key.to_string(), None);
        }
        existed
    }

    /// Read and deserialize a single value.
    pub fn get_value<V: DeserializeOwned>(&self, key: &str) -> Result<Option<V>> {
        self.get(key)
            .map(|value| V::deserialize(value).map_err(Error::from))
            .transpose()
    }

    /// Serialize and write a single value.
    pub fn set_value<V: Serialize + ?Sized>(&mut self, key: &str, value: &V) -> Result<()> {
        self.put(key, serde_json::to_value(value)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::testing::temp_store_path;

    #[test]
    fn writes_are_visible_inside_and_after() {
        let store = Store::in_memory();
        store
            .transaction(|txn| {
                txn.put("a", json!(1));
                assert_eq!(txn.get("a"), Some(&json!(1)));
                Ok::<_, Error>(())
            })
            .unwrap();
        let value: Option<i32> = store.transaction(|txn| txn.get_value("a")).unwrap();
        assert_eq!(value, Some(1));
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let store = Store::in_memory();
        store
            .transaction(|txn| txn.set_value("kept", &true))
            .unwrap();
        let result: Result<()> = store.transaction(|txn| {
            txn.put("lost", json!("x"));
            txn.remove("kept");
            Err(Error::NotFound("forced".into()))
        });
        assert!(result.is_err());
        store
            .transaction(|txn| {
                assert!(!txn.contains("lost"));
                assert!(txn.contains("kept"));
                Ok::<_, Error>(())
            })
            .unwrap();
    }

    #[test]
    fn prefix_scan_merges_staged_writes() {
        let store = Store::in_memory();
        store
            .transaction(|txn| {
                txn.put("vote_1", json!(1));
                txn.put("vote_2", json!(2));
                txn.put("voter", json!(0));
                Ok::<_, Error>(())
            })
            .unwrap();
        store
            .transaction(|txn| {
                txn.remove("vote_1");
                txn.put("vote_3", json!(3));
                assert_eq!(txn.keys_with_prefix("vote_"), vec!["vote_2", "vote_3"]);
                Ok::<_, Error>(())
            })
            .unwrap();
    }

    #[test]
    fn file_store_survives_reopen() {
        let path = temp_store_path();
        {
            let store = Store::open(&path).unwrap();
            store
                .transaction(|txn| txn.set_value("votesmart_dark_mode", &true))
                .unwrap();
            assert_eq!(store.path(), Some(path.clone()));
        }
        let reopened = Store::open(&path).unwrap();
        let dark: Option<bool> = reopened
            .transaction(|txn| txn.get_value("votesmart_dark_mode"))
            .unwrap();
        assert_eq!(dark, Some(true));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_file_opens_empty() {
        let path = temp_store_path();
        let store = Store::open(&path).unwrap();
        let keys = store
            .transaction(|txn| Ok::<_, Error>(txn.keys_with_prefix("")))
            .unwrap();
        assert!(keys.is_empty());
        assert!(!path.exists());
    }
}
