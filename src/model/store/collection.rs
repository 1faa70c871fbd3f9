use std::marker::PhantomData;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{Error, Result};

use super::db::{Store, Txn};

/// A type that can be directly inserted/read to/from the store.
pub trait StoreCollection: Serialize + DeserializeOwned {
    /// The key prefix shared by every document of this type.
    const NAME: &'static str;

    /// The document's unique key within the collection.
    fn key(&self) -> String;

    /// The full store key for a document key.
    fn store_key(key: &str) -> String {
        format!("{}{}", Self::NAME, key)
    }
}

/// Typed document access inside a transaction.
impl Txn<'_> {
    pub fn find_one<T: StoreCollection>(&self, key: &str) -> Result<Option<T>> {
        self.get_value(&T::store_key(key))
    }

    /// Every document of the collection matching `filter`, in key order.
    pub fn find<T, F>(&self, filter: F) -> Result<Vec<T>>
    where
        T: StoreCollection,
        F: Fn(&T) -> bool,
    {
        let mut found = Vec::new();
        for key in self.keys_with_prefix(T::NAME) {
            let doc: T = self
                .get_value(&key)?
                .ok_or_else(|| Error::Corrupt(format!("key {key} vanished mid-scan")))?;
            if filter(&doc) {
                found.push(doc);
            }
        }
        Ok(found)
    }

    /// Insert a new document, failing if its key is already taken.
    pub fn insert_one<T: StoreCollection>(&mut self, doc: &T) -> Result<()> {
        let key = T::store_key(&doc.key());
        if self.contains(&key) {
            return Err(Error::DuplicateKey(key));
        }
        self.set_value(&key, doc)
    }

    /// Overwrite an existing document, failing if it does not exist.
    pub fn replace_one<T: StoreCollection>(&mut self, doc: &T) -> Result<()> {
        let key = T::store_key(&doc.key());
        if !self.contains(&key) {
            return Err(Error::NotFound(key));
        }
        self.set_value(&key, doc)
    }

    /// Delete a document by key, returning whether it existed.
    pub fn delete_one<T: StoreCollection>(&mut self, key: &str) -> bool {
        self.remove(&T::store_key(key))
    }

    /// Delete every document matching `filter`, returning how many went.
    pub fn delete_many<T, F>(&mut self, filter: F) -> Result<usize>
    where
        T: StoreCollection,
        F: Fn(&T) -> bool,
    {
        let doomed = self.find::<T, _>(filter)?;
        for doc in &doomed {
            self.delete_one::<T>(&doc.key());
        }
        Ok(doomed.len())
    }
}

/// A handle on one collection of the store. Each call runs as its own
/// transaction; use [`Store::transaction`] to combine several.
pub struct Coll<T> {
    store: Store,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Coll<T>
where
    T: StoreCollection,
{
    /// Get a handle on this collection in the given store.
    pub fn from_store(store: &Store) -> Self {
        Self {
            store: store.clone(),
            _marker: PhantomData,
        }
    }

    pub fn find_one(&self, key: &str) -> Result<Option<T>> {
        self.store.transaction(|txn| txn.find_one(key))
    }

    pub fn find<F: Fn(&T) -> bool>(&self, filter: F) -> Result<Vec<T>> {
        self.store.transaction(|txn| txn.find(filter))
    }

    pub fn count(&self) -> Result<usize> {
        self.store
            .transaction(|txn| Ok(txn.keys_with_prefix(T::NAME).len()))
    }

    pub fn insert_one(&self, doc: &T) -> Result<()> {
        self.store.transaction(|txn| txn.insert_one(doc))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            _marker: PhantomData,
        }
    }
}
