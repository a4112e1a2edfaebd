#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use super::{Collection, Storage, StorageError};

/// In-memory storage implementation for tests and database-less runs
///
/// One ordered map per collection plus a counter map, all behind a single
/// mutex. Every operation holds the lock for its whole duration, which makes
/// `insert_new` and `increment` atomic. A poisoned lock is recovered, since
/// no operation leaves the maps half-written.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryStorageInner>>,
}

#[derive(Default)]
struct MemoryStorageInner {
    collections: HashMap<Collection, BTreeMap<String, Vec<u8>>>,
    counters: HashMap<String, u64>,
}

impl MemoryStorage {
    /// Create a new empty `MemoryStorage`
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryStorageInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of records in a collection.
    pub fn record_count(&self, collection: Collection) -> usize {
        self.lock().collections.get(&collection).map_or(0, BTreeMap::len)
    }
}

impl Storage for MemoryStorage {
    fn get(&self, collection: Collection, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.lock().collections.get(&collection).and_then(|c| c.get(key)).cloned())
    }

    fn put(&self, collection: Collection, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.lock().collections.entry(collection).or_default().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn insert_new(&self, collection: Collection, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let mut inner = self.lock();
        let records = inner.collections.entry(collection).or_default();
        if records.contains_key(key) {
            return Err(StorageError::Conflict { collection, key: key.to_string() });
        }
        records.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, collection: Collection, key: &str) -> Result<bool, StorageError> {
        Ok(self.lock().collections.get_mut(&collection).is_some_and(|c| c.remove(key).is_some()))
    }

    fn scan(&self, collection: Collection) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        Ok(self
            .lock()
            .collections
            .get(&collection)
            .map(|c| c.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    fn increment(&self, counter: &str) -> Result<u64, StorageError> {
        let mut inner = self.lock();
        let value = inner.counters.entry(counter.to_string()).or_insert(0);
        *value += 1;
        Ok(*value)
    }
}
