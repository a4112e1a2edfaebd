//! Redb-backed durable storage implementation.
//!
//! One redb table per [`Collection`], keyed by string, holding the CBOR bytes
//! the repository produces. Counters live in their own table. Write
//! transactions are serialized by redb, which is what makes `insert_new` and
//! `increment` atomic across threads.

use std::{fmt::Display, path::Path, sync::Arc};

use redb::{Database, ReadableTable, TableDefinition};

use super::{Collection, Storage, StorageError};

/// Table: counters
/// Key: counter name
/// Value: last value handed out
const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");

fn table(collection: Collection) -> TableDefinition<'static, &'static str, &'static [u8]> {
    TableDefinition::new(collection.name())
}

fn io(err: impl Display) -> StorageError {
    StorageError::Io(err.to_string())
}

/// Durable storage backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
}

impl RedbStorage {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates every collection table and the counter table if missing.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(io)?;

        let txn = db.begin_write().map_err(io)?;
        {
            for collection in Collection::ALL {
                let _ = txn.open_table(table(collection)).map_err(io)?;
            }
            let _ = txn.open_table(COUNTERS).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl Storage for RedbStorage {
    fn get(&self, collection: Collection, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let records = txn.open_table(table(collection)).map_err(io)?;
        let value = records.get(key).map_err(io)?.map(|guard| guard.value().to_vec());
        Ok(value)
    }

    fn put(&self, collection: Collection, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut records = txn.open_table(table(collection)).map_err(io)?;
            records.insert(key, value).map_err(io)?;
        }
        txn.commit().map_err(io)
    }

    fn insert_new(&self, collection: Collection, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut records = txn.open_table(table(collection)).map_err(io)?;
            if records.get(key).map_err(io)?.is_some() {
                return Err(StorageError::Conflict { collection, key: key.to_string() });
            }
            records.insert(key, value).map_err(io)?;
        }
        txn.commit().map_err(io)
    }

    fn delete(&self, collection: Collection, key: &str) -> Result<bool, StorageError> {
        let txn = self.db.begin_write().map_err(io)?;
        let removed = {
            let mut records = txn.open_table(table(collection)).map_err(io)?;
            records.remove(key).map_err(io)?.is_some()
        };
        txn.commit().map_err(io)?;
        Ok(removed)
    }

    fn scan(&self, collection: Collection) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let records = txn.open_table(table(collection)).map_err(io)?;

        let mut entries = Vec::new();
        for entry in records.iter().map_err(io)? {
            let (key, value) = entry.map_err(io)?;
            entries.push((key.value().to_string(), value.value().to_vec()));
        }
        Ok(entries)
    }

    fn increment(&self, counter: &str) -> Result<u64, StorageError> {
        let txn = self.db.begin_write().map_err(io)?;
        let next = {
            let mut counters = txn.open_table(COUNTERS).map_err(io)?;
            let current = counters.get(counter).map_err(io)?.map_or(0, |guard| guard.value());
            counters.insert(counter, current + 1).map_err(io)?;
            current + 1
        };
        txn.commit().map_err(io)?;
        Ok(next)
    }
}
