//! Storage abstraction for the encore server
//!
//! A keyed byte store with one namespace per [`Collection`] plus atomic
//! counters. The trait is synchronous; the runtime calls it from blocking
//! tasks. Typed records and every repository operation live in
//! [`Repository`], which encodes values as CBOR.

mod chaotic;
mod error;
mod memory;
mod redb;
mod repository;

pub use chaotic::ChaoticStorage;
pub use error::StorageError;
pub use memory::MemoryStorage;
pub use repository::{
    BAND_ROLE_ID, BandRecord, BattleRecord, BlobRecord, CharacterRecord, MachineRecord, PID_COUNTER, Repository,
    ScoreRecord, SetlistRecord, StatRecord, UserRecord,
};
use serde::{Deserialize, Serialize};

pub use self::redb::RedbStorage;

/// Record namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Collection {
    /// Users by pid
    Users,
    /// Username to pid index
    Usernames,
    /// Console machines by id
    Machines,
    /// Friend code to machine id index
    FriendCodes,
    /// Gatherings by id
    Gatherings,
    /// Scores by id
    Scores,
    /// Setlists by id
    Setlists,
    /// Bands by owner pid
    Bands,
    /// Characters by id
    Characters,
    /// Battles by id
    Battles,
    /// Opaque binary blobs by key
    Blobs,
    /// Server configuration values
    Config,
    /// Performance, accomplishment and pad statistics
    Stats,
}

impl Collection {
    /// Every collection.
    pub const ALL: [Self; 13] = [
        Self::Users,
        Self::Usernames,
        Self::Machines,
        Self::FriendCodes,
        Self::Gatherings,
        Self::Scores,
        Self::Setlists,
        Self::Bands,
        Self::Characters,
        Self::Battles,
        Self::Blobs,
        Self::Config,
        Self::Stats,
    ];

    /// Stable name, used as the table name by durable backends.
    pub fn name(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Usernames => "usernames",
            Self::Machines => "machines",
            Self::FriendCodes => "friend_codes",
            Self::Gatherings => "gatherings",
            Self::Scores => "scores",
            Self::Setlists => "setlists",
            Self::Bands => "bands",
            Self::Characters => "characters",
            Self::Battles => "battles",
            Self::Blobs => "blobs",
            Self::Config => "config",
            Self::Stats => "stats",
        }
    }
}

/// Key for numeric ids; zero-padded so scans return ascending id order.
pub fn id_key(id: u64) -> String {
    format!("{id:020}")
}

/// Keyed byte storage with atomic counters
///
/// Must be Clone (shared by every client task), Send + Sync, and synchronous.
/// Implementations share internal state via Arc, so clones access the same
/// underlying storage.
pub trait Storage: Clone + Send + Sync + 'static {
    /// Value stored under `key`, if any.
    fn get(&self, collection: Collection, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    fn put(&self, collection: Collection, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Store `value` under `key` only if the key is free.
    ///
    /// # Invariants
    ///
    /// - Atomic: of two concurrent inserts of the same key, exactly one
    ///   succeeds and the other gets `Conflict`
    fn insert_new(&self, collection: Collection, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Remove `key`. Returns false if it was absent.
    fn delete(&self, collection: Collection, key: &str) -> Result<bool, StorageError>;

    /// Every entry of a collection in ascending key order.
    fn scan(&self, collection: Collection) -> Result<Vec<(String, Vec<u8>)>, StorageError>;

    /// Atomically add one to `counter` and return the new value.
    ///
    /// An absent counter starts at 0, so the first call returns 1.
    ///
    /// # Invariants
    ///
    /// - Concurrent callers never observe the same value
    fn increment(&self, counter: &str) -> Result<u64, StorageError>;
}
