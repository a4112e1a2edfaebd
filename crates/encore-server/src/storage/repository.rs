//! Typed records and repository operations.
//!
//! Every record is stored as CBOR under a string key. Secondary lookups
//! (username, friend code) are separate index collections written with
//! `insert_new`, so uniqueness holds even when two logins race.

use std::collections::{BTreeMap, HashMap};

use encore_core::{Gathering, Platform};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use super::{Collection, Storage, StorageError, id_key};

/// Counter shared by user PIDs and machine ids, so a master PID never
/// collides with a user PID.
pub const PID_COUNTER: &str = "pid";

/// PIDs and machine ids are allocated above this value.
const PID_BASE: u64 = 1000;

const SCORE_COUNTER: &str = "score";
const SETLIST_COUNTER: &str = "setlist";
const BAND_COUNTER: &str = "band";
const CHARACTER_COUNTER: &str = "character";
const BATTLE_COUNTER: &str = "battle";

/// Config key holding a comma-separated list of banned PIDs.
const BANNED_USERS_KEY: &str = "banned_users";

/// A user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Unique principal id
    pub pid: u32,
    /// Unique username
    pub username: String,
    /// Platform the account was created on
    pub platform: Platform,
    /// Station URL as seen from the internet
    pub external_url: Option<String>,
    /// Station URL on the client's LAN
    pub internal_url: Option<String>,
    /// Friend PIDs
    pub friends: Vec<u32>,
    /// Group memberships
    pub groups: Vec<u32>,
    /// Machine that created the account; 0 if none
    pub creator_machine: u32,
    /// Songs the client reported as installed
    pub available_songs: Vec<i64>,
    /// Opaque client option string
    pub option_data: String,
    /// Link code handed out for web account linking
    pub link_code: Option<String>,
    /// Account linked to a web profile
    pub linked: bool,
}

impl UserRecord {
    /// New account with no URLs, friends or groups.
    pub fn new(pid: u32, username: impl Into<String>, platform: Platform, creator_machine: u32) -> Self {
        Self {
            pid,
            username: username.into(),
            platform,
            external_url: None,
            internal_url: None,
            friends: Vec::new(),
            groups: Vec::new(),
            creator_machine,
            available_songs: Vec::new(),
            option_data: String::new(),
            link_code: None,
            linked: false,
        }
    }
}

/// A console.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineRecord {
    /// Unique id; also the master user's PID
    pub id: u32,
    /// Console platform
    pub platform: Platform,
    /// Platform identifier (friend code)
    pub friend_code: String,
    /// Accounts this console created
    pub users: Vec<u32>,
    /// Free-form status string
    pub status: String,
    /// Last station URL the console registered
    pub last_url: Option<String>,
}

/// One submitted score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRecord {
    /// Server-assigned id
    pub id: u64,
    /// Player, or band owner for role 10
    pub pid: u32,
    /// Song
    pub song_id: u32,
    /// Instrument track 1-9, or 10 for band aggregates
    pub role_id: u32,
    /// Score
    pub score: u32,
    /// Stars earned
    pub stars: u32,
    /// Difficulty 1-4
    pub diff_id: u32,
    /// Notes hit, percent
    pub notes_pct: u32,
    /// Instruments played
    pub instrument_mask: u32,
    /// Battle the score was submitted to
    pub battle_id: Option<u32>,
    /// Unix seconds
    pub recorded_at: u64,
}

/// Role id reserved for band aggregate scores.
pub const BAND_ROLE_ID: u32 = 10;

/// A user-created setlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetlistRecord {
    /// Server-assigned id
    pub id: u32,
    /// Owner
    pub pid: u32,
    /// Client-side identifier, unique per owner
    pub guid: String,
    /// Title
    pub name: String,
    /// Description
    pub description: String,
    /// Song ids in order
    pub songs: Vec<i64>,
    /// Client setlist type
    pub list_type: i64,
    /// Visible to other players
    pub shared: bool,
    /// Platform of the owner
    pub platform: Platform,
    /// Unix seconds of the last update
    pub updated_at: u64,
}

/// A band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandRecord {
    /// Server-assigned id
    pub id: u32,
    /// Owner
    pub pid: u32,
    /// Display name
    pub name: String,
    /// Opaque art bytes
    pub art: Vec<u8>,
}

/// A player character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterRecord {
    /// Server-assigned id
    pub id: u32,
    /// Owner
    pub pid: u32,
    /// Client-side identifier, unique per owner
    pub guid: String,
    /// Display name
    pub name: String,
    /// Opaque client data
    pub data: String,
}

/// A score battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleRecord {
    /// Server-assigned id
    pub id: u32,
    /// Creator
    pub pid: u32,
    /// Title
    pub name: String,
    /// Description
    pub description: String,
    /// Songs in the battle
    pub songs: Vec<i64>,
    /// Instrument restriction, 0 for any
    pub instrument: i64,
    /// Platform of the creator
    pub platform: Platform,
    /// Unix seconds
    pub created_at: u64,
    /// Unix seconds after which no scores are accepted
    pub closes_at: u64,
}

/// An opaque blob and the principal allowed to overwrite it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRecord {
    /// Principal that first saved the blob
    pub owner: u32,
    /// Blob bytes, never interpreted
    pub data: Vec<u8>,
}

/// A keyed statistic row: performances, accomplishments, pad stats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatRecord {
    /// Reporting player
    pub pid: u32,
    /// Statistic family, e.g. `"accomplishment"`
    pub kind: String,
    /// Family-specific id (accomplishment id, song id, ...)
    pub subject: i64,
    /// Numeric value ranked on leaderboards
    pub value: i64,
    /// Remaining reported fields
    pub fields: BTreeMap<String, String>,
    /// Unix seconds
    pub recorded_at: u64,
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes).map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(bytes)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    ciborium::from_reader(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn stat_key(pid: u32, kind: &str, subject: i64) -> String {
    format!("{kind}:{pid:010}:{subject}")
}

/// Repository over a [`Storage`] backend.
///
/// Clone is cheap; clones share the backend.
#[derive(Clone)]
pub struct Repository<S: Storage> {
    storage: S,
}

impl<S: Storage> Repository<S> {
    /// Wrap a storage backend.
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Underlying storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn load<T: DeserializeOwned>(&self, collection: Collection, key: &str) -> Result<Option<T>, StorageError> {
        self.storage.get(collection, key)?.map(|bytes| decode(&bytes)).transpose()
    }

    fn store<T: Serialize>(&self, collection: Collection, key: &str, value: &T) -> Result<(), StorageError> {
        self.storage.put(collection, key, &encode(value)?)
    }

    fn load_all<T: DeserializeOwned>(&self, collection: Collection) -> Result<Vec<T>, StorageError> {
        self.storage.scan(collection)?.iter().map(|(_, bytes)| decode(bytes)).collect()
    }

    fn narrow_id(value: u64, counter: &str) -> Result<u32, StorageError> {
        u32::try_from(value).map_err(|_| StorageError::Io(format!("{counter} counter exhausted")))
    }

    /// Atomically allocate the next value of `counter`, starting at 1.
    pub fn allocate_next_id(&self, counter: &str) -> Result<u64, StorageError> {
        self.storage.increment(counter)
    }

    /// Allocate a PID (or machine id): one more than the last one handed out.
    pub fn allocate_pid(&self) -> Result<u32, StorageError> {
        Self::narrow_id(PID_BASE + self.allocate_next_id(PID_COUNTER)?, PID_COUNTER)
    }

    // Users

    /// User with `pid`.
    pub fn get_user_by_pid(&self, pid: u32) -> Result<Option<UserRecord>, StorageError> {
        self.load(Collection::Users, &id_key(u64::from(pid)))
    }

    /// User named `username`.
    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRecord>, StorageError> {
        let Some(pid) = self.load::<u32>(Collection::Usernames, username)? else {
            return Ok(None);
        };
        self.get_user_by_pid(pid)
    }

    /// Users for a batch of PIDs. Unknown PIDs are absent from the map.
    pub fn get_users_by_pids(&self, pids: &[u32]) -> Result<HashMap<u32, UserRecord>, StorageError> {
        let mut users = HashMap::with_capacity(pids.len());
        for &pid in pids {
            if users.contains_key(&pid) {
                continue;
            }
            if let Some(user) = self.get_user_by_pid(pid)? {
                users.insert(pid, user);
            }
        }
        Ok(users)
    }

    /// Insert a new user.
    ///
    /// # Errors
    ///
    /// - `Conflict` if the username is taken
    pub fn insert_user(&self, user: &UserRecord) -> Result<(), StorageError> {
        self.storage.insert_new(Collection::Usernames, &user.username, &encode(&user.pid)?)?;
        self.store(Collection::Users, &id_key(u64::from(user.pid)), user)
    }

    /// Replace an existing user record.
    pub fn update_user(&self, user: &UserRecord) -> Result<(), StorageError> {
        self.store(Collection::Users, &id_key(u64::from(user.pid)), user)
    }

    /// Record a user's station URLs.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the user does not exist
    pub fn update_user_station_urls(
        &self,
        pid: u32,
        external_url: Option<String>,
        internal_url: Option<String>,
    ) -> Result<(), StorageError> {
        let mut user = self.require_user(pid)?;
        user.external_url = external_url;
        user.internal_url = internal_url;
        self.update_user(&user)
    }

    /// User with `pid`, or `NotFound`.
    pub fn require_user(&self, pid: u32) -> Result<UserRecord, StorageError> {
        self.get_user_by_pid(pid)?
            .ok_or_else(|| StorageError::NotFound { collection: Collection::Users, key: pid.to_string() })
    }

    /// Delete a user and its username index. Returns false if absent.
    pub fn delete_user(&self, pid: u32) -> Result<bool, StorageError> {
        let Some(user) = self.get_user_by_pid(pid)? else {
            return Ok(false);
        };
        self.storage.delete(Collection::Usernames, &user.username)?;
        self.storage.delete(Collection::Users, &id_key(u64::from(pid)))
    }

    /// Users created by a machine, in PID order.
    pub fn get_users_by_machine(&self, machine_id: u32) -> Result<Vec<UserRecord>, StorageError> {
        let Some(machine) = self.get_machine_by_id(machine_id)? else {
            return Ok(Vec::new());
        };
        let mut users: Vec<UserRecord> =
            self.get_users_by_pids(&machine.users)?.into_values().collect();
        users.sort_by_key(|u| u.pid);
        Ok(users)
    }

    // Machines

    /// Machine with `id`.
    pub fn get_machine_by_id(&self, id: u32) -> Result<Option<MachineRecord>, StorageError> {
        self.load(Collection::Machines, &id_key(u64::from(id)))
    }

    /// Machine identified by `friend_code`.
    pub fn get_machine_by_friend_code(&self, friend_code: &str) -> Result<Option<MachineRecord>, StorageError> {
        let Some(id) = self.load::<u32>(Collection::FriendCodes, friend_code)? else {
            return Ok(None);
        };
        self.get_machine_by_id(id)
    }

    /// Insert a new machine.
    ///
    /// # Errors
    ///
    /// - `Conflict` if the friend code is already registered
    pub fn insert_machine(&self, machine: &MachineRecord) -> Result<(), StorageError> {
        self.storage.insert_new(Collection::FriendCodes, &machine.friend_code, &encode(&machine.id)?)?;
        self.update_machine(machine)
    }

    /// Replace an existing machine record.
    pub fn update_machine(&self, machine: &MachineRecord) -> Result<(), StorageError> {
        self.store(Collection::Machines, &id_key(u64::from(machine.id)), machine)
    }

    /// Set a machine's status string.
    pub fn update_machine_status(&self, id: u32, status: &str) -> Result<(), StorageError> {
        let mut machine = self.require_machine(id)?;
        machine.status = status.to_string();
        self.update_machine(&machine)
    }

    /// Record the last station URL a machine registered.
    pub fn update_machine_url(&self, id: u32, url: &str) -> Result<(), StorageError> {
        let mut machine = self.require_machine(id)?;
        machine.last_url = Some(url.to_string());
        self.update_machine(&machine)
    }

    /// Record that machine `id` created account `pid`. No-op for machine 0.
    pub fn add_machine_user(&self, id: u32, pid: u32) -> Result<(), StorageError> {
        if id == 0 {
            return Ok(());
        }
        let mut machine = self.require_machine(id)?;
        if !machine.users.contains(&pid) {
            machine.users.push(pid);
            self.update_machine(&machine)?;
        }
        Ok(())
    }

    /// Forget that machine `id` created account `pid`.
    pub fn remove_machine_user(&self, id: u32, pid: u32) -> Result<(), StorageError> {
        let Some(mut machine) = self.get_machine_by_id(id)? else {
            return Ok(());
        };
        machine.users.retain(|&u| u != pid);
        self.update_machine(&machine)
    }

    fn require_machine(&self, id: u32) -> Result<MachineRecord, StorageError> {
        self.get_machine_by_id(id)?
            .ok_or_else(|| StorageError::NotFound { collection: Collection::Machines, key: id.to_string() })
    }

    // Config

    /// Configuration value.
    pub fn get_config(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.load(Collection::Config, key)
    }

    /// Set a configuration value.
    pub fn set_config(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.store(Collection::Config, key, &value.to_string())
    }

    /// Banned PIDs. Unparseable entries are ignored.
    pub fn get_banned_users(&self) -> Result<Vec<u32>, StorageError> {
        Ok(self
            .get_config(BANNED_USERS_KEY)?
            .map(|list| list.split(',').filter_map(|pid| pid.trim().parse().ok()).collect())
            .unwrap_or_default())
    }

    // Gatherings

    /// Gathering with `id`.
    pub fn find_gathering(&self, id: u32) -> Result<Option<Gathering>, StorageError> {
        self.load(Collection::Gatherings, &id_key(u64::from(id)))
    }

    /// Insert a gathering.
    ///
    /// # Errors
    ///
    /// - `Conflict` if the id is taken
    pub fn insert_gathering(&self, gathering: &Gathering) -> Result<(), StorageError> {
        self.storage.insert_new(Collection::Gatherings, &id_key(u64::from(gathering.id)), &encode(gathering)?)
    }

    /// Replace a gathering.
    pub fn update_gathering(&self, gathering: &Gathering) -> Result<(), StorageError> {
        self.store(Collection::Gatherings, &id_key(u64::from(gathering.id)), gathering)
    }

    /// Delete a gathering. Returns false if absent.
    pub fn delete_gathering(&self, id: u32) -> Result<bool, StorageError> {
        self.storage.delete(Collection::Gatherings, &id_key(u64::from(id)))
    }

    /// Every gathering.
    pub fn list_gatherings(&self) -> Result<Vec<Gathering>, StorageError> {
        self.load_all(Collection::Gatherings)
    }

    /// Delete every gathering created by `creator`. Returns how many.
    pub fn delete_gatherings_by_creator(&self, creator: &str) -> Result<usize, StorageError> {
        let mut deleted = 0;
        for gathering in self.list_gatherings()?.into_iter().filter(|g| g.creator == creator) {
            if self.delete_gathering(gathering.id)? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Delete gatherings not updated for an hour. Returns how many.
    pub fn delete_stale_gatherings(&self, now: u64) -> Result<usize, StorageError> {
        let mut deleted = 0;
        for gathering in self.list_gatherings()?.into_iter().filter(|g| g.is_stale(now)) {
            if self.delete_gathering(gathering.id)? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    // Scores

    /// Insert a score, assigning its id.
    pub fn insert_score(&self, mut score: ScoreRecord) -> Result<ScoreRecord, StorageError> {
        score.id = self.allocate_next_id(SCORE_COUNTER)?;
        self.store(Collection::Scores, &id_key(score.id), &score)?;
        Ok(score)
    }

    /// Every score.
    pub fn list_scores(&self) -> Result<Vec<ScoreRecord>, StorageError> {
        self.load_all(Collection::Scores)
    }

    // Setlists

    /// Insert or replace a setlist, keyed by `(pid, guid)`. A new setlist gets
    /// a fresh id; an existing one keeps its id.
    pub fn upsert_setlist(&self, mut setlist: SetlistRecord) -> Result<SetlistRecord, StorageError> {
        let existing =
            self.list_setlists()?.into_iter().find(|s| s.pid == setlist.pid && s.guid == setlist.guid);
        setlist.id = match existing {
            Some(existing) => existing.id,
            None => Self::narrow_id(self.allocate_next_id(SETLIST_COUNTER)?, SETLIST_COUNTER)?,
        };
        self.store(Collection::Setlists, &id_key(u64::from(setlist.id)), &setlist)?;
        Ok(setlist)
    }

    /// Setlist with `id`.
    pub fn get_setlist(&self, id: u32) -> Result<Option<SetlistRecord>, StorageError> {
        self.load(Collection::Setlists, &id_key(u64::from(id)))
    }

    /// Every setlist.
    pub fn list_setlists(&self) -> Result<Vec<SetlistRecord>, StorageError> {
        self.load_all(Collection::Setlists)
    }

    // Bands

    /// Band owned by `pid`.
    pub fn get_band(&self, pid: u32) -> Result<Option<BandRecord>, StorageError> {
        self.load(Collection::Bands, &id_key(u64::from(pid)))
    }

    /// Insert or replace the band owned by `band.pid`. A new band gets a
    /// fresh id.
    pub fn upsert_band(&self, mut band: BandRecord) -> Result<BandRecord, StorageError> {
        band.id = match self.get_band(band.pid)? {
            Some(existing) => existing.id,
            None => Self::narrow_id(self.allocate_next_id(BAND_COUNTER)?, BAND_COUNTER)?,
        };
        self.store(Collection::Bands, &id_key(u64::from(band.pid)), &band)?;
        Ok(band)
    }

    /// Bands for a batch of owners. Owners without a band are absent.
    pub fn get_bands_by_pids(&self, pids: &[u32]) -> Result<HashMap<u32, BandRecord>, StorageError> {
        let mut bands = HashMap::with_capacity(pids.len());
        for &pid in pids {
            if !bands.contains_key(&pid)
                && let Some(band) = self.get_band(pid)?
            {
                bands.insert(pid, band);
            }
        }
        Ok(bands)
    }

    // Characters

    /// Insert or replace a character, keyed by `(pid, guid)`.
    pub fn upsert_character(&self, mut character: CharacterRecord) -> Result<CharacterRecord, StorageError> {
        let existing = self
            .list_characters()?
            .into_iter()
            .find(|c| c.pid == character.pid && c.guid == character.guid);
        character.id = match existing {
            Some(existing) => existing.id,
            None => Self::narrow_id(self.allocate_next_id(CHARACTER_COUNTER)?, CHARACTER_COUNTER)?,
        };
        self.store(Collection::Characters, &id_key(u64::from(character.id)), &character)?;
        Ok(character)
    }

    /// Every character.
    pub fn list_characters(&self) -> Result<Vec<CharacterRecord>, StorageError> {
        self.load_all(Collection::Characters)
    }

    // Battles

    /// Insert a battle, assigning its id.
    pub fn insert_battle(&self, mut battle: BattleRecord) -> Result<BattleRecord, StorageError> {
        battle.id = Self::narrow_id(self.allocate_next_id(BATTLE_COUNTER)?, BATTLE_COUNTER)?;
        self.store(Collection::Battles, &id_key(u64::from(battle.id)), &battle)?;
        Ok(battle)
    }

    /// Battle with `id`.
    pub fn get_battle(&self, id: u32) -> Result<Option<BattleRecord>, StorageError> {
        self.load(Collection::Battles, &id_key(u64::from(id)))
    }

    /// Every battle.
    pub fn list_battles(&self) -> Result<Vec<BattleRecord>, StorageError> {
        self.load_all(Collection::Battles)
    }

    // Blobs

    /// Store an opaque blob, replacing any previous one under the same key.
    pub fn save_blob(&self, key: &str, blob: &BlobRecord) -> Result<(), StorageError> {
        self.store(Collection::Blobs, key, blob)
    }

    /// Load an opaque blob.
    pub fn load_blob(&self, key: &str) -> Result<Option<BlobRecord>, StorageError> {
        self.load(Collection::Blobs, key)
    }

    // Statistics

    /// Insert or replace the statistic `(pid, kind, subject)`.
    pub fn put_stat(&self, stat: &StatRecord) -> Result<(), StorageError> {
        self.store(Collection::Stats, &stat_key(stat.pid, &stat.kind, stat.subject), stat)
    }

    /// Every statistic of one family.
    pub fn list_stats(&self, kind: &str) -> Result<Vec<StatRecord>, StorageError> {
        Ok(self.load_all::<StatRecord>(Collection::Stats)?.into_iter().filter(|s| s.kind == kind).collect())
    }
}
