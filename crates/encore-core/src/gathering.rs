//! Gathering rules.
//!
//! A gathering is a peer-to-peer session advertised by its creator. The
//! server treats its contents as opaque except for a few little-endian u32
//! fields at fixed offsets:
//!
//! ```text
//! 0x04  host pid       rewritten with the creator's pid on discovery
//! 0x08  owner pid      rewritten with the creator's pid on discovery
//! 0x1C  state          0 idle, 6 on song select, 2 in song
//! 0x24  public flag    non-zero = listed
//! ```
//!
//! State transitions are never rejected; clients cycle 0 → 6 → 2 → 0.

use serde::{Deserialize, Serialize};

use crate::platform::Platform;

/// Offset of the mirrored state field.
pub const STATE_OFFSET: usize = 0x1C;
/// Offset of the public flag.
pub const PUBLIC_OFFSET: usize = 0x24;
/// Offsets rewritten with the creator's pid on discovery.
pub const CREATOR_PID_OFFSETS: [usize; 2] = [0x04, 0x08];

/// Smallest gathering id.
pub const MIN_GATHERING_ID: u32 = 500;
/// Largest gathering id.
pub const MAX_GATHERING_ID: u32 = 250_000;

/// Most gatherings returned by one discovery query.
pub const DISCOVERY_LIMIT: usize = 10;
/// Gatherings not updated within this many seconds are not discoverable.
pub const DISCOVERY_FRESHNESS_SECS: u64 = 300;
/// Gatherings not updated within this many seconds are garbage.
pub const STALE_AFTER_SECS: u64 = 3600;

/// Idle in the lobby.
pub const STATE_IDLE: u32 = 0;
/// Playing a song.
pub const STATE_IN_SONG: u32 = 2;
/// Choosing a song.
pub const STATE_SONG_SELECT: u32 = 6;

/// Read a little-endian u32 at `offset`.
pub fn read_u32_at(contents: &[u8], offset: usize) -> Option<u32> {
    let bytes = contents.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Write a little-endian u32 at `offset`, zero-padding short contents.
pub fn write_u32_at(contents: &mut Vec<u8>, offset: usize, value: u32) {
    if contents.len() < offset + 4 {
        contents.resize(offset + 4, 0);
    }
    contents[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Map a random value onto the gathering id range.
pub fn gathering_id_from_random(random: u32) -> u32 {
    MIN_GATHERING_ID + random % (MAX_GATHERING_ID - MIN_GATHERING_ID + 1)
}

/// A published gathering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gathering {
    /// Id in `MIN_GATHERING_ID..=MAX_GATHERING_ID`
    pub id: u32,
    /// Creator username
    pub creator: String,
    /// Creator principal
    pub creator_pid: u32,
    /// Opaque client blob
    pub contents: Vec<u8>,
    /// Unix seconds of the last write
    pub last_updated: u64,
    /// Lobby state
    pub state: u32,
    /// Listed for discovery
    pub public: bool,
    /// Platform of the creator
    pub platform: Platform,
}

impl Gathering {
    /// New idle, private gathering.
    pub fn new(
        id: u32,
        creator: impl Into<String>,
        creator_pid: u32,
        contents: Vec<u8>,
        platform: Platform,
        now: u64,
    ) -> Self {
        Self {
            id,
            creator: creator.into(),
            creator_pid,
            contents,
            last_updated: now,
            state: STATE_IDLE,
            public: false,
            platform,
        }
    }

    /// Replace the contents and re-derive state and public flag from them.
    pub fn apply_update(&mut self, contents: Vec<u8>, now: u64) {
        self.state = read_u32_at(&contents, STATE_OFFSET).unwrap_or(self.state);
        self.public = read_u32_at(&contents, PUBLIC_OFFSET).is_some_and(|flag| flag != 0);
        self.contents = contents;
        self.last_updated = now;
    }

    /// Set the state, mirroring it into the contents.
    pub fn set_state(&mut self, state: u32, now: u64) {
        write_u32_at(&mut self.contents, STATE_OFFSET, state);
        self.state = state;
        self.last_updated = now;
    }

    /// True if `caller` on `platform` may discover this gathering at `now`.
    pub fn is_discoverable_by(&self, caller: &str, platform: Platform, now: u64) -> bool {
        self.creator != caller
            && self.platform == platform
            && self.public
            && self.state != STATE_IN_SONG
            && self.state != STATE_SONG_SELECT
            && now.saturating_sub(self.last_updated) <= DISCOVERY_FRESHNESS_SECS
    }

    /// True if the gathering has not been written for an hour.
    pub fn is_stale(&self, now: u64) -> bool {
        now.saturating_sub(self.last_updated) > STALE_AFTER_SECS
    }

    /// Contents as returned by discovery, host and owner pids rewritten.
    pub fn discovery_contents(&self) -> Vec<u8> {
        let mut contents = self.contents.clone();
        for offset in CREATOR_PID_OFFSETS {
            if contents.len() >= offset + 4 {
                contents[offset..offset + 4].copy_from_slice(&self.creator_pid.to_le_bytes());
            }
        }
        contents
    }
}

/// Pick up to `limit` gatherings uniformly at random.
///
/// `random` supplies one value per draw; a partial Fisher-Yates shuffle keeps
/// each returned subset equally likely.
pub fn sample<T>(mut candidates: Vec<T>, limit: usize, mut random: impl FnMut() -> u64) -> Vec<T> {
    let take = limit.min(candidates.len());
    for i in 0..take {
        let remaining = (candidates.len() - i) as u64;
        let j = i + (random() % remaining) as usize;
        candidates.swap(i, j);
    }
    candidates.truncate(take);
    candidates
}
