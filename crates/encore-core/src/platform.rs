//! Console platforms and their access keys.
//!
//! Three client builds share one wire format. Each ships a 16-byte access key
//! that seeds the packet checksum, keys the initial cipher and signs DATA
//! packets, so the key a client uses also tells us which console it is.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Console platform tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Platform {
    /// Platform A
    Xbox360,
    /// Platform B
    Ps3,
    /// Platform C: sends a friend code instead of a password
    Wii,
}

impl Platform {
    /// All platforms, in detection order.
    pub const ALL: [Self; 3] = [Self::Xbox360, Self::Ps3, Self::Wii];

    /// Published access key of this platform's client build.
    // Literal keys below are 32 hex digits.
    #[allow(clippy::expect_used)]
    pub fn default_access_key(self) -> AccessKey {
        let hex_key = match self {
            Self::Xbox360 => "3f1e5a7c9d2b4e6f8a0c1d3e5f7a9b2c",
            Self::Ps3 => "bfa620c57c2d3bcdf4362a6fa6418e58",
            Self::Wii => "6d8f0a2c4e6b8d1f3a5c7e9b0d2f4a6c",
        };
        AccessKey::from_hex(hex_key).expect("built-in access keys are valid hex")
    }

    /// True for the platform that logs in with a friend code.
    pub fn uses_friend_code(self) -> bool {
        self == Self::Wii
    }

    /// Tag prepended to usernames on leaderboards.
    pub fn console_prefix(self) -> &'static str {
        match self {
            Self::Xbox360 => "[360]",
            Self::Ps3 => "[PS3]",
            Self::Wii => "[Wii]",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Xbox360 => "xbox360",
            Self::Ps3 => "ps3",
            Self::Wii => "wii",
        };
        f.write_str(name)
    }
}

/// Error parsing an access key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("access key must be 32 hex digits: {0}")]
pub struct InvalidAccessKey(String);

/// A 16-byte access key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccessKey([u8; 16]);

impl AccessKey {
    /// Parse 32 hex digits.
    pub fn from_hex(text: &str) -> Result<Self, InvalidAccessKey> {
        let bytes = hex::decode(text.trim()).map_err(|e| InvalidAccessKey(e.to_string()))?;
        let key: [u8; 16] =
            bytes.try_into().map_err(|b: Vec<u8>| InvalidAccessKey(format!("{} bytes", b.len())))?;
        Ok(Self(key))
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Checksum seed: sum of the key bytes.
    pub fn checksum_seed(&self) -> u8 {
        encore_proto::packet::checksum_seed(&self.0)
    }
}

impl fmt::Debug for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessKey({})", hex::encode(self.0))
    }
}

/// Access keys in use, one per platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessKeys {
    keys: [(Platform, AccessKey); 3],
}

impl AccessKeys {
    /// Keys for each platform.
    pub fn new(xbox360: AccessKey, ps3: AccessKey, wii: AccessKey) -> Self {
        Self { keys: [(Platform::Xbox360, xbox360), (Platform::Ps3, ps3), (Platform::Wii, wii)] }
    }

    /// Key for `platform`.
    pub fn key(&self, platform: Platform) -> AccessKey {
        self.keys.iter().find(|(p, _)| *p == platform).map_or_else(|| platform.default_access_key(), |(_, k)| *k)
    }

    /// Platform whose checksum seed validates `datagram`.
    pub fn detect(&self, datagram: &[u8]) -> Option<(Platform, AccessKey)> {
        self.keys
            .iter()
            .find(|(_, key)| encore_proto::packet::checksum_matches(key.checksum_seed(), datagram))
            .copied()
    }
}

impl Default for AccessKeys {
    fn default() -> Self {
        Self::new(
            Platform::Xbox360.default_access_key(),
            Platform::Ps3.default_access_key(),
            Platform::Wii.default_access_key(),
        )
    }
}
