//! Kerberos-style tickets.
//!
//! The auth endpoint issues a ticket sealed with a key derived from the
//! user's password; the secure endpoint re-derives that key from the PID the
//! client claims, checks the MAC, and recovers the session key.
//!
//! ```text
//! body   = session_key[16] | 1 u32 | 0x24 u32 | len u32 | RC4_info(info)
//! ticket = RC4_K(body) | HMAC-MD5_K(RC4_K(body))
//! ```

use std::fmt;

use md5::{Digest, Md5};
use zeroize::Zeroize;

use crate::{
    error::CryptoError,
    signature::{hmac_md5, verify_hmac_md5},
    stream_cipher::Rc4,
};

/// Size of user, session and info keys.
pub const KEY_SIZE: usize = 16;

/// Size of the HMAC-MD5 tail.
pub const MAC_SIZE: usize = 16;

const BASE_ITERATIONS: u32 = 65000;
const PID_FLAG: u32 = 1;
const INFO_TAG: u32 = 0x24;

/// Session key, pid flag, info tag, info length.
const BODY_HEADER_SIZE: usize = KEY_SIZE + 4 + 4 + 4;

/// Number of MD5 rounds for `pid`.
pub fn iteration_count(pid: u32) -> u32 {
    BASE_ITERATIONS + pid % 1024
}

/// Key derived from a user's password.
#[derive(Clone, PartialEq, Eq)]
pub struct UserKey([u8; KEY_SIZE]);

impl UserKey {
    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UserKey(..)")
    }
}

impl Drop for UserKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Per-login session key carried inside the ticket.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey([u8; KEY_SIZE]);

impl SessionKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// A freshly built ticket and the key that seals it.
#[derive(Debug, Clone)]
pub struct IssuedTicket {
    /// Encrypted body followed by its MAC
    pub ticket: Vec<u8>,
    /// Key the body is sealed with
    pub user_key: UserKey,
}

/// `K = MD5^N(password)` with `N = 65000 + pid % 1024`.
pub fn derive_user_key(pid: u32, password: &str) -> UserKey {
    let mut key: [u8; KEY_SIZE] = Md5::digest(password.as_bytes()).into();
    for _ in 1..iteration_count(pid) {
        key = Md5::digest(key).into();
    }
    UserKey(key)
}

/// Build a ticket for `pid`.
///
/// `info_key` seals the (empty) inner info block; callers pass fresh random
/// bytes for it and for `session_key`.
pub fn build_ticket(
    pid: u32,
    password: &str,
    session_key: &SessionKey,
    info_key: &[u8; KEY_SIZE],
) -> Result<IssuedTicket, CryptoError> {
    let user_key = derive_user_key(pid, password);

    // Inner info is an empty length-prefixed block.
    let info = Rc4::new(info_key)?.process(&0u32.to_le_bytes());

    let mut body = Vec::with_capacity(BODY_HEADER_SIZE + info.len() + MAC_SIZE);
    body.extend_from_slice(session_key.as_bytes());
    body.extend_from_slice(&PID_FLAG.to_le_bytes());
    body.extend_from_slice(&INFO_TAG.to_le_bytes());
    body.extend_from_slice(&(info.len() as u32).to_le_bytes());
    body.extend_from_slice(&info);

    Rc4::new(user_key.as_bytes())?.apply(&mut body);
    let mac = hmac_md5(user_key.as_bytes(), &body);
    body.extend_from_slice(&mac);

    Ok(IssuedTicket { ticket: body, user_key })
}

/// Verify a ticket presented for `pid` and recover its session key.
///
/// # Errors
///
/// - `TicketTooShort` if the ticket cannot hold a body header and MAC
/// - `TicketSignatureMismatch` if the MAC does not verify under the key
///   derived from `(pid, password)`
/// - `MalformedTicket` if the decrypted info length disagrees with the body
pub fn verify_ticket(pid: u32, password: &str, ticket: &[u8]) -> Result<SessionKey, CryptoError> {
    let min = BODY_HEADER_SIZE + MAC_SIZE;
    if ticket.len() < min {
        return Err(CryptoError::TicketTooShort { len: ticket.len(), min });
    }

    let (body, mac) = ticket.split_at(ticket.len() - MAC_SIZE);
    let user_key = derive_user_key(pid, password);
    if !verify_hmac_md5(user_key.as_bytes(), body, mac) {
        return Err(CryptoError::TicketSignatureMismatch);
    }

    let mut plain = Rc4::new(user_key.as_bytes())?.process(body);

    let info_len = u32::from_le_bytes([plain[24], plain[25], plain[26], plain[27]]) as usize;
    if info_len != plain.len() - BODY_HEADER_SIZE {
        let got = plain.len() - BODY_HEADER_SIZE;
        plain.zeroize();
        return Err(CryptoError::MalformedTicket(format!("info length {info_len} but {got} bytes follow")));
    }

    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&plain[..KEY_SIZE]);
    plain.zeroize();

    Ok(SessionKey(key))
}
