//! RC4 stream cipher.
//!
//! Each connection holds two independent instances, one per direction. The
//! keystream position advances with every byte, so both sides must apply the
//! cipher to payloads in the same order.
//!
//! Keys of any length are accepted. The RC4 key schedule reads the key
//! cyclically over 256 steps, so a key repeated out to 256 bytes yields the
//! same keystream as the key itself.

use rc4::{Key, KeyInit, Rc4 as Rc4Core, StreamCipher, consts::U256};
use zeroize::Zeroize;

use crate::error::CryptoError;

const SCHEDULE_LEN: usize = 256;

/// RC4 keystream state for one direction.
pub struct Rc4 {
    inner: Rc4Core<U256>,
}

impl Rc4 {
    /// Run the key schedule for `key`.
    ///
    /// # Errors
    ///
    /// - `EmptyKey` if `key` is empty
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        if key.is_empty() {
            return Err(CryptoError::EmptyKey);
        }

        let mut schedule = [0u8; SCHEDULE_LEN];
        for (slot, byte) in schedule.iter_mut().zip(key.iter().cycle()) {
            *slot = *byte;
        }

        let inner = Rc4Core::<U256>::new(Key::<U256>::from_slice(&schedule));
        schedule.zeroize();

        Ok(Self { inner })
    }

    /// XOR `data` with the next `data.len()` keystream bytes in place.
    pub fn apply(&mut self, data: &mut [u8]) {
        self.inner.apply_keystream(data);
    }

    /// Owned-buffer convenience for [`apply`](Self::apply).
    pub fn process(&mut self, data: &[u8]) -> Vec<u8> {
        let mut out = data.to_vec();
        self.apply(&mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 6229 test vectors, offset 0
    #[test]
    fn rfc6229_key_0102030405() {
        let mut rc4 = Rc4::new(&[0x01, 0x02, 0x03, 0x04, 0x05]).unwrap();
        let stream = rc4.process(&[0u8; 16]);
        assert_eq!(hex::encode(stream), "b2396305f03dc027ccc3524a0a1118a8");
    }

    #[test]
    fn rfc6229_key_128_bit() {
        let key = hex::decode("0102030405060708090a0b0c0d0e0f10").unwrap();
        let mut rc4 = Rc4::new(&key).unwrap();
        let stream = rc4.process(&[0u8; 16]);
        assert_eq!(hex::encode(stream), "9ac7cc9a609d1ef7b2932899cde41b97");
    }

    #[test]
    fn classic_key_plaintext() {
        let mut rc4 = Rc4::new(b"Key").unwrap();
        assert_eq!(hex::encode(rc4.process(b"Plaintext")), "bbf316e8d940af0ad3");
    }

    #[test]
    fn keystream_continues_across_calls() {
        let mut whole = Rc4::new(b"Secret").unwrap();
        let expected = whole.process(b"Attack at dawn");
        assert_eq!(hex::encode(&expected), "45a01f645fc35b383552544b9bf5");

        let mut split = Rc4::new(b"Secret").unwrap();
        let mut actual = split.process(b"Attack ");
        actual.extend(split.process(b"at dawn"));

        assert_eq!(actual, expected);
    }

    #[test]
    fn empty_key_rejected() {
        assert_eq!(Rc4::new(&[]).err(), Some(CryptoError::EmptyKey));
    }
}
