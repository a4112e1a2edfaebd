//! HMAC-MD5 helpers.

use hmac::{Hmac, Mac};
use md5::Md5;

type HmacMd5 = Hmac<Md5>;

/// HMAC-MD5 of `data` keyed by `key`.
pub fn hmac_md5(key: &[u8], data: &[u8]) -> [u8; 16] {
    let Ok(mut mac) = HmacMd5::new_from_slice(key) else {
        unreachable!("HMAC-MD5 accepts any key size");
    };
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Constant-time check of a full 16-byte HMAC-MD5 tag.
pub fn verify_hmac_md5(key: &[u8], data: &[u8], tag: &[u8]) -> bool {
    let Ok(mut mac) = HmacMd5::new_from_slice(key) else {
        unreachable!("HMAC-MD5 accepts any key size");
    };
    mac.update(data);
    mac.verify_slice(tag).is_ok()
}

/// Signature of a DATA packet: the first four bytes of
/// HMAC-MD5(access key, signed bytes), little-endian.
pub fn data_signature(access_key: &[u8], signed: &[u8]) -> u32 {
    let tag = hmac_md5(access_key, signed);
    u32::from_le_bytes([tag[0], tag[1], tag[2], tag[3]])
}
