//! Property-based tests for tickets and the stream cipher.
//!
//! Key derivation runs 65k+ MD5 rounds per call, so case counts are kept low.

use encore_crypto::{CryptoError, Rc4, SessionKey, build_ticket, verify_ticket};
use proptest::prelude::*;

#[test]
fn prop_ticket_yields_session_key() {
    let config = ProptestConfig { cases: 16, ..ProptestConfig::default() };
    proptest!(config, |(
        pid in any::<u32>(),
        password in "[A-Za-z0-9]{0,16}",
        session in any::<[u8; 16]>(),
        info in any::<[u8; 16]>(),
    )| {
        let key = SessionKey::from_bytes(session);
        let issued = build_ticket(pid, &password, &key, &info).expect("build should succeed");

        let recovered = verify_ticket(pid, &password, &issued.ticket).expect("verify should succeed");
        prop_assert_eq!(recovered, key);
    });
}

#[test]
fn prop_any_flipped_bit_rejected() {
    let config = ProptestConfig { cases: 16, ..ProptestConfig::default() };
    proptest!(config, |(pid in any::<u32>(), index in any::<prop::sample::Index>(), bit in 0u8..8)| {
        let key = SessionKey::from_bytes([0x11; 16]);
        let mut ticket = build_ticket(pid, "", &key, &[0x22; 16]).expect("build should succeed").ticket;
        let i = index.index(ticket.len());
        ticket[i] ^= 1 << bit;

        prop_assert_eq!(verify_ticket(pid, "", &ticket), Err(CryptoError::TicketSignatureMismatch));
    });
}

#[test]
fn prop_rc4_is_an_involution() {
    proptest!(|(key in prop::collection::vec(any::<u8>(), 1..32), data in prop::collection::vec(any::<u8>(), 0..512))| {
        let encrypted = Rc4::new(&key).expect("non-empty key").process(&data);
        let decrypted = Rc4::new(&key).expect("non-empty key").process(&encrypted);
        prop_assert_eq!(decrypted, data);
    });
}
