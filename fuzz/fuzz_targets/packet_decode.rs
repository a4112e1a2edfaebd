//! Fuzz target for Packet::decode
//!
//! Arbitrary datagrams under every platform's checksum seed. Decoding must
//! never panic, and anything that decodes must re-encode to a datagram that
//! decodes to the same packet.

#![no_main]

use encore_core::Platform;
use encore_proto::Packet;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    for platform in Platform::ALL {
        let seed = platform.default_access_key().checksum_seed();
        let Ok(packet) = Packet::decode(data, seed) else {
            continue;
        };

        let wire = packet.encode(seed).expect("decoded packet re-encodes");
        let again = Packet::decode(&wire, seed).expect("re-encoded packet decodes");
        assert_eq!(again, packet);
    }
});
