//! Fuzz target for the PRUDP connection state machine
//!
//! Drives one server-side connection with arbitrary datagrams, clock steps
//! and sends, on either endpoint.
//!
//! # Invariants
//!
//! - `handle_packet`, `tick` and `send` never panic
//! - Nothing but `Close` or an error comes out of a closed connection
//! - Sending is only accepted while connected

#![no_main]

use std::time::Duration;

use arbitrary::Arbitrary;
use bytes::Bytes;
use encore_core::{
    Connection, ConnectionAction, ConnectionConfig, ConnectionState, Endpoint, Platform,
};
use encore_crypto::SessionKey;
use encore_proto::Packet;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Scenario {
    secure: bool,
    platform: u8,
    server_signature: u32,
    steps: Vec<Step>,
}

#[derive(Debug, Arbitrary)]
enum Step {
    Datagram(Vec<u8>),
    Advance { millis: u16 },
    Send(Vec<u8>),
    Disconnect,
}

fuzz_target!(|scenario: Scenario| {
    let platform = Platform::ALL[scenario.platform as usize % Platform::ALL.len()];
    let endpoint = if scenario.secure { Endpoint::Secure } else { Endpoint::Auth };
    let config = ConnectionConfig::default();
    let mut now = Duration::ZERO;

    let Ok(mut conn) = Connection::new(endpoint, platform.default_access_key(), scenario.server_signature, config, now)
    else {
        return;
    };
    let seed = conn.checksum_seed();

    for step in scenario.steps {
        let was_closed = conn.state() == ConnectionState::Closed;
        let actions = match step {
            Step::Datagram(bytes) => {
                let Ok(packet) = Packet::decode(&bytes, seed) else {
                    continue;
                };
                conn.handle_packet(packet, now).unwrap_or_default()
            },
            Step::Advance { millis } => {
                now += Duration::from_millis(u64::from(millis));
                conn.tick(now)
            },
            Step::Send(message) => match conn.send(&Bytes::from(message), now) {
                Ok(actions) => {
                    assert_eq!(conn.state(), ConnectionState::Connected);
                    actions
                },
                Err(_) => Vec::new(),
            },
            Step::Disconnect => conn.disconnect(),
        };

        for action in actions {
            match action {
                ConnectionAction::VerifyTicket(request) => {
                    assert!(!was_closed);
                    if request.pid % 2 == 0 {
                        let _ = conn.accept_connect(&SessionKey::from_bytes([0x5A; 16]), request.challenge, now);
                    } else {
                        conn.reject_connect("odd pid");
                    }
                },
                ConnectionAction::Send(packet) => {
                    assert!(!was_closed, "closed connection sent {packet:?}");
                    let _ = packet.encode(seed);
                },
                ConnectionAction::Deliver(_) => assert!(!was_closed),
                ConnectionAction::Close { .. } => {},
            }
        }
    }
});
