//! Fuzz target for request dispatch under storage failures
//!
//! Arbitrary requests against every registered method, with a
//! `ChaoticStorage` failing a fuzzer-chosen share of repository calls.
//!
//! # Invariants
//!
//! - Dispatch never panics, whatever the parameters or storage outcome
//! - Every response echoes the request's call id
//! - The route table answers every protocol, known method or not

#![no_main]

use std::{net::SocketAddr, sync::Arc};

use arbitrary::Arbitrary;
use bytes::Bytes;
use encore_core::{Endpoint, Platform, SessionState};
use encore_proto::{ProtocolId, RmcRequest, RmcResponse};
use encore_server::{
    ChaoticStorage, ClientRegistry, Dispatcher, HandlerConfig, MemoryStorage, Services, SystemEnv,
};
use libfuzzer_sys::fuzz_target;

const PROTOCOLS: [ProtocolId; 11] = [
    ProtocolId::NatTraversal,
    ProtocolId::Authentication,
    ProtocolId::Secure,
    ProtocolId::Matchmaking,
    ProtocolId::Messaging,
    ProtocolId::AccountManagement,
    ProtocolId::MessageDelivery,
    ProtocolId::CustomMatchmaking,
    ProtocolId::BinaryData,
    ProtocolId::Json,
    ProtocolId::ConsoleManagement,
];

#[derive(Debug, Arbitrary)]
struct Scenario {
    chaos_seed: u64,
    /// 0-9 maps to 0%-90%
    failure_rate_tenth: u8,
    secure: bool,
    platform: u8,
    pid: u16,
    requests: Vec<Call>,
}

#[derive(Debug, Arbitrary)]
struct Call {
    protocol: u8,
    method: u8,
    params: Vec<u8>,
}

fuzz_target!(|scenario: Scenario| {
    let failure_rate = f64::from(scenario.failure_rate_tenth % 10) / 10.0;
    let storage = ChaoticStorage::with_seed(MemoryStorage::new(), failure_rate, scenario.chaos_seed);
    let services = Services::new(SystemEnv::new(), storage, Arc::new(ClientRegistry::new()), HandlerConfig::default());
    let dispatcher = Dispatcher::new(Arc::new(services));

    let endpoint = if scenario.secure { Endpoint::Secure } else { Endpoint::Auth };
    let platform = Platform::ALL[scenario.platform as usize % Platform::ALL.len()];
    let mut session = SessionState::new(endpoint, platform, SocketAddr::from(([10, 0, 0, 1], 3074)), 1);
    if scenario.secure {
        session.authenticate(1000 + u32::from(scenario.pid), "fuzzer");
    }

    for (call_id, call) in (1u32..).zip(scenario.requests) {
        let protocol = PROTOCOLS[call.protocol as usize % PROTOCOLS.len()];
        let request = RmcRequest {
            protocol_id: protocol.to_u8(),
            call_id,
            method_id: u32::from(call.method % 32),
            parameters: Bytes::from(call.params),
        };

        let response = dispatcher.dispatch(&mut session, &request);
        assert_eq!(response.call_id(), call_id);
        // round-trips through the wire form the client would see
        assert_eq!(RmcResponse::decode(&response.encode()).ok(), Some(response));
    }
});
