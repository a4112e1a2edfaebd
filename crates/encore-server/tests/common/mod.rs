//! Shared fixtures for the server integration tests.

#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use bytes::Bytes;
use encore_core::{Endpoint, Environment, Platform, SessionState};
use encore_proto::{ProtocolId, RmcRequest, RmcResponse, StreamWriter};
use encore_server::{ClientRegistry, Dispatcher, HandlerConfig, MemoryStorage, Services, Storage};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Deterministic environment: a manual clock and a seeded generator.
#[derive(Clone)]
pub struct TestEnv {
    millis: Arc<AtomicU64>,
    rng: Arc<Mutex<ChaCha8Rng>>,
}

impl TestEnv {
    pub fn new(seed: u64) -> Self {
        Self { millis: Arc::new(AtomicU64::new(0)), rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))) }
    }

    /// Move both clocks forward.
    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    /// Set the clock to `secs` after the epoch.
    pub fn set_secs(&self, secs: u64) {
        self.millis.store(secs * 1000, Ordering::SeqCst);
    }
}

impl Environment for TestEnv {
    type Instant = Duration;

    fn now(&self) -> Self::Instant {
        Duration::from_millis(self.millis.load(Ordering::SeqCst))
    }

    fn wall_clock_secs(&self) -> u64 {
        self.millis.load(Ordering::SeqCst) / 1000
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap().fill_bytes(buffer);
    }
}

pub fn dispatcher_with<S: Storage>(env: TestEnv, storage: S) -> Dispatcher<TestEnv, S> {
    let services = Services::new(env, storage, Arc::new(ClientRegistry::new()), HandlerConfig::default());
    Dispatcher::new(Arc::new(services))
}

pub fn dispatcher(env: TestEnv) -> Dispatcher<TestEnv, MemoryStorage> {
    dispatcher_with(env, MemoryStorage::new())
}

/// Unauthenticated session for a client at `10.0.0.<host>:3074`.
pub fn session(endpoint: Endpoint, platform: Platform, host: u8) -> SessionState {
    let address = SocketAddr::from(([10, 0, 0, host], 3074));
    SessionState::new(endpoint, platform, address, u32::from(host))
}

pub fn request(protocol: ProtocolId, method: u32, call_id: u32, params: StreamWriter) -> RmcRequest {
    RmcRequest { protocol_id: protocol.to_u8(), call_id, method_id: method, parameters: params.freeze() }
}

/// Payload of a successful response; panics on an error response.
pub fn payload(response: &RmcResponse) -> Bytes {
    match response {
        RmcResponse::Success { payload, .. } => payload.clone(),
        RmcResponse::Error { error_code, .. } => panic!("request failed with {error_code:#010x}"),
    }
}
