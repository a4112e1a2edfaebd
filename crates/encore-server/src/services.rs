//! Shared state handed to every handler.
//!
//! One `Services` value exists per server. Handlers receive it by reference
//! next to the caller's own session; nothing in here is global.

use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicU32, Ordering},
};

use encore_core::{Environment, MessageStore};

use crate::{
    config::HandlerConfig,
    registry::ClientRegistry,
    storage::{Repository, Storage},
    tunnel::TunnelRegistry,
};

/// Process-wide state shared by all clients.
pub struct Services<E: Environment, S: Storage> {
    /// Time and randomness
    pub env: E,
    /// Persistent records
    pub repo: Repository<S>,
    /// Connected clients
    pub registry: Arc<ClientRegistry>,
    /// Handler settings
    pub config: HandlerConfig,
    messages: Mutex<MessageStore>,
    tunnel: TunnelRegistry<E, S>,
    next_call_id: AtomicU32,
}

impl<E: Environment, S: Storage> Services<E, S> {
    /// Assemble the shared state with an empty message store.
    pub fn new(env: E, storage: S, registry: Arc<ClientRegistry>, config: HandlerConfig) -> Self {
        Self {
            env,
            repo: Repository::new(storage),
            registry,
            config,
            messages: Mutex::new(MessageStore::new()),
            tunnel: TunnelRegistry::standard(),
            next_call_id: AtomicU32::new(1),
        }
    }

    /// Unix seconds.
    pub fn now_secs(&self) -> u64 {
        self.env.wall_clock_secs()
    }

    /// Message store. Never held across a repository call.
    pub fn messages(&self) -> MutexGuard<'_, MessageStore> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// JSON tunnel services.
    pub fn tunnel(&self) -> &TunnelRegistry<E, S> {
        &self.tunnel
    }

    /// Call id for a server-initiated request.
    pub fn next_call_id(&self) -> u32 {
        self.next_call_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Drop expired messages. Returns how many were dropped.
    pub fn purge_messages(&self) -> usize {
        let now = self.now_secs();
        self.messages().purge(now)
    }
}
