//! Client registry.
//!
//! Two indexes over the connected clients:
//!
//! - `(endpoint, address)` → inbox, used by the listeners to route datagrams
//! - connection id → address, principal and station URLs, used by handlers
//!   that address another client (NAT probes, URL lookups)
//!
//! Both indexes sit behind one reader-writer lock; lookups take the read
//! side. Only the owning client task writes its own entry. Handlers read other
//! entries and may push a notification into another client's inbox; they
//! never touch another client's session.

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use bytes::Bytes;
use encore_core::Endpoint;
use encore_proto::StationUrl;
use tokio::sync::mpsc;

/// Largest connection id; ids are 16-bit on the wire.
pub const MAX_CONNECTION_ID: u32 = 0xFFFF;

/// Work delivered to a client task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Raw datagram from the client's address
    Datagram(Bytes),
    /// Server-initiated RMC message to send to the client
    Notify(Bytes),
}

/// What other clients may learn about a connected client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedClient {
    /// Listener the client is on
    pub endpoint: Endpoint,
    /// Remote address
    pub address: SocketAddr,
    /// Current principal; 0 before authentication
    pub pid: u32,
    /// Station URLs registered on the secure endpoint
    pub station_urls: Vec<StationUrl>,
}

struct Entry {
    info: ConnectedClient,
    inbox: mpsc::Sender<ClientEvent>,
}

#[derive(Default)]
struct Inner {
    by_address: HashMap<(Endpoint, SocketAddr), u32>,
    by_connection: HashMap<u32, Entry>,
    last_connection_id: u32,
}

impl Inner {
    fn allocate_connection_id(&mut self) -> Option<u32> {
        for _ in 0..MAX_CONNECTION_ID {
            self.last_connection_id = self.last_connection_id % MAX_CONNECTION_ID + 1;
            if !self.by_connection.contains_key(&self.last_connection_id) {
                return Some(self.last_connection_id);
            }
        }
        None
    }
}

/// Registry of connected clients, shared by listeners and handlers.
#[derive(Default)]
pub struct ClientRegistry {
    inner: RwLock<Inner>,
}

impl ClientRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new client and assign its connection id.
    ///
    /// Returns `None` if the address is already registered on `endpoint` or
    /// every connection id is in use.
    pub fn register(
        &self,
        endpoint: Endpoint,
        address: SocketAddr,
        inbox: mpsc::Sender<ClientEvent>,
    ) -> Option<u32> {
        let mut inner = self.write();
        if inner.by_address.contains_key(&(endpoint, address)) {
            return None;
        }
        let connection_id = inner.allocate_connection_id()?;
        inner.by_address.insert((endpoint, address), connection_id);
        inner.by_connection.insert(
            connection_id,
            Entry { info: ConnectedClient { endpoint, address, pid: 0, station_urls: Vec::new() }, inbox },
        );
        Some(connection_id)
    }

    /// Remove a client. Returns false if it was not registered.
    pub fn unregister(&self, endpoint: Endpoint, address: SocketAddr) -> bool {
        let mut inner = self.write();
        let Some(connection_id) = inner.by_address.remove(&(endpoint, address)) else {
            return false;
        };
        inner.by_connection.remove(&connection_id);
        true
    }

    /// Inbox of the client at `address`.
    pub fn inbox(&self, endpoint: Endpoint, address: SocketAddr) -> Option<mpsc::Sender<ClientEvent>> {
        let inner = self.read();
        let connection_id = inner.by_address.get(&(endpoint, address))?;
        inner.by_connection.get(connection_id).map(|e| e.inbox.clone())
    }

    /// Publish a client's principal and station URLs.
    pub fn update(&self, connection_id: u32, pid: u32, station_urls: &[StationUrl]) {
        if let Some(entry) = self.write().by_connection.get_mut(&connection_id) {
            entry.info.pid = pid;
            entry.info.station_urls = station_urls.to_vec();
        }
    }

    /// Client with `connection_id`.
    pub fn lookup(&self, connection_id: u32) -> Option<ConnectedClient> {
        self.read().by_connection.get(&connection_id).map(|e| e.info.clone())
    }

    /// Secure-endpoint client currently authenticated as `pid`.
    pub fn find_by_pid(&self, pid: u32) -> Option<(u32, ConnectedClient)> {
        self.read()
            .by_connection
            .iter()
            .find(|(_, e)| e.info.endpoint == Endpoint::Secure && e.info.pid == pid)
            .map(|(&id, e)| (id, e.info.clone()))
    }

    /// Queue a server-initiated message for another client.
    ///
    /// Returns false if the client is gone or its inbox is full.
    pub fn notify(&self, connection_id: u32, message: Bytes) -> bool {
        let inbox = match self.read().by_connection.get(&connection_id) {
            Some(entry) => entry.inbox.clone(),
            None => return false,
        };
        inbox.try_send(ClientEvent::Notify(message)).is_ok()
    }

    /// Number of connected clients on both endpoints.
    pub fn len(&self) -> usize {
        self.read().by_connection.len()
    }

    /// True if no clients are connected.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
