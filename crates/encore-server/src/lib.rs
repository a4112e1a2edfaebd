//! Encore online-services server.
//!
//! Production runtime for the PRUDP auth and secure endpoints, using Tokio
//! for I/O, the system clock and OS randomness.
//!
//! # Architecture
//!
//! [`encore_core`] holds the Sans-IO pieces: the PRUDP connection state
//! machine, session state and validation. This crate supplies the I/O
//! around them:
//!
//! - [`UdpTransport`]: one socket per endpoint
//! - [`ClientRegistry`]: routes datagrams from a source address to that
//!   client's task, and lets handlers reach other clients
//! - [`ClientTask`]: owns one client's connection and session
//! - [`Dispatcher`]: routes RMC requests to protocol handlers
//! - [`Repository`]: typed records over a pluggable [`Storage`]
//!
//! # Shutdown
//!
//! [`Server::run`] owns a `watch` channel. The listeners, the purge loop and
//! every client task exit when it flips; clients send a disconnect first.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod dispatcher;
mod error;
pub mod handler_error;
pub mod protocols;
pub mod registry;
pub mod services;
pub mod storage;
mod system_env;
pub mod transport;
pub mod tunnel;

use std::{net::SocketAddr, sync::Arc};

use bytes::Bytes;
pub use client::ClientTask;
pub use config::{HandlerConfig, ServerRuntimeConfig};
pub use dispatcher::Dispatcher;
use encore_core::{Connection, ConnectionConfig, Endpoint, Environment, SessionState};
pub use error::ServerError;
pub use handler_error::HandlerError;
pub use registry::{ClientEvent, ClientRegistry};
pub use services::Services;
pub use storage::{ChaoticStorage, MemoryStorage, RedbStorage, Repository, Storage, StorageError};
pub use system_env::SystemEnv;
use tokio::{
    sync::{mpsc, watch},
    task::JoinSet,
};
use tracing::Instrument;
pub use transport::UdpTransport;

/// Stops a running [`Server`].
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Signal every listener and client to stop.
    pub fn shutdown(&self) {
        self.sender.send_replace(true);
    }
}

/// Production Encore server.
///
/// Two listeners share one [`Dispatcher`]; clients on either endpoint see the
/// same repository, message store and registry.
pub struct Server<E: Environment, S: Storage> {
    config: ServerRuntimeConfig,
    dispatcher: Arc<Dispatcher<E, S>>,
    auth: UdpTransport,
    secure: UdpTransport,
    shutdown: Arc<watch::Sender<bool>>,
}

impl<S: Storage> Server<SystemEnv, S> {
    /// Bind both endpoints with the system environment.
    pub fn bind(config: ServerRuntimeConfig, storage: S) -> Result<Self, ServerError> {
        Self::bind_with_env(config, SystemEnv::new(), storage)
    }
}

impl<E: Environment, S: Storage> Server<E, S> {
    /// Bind both endpoints.
    ///
    /// Must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// - `Config` if the configuration is inconsistent
    /// - `Transport` if either socket cannot be bound
    pub fn bind_with_env(config: ServerRuntimeConfig, env: E, storage: S) -> Result<Self, ServerError> {
        config.validate()?;

        let auth = UdpTransport::bind(Endpoint::Auth, SocketAddr::new(config.listen_address, config.auth_port))?;
        let secure =
            UdpTransport::bind(Endpoint::Secure, SocketAddr::new(config.listen_address, config.secure_port))?;

        let mut handler = config.handler.clone();
        // an ephemeral secure port is only known after binding
        if config.secure_port == 0 {
            handler.secure_port = secure.local_addr()?.port();
        }

        let registry = Arc::new(ClientRegistry::new());
        let services = Arc::new(Services::new(env, storage, registry, handler));
        let dispatcher = Arc::new(Dispatcher::new(services));
        let (shutdown, _) = watch::channel(false);

        Ok(Self { config, dispatcher, auth, secure, shutdown: Arc::new(shutdown) })
    }

    /// Local address of `endpoint`.
    pub fn local_addr(&self, endpoint: Endpoint) -> Result<SocketAddr, ServerError> {
        match endpoint {
            Endpoint::Auth => self.auth.local_addr(),
            Endpoint::Secure => self.secure.local_addr(),
        }
    }

    /// Shared state, for inspection and seeding.
    pub fn services(&self) -> &Arc<Services<E, S>> {
        self.dispatcher.services()
    }

    /// Handle that stops [`Server::run`].
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle { sender: Arc::clone(&self.shutdown) }
    }

    /// Serve until shut down.
    ///
    /// # Errors
    ///
    /// - `Internal` if a listener or the purge loop panicked
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!(
            auth = %self.auth.local_addr()?,
            secure = %self.secure.local_addr()?,
            "Server starting"
        );

        let mut tasks = JoinSet::new();
        for transport in [self.auth.clone(), self.secure.clone()] {
            let listener = Listener {
                transport,
                dispatcher: Arc::clone(&self.dispatcher),
                connection: self.config.connection.clone(),
                shutdown: self.shutdown.subscribe(),
            };
            tasks.spawn(listener.run());
        }
        tasks.spawn(purge_loop(
            Arc::clone(self.dispatcher.services()),
            self.config.purge_interval,
            self.shutdown.subscribe(),
        ));

        let mut outcome = Ok(());
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!("server task failed: {e}");
                self.shutdown.send_replace(true);
                outcome = Err(ServerError::Internal(format!("server task failed: {e}")));
            }
        }

        tracing::info!("Server stopped");
        outcome
    }
}

/// Receives datagrams on one endpoint and routes them to client tasks.
struct Listener<E: Environment, S: Storage> {
    transport: UdpTransport,
    dispatcher: Arc<Dispatcher<E, S>>,
    connection: ConnectionConfig,
    shutdown: watch::Receiver<bool>,
}

impl<E: Environment, S: Storage> Listener<E, S> {
    async fn run(mut self) {
        let mut buf = vec![0u8; transport::MAX_DATAGRAM_SIZE];
        let endpoint = self.transport.endpoint();

        loop {
            tokio::select! {
                received = self.transport.recv_from(&mut buf) => match received {
                    Ok((len, from)) => self.route(Bytes::copy_from_slice(&buf[..len]), from),
                    // e.g. ICMP port unreachable surfacing on the next read
                    Err(e) => tracing::debug!(?endpoint, "{e}"),
                },
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                },
            }
        }

        tracing::info!(?endpoint, "listener stopped");
    }

    /// Hand a datagram to its client, starting one for a new address.
    fn route(&self, datagram: Bytes, from: SocketAddr) {
        let endpoint = self.transport.endpoint();
        let services = self.dispatcher.services();

        if let Some(inbox) = services.registry.inbox(endpoint, from) {
            if inbox.try_send(ClientEvent::Datagram(datagram)).is_err() {
                tracing::debug!(?endpoint, %from, "client inbox full, datagram dropped");
            }
            return;
        }

        let Some((platform, access_key)) = services.config.access_keys.detect(&datagram) else {
            tracing::debug!(?endpoint, %from, "no access key matches datagram");
            return;
        };

        let (inbox, events) = mpsc::channel(client::INBOX_CAPACITY);
        let Some(connection_id) = services.registry.register(endpoint, from, inbox.clone()) else {
            tracing::warn!(?endpoint, %from, "no connection id available");
            return;
        };

        let env = &services.env;
        let connection =
            match Connection::new(endpoint, access_key, env.random_u32(), self.connection.clone(), env.now()) {
                Ok(connection) => connection,
                Err(e) => {
                    tracing::error!(?endpoint, %from, "failed to create connection: {e}");
                    services.registry.unregister(endpoint, from);
                    return;
                },
            };

        let session = SessionState::new(endpoint, platform, from, connection_id);
        let task = ClientTask::new(connection, session, Arc::clone(&self.dispatcher), self.transport.clone());
        if inbox.try_send(ClientEvent::Datagram(datagram)).is_err() {
            tracing::debug!(?endpoint, %from, "first datagram not queued");
        }

        tracing::debug!(?endpoint, %from, %platform, connection_id, "new client");
        let span = tracing::info_span!("client", ?endpoint, %from, connection_id);
        tokio::spawn(task.run(events, self.shutdown.clone()).instrument(span));
    }
}

/// Sweep expired messages until shutdown.
async fn purge_loop<E: Environment, S: Storage>(
    services: Arc<Services<E, S>>,
    period: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let purged = services.purge_messages();
                if purged > 0 {
                    tracing::debug!(purged, "expired messages purged");
                }
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            },
        }
    }
}
