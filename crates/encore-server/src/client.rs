//! Per-client task.
//!
//! Each remote address on each endpoint gets one task that owns its PRUDP
//! [`Connection`] and its [`SessionState`]. The task executes the actions the
//! connection returns: it writes packets to the socket, dispatches delivered
//! RMC requests, verifies tickets on the secure endpoint and tears itself
//! down on close.
//!
//! Ticket checks on the secure endpoint run on the blocking pool under the
//! same deadline as requests.
//!
//! Requests are dispatched on the blocking pool against a copy of the
//! session. The copy replaces the live session only if the handler finishes
//! within the request timeout; a late handler's session edits are dropped.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use bytes::Bytes;
use encore_core::{
    Connection, ConnectionAction, Environment, SessionState,
    prudp::ConnectPayload,
};
use encore_crypto::{SessionKey, verify_ticket};
use encore_proto::{ErrorCode, Packet, RmcRequest, RmcResponse};
use tokio::{
    sync::{mpsc, watch},
    time::MissedTickBehavior,
};

use crate::{
    dispatcher::Dispatcher,
    handler_error::HandlerError,
    protocols::authentication::ticket_password,
    registry::ClientEvent,
    services::Services,
    storage::Storage,
    transport::UdpTransport,
};

/// How often the connection is ticked for retransmits and idle eviction.
pub const TICK_INTERVAL: Duration = Duration::from_millis(250);

/// Inbox depth per client.
pub const INBOX_CAPACITY: usize = 256;

/// One client's connection, session and the shared server pieces it uses.
pub struct ClientTask<E: Environment, S: Storage> {
    connection: Connection<E::Instant>,
    session: SessionState,
    dispatcher: Arc<Dispatcher<E, S>>,
    transport: UdpTransport,
}

impl<E: Environment, S: Storage> ClientTask<E, S> {
    /// Task for a freshly registered client.
    pub fn new(
        connection: Connection<E::Instant>,
        session: SessionState,
        dispatcher: Arc<Dispatcher<E, S>>,
        transport: UdpTransport,
    ) -> Self {
        Self { connection, session, dispatcher, transport }
    }

    /// Session as last committed.
    pub fn session(&self) -> &SessionState {
        &self.session
    }

    fn now(&self) -> E::Instant {
        self.dispatcher.services().env.now()
    }

    /// Run until the connection closes or shutdown is signalled.
    /// Unregisters the client on exit.
    pub async fn run(mut self, mut inbox: mpsc::Receiver<ClientEvent>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let actions = tokio::select! {
                event = inbox.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        let actions = self.connection.disconnect();
                        self.execute(actions).await;
                        break;
                    },
                },
                _ = ticker.tick() => {
                    let now = self.now();
                    self.connection.tick(now)
                },
                changed = shutdown.changed() => {
                    if changed.is_ok() && !*shutdown.borrow() {
                        continue;
                    }
                    let actions = self.connection.disconnect();
                    self.execute(actions).await;
                    break;
                },
            };

            if self.execute(actions).await {
                break;
            }
        }

        let services = self.dispatcher.services();
        services.registry.unregister(self.session.endpoint, self.session.address);
        tracing::debug!(
            addr = %self.session.address,
            pid = self.session.pid,
            clients = services.registry.len(),
            "client task finished"
        );
    }

    /// Turn one inbox event into connection actions.
    pub fn handle_event(&mut self, event: ClientEvent) -> Vec<ConnectionAction> {
        let now = self.now();
        match event {
            ClientEvent::Datagram(datagram) => {
                let packet = match Packet::decode(&datagram, self.connection.checksum_seed()) {
                    Ok(packet) => packet,
                    Err(e) => {
                        tracing::debug!(addr = %self.session.address, "dropping datagram: {e}");
                        return Vec::new();
                    },
                };
                match self.connection.handle_packet(packet, now) {
                    Ok(actions) => actions,
                    Err(e) if e.is_fatal() => {
                        tracing::warn!(addr = %self.session.address, "closing connection: {e}");
                        self.connection.disconnect()
                    },
                    Err(e) => {
                        tracing::debug!(addr = %self.session.address, "dropping packet: {e}");
                        Vec::new()
                    },
                }
            },
            ClientEvent::Notify(message) => self.send_message(&message),
        }
    }

    /// Execute actions until none remain. Returns true once the connection
    /// has closed.
    async fn execute(&mut self, actions: Vec<ConnectionAction>) -> bool {
        let mut queue = VecDeque::from(actions);
        let mut closed = false;

        while let Some(action) = queue.pop_front() {
            match action {
                ConnectionAction::Send(packet) => self.send_packet(&packet).await,
                ConnectionAction::Deliver(message) => {
                    let follow_up = self.handle_message(&message).await;
                    queue.extend(follow_up);
                },
                ConnectionAction::VerifyTicket(payload) => {
                    let follow_up = self.verify_connect(&payload).await;
                    queue.extend(follow_up);
                },
                ConnectionAction::Close { reason } => {
                    tracing::info!(
                        addr = %self.session.address,
                        endpoint = ?self.session.endpoint,
                        pid = self.session.pid,
                        "connection closed: {reason}"
                    );
                    closed = true;
                },
            }
        }

        closed
    }

    async fn send_packet(&self, packet: &Packet) {
        let datagram = match packet.encode(self.connection.checksum_seed()) {
            Ok(datagram) => datagram,
            Err(e) => {
                tracing::error!(addr = %self.session.address, "failed to encode packet: {e}");
                return;
            },
        };
        if let Err(e) = self.transport.send_to(&datagram, self.session.address).await {
            tracing::warn!("{e}");
        }
    }

    fn send_message(&mut self, message: &Bytes) -> Vec<ConnectionAction> {
        let now = self.now();
        match self.connection.send(message, now) {
            Ok(actions) => actions,
            Err(e) => {
                tracing::debug!(addr = %self.session.address, "message not sent: {e}");
                Vec::new()
            },
        }
    }

    async fn handle_message(&mut self, message: &Bytes) -> Vec<ConnectionAction> {
        let request = match RmcRequest::decode(message) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(addr = %self.session.address, "undecodable RMC request: {e}");
                return Vec::new();
            },
        };
        let response = self.dispatch(request).await;
        self.send_message(&response.encode())
    }

    /// Dispatch on the blocking pool under the request timeout.
    pub async fn dispatch(&mut self, request: RmcRequest) -> RmcResponse {
        let dispatcher = Arc::clone(&self.dispatcher);
        let timeout = dispatcher.services().config.request_timeout;
        let mut session = self.session.clone();
        let in_flight = request.clone();

        let task = tokio::task::spawn_blocking(move || {
            let response = dispatcher.dispatch(&mut session, &in_flight);
            (session, response)
        });

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok((session, response))) => {
                self.session = session;
                self.publish();
                response
            },
            Ok(Err(e)) => {
                tracing::error!(
                    addr = %self.session.address,
                    protocol = request.protocol_id,
                    method = request.method_id,
                    "handler task failed: {e}"
                );
                RmcResponse::error(&request, ErrorCode::Unknown)
            },
            Err(_) => {
                tracing::warn!(
                    addr = %self.session.address,
                    protocol = request.protocol_id,
                    method = request.method_id,
                    ?timeout,
                    "request timed out"
                );
                RmcResponse::error(&request, HandlerError::Timeout.code())
            },
        }
    }

    fn publish(&self) {
        self.dispatcher.services().registry.update(
            self.session.connection_id,
            self.session.pid,
            &self.session.station_urls,
        );
    }

    async fn verify_connect(&mut self, payload: &ConnectPayload) -> Vec<ConnectionAction> {
        let key = match self.authenticate(payload).await {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(addr = %self.session.address, pid = payload.pid, "ticket rejected: {e}");
                return self.connection.reject_connect(format!("ticket rejected: {e}"));
            },
        };

        let now = self.now();
        match self.connection.accept_connect(&key, payload.challenge, now) {
            Ok(actions) => {
                tracing::info!(
                    addr = %self.session.address,
                    pid = self.session.pid,
                    username = self.session.username,
                    "secure connection established"
                );
                actions
            },
            Err(e) => {
                tracing::warn!(addr = %self.session.address, "connect not accepted: {e}");
                self.connection.reject_connect(e.to_string())
            },
        }
    }

    /// Check the ticket on the blocking pool under the request timeout and
    /// bind the session to its principal.
    async fn authenticate(&mut self, payload: &ConnectPayload) -> Result<SessionKey, HandlerError> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let timeout = dispatcher.services().config.request_timeout;
        let presented = payload.clone();

        let task = tokio::task::spawn_blocking(move || resolve_ticket(dispatcher.services(), &presented));
        let principal = match tokio::time::timeout(timeout, task).await {
            Ok(Ok(outcome)) => outcome?,
            Ok(Err(e)) => return Err(HandlerError::Aborted(format!("ticket check failed: {e}"))),
            Err(_) => return Err(HandlerError::Timeout),
        };

        if let Some((machine_id, friend_code)) = principal.machine {
            self.session.machine_id = machine_id;
            self.session.friend_code = Some(friend_code);
        }
        self.session.authenticate(principal.pid, principal.username);
        self.publish();
        Ok(principal.key)
    }
}

/// Who a verified ticket belongs to.
struct Principal {
    key: SessionKey,
    pid: u32,
    username: String,
    /// Console id and friend code, if the account has one
    machine: Option<(u32, String)>,
}

/// Verify a CONNECT ticket and look up its owner.
fn resolve_ticket<E: Environment, S: Storage>(
    services: &Services<E, S>,
    payload: &ConnectPayload,
) -> Result<Principal, HandlerError> {
    let repo = &services.repo;
    let pid = payload.pid;

    let password = ticket_password(repo, &services.config, pid)?;
    let key = verify_ticket(pid, &password, &payload.ticket)?;
    let user = repo.get_user_by_pid(pid)?.ok_or(HandlerError::InvalidPid(pid))?;

    // master users are the machine itself
    let machine_id = if repo.get_machine_by_id(pid)?.is_some() { pid } else { user.creator_machine };
    let machine = match machine_id {
        0 => None,
        id => repo.get_machine_by_id(id)?.map(|m| (m.id, m.friend_code)),
    };

    Ok(Principal { key, pid, username: user.username, machine })
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use encore_core::{ConnectionConfig, Endpoint, Platform};
    use encore_crypto::build_ticket;
    use encore_proto::{ProtocolId, StreamWriter, protocol};

    use super::*;
    use crate::{
        config::HandlerConfig,
        registry::ClientRegistry,
        storage::{MemoryStorage, UserRecord},
        system_env::SystemEnv,
    };

    fn task(endpoint: Endpoint, timeout: Duration) -> ClientTask<SystemEnv, MemoryStorage> {
        let env = SystemEnv::new();
        let registry = Arc::new(ClientRegistry::new());
        let config = HandlerConfig { request_timeout: timeout, ..HandlerConfig::default() };
        let services = Arc::new(Services::new(env.clone(), MemoryStorage::new(), Arc::clone(&registry), config));
        let dispatcher = Arc::new(Dispatcher::new(services));

        let transport = UdpTransport::bind(endpoint, "127.0.0.1:0".parse().unwrap()).unwrap();
        let address: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let (tx, _rx) = mpsc::channel(INBOX_CAPACITY);
        let cid = registry.register(endpoint, address, tx).unwrap();

        let key = Platform::Ps3.default_access_key();
        let connection = Connection::new(endpoint, key, 0x1234_5678, ConnectionConfig::default(), env.now()).unwrap();
        let session = SessionState::new(endpoint, Platform::Ps3, address, cid);
        ClientTask::new(connection, session, dispatcher, transport)
    }

    fn get_pid_request(name: &str) -> RmcRequest {
        let mut params = StreamWriter::new();
        params.write_string(name);
        RmcRequest {
            protocol_id: ProtocolId::Authentication.to_u8(),
            call_id: 5,
            method_id: protocol::authentication::GET_PID,
            parameters: params.freeze(),
        }
    }

    #[tokio::test]
    async fn dispatch_answers_through_the_route_table() {
        let mut client = task(Endpoint::Auth, Duration::from_secs(5));
        let response = client.dispatch(get_pid_request("nobody")).await;
        assert_eq!(response.call_id(), 5);
        assert_eq!(response.error_code(), Some(ErrorCode::InvalidUsername));
    }

    #[tokio::test]
    async fn login_commits_session_changes() {
        let mut client = task(Endpoint::Auth, Duration::from_secs(5));
        let mut params = StreamWriter::new();
        params.write_string("alice");
        let request = RmcRequest {
            protocol_id: ProtocolId::Authentication.to_u8(),
            call_id: 1,
            method_id: protocol::authentication::LOGIN,
            parameters: params.freeze(),
        };

        let response = client.dispatch(request).await;
        assert_eq!(response.error_code(), None);
        assert!(client.session().is_authenticated());
        assert_eq!(client.session().username, "alice");
    }

    #[tokio::test]
    async fn valid_ticket_binds_the_principal() {
        let mut client = task(Endpoint::Secure, Duration::from_secs(5));
        let services = Arc::clone(client.dispatcher.services());
        services.repo.insert_user(&UserRecord::new(1001, "alice", Platform::Ps3, 0)).unwrap();

        let session_key = SessionKey::from_bytes([3; 16]);
        let ticket = build_ticket(1001, "", &session_key, &[4; 16]).unwrap().ticket;
        let payload = ConnectPayload { ticket: Bytes::from(ticket), pid: 1001, challenge: 7 };

        assert_eq!(client.authenticate(&payload).await.unwrap(), session_key);
        assert_eq!(client.session().pid, 1001);
        assert!(client.session().pid_stack.contains(1001));
        assert_eq!(services.registry.find_by_pid(1001).map(|(cid, _)| cid), Some(client.session().connection_id));
    }

    #[tokio::test]
    async fn forged_ticket_is_refused() {
        let mut client = task(Endpoint::Secure, Duration::from_secs(5));
        let services = Arc::clone(client.dispatcher.services());
        services.repo.insert_user(&UserRecord::new(1001, "alice", Platform::Ps3, 0)).unwrap();

        let ticket = build_ticket(1001, "wrong", &SessionKey::from_bytes([3; 16]), &[4; 16]).unwrap().ticket;
        let payload = ConnectPayload { ticket: Bytes::from(ticket), pid: 1001, challenge: 7 };

        assert!(matches!(client.authenticate(&payload).await, Err(HandlerError::Crypto(_))));
        assert!(!client.session().is_authenticated());
    }

    #[tokio::test]
    async fn ticket_check_runs_under_the_request_timeout() {
        let mut client = task(Endpoint::Secure, Duration::ZERO);
        let services = Arc::clone(client.dispatcher.services());
        services.repo.insert_user(&UserRecord::new(1001, "alice", Platform::Ps3, 0)).unwrap();

        let ticket = build_ticket(1001, "", &SessionKey::from_bytes([3; 16]), &[4; 16]).unwrap().ticket;
        let payload = ConnectPayload { ticket: Bytes::from(ticket), pid: 1001, challenge: 7 };

        assert!(matches!(client.authenticate(&payload).await, Err(HandlerError::Timeout)));
        assert!(!client.session().is_authenticated());
        assert!(services.registry.find_by_pid(1001).is_none());
    }

    #[tokio::test]
    async fn notify_before_connect_is_dropped() {
        let mut client = task(Endpoint::Secure, Duration::from_secs(5));
        let actions = client.handle_event(ClientEvent::Notify(Bytes::from_static(b"probe")));
        assert!(actions.is_empty());

        let garbage = client.handle_event(ClientEvent::Datagram(Bytes::from_static(&[1, 2, 3])));
        assert!(garbage.is_empty());
    }
}
