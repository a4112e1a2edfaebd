//! RMC dispatcher.
//!
//! Routes a decoded request to its handler by `(protocol, method)`, enforces
//! which endpoint a method may be called on, and turns every handler error
//! into a typed error response. A handler never sees a request it is not
//! allowed to answer.

use std::{collections::HashMap, sync::Arc};

use bytes::Bytes;
use encore_core::{Endpoint, Environment, SessionState, validation};
use encore_proto::{ProtocolId, RmcRequest, RmcResponse, StreamReader, StreamWriter};

use crate::{
    handler_error::HandlerError,
    protocols,
    services::Services,
    storage::Storage,
};

/// Where a method may be called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Auth endpoint, before any ticket exists
    Auth,
    /// Secure endpoint, after ticket verification
    Secure,
}

/// One request in flight: the caller's session, shared services and the
/// request itself.
pub struct Call<'a, E: Environment, S: Storage> {
    /// Caller's session; the only session a handler may write
    pub session: &'a mut SessionState,
    /// Shared state
    pub services: &'a Services<E, S>,
    /// Request being answered
    pub request: &'a RmcRequest,
}

impl<'a, E: Environment, S: Storage> Call<'a, E, S> {
    /// Reader over the request parameters.
    pub fn params(&self) -> StreamReader<'a> {
        StreamReader::new(&self.request.parameters)
    }

    /// Unix seconds.
    pub fn now(&self) -> u64 {
        self.services.now_secs()
    }

    /// `pid` was authenticated on this connection.
    pub fn validate_pid(&self, pid: u32) -> Result<(), HandlerError> {
        Ok(validation::validate_client_pid(self.session, pid)?)
    }

    /// `pid` was authenticated here, is not the master user and is not banned.
    pub fn validate_non_master_pid(&self, pid: u32) -> Result<(), HandlerError> {
        let banned = self.services.repo.get_banned_users()?;
        Ok(validation::validate_non_master_client_pid(self.session, pid, &banned)?)
    }

    /// The current principal is an ordinary user.
    pub fn require_non_master(&self) -> Result<(), HandlerError> {
        self.validate_non_master_pid(self.session.pid)
    }
}

/// Handler signature. The returned writer holds the response payload.
pub type Handler<E, S> = fn(&mut Call<'_, E, S>) -> Result<StreamWriter, HandlerError>;

struct Route<E: Environment, S: Storage> {
    access: Access,
    handler: Handler<E, S>,
}

/// Handlers keyed by `(protocol, method)`.
pub struct RouteTable<E: Environment, S: Storage> {
    routes: HashMap<(ProtocolId, u32), Route<E, S>>,
}

impl<E: Environment, S: Storage> RouteTable<E, S> {
    fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    /// Register a handler. A later registration for the same key wins.
    pub fn insert(&mut self, protocol: ProtocolId, method: u32, access: Access, handler: Handler<E, S>) {
        self.routes.insert((protocol, method), Route { access, handler });
    }

    /// Number of registered methods.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Routes requests to handlers.
pub struct Dispatcher<E: Environment, S: Storage> {
    routes: RouteTable<E, S>,
    services: Arc<Services<E, S>>,
}

impl<E: Environment, S: Storage> Dispatcher<E, S> {
    /// Dispatcher with every protocol registered.
    pub fn new(services: Arc<Services<E, S>>) -> Self {
        let mut routes = RouteTable::new();
        protocols::register_all(&mut routes);
        Self { routes, services }
    }

    /// Shared state.
    pub fn services(&self) -> &Arc<Services<E, S>> {
        &self.services
    }

    /// Registered methods.
    pub fn routes(&self) -> &RouteTable<E, S> {
        &self.routes
    }

    /// Answer one request. Errors become error responses; nothing panics out.
    pub fn dispatch(&self, session: &mut SessionState, request: &RmcRequest) -> RmcResponse {
        match self.call(session, request) {
            Ok(payload) => RmcResponse::success(request, payload),
            Err(err) => {
                log_failure(session, request, &err);
                RmcResponse::error(request, err.code())
            },
        }
    }

    fn call(&self, session: &mut SessionState, request: &RmcRequest) -> Result<Bytes, HandlerError> {
        let unknown = || HandlerError::UnknownMethod { protocol: request.protocol_id, method: request.method_id };
        let protocol = ProtocolId::from_u8(request.protocol_id).ok_or_else(unknown)?;
        let route = self.routes.routes.get(&(protocol, request.method_id)).ok_or_else(unknown)?;

        match route.access {
            Access::Auth if session.endpoint != Endpoint::Auth => {
                return Err(HandlerError::AccessDenied(format!("{protocol:?} is only served on the auth endpoint")));
            },
            Access::Secure if session.endpoint != Endpoint::Secure => {
                return Err(HandlerError::AccessDenied(format!("{protocol:?} is only served on the secure endpoint")));
            },
            Access::Secure if !session.is_authenticated() => return Err(HandlerError::NotAuthenticated),
            _ => {},
        }

        let mut call = Call { session, services: &self.services, request };
        Ok((route.handler)(&mut call)?.freeze())
    }
}

fn log_failure(session: &SessionState, request: &RmcRequest, err: &HandlerError) {
    let addr = session.address;
    let (protocol, method, call_id) = (request.protocol_id, request.method_id, request.call_id);
    match err {
        HandlerError::Storage(_) => {
            tracing::error!(%addr, pid = session.pid, protocol, method, call_id, "repository failure: {err}");
        },
        HandlerError::UnknownMethod { .. } | HandlerError::Protocol(_) => {
            tracing::warn!(%addr, protocol, method, call_id, "{err}");
        },
        _ => tracing::warn!(%addr, pid = session.pid, protocol, method, call_id, "request rejected: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use encore_core::Platform;
    use encore_proto::{ErrorCode, protocol};

    use super::*;
    use crate::{config::HandlerConfig, registry::ClientRegistry, storage::MemoryStorage, system_env::SystemEnv};

    fn dispatcher() -> Dispatcher<SystemEnv, MemoryStorage> {
        let services = Services::new(
            SystemEnv::new(),
            MemoryStorage::new(),
            Arc::new(ClientRegistry::new()),
            HandlerConfig { request_timeout: Duration::from_secs(1), ..HandlerConfig::default() },
        );
        Dispatcher::new(Arc::new(services))
    }

    fn session(endpoint: Endpoint) -> SessionState {
        SessionState::new(endpoint, Platform::Ps3, "10.0.0.9:5000".parse().unwrap(), 3)
    }

    fn request(protocol: ProtocolId, method: u32, params: StreamWriter) -> RmcRequest {
        RmcRequest { protocol_id: protocol.to_u8(), call_id: 77, method_id: method, parameters: params.freeze() }
    }

    #[test]
    fn unknown_method_answers_unknown() {
        let d = dispatcher();
        let response = d.dispatch(&mut session(Endpoint::Secure), &request(ProtocolId::Matchmaking, 999, StreamWriter::new()));
        assert_eq!(response.error_code(), Some(ErrorCode::Unknown));
        assert_eq!(response.call_id(), 77);
    }

    #[test]
    fn secure_methods_need_a_principal() {
        let d = dispatcher();
        let req = request(ProtocolId::CustomMatchmaking, protocol::custom_matchmaking::CUSTOM_FIND, StreamWriter::new());

        let response = d.dispatch(&mut session(Endpoint::Secure), &req);
        assert_eq!(response.error_code(), Some(ErrorCode::NotAuthenticated));

        let response = d.dispatch(&mut session(Endpoint::Auth), &req);
        assert_eq!(response.error_code(), Some(ErrorCode::AccessDenied));
    }

    #[test]
    fn truncated_parameters_answer_invalid_argument() {
        let d = dispatcher();
        let mut s = session(Endpoint::Secure);
        s.authenticate(1001, "alice");

        let response = d.dispatch(&mut s, &request(ProtocolId::Matchmaking, protocol::matchmaking::GET_STATE, StreamWriter::new()));
        assert_eq!(response.error_code(), Some(ErrorCode::InvalidArgument));
    }

    #[test]
    fn every_protocol_is_routed() {
        assert!(dispatcher().routes().len() >= 40);
    }
}
