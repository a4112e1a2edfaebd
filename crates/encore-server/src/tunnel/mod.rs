//! JSON tunnel services.
//!
//! `Json.Request` carries a column-oriented JSON document addressed to a
//! service path. The registry parses it once into named arguments, hands
//! them to the service registered for the path and serializes the service's
//! rows back. Every service that receives a `pid` validates it against the
//! caller's PID stack before touching the repository.

mod config;
mod entities;
mod leaderboards;
mod misc;
mod scores;
mod setlists;
mod stats;

use std::collections::HashMap;

use encore_core::{Environment, Platform, SessionState, validation};
use encore_proto::tunnel::{RowWriter, TunnelArgs, TunnelRequest, TunnelResponse, TunnelRow};

use crate::{handler_error::HandlerError, services::Services, storage::Storage};

/// One tunnel request in flight.
pub struct TunnelCall<'a, E: Environment, S: Storage> {
    /// Caller's session
    pub session: &'a SessionState,
    /// Shared state
    pub services: &'a Services<E, S>,
    /// Service path
    pub path: &'a str,
    /// Named arguments
    pub args: &'a TunnelArgs,
}

impl<E: Environment, S: Storage> TunnelCall<'_, E, S> {
    /// The `pid` argument, checked against the caller's PID stack.
    pub fn pid(&self) -> Result<u32, HandlerError> {
        let pid = self.u32_arg("pid")?;
        validation::validate_client_pid(self.session, pid)?;
        Ok(pid)
    }

    /// The `pid` argument if present, checked like [`Self::pid`].
    pub fn opt_pid(&self) -> Result<Option<u32>, HandlerError> {
        if self.args.get("pid").is_some() { self.pid().map(Some) } else { Ok(None) }
    }

    /// Required non-negative integer argument.
    pub fn u32_arg(&self, name: &str) -> Result<u32, HandlerError> {
        let value = self.args.int(name)?;
        u32::try_from(value).map_err(|_| HandlerError::InvalidArgument(format!("{name} out of range: {value}")))
    }

    /// Optional non-negative integer argument; absent or negative gives `None`.
    pub fn opt_u32_arg(&self, name: &str) -> Option<u32> {
        self.args.opt_int(name).and_then(|v| u32::try_from(v).ok())
    }

    /// Caller's platform.
    pub fn platform(&self) -> Platform {
        self.session.platform
    }

    /// Unix seconds.
    pub fn now(&self) -> u64 {
        self.services.now_secs()
    }

    /// Response with one row.
    pub fn single<R: TunnelRow + ?Sized>(&self, row: &R) -> Result<TunnelResponse, HandlerError> {
        Ok(TunnelResponse::single(self.path, row)?)
    }

    /// Response with a list of rows.
    pub fn rows<R: TunnelRow>(&self, rows: &[R]) -> Result<TunnelResponse, HandlerError> {
        Ok(TunnelResponse::rows(self.path, rows)?)
    }

    /// Response with no rows.
    pub fn empty(&self) -> TunnelResponse {
        TunnelResponse::empty(self.path)
    }
}

/// A tunnel service.
pub type Service<E, S> = fn(&TunnelCall<'_, E, S>) -> Result<TunnelResponse, HandlerError>;

/// Services keyed by path.
pub struct TunnelRegistry<E: Environment, S: Storage> {
    services: HashMap<&'static str, Service<E, S>>,
}

impl<E: Environment, S: Storage> TunnelRegistry<E, S> {
    /// Registry with nothing registered.
    pub fn new() -> Self {
        Self { services: HashMap::new() }
    }

    /// Registry with every built-in service.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        config::register(&mut registry);
        misc::register(&mut registry);
        leaderboards::register(&mut registry);
        entities::register(&mut registry);
        scores::register(&mut registry);
        setlists::register(&mut registry);
        stats::register(&mut registry);
        registry
    }

    /// Register `service` under `path`. A later registration wins.
    pub fn insert(&mut self, path: &'static str, service: Service<E, S>) {
        self.services.insert(path, service);
    }

    /// True if `path` has a service.
    pub fn contains(&self, path: &str) -> bool {
        self.services.contains_key(path)
    }

    /// Number of services.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Run one request and serialize its response.
    ///
    /// # Errors
    ///
    /// - `Tunnel` for malformed documents, unknown paths and bad arguments
    /// - `Validation` if the body PID is not on the caller's stack
    /// - `Storage` if the repository fails
    pub fn handle(
        &self,
        session: &SessionState,
        services: &Services<E, S>,
        text: &str,
    ) -> Result<String, HandlerError> {
        let request = TunnelRequest::parse(text).map_err(|err| HandlerError::Tunnel(err.to_string()))?;
        let Some(service) = self.services.get(request.path.as_str()) else {
            return Err(HandlerError::Tunnel(format!("no service at {:?}", request.path)));
        };

        let call = TunnelCall { session, services, path: &request.path, args: &request.args };
        let response = service(&call).map_err(|err| match err {
            HandlerError::Protocol(err) => HandlerError::Tunnel(format!("{}: {err}", request.path)),
            HandlerError::InvalidArgument(msg) => HandlerError::Tunnel(format!("{}: {msg}", request.path)),
            other => other,
        })?;

        tracing::debug!(pid = session.pid, path = %request.path, rows = response.row_count(), "tunnel request");
        Ok(response.to_json_string())
    }
}

impl<E: Environment, S: Storage> Default for TunnelRegistry<E, S> {
    fn default() -> Self {
        Self::new()
    }
}

/// `{ret_code}` answer; 0 accepted, 1 rejected.
pub(crate) struct RetCode(pub bool);

impl TunnelRow for RetCode {
    fn write_row(&self, row: &mut RowWriter<'_>) {
        row.int("ret_code", i64::from(!self.0));
    }
}

/// Comma-separated config value as a list; missing key is empty.
pub(crate) fn config_list<S: Storage>(
    repo: &crate::storage::Repository<S>,
    key: &str,
) -> Result<Vec<String>, HandlerError> {
    Ok(repo
        .get_config(key)?
        .map(|v| v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect())
        .unwrap_or_default())
}
