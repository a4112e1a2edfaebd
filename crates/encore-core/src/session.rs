//! Per-client session state.
//!
//! One `SessionState` exists per remote address per endpoint. It is owned by
//! that client's task; handlers receive it by `&mut` and nothing else writes
//! it.

use std::net::SocketAddr;

use encore_proto::StationUrl;

use crate::{pid_stack::PidStack, platform::Platform};

/// Which of the two listeners a client reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Login and ticket issue
    Auth,
    /// Everything after ticket verification
    Secure,
}

/// Identity and application state of one connected client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    /// Listener the client is connected to
    pub endpoint: Endpoint,
    /// Platform detected from the access key
    pub platform: Platform,
    /// Remote UDP address
    pub address: SocketAddr,
    /// Server-assigned connection id (RVCID)
    pub connection_id: u32,
    /// Username of the current principal; empty until login
    pub username: String,
    /// Current principal; 0 until login or ticket verification
    pub pid: u32,
    /// Principals authenticated on this connection
    pub pid_stack: PidStack,
    /// Console machine record; 0 until associated
    pub machine_id: u32,
    /// Friend code sent by friend-code platforms
    pub friend_code: Option<String>,
    /// Station URLs registered on the secure endpoint
    pub station_urls: Vec<StationUrl>,
}

impl SessionState {
    /// Fresh unauthenticated session.
    pub fn new(endpoint: Endpoint, platform: Platform, address: SocketAddr, connection_id: u32) -> Self {
        Self {
            endpoint,
            platform,
            address,
            connection_id,
            username: String::new(),
            pid: 0,
            pid_stack: PidStack::new(),
            machine_id: 0,
            friend_code: None,
            station_urls: Vec::new(),
        }
    }

    /// True once a principal is bound.
    pub fn is_authenticated(&self) -> bool {
        self.pid != 0
    }

    /// Bind `pid` as the current principal and push it on the stack.
    pub fn authenticate(&mut self, pid: u32, username: impl Into<String>) {
        self.pid = pid;
        self.username = username.into();
        self.pid_stack.push(pid);
    }

    /// True if `pid` is this console's master user.
    ///
    /// Master users are the console itself; their PID is the machine id.
    pub fn is_master_pid(&self, pid: u32) -> bool {
        self.machine_id != 0 && pid == self.machine_id
    }

    /// True if the current principal is the master user.
    pub fn is_master(&self) -> bool {
        self.is_master_pid(self.pid)
    }
}
