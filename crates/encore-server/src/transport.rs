//! UDP transport.
//!
//! One socket per endpoint. Sockets are built with socket2 so buffer sizes
//! and address reuse can be set before binding, then handed to Tokio.
//! Every client on an endpoint shares its socket; the listener routes by
//! source address.

use std::{
    net::{SocketAddr, UdpSocket as StdUdpSocket},
    sync::Arc,
};

use encore_core::Endpoint;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use crate::error::ServerError;

/// Kernel buffer size requested for each socket.
pub const SOCKET_BUFFER_SIZE: usize = 1 << 20;

/// Largest datagram the listener reads.
pub const MAX_DATAGRAM_SIZE: usize = 2048;

/// Bound UDP socket for one endpoint.
///
/// # Cloning
///
/// Clones share the socket. Client tasks send through their own clone while
/// the listener receives.
#[derive(Clone, Debug)]
pub struct UdpTransport {
    endpoint: Endpoint,
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    /// Bind `address` for `endpoint`.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn bind(endpoint: Endpoint, address: SocketAddr) -> Result<Self, ServerError> {
        let socket = Socket::new(Domain::for_address(address), Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| ServerError::Transport(format!("failed to create socket: {e}")))?;

        socket
            .set_reuse_address(true)
            .map_err(|e| ServerError::Transport(format!("failed to set SO_REUSEADDR: {e}")))?;
        // best effort; the kernel may clamp both
        if let Err(e) = socket.set_recv_buffer_size(SOCKET_BUFFER_SIZE) {
            tracing::debug!(?endpoint, "receive buffer not resized: {e}");
        }
        if let Err(e) = socket.set_send_buffer_size(SOCKET_BUFFER_SIZE) {
            tracing::debug!(?endpoint, "send buffer not resized: {e}");
        }
        socket
            .set_nonblocking(true)
            .map_err(|e| ServerError::Transport(format!("failed to set non-blocking: {e}")))?;
        socket
            .bind(&address.into())
            .map_err(|e| ServerError::Transport(format!("failed to bind {address}: {e}")))?;

        let socket = UdpSocket::from_std(StdUdpSocket::from(socket))
            .map_err(|e| ServerError::Transport(format!("failed to register socket: {e}")))?;

        let transport = Self { endpoint, socket: Arc::new(socket) };
        tracing::info!(?endpoint, addr = %transport.local_addr()?, "UDP transport bound");
        Ok(transport)
    }

    /// Endpoint this socket serves.
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// Receive one datagram into `buf`.
    pub async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), ServerError> {
        self.socket
            .recv_from(buf)
            .await
            .map_err(|e| ServerError::Transport(format!("recv failed on {:?}: {e}", self.endpoint)))
    }

    /// Send one datagram to `target`.
    pub async fn send_to(&self, datagram: &[u8], target: SocketAddr) -> Result<(), ServerError> {
        let sent = self
            .socket
            .send_to(datagram, target)
            .await
            .map_err(|e| ServerError::Transport(format!("send to {target} failed: {e}")))?;
        if sent != datagram.len() {
            return Err(ServerError::Transport(format!("short send to {target}: {sent} of {}", datagram.len())));
        }
        Ok(())
    }

    /// Local address the socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.socket
            .local_addr()
            .map_err(|e| ServerError::Transport(format!("failed to get local address: {e}")))
    }
}
