//! Datagram socket setup and message send helper.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use cumulus_core::Message;

use crate::error::SyncError;

/// Kernel socket buffer size requested for both directions. Bursts of chunk
/// datagrams overflow the default receive buffer long before the loop drains it.
const SOCKET_BUFFER_BYTES: usize = 8 * 1024 * 1024;

/// Receive buffer for one datagram (largest UDP payload plus slack).
pub const RECV_BUFFER_LEN: usize = 65536 + 1024;

/// Bind a non-blocking UDP socket at `addr` and hand it to tokio.
///
/// Must be called from within a tokio runtime.
pub fn bind_udp(addr: SocketAddr) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
        .context("socket()")?;

    if let Err(e) = socket.set_recv_buffer_size(SOCKET_BUFFER_BYTES) {
        tracing::debug!(error = %e, "SO_RCVBUF not applied");
    }
    if let Err(e) = socket.set_send_buffer_size(SOCKET_BUFFER_BYTES) {
        tracing::debug!(error = %e, "SO_SNDBUF not applied");
    }
    socket.set_nonblocking(true).context("set_nonblocking")?;
    socket
        .bind(&addr.into())
        .with_context(|| format!("bind({addr})"))?;

    UdpSocket::from_std(socket.into()).context("failed to convert to tokio UdpSocket")
}

/// Encode `message` and send it as one datagram.
pub async fn send_message(
    socket: &UdpSocket,
    peer: SocketAddr,
    message: &Message,
) -> Result<usize, SyncError> {
    let bytes = message.encode();
    socket
        .send_to(&bytes, peer)
        .await
        .map_err(|source| SyncError::Transport {
            op: "send",
            peer: Some(peer),
            source,
        })
}
