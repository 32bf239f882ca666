//! Socket layer for Pairplay.
//!
//! The matchmaking core never touches a socket. It addresses players by
//! [`ConnectionId`], and the server's per-connection task owns the
//! [`Connection`] and moves frames between it and the core.
//!
//! # Feature Flags
//!
//! - `websocket` (default): [`WebSocketTransport`] on `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Longest close reason a WebSocket close frame can carry, in bytes.
pub const MAX_CLOSE_REASON_LEN: usize = 123;

/// Process-unique handle for one client socket.
///
/// Ids are never reused while a transport is alive, so a stale id held
/// by the registry can't be mistaken for a newer socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Hands out increasing [`ConnectionId`]s starting at 1.
#[derive(Debug)]
pub struct ConnectionIds {
    next: AtomicU64,
}

impl ConnectionIds {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> ConnectionId {
        ConnectionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionIds {
    fn default() -> Self {
        Self::new()
    }
}

/// Listens for client sockets.
pub trait Transport: Send + Sync + 'static {
    type Connection: Connection;
    type Error: std::error::Error + Send + Sync;

    /// Waits for the next client. Fails with a shutdown error once
    /// [`shutdown`](Transport::shutdown) has been called.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;

    fn local_addr(&self) -> std::io::Result<SocketAddr>;

    /// Stops accepting. Already accepted connections are unaffected.
    async fn shutdown(&self) -> Result<(), Self::Error>;
}

/// One client socket.
///
/// One task may be parked in [`recv`](Connection::recv) while another
/// calls [`send`](Connection::send) on the same connection.
pub trait Connection: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync;

    /// Writes one frame. Fails once the connection has been closed.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Reads the next frame. `Ok(None)` means the peer closed cleanly.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Writes a frame the caller is willing to lose (presence updates).
    ///
    /// Sockets without a datagram channel just send reliably.
    async fn send_unreliable(&self, data: &[u8]) -> Result<(), Self::Error> {
        self.send(data).await
    }

    /// Closes the socket, telling the peer `reason`. Closing twice is a
    /// no-op.
    async fn close(&self, reason: &str) -> Result<(), Self::Error>;

    fn id(&self) -> ConnectionId;

    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }
}

/// Cuts `reason` to at most [`MAX_CLOSE_REASON_LEN`] bytes on a char
/// boundary.
pub fn truncate_close_reason(reason: &str) -> &str {
    if reason.len() <= MAX_CLOSE_REASON_LEN {
        return reason;
    }
    let mut end = MAX_CLOSE_REASON_LEN;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    &reason[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_display() {
        assert_eq!(ConnectionId::new(7).to_string(), "conn-7");
    }

    #[test]
    fn test_connection_ids_next_id_starts_at_one_and_increases() {
        let ids = ConnectionIds::new();
        let a = ids.next_id();
        let b = ids.next_id();
        assert_eq!(a.into_inner(), 1);
        assert!(b > a);
    }

    #[test]
    fn test_connection_ids_are_independent_per_allocator() {
        let first = ConnectionIds::new();
        let second = ConnectionIds::new();
        first.next_id();
        assert_eq!(second.next_id(), ConnectionId::new(1));
    }

    #[test]
    fn test_truncate_close_reason_short_reason_unchanged() {
        assert_eq!(truncate_close_reason("session ended"), "session ended");
    }

    #[test]
    fn test_truncate_close_reason_respects_char_boundary() {
        let long = "é".repeat(100);
        let cut = truncate_close_reason(&long);
        assert!(cut.len() <= MAX_CLOSE_REASON_LEN);
        assert_eq!(cut.chars().count(), MAX_CLOSE_REASON_LEN / 2);
    }
}
