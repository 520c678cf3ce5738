//! Sockets for Tandem: a listener on the server side, a dialer on the
//! client side, both speaking length-delimited binary messages.
//!
//! Accepting is two-phase. [`Transport::accept`] only takes the TCP
//! connection off the listener and hands back an [`Incoming`]; the
//! protocol upgrade happens in [`Incoming::upgrade`], which the server
//! runs on the socket's own task under a deadline. A peer that connects
//! and then says nothing therefore never stalls the listener.
//!
//! A [`Connection`] is full duplex. Its send and receive halves are locked
//! separately, so one task can sit in [`Connection::recv`] while another
//! pushes events through [`Connection::send`].
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{
    ClientConnection, PendingWebSocket, WebSocketConnection, WebSocketTransport, connect,
};

use std::fmt;
use std::net::SocketAddr;

/// Identifies one socket for logging and for telling apart two sockets
/// that present the same client id.
///
/// Ids are unique for the life of the process and never reused.
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
        write!(f, "sock-{}", self.0)
    }
}

/// The listening side.
pub trait Transport: Send + Sync + 'static {
    type Connection: Connection;
    type Incoming: Incoming<Connection = Self::Connection, Error = Self::Error>;
    type Error: std::error::Error + Send + Sync;

    /// Takes the next TCP connection off the listener.
    ///
    /// Returns as soon as the peer is connected. No bytes are exchanged.
    async fn accept(&mut self) -> Result<Self::Incoming, Self::Error>;

    fn local_addr(&self) -> std::io::Result<SocketAddr>;
}

/// An accepted peer that has not finished the protocol upgrade.
pub trait Incoming: Send + 'static {
    type Connection: Connection;
    type Error: std::error::Error + Send + Sync;

    fn peer_addr(&self) -> SocketAddr;

    /// Completes the upgrade. Waits on the peer, so bound it with a
    /// timeout.
    async fn upgrade(self) -> Result<Self::Connection, Self::Error>;
}

/// A full-duplex message socket.
///
/// `send` and `recv` take `&self` and may run at the same time from
/// different tasks. Two concurrent `send` calls are serialized, as are two
/// concurrent `recv` calls.
pub trait Connection: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync;

    /// Sends one message. Never waits on a pending `recv`.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Waits for the next message.
    ///
    /// Returns `Ok(None)` once the peer has closed the socket.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Starts the closing handshake. Later sends fail.
    async fn close(&self) -> Result<(), Self::Error>;

    fn id(&self) -> ConnectionId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_display_names_socket() {
        assert_eq!(ConnectionId::new(7).to_string(), "sock-7");
    }

    #[test]
    fn test_connection_id_orders_by_value() {
        let mut ids = vec![ConnectionId::new(3), ConnectionId::new(1), ConnectionId::new(2)];
        ids.sort();
        assert_eq!(
            ids.into_iter().map(ConnectionId::into_inner).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }
}
