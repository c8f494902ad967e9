//! Transport abstraction layer for relaycast.
//!
//! Provides the [`Connector`] and [`Connection`] traits that the client's
//! control loop drives. The loop only ever needs four primitives from a
//! transport: dial, send, receive, close. Anything that can provide those
//! (a WebSocket, an in-memory pipe in tests) can carry the relay protocol.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket client via `tokio-tungstenite`
//! - `tls` (default): `wss://` support through rustls with webpki roots

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketConnector};

use std::fmt;
use std::future::Future;

/// Opaque identifier for a connection.
///
/// Every successful dial produces a fresh id. The control loop tags
/// inbound notifications with it so that a late "closed" from an old
/// connection can't tear down its replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Opens new outbound connections to the relay.
///
/// The returned futures are `Send` because the control loop runs inside
/// `tokio::spawn`, which may move it between worker threads.
pub trait Connector: Send + Sync + 'static {
    /// The connection type produced by this connector.
    type Connection: Connection;

    /// Dials `url` and completes the protocol upgrade.
    fn connect(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;
}

/// A single connection that can send and receive bytes.
///
/// Implementations must allow `send` to make progress while another task
/// is parked in `recv`: the client reads on a dedicated task and writes
/// from the control loop.
pub trait Connection: Send + Sync + 'static {
    /// Sends one frame to the relay.
    fn send(
        &self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next frame from the relay.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, TransportError>> + Send;

    /// Closes the connection.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
    }

    #[test]
    fn test_connection_id_distinguishes_generations() {
        let old = ConnectionId::new(1);
        let new = ConnectionId::new(2);
        assert_ne!(old, new);
        assert_eq!(old, ConnectionId::new(1));
    }
}
