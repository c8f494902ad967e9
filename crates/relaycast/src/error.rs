//! Unified error type for the relaycast client.

use relaycast_auth::AuthError;
use relaycast_channel::ChannelError;
use relaycast_protocol::ProtocolError;
use relaycast_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// Callers of [`RelayClient`](crate::RelayClient) only ever see this type;
/// `#[from]` lets the control loop use `?` on sub-crate results.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A transport-level error (dial, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A restricted channel could not be authorized.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A channel name was rejected.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// The control loop has exited; the client no longer accepts requests.
    #[error("client is closed")]
    Closed,

    /// The configuration can't be used to build a client.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
