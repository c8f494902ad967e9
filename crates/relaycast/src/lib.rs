//! # relaycast
//!
//! Reconnecting client for channel-based publish/subscribe relays.
//!
//! One [`RelayClient`] keeps one logical connection to the relay. It
//! subscribes to public, private and presence channels, signs restricted
//! subscriptions, and delivers decoded events to listeners. When the
//! connection drops it redials on a fixed delay and resubscribes every
//! registered channel.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use relaycast::prelude::*;
//!
//! # async fn run() -> Result<(), ClientError> {
//! let config = ClientConfig::builder("app-key")
//!     .host("relay.example.com")
//!     .build();
//! let client = RelayClient::new(config)?;
//!
//! client
//!     .bind_global(|channel, event, data| println!("{channel} {event} {data:?}"))
//!     .await?;
//! client.subscribe("updates").await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod control;
mod error;
mod timer;

pub use client::RelayClient;
pub use config::{ClientConfig, ClientConfigBuilder};
pub use control::ConnectionState;
pub use error::ClientError;

pub use relaycast_auth::{AuthError, ChannelAuth, sign_presence, sign_private};
pub use relaycast_channel::{BindingId, Channel, ChannelEvent, EventData, EventStream};
pub use relaycast_protocol::{ChannelKind, Member, MemberRoster};
pub use relaycast_transport::{
    Connection, ConnectionId, Connector, TransportError, WebSocketConnection, WebSocketConnector,
};

/// Everything a typical caller needs.
pub mod prelude {
    pub use crate::{
        AuthError, BindingId, Channel, ChannelEvent, ChannelKind, ClientConfig, ClientError,
        ConnectionState, EventData, Member, RelayClient,
    };
}

/// Installs a `tracing-subscriber` formatter on stderr, filtered by
/// `RUST_LOG`.
///
/// Without `RUST_LOG`, logs at `info`, raising the `relaycast` crates to
/// `debug` when `debug` is set. Does nothing if a global subscriber already
/// exists.
pub fn init_tracing(debug: bool) {
    use tracing_subscriber::EnvFilter;

    let fallback = if debug { "info,relaycast=debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
