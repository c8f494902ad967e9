//! Wire protocol for relaycast.
//!
//! - **Types** ([`Event`], [`OutboundFrame`], [`SubscribeData`], [`Member`],
//!   ...): the frames that travel on the socket.
//! - **Event names** ([`EventNames`]): the control events of one protocol
//!   namespace.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how frames are converted
//!   to and from bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Transport (bytes) → Protocol (Event) → Client (channels, listeners)
//! ```

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{
    ChannelKind, ConnectionEstablished, Empty, Event, EventNames, Member,
    MemberRoster, OutboundFrame, PRESENCE_PREFIX, PRIVATE_PREFIX,
    PresenceData, PresenceSnapshot, RelayError, SubscribeData,
    UnsubscribeData,
};
