//! Codec trait and the JSON implementation.
//!
//! The control loop never calls `serde_json` directly. It goes through a
//! [`Codec`], which keeps the framing format swappable and lets tests
//! substitute a codec that fails on demand.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because the codec is owned by the control
/// loop, which runs as a spawned Tokio task.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or don't
    /// match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that uses JSON (via `serde_json`). This is what the relay
/// speaks.
///
/// ## Example
///
/// ```rust
/// use relaycast_protocol::{Codec, Event, JsonCodec};
///
/// let codec = JsonCodec;
/// let event: Event = codec
///     .decode(br#"{"event":"price","channel":"ticker","data":"1.5"}"#)
///     .unwrap();
/// assert_eq!(event.data, "1.5");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
