//! Error types for the channel layer.

/// Errors that can occur during channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The channel name can't be used on the wire.
    #[error("invalid channel name {0:?}: {1}")]
    InvalidName(String, &'static str),
}
