//! Error types for the authorization layer.

/// Errors that can occur while authorizing a channel subscription.
///
/// None of these are fatal to the client: the subscription that needed
/// the signature fails and the channel stays unsubscribed.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The caller's [`ChannelAuth`](crate::ChannelAuth) rejected or failed
    /// to sign the subscription.
    #[error("authorization failed for {channel}: {reason}")]
    Rejected { channel: String, reason: String },

    /// A private channel was requested but no callback is configured.
    #[error("no authorization callback configured for private channel {0}")]
    MissingCallback(String),

    /// A presence channel was requested without an application secret.
    #[error("no application secret configured for presence channel {0}")]
    MissingSecret(String),

    /// A presence channel was requested without a caller identity.
    #[error("no user data configured for presence channel {0}")]
    MissingIdentity(String),

    /// The caller identity couldn't be serialized.
    #[error("failed to encode user data: {0}")]
    EncodeIdentity(#[source] serde_json::Error),
}

impl AuthError {
    /// Shorthand for a callback rejection.
    pub fn rejected(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            channel: channel.into(),
            reason: reason.into(),
        }
    }
}
