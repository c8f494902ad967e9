//! Authorization hook for private channels.
//!
//! relaycast can't sign private-channel subscriptions itself: the secret
//! belongs on your server, not in every client. Instead it defines the
//! [`ChannelAuth`] trait, a single method that takes the session's socket
//! id and the channel name and returns the `auth` string to embed in the
//! subscribe frame. Typically it asks your backend for a signature.
//!
//! Any `Fn(&str, &str) -> Result<String, AuthError>` closure already
//! implements the trait.

use crate::AuthError;

/// Produces the `auth` field for a private-channel subscription.
///
/// # Trait bounds
///
/// - `Send + Sync` → the callback is shared with the control-loop task.
/// - `'static` → it lives as long as the client.
///
/// # Contract
///
/// The callback runs on the control loop. While it runs, no other
/// request or inbound frame is processed, so keep it quick.
///
/// # Example
///
/// ```rust
/// use relaycast_auth::{AuthError, ChannelAuth, sign_private};
///
/// /// Signs locally. Only for development; ship the secret to a server.
/// struct DevSigner {
///     key: String,
///     secret: String,
/// }
///
/// impl ChannelAuth for DevSigner {
///     fn authorize(&self, socket_id: &str, channel: &str) -> Result<String, AuthError> {
///         Ok(sign_private(&self.key, &self.secret, socket_id, channel))
///     }
/// }
///
/// let signer = DevSigner { key: "key".into(), secret: "secret".into() };
/// assert!(signer.authorize("1.2", "private-x").unwrap().starts_with("key:"));
/// ```
pub trait ChannelAuth: Send + Sync + 'static {
    /// Returns the auth string for subscribing `socket_id` to `channel`.
    ///
    /// # Returns
    /// - `Ok(auth)`: embedded verbatim in the subscribe frame
    /// - `Err(_)`: the subscription fails; the client keeps running
    fn authorize(&self, socket_id: &str, channel: &str) -> Result<String, AuthError>;
}

impl<F> ChannelAuth for F
where
    F: Fn(&str, &str) -> Result<String, AuthError> + Send + Sync + 'static,
{
    fn authorize(&self, socket_id: &str, channel: &str) -> Result<String, AuthError> {
        self(socket_id, channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_implements_channel_auth() {
        let auth = |socket_id: &str, channel: &str| -> Result<String, AuthError> {
            Ok(format!("{socket_id}/{channel}"))
        };
        assert_eq!(auth.authorize("1.2", "private-a").unwrap(), "1.2/private-a");
    }

    #[test]
    fn test_closure_error_is_returned() {
        let auth = |_: &str, channel: &str| -> Result<String, AuthError> {
            Err(AuthError::rejected(channel, "backend said no"))
        };
        let err = auth.authorize("1.2", "private-a").unwrap_err();
        assert!(err.to_string().contains("backend said no"));
    }
}
