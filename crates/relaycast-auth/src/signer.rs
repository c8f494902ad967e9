//! Builds the authorization fields of subscribe frames.
//!
//! | Kind       | `auth`                                   | `channel_data` |
//! |------------|------------------------------------------|----------------|
//! | public     | none                                     | none           |
//! | `private-` | whatever [`ChannelAuth`] returns         | none           |
//! | `presence-`| `key:hex(HMAC(secret, sid:chan:data))`   | identity JSON  |

use std::fmt;
use std::sync::Arc;

use hmac::{Hmac, Mac};
use relaycast_protocol::{ChannelKind, Member, SubscribeData};
use sha2::Sha256;

use crate::{AuthError, ChannelAuth};

type HmacSha256 = Hmac<Sha256>;

/// Computes the subscribe payload for any channel kind.
///
/// Built once from the client configuration and owned by the control
/// loop.
#[derive(Clone)]
pub struct Authorizer {
    key: String,
    secret: Option<String>,
    identity: Option<Member>,
    callback: Option<Arc<dyn ChannelAuth>>,
}

impl fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authorizer")
            .field("key", &self.key)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("identity", &self.identity)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

impl Authorizer {
    /// Creates an authorizer for application `key`.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: None,
            identity: None,
            callback: None,
        }
    }

    /// Sets the application secret used for presence signing.
    pub fn with_secret(mut self, secret: Option<String>) -> Self {
        self.secret = secret;
        self
    }

    /// Sets the caller identity sent on presence channels.
    pub fn with_identity(mut self, identity: Option<Member>) -> Self {
        self.identity = identity;
        self
    }

    /// Sets the private-channel callback.
    pub fn with_callback(mut self, callback: Option<Arc<dyn ChannelAuth>>) -> Self {
        self.callback = callback;
        self
    }

    /// The configured identity's user id, if any.
    pub fn user_id(&self) -> Option<&str> {
        self.identity.as_ref().map(|m| m.user_id.as_str())
    }

    /// Builds the `data` of a subscribe frame for `channel` on the session
    /// identified by `socket_id`.
    ///
    /// # Errors
    /// Any [`AuthError`]; public channels never fail.
    pub fn subscribe_data(
        &self,
        socket_id: &str,
        channel: &str,
    ) -> Result<SubscribeData, AuthError> {
        match ChannelKind::from_name(channel) {
            ChannelKind::Public => Ok(SubscribeData::public(channel)),
            ChannelKind::Private => {
                let callback = self
                    .callback
                    .as_ref()
                    .ok_or_else(|| AuthError::MissingCallback(channel.to_string()))?;
                let auth = callback.authorize(socket_id, channel)?;
                tracing::trace!(channel, "private channel authorized");
                Ok(SubscribeData {
                    channel: channel.to_string(),
                    auth: Some(auth),
                    channel_data: None,
                })
            }
            ChannelKind::Presence => {
                let secret = self
                    .secret
                    .as_deref()
                    .ok_or_else(|| AuthError::MissingSecret(channel.to_string()))?;
                let identity = self
                    .identity
                    .as_ref()
                    .ok_or_else(|| AuthError::MissingIdentity(channel.to_string()))?;
                let channel_data =
                    serde_json::to_string(identity).map_err(AuthError::EncodeIdentity)?;
                let auth = sign_presence(&self.key, secret, socket_id, channel, &channel_data);
                tracing::trace!(channel, "presence channel signed");
                Ok(SubscribeData {
                    channel: channel.to_string(),
                    auth: Some(auth),
                    channel_data: Some(channel_data),
                })
            }
        }
    }
}

/// Signs a presence subscription: `key:hex(HMAC-SHA256(secret,
/// "socket_id:channel:channel_data"))`.
pub fn sign_presence(
    key: &str,
    secret: &str,
    socket_id: &str,
    channel: &str,
    channel_data: &str,
) -> String {
    let string_to_sign = format!("{socket_id}:{channel}:{channel_data}");
    format!("{key}:{}", hmac_hex(secret, &string_to_sign))
}

/// Signs a private subscription: `key:hex(HMAC-SHA256(secret,
/// "socket_id:channel"))`. This is what an auth backend returns.
pub fn sign_private(key: &str, secret: &str, socket_id: &str, channel: &str) -> String {
    let string_to_sign = format!("{socket_id}:{channel}");
    format!("{key}:{}", hmac_hex(secret, &string_to_sign))
}

/// Lowercase hex HMAC-SHA256 of `message` under `secret`.
fn hmac_hex(secret: &str, message: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key size");
    mac.update(message.as_bytes());
    mac.finalize()
        .into_bytes()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // -- Helpers ----------------------------------------------------------

    fn presence_authorizer() -> Authorizer {
        Authorizer::new("key")
            .with_secret(Some("secret".into()))
            .with_identity(Some(Member::new("42")))
    }

    // =====================================================================
    // Signing primitives
    // =====================================================================

    #[test]
    fn test_sign_private_matches_known_vector() {
        // Published reference vector for this signing scheme.
        let auth = sign_private(
            "278d425bdf160c739803",
            "7ad3773142a6692b25b8",
            "1234.1234",
            "private-foobar",
        );
        assert_eq!(
            auth,
            "278d425bdf160c739803:58df8b0c36d6982b82c3ecf6b4662e34fe8c25bba48f5369f135bf843651c3a4"
        );
    }

    #[test]
    fn test_sign_presence_matches_known_vector() {
        let auth = sign_presence(
            "278d425bdf160c739803",
            "7ad3773142a6692b25b8",
            "1234.1234",
            "presence-foobar",
            r#"{"user_id":10,"user_info":{"name":"Mr. Pusher"}}"#,
        );
        assert_eq!(
            auth,
            "278d425bdf160c739803:afaed3695da2ffd16931f457e338e6c9f2921fa133ce7dac49f529792be6304c"
        );
    }

    #[test]
    fn test_sign_presence_is_deterministic() {
        let a = sign_presence("key", "secret", "S", "presence-room", r#"{"user_id":"42"}"#);
        let b = sign_presence("key", "secret", "S", "presence-room", r#"{"user_id":"42"}"#);
        assert_eq!(a, b);
        assert_eq!(
            a,
            "key:d73942d6b8d50cdc277132f7fbb28ab5d4b2fb9a5d16bbb9f87672d4110cb89c"
        );
    }

    // =====================================================================
    // Authorizer::subscribe_data()
    // =====================================================================

    #[test]
    fn test_subscribe_data_public_has_no_auth() {
        let data = Authorizer::new("key").subscribe_data("abc", "updates").unwrap();
        assert_eq!(data, SubscribeData::public("updates"));
    }

    #[test]
    fn test_subscribe_data_private_embeds_callback_result_verbatim() {
        let callback = |socket_id: &str, channel: &str| -> Result<String, AuthError> {
            assert_eq!(socket_id, "abc");
            assert_eq!(channel, "private-orders");
            Ok("opaque-signature".to_string())
        };
        let authorizer = Authorizer::new("key").with_callback(Some(Arc::new(callback)));

        let data = authorizer.subscribe_data("abc", "private-orders").unwrap();
        assert_eq!(data.auth.as_deref(), Some("opaque-signature"));
        assert_eq!(data.channel_data, None);
    }

    #[test]
    fn test_subscribe_data_private_callback_error_is_returned() {
        let callback = |_: &str, channel: &str| -> Result<String, AuthError> {
            Err(AuthError::rejected(channel, "forbidden"))
        };
        let authorizer = Authorizer::new("key").with_callback(Some(Arc::new(callback)));

        let result = authorizer.subscribe_data("abc", "private-orders");
        assert!(matches!(result, Err(AuthError::Rejected { .. })));
    }

    #[test]
    fn test_subscribe_data_private_without_callback_fails() {
        let result = Authorizer::new("key").subscribe_data("abc", "private-orders");
        assert!(matches!(result, Err(AuthError::MissingCallback(c)) if c == "private-orders"));
    }

    #[test]
    fn test_subscribe_data_presence_signs_identity() {
        let data = presence_authorizer()
            .subscribe_data("abc", "presence-room")
            .unwrap();

        assert_eq!(data.channel_data.as_deref(), Some(r#"{"user_id":"42"}"#));
        assert_eq!(
            data.auth.as_deref(),
            Some("key:a9c26472a9b115d2599c13aee0c231007b3ded853f6019b956253f76a4216534")
        );
    }

    #[test]
    fn test_subscribe_data_presence_without_secret_fails() {
        let authorizer = Authorizer::new("key").with_identity(Some(Member::new("42")));
        let result = authorizer.subscribe_data("abc", "presence-room");
        assert!(matches!(result, Err(AuthError::MissingSecret(_))));
    }

    #[test]
    fn test_subscribe_data_presence_without_identity_fails() {
        let authorizer = Authorizer::new("key").with_secret(Some("secret".into()));
        let result = authorizer.subscribe_data("abc", "presence-room");
        assert!(matches!(result, Err(AuthError::MissingIdentity(_))));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", presence_authorizer());
        assert!(!rendered.contains("\"secret\""));
        assert!(rendered.contains("<redacted>"));
    }
}
