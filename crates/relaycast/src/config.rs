//! Client configuration and its builder.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use relaycast_auth::{Authorizer, ChannelAuth};
use relaycast_protocol::{EventNames, Member};

use crate::ClientError;

/// Everything the client needs to reach and talk to the relay.
///
/// Immutable once handed to [`RelayClient`](crate::RelayClient).
#[derive(Clone)]
pub struct ClientConfig {
    /// URL scheme, `wss` or `ws`.
    pub scheme: String,
    pub host: String,
    pub port: u16,
    /// Application key, part of the connection URL.
    pub key: String,
    /// Application secret, used to sign presence subscriptions locally.
    pub secret: Option<String>,
    /// Signs private-channel subscriptions.
    pub auth: Option<Arc<dyn ChannelAuth>>,
    /// Identity announced on presence channels.
    pub user_data: Option<Member>,
    /// Log every frame sent and received at `debug`.
    pub debug: bool,
    /// Fixed wait between a lost connection and the next dial.
    pub reconnect_delay: Duration,
    /// Prefix of the protocol's control events.
    pub namespace: String,
    /// Capacity of the queue between client handles and the control loop.
    pub request_queue: usize,
}

impl ClientConfig {
    pub const DEFAULT_SCHEME: &'static str = "wss";
    /// Hosted relays at this address speak the `pusher` namespace, so pair
    /// it with `.namespace("pusher")`. The default namespace suits
    /// self-hosted relays.
    pub const DEFAULT_HOST: &'static str = "ws.pusherapp.com";
    pub const DEFAULT_PORT: u16 = 443;
    pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);
    pub const DEFAULT_REQUEST_QUEUE: usize = 64;

    /// Default configuration for application `key`.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    /// Creates a builder for application `key`.
    pub fn builder(key: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder::new(key)
    }

    /// The endpoint the client dials: `scheme://host:port/app/key`.
    pub fn url(&self) -> String {
        format!(
            "{}://{}:{}/app/{}",
            self.scheme, self.host, self.port, self.key
        )
    }

    /// Rejects configurations that could never connect.
    ///
    /// # Errors
    /// [`ClientError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.key.is_empty() {
            return Err(ClientError::InvalidConfig("key must not be empty".into()));
        }
        if self.host.is_empty() {
            return Err(ClientError::InvalidConfig("host must not be empty".into()));
        }
        if self.scheme != "ws" && self.scheme != "wss" {
            return Err(ClientError::InvalidConfig(format!(
                "unsupported scheme {:?}, expected ws or wss",
                self.scheme
            )));
        }
        if self.namespace.is_empty() {
            return Err(ClientError::InvalidConfig(
                "namespace must not be empty".into(),
            ));
        }
        if self.request_queue == 0 {
            return Err(ClientError::InvalidConfig(
                "request_queue must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn event_names(&self) -> EventNames {
        EventNames::new(&self.namespace)
    }

    pub(crate) fn authorizer(&self) -> Authorizer {
        Authorizer::new(self.key.clone())
            .with_secret(self.secret.clone())
            .with_identity(self.user_data.clone())
            .with_callback(self.auth.clone())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            scheme: Self::DEFAULT_SCHEME.to_string(),
            host: Self::DEFAULT_HOST.to_string(),
            port: Self::DEFAULT_PORT,
            key: String::new(),
            secret: None,
            auth: None,
            user_data: None,
            debug: false,
            reconnect_delay: Self::DEFAULT_RECONNECT_DELAY,
            namespace: EventNames::DEFAULT_NAMESPACE.to_string(),
            request_queue: Self::DEFAULT_REQUEST_QUEUE,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("url", &self.url())
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("auth", &self.auth.is_some())
            .field("user_data", &self.user_data)
            .field("debug", &self.debug)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("namespace", &self.namespace)
            .field("request_queue", &self.request_queue)
            .finish()
    }
}

/// Builder for [`ClientConfig`].
///
/// # Example
///
/// ```rust
/// use relaycast::ClientConfig;
///
/// let config = ClientConfig::builder("app-key")
///     .host("relay.example.com")
///     .secret("app-secret")
///     .debug(true)
///     .build();
/// assert_eq!(config.url(), "wss://relay.example.com:443/app/app-key");
/// ```
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Creates a builder with default settings for application `key`.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            config: ClientConfig::new(key),
        }
    }

    pub fn scheme(mut self, scheme: &str) -> Self {
        self.config.scheme = scheme.to_string();
        self
    }

    pub fn host(mut self, host: &str) -> Self {
        self.config.host = host.to_string();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Sets the application secret used for presence signing.
    pub fn secret(mut self, secret: &str) -> Self {
        self.config.secret = Some(secret.to_string());
        self
    }

    /// Sets the private-channel authorization callback.
    pub fn auth(mut self, auth: impl ChannelAuth) -> Self {
        self.config.auth = Some(Arc::new(auth));
        self
    }

    /// Sets the identity announced on presence channels.
    pub fn user_data(mut self, member: Member) -> Self {
        self.config.user_data = Some(member);
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay = delay;
        self
    }

    /// Prefix of control events, e.g. `"pusher"` for `pusher:subscribe`.
    pub fn namespace(mut self, namespace: &str) -> Self {
        self.config.namespace = namespace.to_string();
        self
    }

    pub fn request_queue(mut self, capacity: usize) -> Self {
        self.config.request_queue = capacity;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use relaycast_auth::AuthError;

    use super::*;

    #[test]
    fn test_default_points_at_hosted_relay() {
        let config = ClientConfig::new("abc");
        assert_eq!(config.url(), "wss://ws.pusherapp.com:443/app/abc");
        assert_eq!(config.reconnect_delay, Duration::from_secs(1));
        assert_eq!(config.namespace, "control");
        assert!(!config.debug);
    }

    #[test]
    fn test_builder_overrides_endpoint() {
        let config = ClientConfig::builder("k")
            .scheme("ws")
            .host("127.0.0.1")
            .port(9000)
            .build();
        assert_eq!(config.url(), "ws://127.0.0.1:9000/app/k");
    }

    #[test]
    fn test_builder_sets_auth_and_identity() {
        let config = ClientConfig::builder("k")
            .secret("s")
            .user_data(Member::new("42"))
            .auth(|_: &str, _: &str| -> Result<String, AuthError> { Ok("sig".into()) })
            .build();
        assert_eq!(config.secret.as_deref(), Some("s"));
        assert!(config.auth.is_some());
        assert_eq!(config.authorizer().user_id(), Some("42"));
    }

    #[test]
    fn test_validate_empty_key_rejected() {
        let result = ClientConfig::default().validate();
        assert!(matches!(result, Err(ClientError::InvalidConfig(msg)) if msg.contains("key")));
    }

    #[test]
    fn test_validate_unknown_scheme_rejected() {
        let config = ClientConfig::builder("k").scheme("http").build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_queue_rejected() {
        let config = ClientConfig::builder("k").request_queue(0).build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_defaults_with_key_accepted() {
        assert!(ClientConfig::new("k").validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = ClientConfig::builder("k").secret("hunter2").build();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_event_names_follow_namespace() {
        let config = ClientConfig::builder("k").namespace("pusher").build();
        assert_eq!(config.event_names().subscribe, "pusher:subscribe");
    }
}
