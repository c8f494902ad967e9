//! `RelayClient`: the public handle to a running control loop.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use relaycast_channel::{BindingId, Channel, EventData, EventStream, GlobalListener};
use relaycast_protocol::JsonCodec;
use relaycast_transport::{Connector, WebSocketConnector};
use tokio::sync::{mpsc, oneshot, watch};

use crate::control::{ConnectionState, ControlLoop, Request, Stats};
use crate::{ClientConfig, ClientError};

/// Handle to a relay connection.
///
/// Cheap to clone: every clone talks to the same control loop. The loop
/// shuts down after [`disconnect`](Self::disconnect), or once the last
/// handle is dropped.
///
/// # Example
///
/// ```rust,no_run
/// use relaycast::prelude::*;
///
/// # async fn demo() -> Result<(), ClientError> {
/// let client = RelayClient::new(ClientConfig::new("app-key"))?;
/// let (_, mut prices) = client.bind("ticker", "price").await?;
/// client.subscribe("ticker").await?;
///
/// while let Some(event) = prices.recv().await {
///     println!("{:?}", event.data);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RelayClient {
    requests: mpsc::Sender<Request>,
    state: watch::Receiver<ConnectionState>,
    stats: Arc<Stats>,
}

impl RelayClient {
    /// Starts a client that connects over WebSocket.
    ///
    /// Must be called from within a Tokio runtime: the control loop is
    /// spawned immediately and starts dialing right away.
    ///
    /// # Errors
    /// [`ClientError::InvalidConfig`] if `config` fails validation.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        Self::with_connector(config, WebSocketConnector)
    }

    /// Starts a client that dials through `connector`.
    ///
    /// # Errors
    /// [`ClientError::InvalidConfig`] if `config` fails validation.
    pub fn with_connector<T: Connector>(
        config: ClientConfig,
        connector: T,
    ) -> Result<Self, ClientError> {
        config.validate()?;

        let (request_tx, request_rx) = mpsc::channel(config.request_queue);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let stats = Arc::new(Stats::default());

        let control = ControlLoop::new(
            &config,
            connector,
            JsonCodec,
            request_rx,
            state_tx,
            Arc::clone(&stats),
        );
        tokio::spawn(control.run());

        Ok(Self {
            requests: request_tx,
            state: state_rx,
            stats,
        })
    }

    /// Sends `make(reply)` to the loop and waits for the reply.
    async fn request<R>(
        &self,
        make: impl FnOnce(oneshot::Sender<R>) -> Request,
    ) -> Result<R, ClientError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send(make(reply_tx))
            .await
            .map_err(|_| ClientError::Closed)?;
        reply_rx.await.map_err(|_| ClientError::Closed)
    }

    /// Subscribes to `name`, registering it if needed.
    ///
    /// Subscribing twice returns the same [`Channel`]. If the connection
    /// isn't ready yet the subscription goes out once it is, and again after
    /// every reconnect.
    ///
    /// # Errors
    /// - [`ClientError::Channel`] if the name is invalid.
    /// - [`ClientError::Auth`] if the connection is ready and the channel
    ///   could not be authorized. The channel stays registered.
    /// - [`ClientError::Closed`] after [`disconnect`](Self::disconnect).
    pub async fn subscribe(&self, name: &str) -> Result<Channel, ClientError> {
        let name = name.to_string();
        self.request(|reply| Request::Subscribe { name, reply })
            .await?
    }

    /// Unsubscribes from `name`. A no-op when not connected or when the
    /// channel was never registered.
    pub async fn unsubscribe(&self, name: &str) -> Result<(), ClientError> {
        let name = name.to_string();
        self.request(|reply| Request::Unsubscribe { name, reply })
            .await
    }

    /// Closes the connection and stops the control loop for good.
    ///
    /// Returns once teardown is complete. Calling it again, or on a closed
    /// client, returns immediately.
    pub async fn disconnect(&self) {
        let _ = self.request(|reply| Request::Disconnect { reply }).await;
    }

    /// Receives every `event` on `channel` through the returned stream.
    ///
    /// Binding doesn't subscribe; the stream stays quiet until the channel
    /// is subscribed.
    pub async fn bind(
        &self,
        channel: &str,
        event: &str,
    ) -> Result<(BindingId, EventStream), ClientError> {
        let (channel, event) = (channel.to_string(), event.to_string());
        self.request(|reply| Request::Bind {
            channel,
            event,
            reply,
        })
        .await
    }

    /// Registers `listener` for every event on every channel.
    ///
    /// The listener runs on the control loop. It must return quickly and
    /// must not wait on this client.
    pub async fn bind_global<F>(&self, listener: F) -> Result<BindingId, ClientError>
    where
        F: Fn(&str, &str, &EventData) + Send + Sync + 'static,
    {
        let listener: GlobalListener = Arc::new(listener);
        self.request(|reply| Request::BindGlobal { listener, reply })
            .await
    }

    /// Removes a binding or global listener. Returns `false` if `id` was
    /// unknown.
    pub async fn unbind(&self, id: BindingId) -> Result<bool, ClientError> {
        self.request(|reply| Request::Unbind { id, reply }).await
    }

    /// The session id assigned by the relay, once connection-established
    /// has been received on the current connection.
    pub async fn socket_id(&self) -> Result<Option<String>, ClientError> {
        self.request(|reply| Request::SocketId { reply }).await
    }

    /// Every registered channel, in registration order.
    pub async fn channels(&self) -> Result<Vec<Channel>, ClientError> {
        self.request(|reply| Request::Channels { reply }).await
    }

    /// The current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// A receiver that observes every state change.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// How many inbound frames or payloads could not be decoded.
    pub fn decode_failures(&self) -> u64 {
        self.stats.decode_failures.load(Ordering::Relaxed)
    }

    /// Returns `true` once the control loop has exited.
    pub fn is_closed(&self) -> bool {
        self.requests.is_closed()
    }
}
