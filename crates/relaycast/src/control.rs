//! The control loop: a single task that owns every piece of client state.
//!
//! Callers never touch the connection, the channel registry or the
//! listener maps directly. They send a [`Request`] carrying a oneshot reply
//! slot, and the loop answers once the request has been applied. Frames
//! from the relay reach the loop the same way, through a queue fed by a
//! per-connection reader task.
//!
//! ```text
//! RelayClient ──Request──▶ ┌──────────────┐ ──send──▶ Connection
//!                          │ ControlLoop  │
//! dial / reader ──Inbound─▶ └──────────────┘ ──push──▶ EventDispatcher
//! ```
//!
//! The loop selects over three inputs with a fixed priority: the reconnect
//! timer, then caller requests, then inbound notifications. Dialing happens
//! on its own task, so a slow handshake never holds up requests.

use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use relaycast_auth::Authorizer;
use relaycast_channel::{
    BindingId, Channel, ChannelRegistry, EventData, EventDispatcher, EventStream,
    GlobalListener,
};
use relaycast_protocol::{
    ChannelKind, Codec, ConnectionEstablished, Empty, Event, EventNames, Member,
    MemberRoster, OutboundFrame, PresenceData, ProtocolError, RelayError,
    UnsubscribeData,
};
use relaycast_transport::{Connection, ConnectionId, Connector, TransportError};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::timer::ReconnectTimer;
use crate::{ClientConfig, ClientError};

/// Lifecycle of the relay connection, as seen from outside the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected. Initial state, and final after a disconnect.
    Disconnected,
    /// Dialing, or waiting to redial after a failure.
    Connecting,
    /// The socket is open. Subscriptions go out once the relay has sent
    /// its connection-established event.
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
        }
    }
}

/// Counters readable from any client handle.
#[derive(Debug, Default)]
pub(crate) struct Stats {
    pub(crate) decode_failures: AtomicU64,
}

/// Work the outside world asks of the loop.
pub(crate) enum Request {
    Subscribe {
        name: String,
        reply: oneshot::Sender<Result<Channel, ClientError>>,
    },
    Unsubscribe {
        name: String,
        reply: oneshot::Sender<()>,
    },
    Bind {
        channel: String,
        event: String,
        reply: oneshot::Sender<(BindingId, EventStream)>,
    },
    BindGlobal {
        listener: GlobalListener,
        reply: oneshot::Sender<BindingId>,
    },
    Unbind {
        id: BindingId,
        reply: oneshot::Sender<bool>,
    },
    SocketId {
        reply: oneshot::Sender<Option<String>>,
    },
    Channels {
        reply: oneshot::Sender<Vec<Channel>>,
    },
    /// Tear down and exit. Acknowledged after the transport is closed.
    Disconnect { reply: oneshot::Sender<()> },
}

/// What the dial and reader tasks report back to the loop.
enum Inbound<C> {
    Dialed(Result<C, TransportError>),
    Frame(ConnectionId, Vec<u8>),
    /// The connection ended; `None` for a clean close.
    Closed(ConnectionId, Option<TransportError>),
}

type InboundSender<C> = mpsc::UnboundedSender<Inbound<C>>;
type InboundReceiver<C> = mpsc::UnboundedReceiver<Inbound<C>>;

/// The current connection, present only in `Connected`.
struct Live<C> {
    conn: Arc<C>,
    reader: JoinHandle<()>,
    /// Known once the relay has sent connection-established.
    socket_id: Option<String>,
}

/// Which control event a frame is, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlEvent {
    ConnectionEstablished,
    SubscriptionSucceeded,
    MemberAdded,
    MemberRemoved,
    Ping,
    Error,
}

impl ControlEvent {
    fn classify(names: &EventNames, event: &str) -> Option<Self> {
        if event == names.connection_established {
            Some(Self::ConnectionEstablished)
        } else if event == names.internal_subscription_succeeded {
            Some(Self::SubscriptionSucceeded)
        } else if event == names.internal_member_added {
            Some(Self::MemberAdded)
        } else if event == names.internal_member_removed {
            Some(Self::MemberRemoved)
        } else if event == names.ping {
            Some(Self::Ping)
        } else if event == names.error {
            Some(Self::Error)
        } else {
            None
        }
    }
}

/// The actor. Built by [`RelayClient`](crate::RelayClient) and moved into
/// its own task with [`ControlLoop::run`].
pub(crate) struct ControlLoop<T: Connector, C: Codec> {
    url: String,
    debug: bool,
    reconnect_delay: Duration,
    names: EventNames,

    connector: Arc<T>,
    codec: C,
    authorizer: Authorizer,
    registry: ChannelRegistry,
    dispatcher: EventDispatcher,
    timer: ReconnectTimer,
    /// The dial in flight, in `Connecting`.
    dialing: Option<JoinHandle<()>>,
    live: Option<Live<T::Connection>>,

    requests: mpsc::Receiver<Request>,
    inbound_tx: InboundSender<T::Connection>,
    inbound_rx: InboundReceiver<T::Connection>,
    state: watch::Sender<ConnectionState>,
    stats: Arc<Stats>,
}

impl<T: Connector, C: Codec> ControlLoop<T, C> {
    pub(crate) fn new(
        config: &ClientConfig,
        connector: T,
        codec: C,
        requests: mpsc::Receiver<Request>,
        state: watch::Sender<ConnectionState>,
        stats: Arc<Stats>,
    ) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            url: config.url(),
            debug: config.debug,
            reconnect_delay: config.reconnect_delay,
            names: config.event_names(),
            connector: Arc::new(connector),
            codec,
            authorizer: config.authorizer(),
            registry: ChannelRegistry::new(),
            dispatcher: EventDispatcher::new(),
            timer: ReconnectTimer::new(),
            dialing: None,
            live: None,
            requests,
            inbound_tx,
            inbound_rx,
            state,
            stats,
        }
    }

    /// Runs until a disconnect request arrives or every client handle is
    /// dropped.
    pub(crate) async fn run(mut self) {
        tracing::info!(url = %self.url, "control loop started");
        self.timer.arm_now();

        loop {
            tokio::select! {
                biased;

                () = self.timer.wait() => self.dial(),

                request = self.requests.recv() => match request {
                    Some(request) => {
                        if self.handle_request(request).await.is_break() {
                            break;
                        }
                    }
                    None => {
                        tracing::info!("all client handles dropped");
                        self.shutdown().await;
                        break;
                    }
                },

                Some(inbound) = self.inbound_rx.recv() => {
                    self.handle_inbound(inbound).await;
                }
            }
        }

        tracing::info!("control loop stopped");
    }

    // ---------------------------------------------------------------------
    // Connection lifecycle
    // ---------------------------------------------------------------------

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "connection state changed");
        }
    }

    /// The socket id, if the connection is ready for subscriptions.
    fn ready_socket_id(&self) -> Option<String> {
        self.live.as_ref().and_then(|live| live.socket_id.clone())
    }

    fn dial(&mut self) {
        if self.dialing.is_some() || self.live.is_some() {
            return;
        }
        self.set_state(ConnectionState::Connecting);
        tracing::debug!(url = %self.url, "dialing");

        let connector = Arc::clone(&self.connector);
        let url = self.url.clone();
        let tx = self.inbound_tx.clone();
        self.dialing = Some(tokio::spawn(async move {
            let result = connector.connect(&url).await;
            let _ = tx.send(Inbound::Dialed(result));
        }));
    }

    fn dialed(&mut self, result: Result<T::Connection, TransportError>) {
        self.dialing = None;

        match result {
            Ok(conn) => {
                let conn = Arc::new(conn);
                let id = conn.id();
                let reader = spawn_reader(Arc::clone(&conn), self.inbound_tx.clone());
                self.live = Some(Live {
                    conn,
                    reader,
                    socket_id: None,
                });
                self.set_state(ConnectionState::Connected);
                tracing::info!(conn = %id, "connected, waiting for connection_established");
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    retry_in = ?self.reconnect_delay,
                    "failed to connect"
                );
                self.timer.arm(self.reconnect_delay);
            }
        }
    }

    /// Forgets the current connection and schedules a redial.
    fn connection_lost(&mut self, reason: Option<TransportError>) {
        let Some(live) = self.live.take() else {
            return;
        };
        live.reader.abort();
        let cleared = self.registry.mark_all_unsubscribed();

        match reason {
            Some(e) => tracing::warn!(
                conn = %live.conn.id(),
                error = %e,
                cleared,
                retry_in = ?self.reconnect_delay,
                "connection lost"
            ),
            None => tracing::warn!(
                conn = %live.conn.id(),
                cleared,
                retry_in = ?self.reconnect_delay,
                "connection closed by relay"
            ),
        }

        self.set_state(ConnectionState::Connecting);
        self.timer.arm(self.reconnect_delay);
    }

    async fn shutdown(&mut self) {
        self.timer.disarm();
        if let Some(dial) = self.dialing.take() {
            dial.abort();
        }
        self.registry.mark_all_unsubscribed();

        if let Some(live) = self.live.take() {
            if let Err(e) = live.conn.close().await {
                tracing::debug!(error = %e, "close failed during disconnect");
            }
            live.reader.abort();
        }

        self.set_state(ConnectionState::Disconnected);
        tracing::info!("disconnected");
    }

    // ---------------------------------------------------------------------
    // Requests
    // ---------------------------------------------------------------------

    /// Applies one request. `Break` means the loop must stop.
    async fn handle_request(&mut self, request: Request) -> ControlFlow<()> {
        match request {
            Request::Subscribe { name, reply } => {
                let result = self.subscribe(&name).await;
                let _ = reply.send(result);
            }
            Request::Unsubscribe { name, reply } => {
                self.unsubscribe(&name).await;
                let _ = reply.send(());
            }
            Request::Bind {
                channel,
                event,
                reply,
            } => {
                let _ = reply.send(self.dispatcher.bind(&channel, &event));
            }
            Request::BindGlobal { listener, reply } => {
                let _ = reply.send(self.dispatcher.bind_global(listener));
            }
            Request::Unbind { id, reply } => {
                let _ = reply.send(self.dispatcher.unbind(id));
            }
            Request::SocketId { reply } => {
                let _ = reply.send(self.ready_socket_id());
            }
            Request::Channels { reply } => {
                let _ = reply.send(self.registry.channels().to_vec());
            }
            Request::Disconnect { reply } => {
                self.shutdown().await;
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    async fn subscribe(&mut self, name: &str) -> Result<Channel, ClientError> {
        let (channel, created) = self.registry.get_or_create(name)?;

        let Some(socket_id) = self.ready_socket_id() else {
            tracing::debug!(channel = name, created, "subscribe deferred until connected");
            return Ok(channel);
        };

        match self.send_subscribe(&socket_id, &channel).await {
            Ok(()) => Ok(channel),
            Err(ClientError::Transport(e)) => {
                // Resent by the sweep after the next connection_established.
                self.connection_lost(Some(e));
                Ok(channel)
            }
            Err(e) => {
                tracing::warn!(channel = name, error = %e, "subscribe failed");
                Err(e)
            }
        }
    }

    async fn unsubscribe(&mut self, name: &str) {
        if self.ready_socket_id().is_none() || self.registry.get(name).is_none() {
            tracing::debug!(channel = name, "unsubscribe ignored");
            return;
        }

        let frame = OutboundFrame::new(
            self.names.unsubscribe.clone(),
            UnsubscribeData {
                channel: name.to_string(),
            },
        );
        match self.send_frame(&frame).await {
            Ok(()) => {
                self.registry.mark_subscribed(name, false);
                tracing::info!(channel = name, "unsubscribed");
            }
            Err(ClientError::Transport(e)) => self.connection_lost(Some(e)),
            Err(e) => tracing::warn!(channel = name, error = %e, "unsubscribe failed"),
        }
    }

    async fn send_subscribe(
        &mut self,
        socket_id: &str,
        channel: &Channel,
    ) -> Result<(), ClientError> {
        let data = self.authorizer.subscribe_data(socket_id, channel.name())?;
        let frame = OutboundFrame::new(self.names.subscribe.clone(), data);
        self.send_frame(&frame).await?;
        tracing::debug!(channel = channel.name(), kind = %channel.kind(), "subscribe sent");
        Ok(())
    }

    async fn send_frame<P: Serialize + Sync>(
        &mut self,
        frame: &OutboundFrame<P>,
    ) -> Result<(), ClientError> {
        let bytes = self.codec.encode(frame)?;
        let live = self
            .live
            .as_ref()
            .ok_or_else(|| TransportError::ConnectionClosed("not connected".into()))?;
        if self.debug {
            tracing::debug!(
                event = %frame.event,
                frame = %String::from_utf8_lossy(&bytes),
                "sending frame"
            );
        }
        live.conn.send(&bytes).await?;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Inbound
    // ---------------------------------------------------------------------

    async fn handle_inbound(&mut self, inbound: Inbound<T::Connection>) {
        let (id, inbound) = match inbound {
            Inbound::Dialed(result) => return self.dialed(result),
            Inbound::Frame(id, bytes) => (id, Ok(bytes)),
            Inbound::Closed(id, reason) => (id, Err(reason)),
        };

        let current = self.live.as_ref().map(|live| live.conn.id());
        if current != Some(id) {
            tracing::trace!(conn = %id, "dropping notification from stale connection");
            return;
        }

        match inbound {
            Ok(bytes) => self.handle_frame(&bytes).await,
            Err(reason) => self.connection_lost(reason),
        }
    }

    async fn handle_frame(&mut self, bytes: &[u8]) {
        let event: Event = match self.codec.decode(bytes) {
            Ok(event) => event,
            Err(e) => {
                self.decode_failed("frame", &e);
                return;
            }
        };

        if self.debug {
            tracing::debug!(
                event = %event.name,
                channel = %event.channel,
                data = %event.data,
                "received frame"
            );
        }

        match ControlEvent::classify(&self.names, &event.name) {
            Some(ControlEvent::ConnectionEstablished) => {
                self.on_connection_established(&event).await;
            }
            Some(ControlEvent::SubscriptionSucceeded) => self.on_subscription_succeeded(event),
            Some(ControlEvent::MemberAdded) => {
                let name = self.names.member_added.clone();
                self.on_member(event, name);
            }
            Some(ControlEvent::MemberRemoved) => {
                let name = self.names.member_removed.clone();
                self.on_member(event, name);
            }
            Some(ControlEvent::Ping) => {
                let pong = OutboundFrame::new(self.names.pong.clone(), Empty {});
                if let Err(e) = self.send_frame(&pong).await {
                    match e {
                        ClientError::Transport(e) => self.connection_lost(Some(e)),
                        e => tracing::warn!(error = %e, "failed to answer ping"),
                    }
                }
            }
            Some(ControlEvent::Error) => {
                match self.codec.decode::<RelayError>(event.data.as_bytes()) {
                    Ok(err) => tracing::warn!(
                        code = ?err.code,
                        message = %err.message,
                        "relay reported an error"
                    ),
                    Err(e) => self.decode_failed(&event.name, &e),
                }
                self.dispatcher
                    .dispatch(&event.channel, &event.name, EventData::Raw(event.data));
            }
            None => {
                self.dispatcher
                    .dispatch(&event.channel, &event.name, EventData::Raw(event.data));
            }
        }
    }

    async fn on_connection_established(&mut self, event: &Event) {
        let established: ConnectionEstablished =
            match self.codec.decode(event.data.as_bytes()) {
                Ok(established) => established,
                Err(e) => {
                    self.decode_failed(&event.name, &e);
                    return;
                }
            };

        let Some(live) = self.live.as_mut() else {
            return;
        };
        live.socket_id = Some(established.socket_id.clone());
        tracing::info!(
            socket_id = %established.socket_id,
            activity_timeout = ?established.activity_timeout,
            "connection established"
        );

        for channel in self.registry.pending() {
            match self.send_subscribe(&established.socket_id, &channel).await {
                Ok(()) => {}
                Err(ClientError::Transport(e)) => {
                    self.connection_lost(Some(e));
                    return;
                }
                Err(e) => {
                    tracing::warn!(channel = channel.name(), error = %e, "resubscribe failed");
                    self.dispatcher.dispatch(
                        channel.name(),
                        &self.names.subscription_error,
                        EventData::Error(e.to_string()),
                    );
                }
            }
        }
    }

    fn on_subscription_succeeded(&mut self, event: Event) {
        if !self.registry.mark_subscribed(&event.channel, true) {
            tracing::debug!(channel = %event.channel, "confirmation for unknown channel");
            return;
        }
        tracing::info!(channel = %event.channel, "subscribed");

        let data = if ChannelKind::from_name(&event.channel) == ChannelKind::Presence {
            match self.codec.decode::<PresenceData>(event.data.as_bytes()) {
                Ok(presence) => EventData::Members(MemberRoster::from_snapshot(
                    presence.presence,
                    self.authorizer.user_id(),
                )),
                Err(e) => {
                    self.decode_failed(&event.name, &e);
                    EventData::Raw(event.data)
                }
            }
        } else {
            EventData::Raw(event.data)
        };

        self.dispatcher
            .dispatch(&event.channel, &self.names.subscription_succeeded, data);
    }

    fn on_member(&mut self, event: Event, deliver_as: String) {
        match self.codec.decode::<Member>(event.data.as_bytes()) {
            Ok(member) => {
                tracing::debug!(
                    channel = %event.channel,
                    user_id = %member.user_id,
                    event = %deliver_as,
                    "presence change"
                );
                self.dispatcher
                    .dispatch(&event.channel, &deliver_as, EventData::Member(member));
            }
            Err(e) => self.decode_failed(&event.name, &e),
        }
    }

    fn decode_failed(&self, what: &str, error: &ProtocolError) {
        let total = self.stats.decode_failures.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::warn!(what, error = %error, total, "dropping undecodable payload");
    }
}

/// Pumps frames from `conn` into the loop until the connection ends.
fn spawn_reader<C: Connection>(conn: Arc<C>, tx: InboundSender<C>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let id = conn.id();
        loop {
            let (inbound, done) = match conn.recv().await {
                Ok(Some(frame)) => (Inbound::Frame(id, frame), false),
                Ok(None) => (Inbound::Closed(id, None), true),
                Err(e) => (Inbound::Closed(id, Some(e)), true),
            };
            if tx.send(inbound).is_err() || done {
                tracing::trace!(conn = %id, "reader finished");
                return;
            }
        }
    })
}
