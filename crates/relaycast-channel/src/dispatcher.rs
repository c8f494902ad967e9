//! Event dispatcher: routes decoded events to listeners.
//!
//! Two kinds of listener:
//!
//! - **Bindings** on a `(channel, event)` key. Each binding owns an
//!   unbounded queue; dispatch pushes into it and moves on, so a slow or
//!   absent consumer never stalls the control loop.
//! - **Global listeners**, plain callbacks invoked for every event in
//!   registration order, right after the bindings. They run on the control
//!   loop itself and must not block or wait on the client.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use relaycast_protocol::{Member, MemberRoster};
use tokio::sync::mpsc;

/// What a listener receives for one event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventData {
    /// An application event's `data`, still encoded.
    Raw(String),
    /// The member roster of a presence channel that just subscribed.
    Members(MemberRoster),
    /// A member who joined or left a presence channel.
    Member(Member),
    /// Why a deferred subscription could not be authorized.
    Error(String),
}

impl EventData {
    /// The raw payload, if this is an application event.
    pub fn as_raw(&self) -> Option<&str> {
        match self {
            Self::Raw(s) => Some(s),
            _ => None,
        }
    }
}

/// One event as delivered to a binding's stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEvent {
    pub channel: String,
    pub event: String,
    pub data: EventData,
}

/// Sending half of a binding's queue.
pub type EventSender = mpsc::UnboundedSender<ChannelEvent>;

/// Receiving half of a binding's queue, handed to the caller.
pub type EventStream = mpsc::UnboundedReceiver<ChannelEvent>;

/// A callback invoked with `(channel, event, data)` for every event.
pub type GlobalListener = Arc<dyn Fn(&str, &str, &EventData) + Send + Sync>;

/// Token returned by every bind, used to unbind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(u64);

impl BindingId {
    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bind-{}", self.0)
    }
}

type BindingKey = (String, String);

/// Routes events to bindings and global listeners.
///
/// Owned by the control loop, like the registry.
#[derive(Default)]
pub struct EventDispatcher {
    next_id: u64,

    /// Per-key bindings, in bind order.
    bindings: HashMap<BindingKey, Vec<(BindingId, EventSender)>>,

    /// Binding id → key, so unbind doesn't scan every key.
    keys: HashMap<BindingId, BindingKey>,

    /// Global listeners, in registration order.
    globals: Vec<(BindingId, GlobalListener)>,
}

impl EventDispatcher {
    /// Creates a dispatcher with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> BindingId {
        self.next_id += 1;
        BindingId(self.next_id)
    }

    /// Binds a new queue to `(channel, event)` and returns its stream.
    pub fn bind(&mut self, channel: &str, event: &str) -> (BindingId, EventStream) {
        let id = self.allocate_id();
        let (tx, rx) = mpsc::unbounded_channel();
        let key = (channel.to_string(), event.to_string());
        self.bindings.entry(key.clone()).or_default().push((id, tx));
        self.keys.insert(id, key);
        tracing::trace!(%id, channel, event, "binding added");
        (id, rx)
    }

    /// Registers a listener for every event on every channel.
    pub fn bind_global(&mut self, listener: GlobalListener) -> BindingId {
        let id = self.allocate_id();
        self.globals.push((id, listener));
        tracing::trace!(%id, "global listener added");
        id
    }

    /// Removes a binding or global listener. Returns `false` for an
    /// unknown id.
    pub fn unbind(&mut self, id: BindingId) -> bool {
        if let Some(key) = self.keys.remove(&id) {
            if let Some(list) = self.bindings.get_mut(&key) {
                list.retain(|(bid, _)| *bid != id);
                if list.is_empty() {
                    self.bindings.remove(&key);
                }
            }
            return true;
        }
        let before = self.globals.len();
        self.globals.retain(|(gid, _)| *gid != id);
        self.globals.len() != before
    }

    /// Delivers one event. Returns how many bindings received it (global
    /// listeners not counted).
    ///
    /// Bindings whose stream was dropped are pruned here.
    pub fn dispatch(&mut self, channel: &str, event: &str, data: EventData) -> usize {
        let mut delivered = 0;
        let key = (channel.to_string(), event.to_string());

        if let Some(list) = self.bindings.get_mut(&key) {
            let keys = &mut self.keys;
            list.retain(|(id, tx)| {
                let sent = tx
                    .send(ChannelEvent {
                        channel: channel.to_string(),
                        event: event.to_string(),
                        data: data.clone(),
                    })
                    .is_ok();
                if sent {
                    delivered += 1;
                } else {
                    // Receiver dropped.
                    tracing::trace!(%id, channel, event, "pruning closed binding");
                    keys.remove(id);
                }
                sent
            });
            if list.is_empty() {
                self.bindings.remove(&key);
            }
        }

        for (_, listener) in &self.globals {
            listener(channel, event, &data);
        }

        delivered
    }

    /// Number of live `(channel, event)` bindings.
    pub fn binding_count(&self) -> usize {
        self.keys.len()
    }

    /// Number of global listeners.
    pub fn global_count(&self) -> usize {
        self.globals.len()
    }
}

// =========================================================================
// Tests
// =========================================================================
