//! Channel registry: every channel the caller has asked for.
//!
//! # Concurrency note
//!
//! `ChannelRegistry` is a plain struct with no locking. It is owned by
//! the client's control loop, and the control loop is the only code that
//! mutates it. Callers hold [`Channel`] handles, which are read-only from
//! the outside: the `subscribed` flag is an atomic that only the registry
//! writes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use relaycast_protocol::ChannelKind;

use crate::ChannelError;

/// Longest channel name the relay accepts.
pub const MAX_CHANNEL_NAME_LEN: usize = 164;

struct ChannelInner {
    name: String,
    kind: ChannelKind,
    subscribed: AtomicBool,
}

/// A shared handle to one registered channel.
///
/// Cloning is cheap (an `Arc` bump). Every handle for the same name points
/// at the same entity; use [`Channel::same_as`] to check.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    fn new(name: String) -> Self {
        let kind = ChannelKind::from_name(&name);
        Self {
            inner: Arc::new(ChannelInner {
                name,
                kind,
                subscribed: AtomicBool::new(false),
            }),
        }
    }

    /// The channel's name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The kind derived from the name prefix.
    pub fn kind(&self) -> ChannelKind {
        self.inner.kind
    }

    /// Whether the relay has confirmed the subscription on the current
    /// connection.
    pub fn is_subscribed(&self) -> bool {
        self.inner.subscribed.load(Ordering::Acquire)
    }

    /// Returns `true` if both handles refer to the same channel entity.
    pub fn same_as(&self, other: &Channel) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn set_subscribed(&self, subscribed: bool) {
        self.inner.subscribed.store(subscribed, Ordering::Release);
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.inner.name)
            .field("kind", &self.inner.kind)
            .field("subscribed", &self.is_subscribed())
            .finish()
    }
}

/// Checks that `name` can be sent to the relay.
pub fn validate_name(name: &str) -> Result<(), ChannelError> {
    if name.is_empty() {
        return Err(ChannelError::InvalidName(name.into(), "name is empty"));
    }
    if name.len() > MAX_CHANNEL_NAME_LEN {
        return Err(ChannelError::InvalidName(name.into(), "name is too long"));
    }
    let valid = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_=@,.;".contains(c));
    if !valid {
        return Err(ChannelError::InvalidName(
            name.into(),
            "only [A-Za-z0-9_-=@,.;] are allowed",
        ));
    }
    Ok(())
}

/// Tracks registered channels, in registration order.
///
/// Channels are never removed: unsubscribing only clears the flag.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    /// Registration order, used for the resubscribe sweep.
    channels: Vec<Channel>,

    /// Name → position in `channels`. Kept in sync with `channels`.
    index: HashMap<String, usize>,
}

impl ChannelRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the channel named `name`, creating it (unsubscribed) if
    /// needed. The flag is `true` when the channel was just created.
    ///
    /// # Errors
    /// [`ChannelError::InvalidName`] if the name can't go on the wire.
    pub fn get_or_create(&mut self, name: &str) -> Result<(Channel, bool), ChannelError> {
        if let Some(&pos) = self.index.get(name) {
            return Ok((self.channels[pos].clone(), false));
        }
        validate_name(name)?;

        let channel = Channel::new(name.to_string());
        self.index.insert(name.to_string(), self.channels.len());
        self.channels.push(channel.clone());
        tracing::debug!(channel = name, kind = %channel.kind(), "channel registered");
        Ok((channel, true))
    }

    /// Looks up a channel by name.
    pub fn get(&self, name: &str) -> Option<&Channel> {
        self.index.get(name).map(|&pos| &self.channels[pos])
    }

    /// Sets the subscribed flag of `name`. Returns `false` if no such
    /// channel is registered.
    pub fn mark_subscribed(&mut self, name: &str, subscribed: bool) -> bool {
        match self.get(name) {
            Some(channel) => {
                channel.set_subscribed(subscribed);
                true
            }
            None => false,
        }
    }

    /// Clears every subscribed flag. Returns how many were set.
    pub fn mark_all_unsubscribed(&mut self) -> usize {
        let mut cleared = 0;
        for channel in &self.channels {
            if channel.is_subscribed() {
                channel.set_subscribed(false);
                cleared += 1;
            }
        }
        cleared
    }

    /// Channels not currently subscribed, in registration order.
    pub fn pending(&self) -> Vec<Channel> {
        self.channels
            .iter()
            .filter(|c| !c.is_subscribed())
            .cloned()
            .collect()
    }

    /// All registered channels, in registration order.
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Number of registered channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================
