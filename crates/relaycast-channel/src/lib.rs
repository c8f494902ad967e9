//! Channel bookkeeping for relaycast.
//!
//! Both types here are plain single-owner structs. The client's control
//! loop owns one of each and is the only code that touches them, which is
//! what keeps channel state and listener maps race-free without locks.
//!
//! # Key types
//!
//! - [`ChannelRegistry`]: lookup-or-create channels, subscribed flags
//! - [`Channel`]: shared, read-only handle returned to callers
//! - [`EventDispatcher`]: per-(channel, event) streams + global listeners
//! - [`EventData`] / [`ChannelEvent`]: what listeners receive

mod dispatcher;
mod error;
mod registry;

pub use dispatcher::{
    BindingId, ChannelEvent, EventData, EventDispatcher, EventSender, EventStream,
    GlobalListener,
};
pub use error::ChannelError;
pub use registry::{Channel, ChannelRegistry, MAX_CHANNEL_NAME_LEN, validate_name};
