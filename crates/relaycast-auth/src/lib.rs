//! Channel authorization for relaycast.
//!
//! Restricted channels need a signature in their subscribe frame:
//!
//! 1. **Private channels**: signed by the caller through the
//!    [`ChannelAuth`] hook (usually a request to your backend).
//! 2. **Presence channels**: signed locally with HMAC-SHA256 over the
//!    caller's identity, using the application secret.
//!
//! [`Authorizer`] picks the right scheme from the channel name.
//!
//! ```text
//! Client control loop (above)  ← asks for subscribe data per channel
//!     ↕
//! Auth layer (this crate)      ← callback or local HMAC
//!     ↕
//! Protocol layer (below)       ← SubscribeData, Member, ChannelKind
//! ```

mod auth;
mod error;
mod signer;

pub use auth::ChannelAuth;
pub use error::AuthError;
pub use signer::{Authorizer, sign_presence, sign_private};
