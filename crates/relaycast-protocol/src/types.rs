//! Wire types for the relay protocol.
//!
//! Every frame on the socket is a small JSON object with an `event` name.
//! Outbound frames carry `data` as a nested object; inbound frames carry
//! `data` as a JSON *string* that needs a second decode pass, keyed by the
//! event name, for the handful of control events the client understands.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Channel naming convention
// ---------------------------------------------------------------------------

/// Name prefix marking a channel that needs an `auth` signature.
pub const PRIVATE_PREFIX: &str = "private-";

/// Name prefix marking a channel that tracks its members.
pub const PRESENCE_PREFIX: &str = "presence-";

/// What kind of channel a name refers to.
///
/// The kind is never sent on the wire. Both sides derive it from the
/// channel name, so it can't drift from the name it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// No authorization needed.
    Public,
    /// `private-*`: the caller's auth callback signs the subscription.
    Private,
    /// `presence-*`: signed locally, carries the caller's identity.
    Presence,
}

impl ChannelKind {
    /// Derives the kind from a channel name's prefix.
    pub fn from_name(name: &str) -> Self {
        if name.starts_with(PRESENCE_PREFIX) {
            Self::Presence
        } else if name.starts_with(PRIVATE_PREFIX) {
            Self::Private
        } else {
            Self::Public
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::Presence => "presence",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

/// The control event names for one protocol namespace.
///
/// Relays speaking this protocol prefix their control events with a
/// vendor namespace (`pusher:subscribe`, `control:subscribe`, ...).
/// Internal events the relay sends about a channel use `{ns}_internal:`;
/// the client re-publishes them to listeners under `{ns}:`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventNames {
    pub subscribe: String,
    pub unsubscribe: String,
    pub connection_established: String,
    pub ping: String,
    pub pong: String,
    pub error: String,
    pub internal_subscription_succeeded: String,
    pub internal_member_added: String,
    pub internal_member_removed: String,
    pub subscription_succeeded: String,
    pub subscription_error: String,
    pub member_added: String,
    pub member_removed: String,
}

impl EventNames {
    /// The namespace used when none is configured.
    pub const DEFAULT_NAMESPACE: &'static str = "control";

    /// Builds the full set of event names for `namespace`.
    pub fn new(namespace: &str) -> Self {
        let public = |name: &str| format!("{namespace}:{name}");
        let internal = |name: &str| format!("{namespace}_internal:{name}");
        Self {
            subscribe: public("subscribe"),
            unsubscribe: public("unsubscribe"),
            connection_established: public("connection_established"),
            ping: public("ping"),
            pong: public("pong"),
            error: public("error"),
            internal_subscription_succeeded: internal("subscription_succeeded"),
            internal_member_added: internal("member_added"),
            internal_member_removed: internal("member_removed"),
            subscription_succeeded: public("subscription_succeeded"),
            subscription_error: public("subscription_error"),
            member_added: public("member_added"),
            member_removed: public("member_removed"),
        }
    }
}

impl Default for EventNames {
    fn default() -> Self {
        Self::new(Self::DEFAULT_NAMESPACE)
    }
}

// ---------------------------------------------------------------------------
// Outbound frames
// ---------------------------------------------------------------------------

/// A frame the client sends to the relay.
///
/// `channel` is only present when the relay needs top-level channel
/// context; subscribe and unsubscribe carry the channel inside `data`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundFrame<T> {
    pub event: String,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

impl<T> OutboundFrame<T> {
    /// A frame with no top-level channel.
    pub fn new(event: impl Into<String>, data: T) -> Self {
        Self {
            event: event.into(),
            data,
            channel: None,
        }
    }
}

/// `data` of a subscribe frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeData {
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_data: Option<String>,
}

impl SubscribeData {
    /// Subscribe data for a public channel.
    pub fn public(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            auth: None,
            channel_data: None,
        }
    }
}

/// `data` of an unsubscribe frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsubscribeData {
    pub channel: String,
}

/// Empty object payload, serialized as `{}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Empty {}

// ---------------------------------------------------------------------------
// Inbound frames
// ---------------------------------------------------------------------------

/// A decoded inbound frame.
///
/// `data` is kept as the raw encoded string. Only the control loop decodes
/// it further, and only for the control events it understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "event")]
    pub name: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default, deserialize_with = "string_or_json")]
    pub data: String,
}

/// Accepts `data` either as a JSON string (the normal case) or as any
/// other JSON value, which is re-encoded to its text form.
fn string_or_json<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// `data` of the connection-established event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEstablished {
    pub socket_id: String,
    /// Seconds of silence after which the relay expects a ping.
    #[serde(default)]
    pub activity_timeout: Option<u64>,
}

/// `data` of a relay error event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayError {
    #[serde(default)]
    pub code: Option<u32>,
    #[serde(default)]
    pub message: String,
}

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

/// A member of a presence channel.
///
/// Serialization order is fixed (`user_id` then `user_info`) because the
/// encoded form is part of the presence signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    #[serde(deserialize_with = "string_or_number")]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_info: Option<serde_json::Value>,
}

impl Member {
    /// A member with no extra info.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_info: None,
        }
    }

    /// Attaches arbitrary info (name, avatar, ...) to the member.
    pub fn with_info(mut self, info: serde_json::Value) -> Self {
        self.user_info = Some(info);
        self
    }
}

/// Relays send numeric user ids as JSON numbers; normalize to strings.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    user_id_string(serde_json::Value::deserialize(deserializer)?)
        .map_err(serde::de::Error::custom)
}

/// Same normalization as [`string_or_number`], for every entry of a list.
fn strings_or_numbers<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Vec::<serde_json::Value>::deserialize(deserializer)?
        .into_iter()
        .map(|v| user_id_string(v).map_err(serde::de::Error::custom))
        .collect()
}

fn user_id_string(value: serde_json::Value) -> Result<String, String> {
    match value {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(format!("user_id must be a string or number, got {other}")),
    }
}

/// `data` of the internal subscription-succeeded event on a presence
/// channel.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PresenceData {
    pub presence: PresenceSnapshot,
}

/// The member snapshot inside [`PresenceData`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PresenceSnapshot {
    #[serde(default, deserialize_with = "strings_or_numbers")]
    pub ids: Vec<String>,
    #[serde(default)]
    pub hash: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub count: usize,
}

/// The decoded member list delivered to listeners when a presence
/// subscription succeeds.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MemberRoster {
    /// Members in the order the relay listed their ids.
    pub members: Vec<Member>,
    /// The caller's own entry, if it appears in the list.
    pub me: Option<Member>,
}

impl MemberRoster {
    /// Builds a roster from a presence snapshot, picking out the entry
    /// whose id matches `my_user_id`.
    pub fn from_snapshot(
        snapshot: PresenceSnapshot,
        my_user_id: Option<&str>,
    ) -> Self {
        let PresenceSnapshot { ids, mut hash, .. } = snapshot;
        let members: Vec<Member> = ids
            .into_iter()
            .map(|id| {
                let info = hash.remove(&id).filter(|v| !v.is_null());
                Member {
                    user_id: id,
                    user_info: info,
                }
            })
            .collect();
        let me = my_user_id.and_then(|mine| {
            members.iter().find(|m| m.user_id == mine).cloned()
        });
        Self { members, me }
    }

    /// Number of members in the roster.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns `true` if nobody is present.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! The relay defines exact JSON shapes; these tests pin our serde
    //! attributes to them.

    use super::*;

    // =====================================================================
    // ChannelKind
    // =====================================================================

    #[test]
    fn test_channel_kind_from_name_uses_prefix() {
        assert_eq!(ChannelKind::from_name("updates"), ChannelKind::Public);
        assert_eq!(ChannelKind::from_name("private-orders"), ChannelKind::Private);
        assert_eq!(ChannelKind::from_name("presence-room"), ChannelKind::Presence);
    }

    #[test]
    fn test_channel_kind_prefix_must_be_at_start() {
        // "my-private-stuff" is just a public channel with an odd name.
        assert_eq!(ChannelKind::from_name("my-private-stuff"), ChannelKind::Public);
        assert_eq!(ChannelKind::from_name("private"), ChannelKind::Public);
    }

    // =====================================================================
    // EventNames
    // =====================================================================

    #[test]
    fn test_event_names_default_namespace() {
        let names = EventNames::default();
        assert_eq!(names.subscribe, "control:subscribe");
        assert_eq!(names.unsubscribe, "control:unsubscribe");
        assert_eq!(
            names.internal_member_added,
            "control_internal:member_added"
        );
        assert_eq!(names.member_added, "control:member_added");
    }

    #[test]
    fn test_event_names_custom_namespace() {
        let names = EventNames::new("pusher");
        assert_eq!(names.connection_established, "pusher:connection_established");
        assert_eq!(
            names.internal_subscription_succeeded,
            "pusher_internal:subscription_succeeded"
        );
    }

    // =====================================================================
    // Outbound frames
    // =====================================================================

    #[test]
    fn test_subscribe_frame_public_has_no_auth_fields() {
        let frame = OutboundFrame::new(
            "control:subscribe",
            SubscribeData::public("updates"),
        );
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(
            json,
            r#"{"event":"control:subscribe","data":{"channel":"updates"}}"#
        );
    }

    #[test]
    fn test_subscribe_frame_presence_carries_auth_and_channel_data() {
        let frame = OutboundFrame::new(
            "control:subscribe",
            SubscribeData {
                channel: "presence-room".into(),
                auth: Some("key:abc".into()),
                channel_data: Some(r#"{"user_id":"42"}"#.into()),
            },
        );
        let json: serde_json::Value = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["data"]["auth"], "key:abc");
        assert_eq!(json["data"]["channel_data"], r#"{"user_id":"42"}"#);
        assert!(json.get("channel").is_none());
    }

    #[test]
    fn test_outbound_frame_with_channel_includes_it() {
        let mut frame = OutboundFrame::new("client-typing", Empty {});
        frame.channel = Some("private-chat".into());
        let json: serde_json::Value = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["channel"], "private-chat");
        assert_eq!(json["data"], serde_json::json!({}));
    }

    // =====================================================================
    // Inbound frames
    // =====================================================================

    #[test]
    fn test_event_decodes_string_data_verbatim() {
        let raw = r#"{"event":"price","channel":"ticker","data":"{\"p\":1}"}"#;
        let event: Event = serde_json::from_str(raw).unwrap();
        assert_eq!(event.name, "price");
        assert_eq!(event.channel, "ticker");
        assert_eq!(event.data, r#"{"p":1}"#);
    }

    #[test]
    fn test_event_reencodes_object_data() {
        let raw = r#"{"event":"price","channel":"ticker","data":{"p":1}}"#;
        let event: Event = serde_json::from_str(raw).unwrap();
        assert_eq!(event.data, r#"{"p":1}"#);
    }

    #[test]
    fn test_event_missing_channel_and_data_default_to_empty() {
        let event: Event =
            serde_json::from_str(r#"{"event":"control:ping"}"#).unwrap();
        assert_eq!(event.channel, "");
        assert_eq!(event.data, "");
    }

    #[test]
    fn test_event_without_name_is_rejected() {
        let result: Result<Event, _> =
            serde_json::from_str(r#"{"channel":"x","data":"y"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_connection_established_decodes_socket_id() {
        let data = r#"{"socket_id":"123.456","activity_timeout":120}"#;
        let est: ConnectionEstablished = serde_json::from_str(data).unwrap();
        assert_eq!(est.socket_id, "123.456");
        assert_eq!(est.activity_timeout, Some(120));
    }

    // =====================================================================
    // Presence
    // =====================================================================

    #[test]
    fn test_member_serializes_canonically() {
        let json = serde_json::to_string(&Member::new("42")).unwrap();
        assert_eq!(json, r#"{"user_id":"42"}"#);

        let with_info = Member::new("7").with_info(serde_json::json!({"name": "Ada"}));
        let json = serde_json::to_string(&with_info).unwrap();
        assert_eq!(json, r#"{"user_id":"7","user_info":{"name":"Ada"}}"#);
    }

    #[test]
    fn test_member_accepts_numeric_user_id() {
        let member: Member =
            serde_json::from_str(r#"{"user_id":42,"user_info":null}"#).unwrap();
        assert_eq!(member.user_id, "42");
    }

    #[test]
    fn test_roster_from_snapshot_keeps_order_and_finds_me() {
        let data = r#"{"presence":{
            "ids":["1","2"],
            "hash":{"1":{"name":"Ada"},"2":null},
            "count":2
        }}"#;
        let presence: PresenceData = serde_json::from_str(data).unwrap();
        let roster = MemberRoster::from_snapshot(presence.presence, Some("2"));

        assert_eq!(roster.len(), 2);
        assert_eq!(roster.members[0].user_id, "1");
        assert_eq!(
            roster.members[0].user_info,
            Some(serde_json::json!({"name": "Ada"}))
        );
        assert_eq!(roster.members[1].user_info, None);
        assert_eq!(roster.me, Some(Member::new("2")));
    }

    #[test]
    fn test_roster_accepts_numeric_ids() {
        let data = r#"{"presence":{
            "ids":[10,7],
            "hash":{"10":{"name":"Ada"},"7":null},
            "count":2
        }}"#;
        let presence: PresenceData = serde_json::from_str(data).unwrap();
        let roster = MemberRoster::from_snapshot(presence.presence, Some("7"));

        assert_eq!(presence_ids(&roster), vec!["10", "7"]);
        assert_eq!(
            roster.members[0].user_info,
            Some(serde_json::json!({"name": "Ada"}))
        );
        assert_eq!(roster.me, Some(Member::new("7")));
    }

    #[test]
    fn test_roster_rejects_object_id() {
        let data = r#"{"presence":{"ids":[{"id":1}],"hash":{},"count":1}}"#;
        let result: Result<PresenceData, _> = serde_json::from_str(data);
        assert!(result.unwrap_err().to_string().contains("string or number"));
    }

    fn presence_ids(roster: &MemberRoster) -> Vec<&str> {
        roster.members.iter().map(|m| m.user_id.as_str()).collect()
    }

    #[test]
    fn test_roster_without_identity_has_no_me() {
        let snapshot = PresenceSnapshot {
            ids: vec!["1".into()],
            hash: HashMap::new(),
            count: 1,
        };
        let roster = MemberRoster::from_snapshot(snapshot, None);
        assert!(roster.me.is_none());
        assert!(!roster.is_empty());
    }
}
