//! Wire messages exchanged over the upgraded WebSocket.
//!
//! Server → client frames are [`ServerMessage`]s serialized as JSON text:
//!
//! ```text
//! { "type": "todo_update", "payload": {...}, "user_id": "alice", "timestamp": "2026-01-01T00:00:00Z" }
//! ```
//!
//! Client → server frames are small control messages parsed into
//! [`ClientMessage`]: `ping`, `subscribe` and `unsubscribe`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::errors::ProtocolError;
use crate::events::Event;
use crate::ids::{ConnectionId, GroupId, UserId};

/// A message written to a client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerMessage {
    /// Type tag.
    #[serde(rename = "type")]
    pub message_type: String,
    /// Type-specific payload.
    #[serde(default)]
    pub payload: Value,
    /// Target user, present only for user-addressed events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    /// Creation time (RFC 3339 on the wire).
    pub timestamp: DateTime<Utc>,
}

impl ServerMessage {
    /// Wire form of an event.
    pub fn from_event(event: &Event) -> Self {
        Self {
            message_type: event.event_type().to_owned(),
            payload: event.kind.payload(),
            user_id: event.target_user.clone(),
            timestamp: event.timestamp,
        }
    }

    /// Reply to a client `ping`.
    pub fn pong() -> Self {
        Self {
            message_type: "pong".into(),
            payload: Value::Null,
            user_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Greeting sent once a connection has been registered.
    pub fn connected(connection_id: &ConnectionId, user_id: &UserId, groups: &[GroupId]) -> Self {
        Self {
            message_type: "connected".into(),
            payload: json!({
                "connection_id": connection_id,
                "user_id": user_id,
                "groups": groups,
            }),
            user_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Serialize to the JSON text frame body.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A control message sent by a client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientMessage {
    /// Application-level keepalive; answered with `pong`.
    Ping,
    /// Start receiving events addressed to a group.
    Subscribe(GroupId),
    /// Stop receiving events addressed to a group.
    Unsubscribe(GroupId),
}

#[derive(Deserialize)]
struct RawClientMessage {
    #[serde(rename = "type")]
    message_type: String,
    #[serde(default)]
    payload: Option<Value>,
}

#[derive(Deserialize)]
struct GroupPayload {
    #[serde(alias = "team_id")]
    group_id: GroupId,
}

impl ClientMessage {
    /// Parse a text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let raw: RawClientMessage = serde_json::from_str(text)?;
        match raw.message_type.as_str() {
            "ping" => Ok(Self::Ping),
            "subscribe" => Ok(Self::Subscribe(group_from(&raw)?)),
            "unsubscribe" => Ok(Self::Unsubscribe(group_from(&raw)?)),
            _ => Err(ProtocolError::UnknownType(raw.message_type)),
        }
    }

    /// Wire name of the message type.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Subscribe(_) => "subscribe",
            Self::Unsubscribe(_) => "unsubscribe",
        }
    }
}

fn group_from(raw: &RawClientMessage) -> Result<GroupId, ProtocolError> {
    let invalid = |reason: String| ProtocolError::InvalidPayload {
        message_type: raw.message_type.clone(),
        reason,
    };
    let payload = raw
        .payload
        .clone()
        .ok_or_else(|| invalid("missing payload".into()))?;
    let parsed: GroupPayload =
        serde_json::from_value(payload).map_err(|e| invalid(e.to_string()))?;
    if parsed.group_id.is_empty() {
        return Err(invalid("empty group_id".into()));
    }
    Ok(parsed.group_id)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChangeAction;
    use assert_matches::assert_matches;

    #[test]
    fn parse_ping() {
        assert_eq!(ClientMessage::parse(r#"{"type":"ping"}"#).unwrap(), ClientMessage::Ping);
    }

    #[test]
    fn parse_ping_ignores_payload() {
        let msg = ClientMessage::parse(r#"{"type":"ping","payload":{"x":1}}"#).unwrap();
        assert_eq!(msg, ClientMessage::Ping);
    }

    #[test]
    fn parse_subscribe() {
        let msg =
            ClientMessage::parse(r#"{"type":"subscribe","payload":{"group_id":"team1"}}"#).unwrap();
        assert_eq!(msg, ClientMessage::Subscribe(GroupId::from("team1")));
        assert_eq!(msg.name(), "subscribe");
    }

    #[test]
    fn parse_unsubscribe_accepts_team_id_alias() {
        let msg =
            ClientMessage::parse(r#"{"type":"unsubscribe","payload":{"team_id":"team2"}}"#)
                .unwrap();
        assert_eq!(msg, ClientMessage::Unsubscribe(GroupId::from("team2")));
    }

    #[test]
    fn subscribe_without_payload_is_invalid() {
        let err = ClientMessage::parse(r#"{"type":"subscribe"}"#).unwrap_err();
        assert_matches!(err, ProtocolError::InvalidPayload { message_type, .. } if message_type == "subscribe");
    }

    #[test]
    fn subscribe_with_numeric_group_is_invalid() {
        let err =
            ClientMessage::parse(r#"{"type":"subscribe","payload":{"group_id":7}}"#).unwrap_err();
        assert_matches!(err, ProtocolError::InvalidPayload { .. });
    }

    #[test]
    fn subscribe_with_empty_group_is_invalid() {
        let err =
            ClientMessage::parse(r#"{"type":"subscribe","payload":{"group_id":""}}"#).unwrap_err();
        assert_matches!(err, ProtocolError::InvalidPayload { reason, .. } if reason == "empty group_id");
    }

    #[test]
    fn unknown_type_is_reported() {
        let err = ClientMessage::parse(r#"{"type":"dance"}"#).unwrap_err();
        assert_matches!(err, ProtocolError::UnknownType(t) if t == "dance");
    }

    #[test]
    fn bad_json_is_reported() {
        assert_matches!(
            ClientMessage::parse("not json"),
            Err(ProtocolError::InvalidJson(_))
        );
        assert_matches!(
            ClientMessage::parse(r#"{"payload":{}}"#),
            Err(ProtocolError::InvalidJson(_))
        );
    }

    #[test]
    fn server_message_from_user_event() {
        let event = Event::notification("alice", "reminder", "standup in 5");
        let msg = ServerMessage::from_event(&event);
        let value: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "notification");
        assert_eq!(value["user_id"], "alice");
        assert_eq!(value["payload"]["content"], "standup in 5");
        let ts = value["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[test]
    fn server_message_omits_user_id_for_group_events() {
        let event = Event::team_update(ChangeAction::Created, "team1", json!({}));
        let value = serde_json::to_value(ServerMessage::from_event(&event)).unwrap();
        assert!(value.get("user_id").is_none());
        assert_eq!(value["type"], "team_update");
    }

    #[test]
    fn pong_message_shape() {
        let value = serde_json::to_value(ServerMessage::pong()).unwrap();
        assert_eq!(value["type"], "pong");
        assert!(value["payload"].is_null());
    }

    #[test]
    fn connected_message_lists_groups() {
        let msg = ServerMessage::connected(
            &ConnectionId::from("conn_1"),
            &UserId::from("bob"),
            &[GroupId::from("team1")],
        );
        assert_eq!(msg.message_type, "connected");
        assert_eq!(msg.payload["connection_id"], "conn_1");
        assert_eq!(msg.payload["user_id"], "bob");
        assert_eq!(msg.payload["groups"][0], "team1");
    }

    #[test]
    fn server_message_deserializes() {
        let text = r#"{"type":"entity_update","payload":{"id":3},"timestamp":"2026-01-01T00:00:00Z"}"#;
        let msg: ServerMessage = serde_json::from_str(text).unwrap();
        assert_eq!(msg.message_type, "entity_update");
        assert_eq!(msg.payload["id"], 3);
        assert!(msg.user_id.is_none());
    }
}
