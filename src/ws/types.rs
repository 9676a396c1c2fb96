//! WebSocket wire envelopes.
//!
//! Every frame is one JSON object discriminated by a `type` field, with
//! camelCase field names and millisecond-epoch timestamps. Unlisted fields
//! are ignored on input; unknown `type` values decode to [`ClientMessage::
//! Unknown`] and are dropped by the dispatcher.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::rooms::GameState;

/// Current time as milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Envelopes sent from clients to the hub.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Join or create a room.
    Join {
        room_id: String,
        #[serde(default)]
        client_type: Option<String>,
    },

    /// Legacy alias for `join`; handled identically.
    Handshake {
        room_id: String,
        #[serde(default)]
        client_type: Option<String>,
    },

    /// Merge a partial state patch into the room.
    GameState {
        #[serde(default)]
        room_id: Option<String>,
        #[serde(default)]
        data: GameState,
    },

    /// Relay an opaque payload to the rest of the room.
    Command {
        #[serde(default)]
        room_id: Option<String>,
        #[serde(default)]
        data: Value,
    },

    /// Application-level liveness probe.
    Ping,

    /// Any unrecognized `type`; silently ignored.
    #[serde(other)]
    Unknown,
}

/// Envelopes sent from the hub to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Sent once immediately after accept.
    Connected { client_id: String, timestamp: i64 },

    /// Full merged room state, pushed on join and after every merge.
    GameState { data: GameState, timestamp: i64 },

    /// Relayed command payload, tagged with the sender.
    Command {
        data: Value,
        from_client: String,
        timestamp: i64,
    },

    /// Membership notice: someone joined the room.
    ClientJoined {
        client_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        client_type: Option<String>,
        timestamp: i64,
    },

    /// Membership notice: someone left the room.
    ClientLeft { client_id: String, timestamp: i64 },

    /// Reply to an application-level ping.
    Pong { timestamp: i64 },
}

impl ServerMessage {
    /// Wire name of the envelope, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::GameState { .. } => "gameState",
            Self::Command { .. } => "command",
            Self::ClientJoined { .. } => "clientJoined",
            Self::ClientLeft { .. } => "clientLeft",
            Self::Pong { .. } => "pong",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_join() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"join","roomId":"R1","clientType":"host"}"#).unwrap();
        match msg {
            ClientMessage::Join {
                room_id,
                client_type,
            } => {
                assert_eq!(room_id, "R1");
                assert_eq!(client_type.as_deref(), Some("host"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_parse_handshake_without_client_type() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"handshake","roomId":"R1"}"#).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::Handshake {
                client_type: None,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_game_state_without_room() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"gameState","data":{"isSpinning":true}}"#).unwrap();
        match msg {
            ClientMessage::GameState { room_id, data } => {
                assert!(room_id.is_none());
                assert_eq!(data["isSpinning"], json!(true));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_and_extra_fields_tolerated() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"somethingElse","whatever":1}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Unknown));

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"ping","extra":"ignored"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));
    }

    #[test]
    fn test_malformed_frame_is_an_error() {
        assert!(serde_json::from_str::<ClientMessage>("not json").is_err());
        assert!(serde_json::from_str::<ClientMessage>(r#"{"roomId":"R1"}"#).is_err());
    }

    #[test]
    fn test_serialize_command_wire_shape() {
        let msg = ServerMessage::Command {
            data: json!({"action": "start"}),
            from_client: "abc123".to_string(),
            timestamp: 42,
        };
        let wire: Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            wire,
            json!({
                "type": "command",
                "data": {"action": "start"},
                "fromClient": "abc123",
                "timestamp": 42,
            })
        );
    }

    #[test]
    fn test_serialize_connected_wire_shape() {
        let msg = ServerMessage::Connected {
            client_id: "abc123".to_string(),
            timestamp: 42,
        };
        let wire: Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            wire,
            json!({"type": "connected", "clientId": "abc123", "timestamp": 42})
        );
    }

    #[test]
    fn test_client_left_omits_client_type() {
        let msg = ServerMessage::ClientJoined {
            client_id: "abc".to_string(),
            client_type: None,
            timestamp: 1,
        };
        let wire = serde_json::to_string(&msg).unwrap();
        assert!(!wire.contains("clientType"));
    }
}
