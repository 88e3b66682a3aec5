//! WebSocket frames.
//!
//! Every frame is a JSON text message tagged by `type`.

use serde::{Deserialize, Serialize};

use crate::domain::{ConnectionId, IdentityLabel, MemberInfo, RoomName, Timestamp};

/// Membership change carried by a `presence` frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceEvent {
    Join,
    Leave,
}

/// Server → client frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Welcome {
        room: RoomName,
        connection_id: ConnectionId,
        member_count: usize,
        members: Vec<MemberInfo>,
    },
    Presence {
        event: PresenceEvent,
        room: RoomName,
        connection_id: ConnectionId,
        identity: IdentityLabel,
        member_count: usize,
        ts: Timestamp,
    },
    Message {
        room: RoomName,
        from: ConnectionId,
        identity: IdentityLabel,
        ts: Timestamp,
        data: serde_json::Value,
    },
    Pong {
        ts: Timestamp,
    },
    Error {
        error: String,
    },
}

impl ServerFrame {
    /// Serialize to the text payload pushed into a member channel.
    ///
    /// Every variant holds plain data, so serialization cannot fail in
    /// practice; a failure still degrades to an `error` frame.
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!("Failed to serialize server frame: {}", e);
            r#"{"type":"error","error":"internal_error"}"#.to_string()
        })
    }
}

/// Client → server frame, as interpreted by the gateway
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    Ping,
    /// Anything else; relayed as the `data` of a `message` frame
    Data(serde_json::Value),
}

impl ClientFrame {
    /// Classify a raw text frame. Never fails: non-JSON text becomes a JSON
    /// string.
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(value) => {
                if value.get("type").and_then(|t| t.as_str()) == Some("ping") {
                    Self::Ping
                } else {
                    Self::Data(value)
                }
            }
            Err(_) => Self::Data(serde_json::Value::String(raw.to_string())),
        }
    }
}
