//! WebSocket message types: envelope, commands, and events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SyncError;

/// Top-level WebSocket message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage {
    /// Client-provided ID for requests; server-generated for events.
    pub id: String,
    /// Message type discriminator.
    #[serde(rename = "type")]
    pub msg_type: WsMessageType,
    /// ISO-8601 timestamp.
    pub timestamp: DateTime<Utc>,
    /// Variant-specific payload.
    pub payload: serde_json::Value,
}

impl WsMessage {
    /// Server push of a view event.
    #[must_use]
    pub fn event(payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            msg_type: WsMessageType::Event,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Reply to the command with id `id`.
    #[must_use]
    pub fn response(id: String, payload: serde_json::Value) -> Self {
        Self {
            id,
            msg_type: WsMessageType::Response,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Error reply with a numeric code.
    #[must_use]
    pub fn error(id: String, code: u32, message: impl Into<String>) -> Self {
        Self {
            id,
            msg_type: WsMessageType::Error,
            timestamp: Utc::now(),
            payload: serde_json::json!({
                "code": code,
                "message": message.into(),
            }),
        }
    }

    /// Error reply for a failed engine call.
    #[must_use]
    pub fn from_sync_error(id: String, err: &SyncError) -> Self {
        let mut msg = Self::error(id, err.error_code(), err.to_string());
        if let Some(obj) = msg.payload.as_object_mut() {
            obj.insert("retryable".to_string(), err.is_retryable().into());
        }
        msg
    }

    /// Serializes the envelope, `None` if it cannot be encoded.
    #[must_use]
    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

/// Discriminator for WebSocket message types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WsMessageType {
    /// Client → Server command.
    Command,
    /// Server → Client response to a command.
    Response,
    /// Server → Client broadcast event.
    Event,
    /// Server → Client error.
    Error,
}

/// Commands that a client can send over WebSocket, carried in the
/// envelope payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WsCommand {
    /// Receive the given event types. Use `["*"]` for all of them.
    Subscribe {
        /// `"updated"`, `"undo_tick"` or `"*"`.
        event_types: Vec<String>,
    },
    /// Stop receiving the given event types.
    Unsubscribe {
        /// `"updated"`, `"undo_tick"` or `"*"`.
        event_types: Vec<String>,
    },
    /// Read the current status.
    GetStatus,
    /// Feed pets as the viewing member.
    Feed {
        /// Pets to feed; omit for all pets.
        #[serde(default)]
        pet_ids: Option<Vec<Uuid>>,
    },
    /// Undo a feeding.
    Undo {
        /// Event key, as shown in the status.
        event_id: String,
    },
    /// Rebuild the view from the store.
    Reload,
    /// Mark the member's notifications read.
    MarkNotificationsRead,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn command_envelope_parses() {
        let text = r#"{
            "id": "c1",
            "type": "command",
            "timestamp": "2025-06-01T08:00:00Z",
            "payload": { "command": "undo", "event_id": "temp-00000000-0000-0000-0000-000000000001" }
        }"#;
        let Ok(msg) = serde_json::from_str::<WsMessage>(text) else {
            panic!("envelope should parse");
        };
        assert_eq!(msg.msg_type, WsMessageType::Command);
        let Ok(WsCommand::Undo { event_id }) = serde_json::from_value(msg.payload) else {
            panic!("expected an undo command");
        };
        assert!(event_id.starts_with("temp-"));
    }

    #[test]
    fn feed_without_pets_parses() {
        let payload = serde_json::json!({ "command": "feed" });
        let Ok(WsCommand::Feed { pet_ids }) = serde_json::from_value(payload) else {
            panic!("expected a feed command");
        };
        assert!(pet_ids.is_none());
    }

    #[test]
    fn sync_error_reply_carries_code() {
        let msg = WsMessage::from_sync_error("c2".to_string(), &SyncError::StillSyncing);
        assert_eq!(msg.msg_type, WsMessageType::Error);
        assert_eq!(msg.payload["code"], 2001);
        assert_eq!(msg.payload["retryable"], true);
    }
}
