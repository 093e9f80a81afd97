//! The wire protocol: tagged JSON events exchanged with the relay.
//!
//! One event per WebSocket text frame, discriminated by a `type` field.
//! Decoding is defensive: malformed frames are an error the caller logs and
//! drops, while well-formed frames with an unknown `type` are silently
//! skipped so newer relays can add event types without breaking us.

use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::types::{ClientId, DeliveryStatus, MessageId};

/// All wire protocol events exchanged with the relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireEvent {
    /// Announce presence after the socket opens
    #[serde(rename_all = "camelCase")]
    Join {
        username: String,
        client_id: ClientId,
    },

    /// A text chat message
    #[serde(rename_all = "camelCase")]
    Message {
        id: MessageId,
        client_id: ClientId,
        username: String,
        message: String,
        time: String,
        status: DeliveryStatus,
    },

    /// A file chat message; `file` is a `data:<mime>;base64,...` blob
    #[serde(rename_all = "camelCase")]
    File {
        id: MessageId,
        client_id: ClientId,
        username: String,
        file: String,
        file_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_name: Option<String>,
        time: String,
        status: DeliveryStatus,
    },

    /// Typing pulse; has no explicit "stopped" counterpart
    #[serde(rename_all = "camelCase")]
    Typing {
        username: String,
        client_id: ClientId,
    },

    /// Receipt advancing a message to Delivered
    Delivered { id: MessageId },

    /// Receipt advancing a message to Seen
    Seen { id: MessageId },

    /// Remove a message for all participants
    Delete { id: MessageId },

    /// Presence count overwrite from the relay
    Users { count: u32 },

    /// Bulk log seed sent by the relay on join
    History { messages: Vec<MessageRecord> },
}

/// A stored message as carried inside a `history` event.
///
/// Text and file messages share one record shape; the file fields are
/// absent on text records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: MessageId,
    pub client_id: ClientId,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub time: String,
    pub status: DeliveryStatus,
}

/// Event type tags this client understands.
const KNOWN_TYPES: &[&str] = &[
    "join",
    "message",
    "file",
    "typing",
    "delivered",
    "seen",
    "delete",
    "users",
    "history",
];

impl WireEvent {
    /// Serialize to a JSON frame.
    pub fn encode(&self) -> Result<String, ParseError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a JSON frame.
    ///
    /// Returns `Ok(None)` for a well-formed frame whose `type` tag is not
    /// one we understand.
    pub fn decode(frame: &str) -> Result<Option<Self>, ParseError> {
        let value: serde_json::Value = serde_json::from_str(frame)?;
        let tag = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or(ParseError::MissingType)?;
        if !KNOWN_TYPES.contains(&tag) {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }

    /// The wire `type` tag of this event.
    pub fn tag(&self) -> &'static str {
        match self {
            WireEvent::Join { .. } => "join",
            WireEvent::Message { .. } => "message",
            WireEvent::File { .. } => "file",
            WireEvent::Typing { .. } => "typing",
            WireEvent::Delivered { .. } => "delivered",
            WireEvent::Seen { .. } => "seen",
            WireEvent::Delete { .. } => "delete",
            WireEvent::Users { .. } => "users",
            WireEvent::History { .. } => "history",
        }
    }

    /// The message id an event addresses, when it has one.
    pub fn message_id(&self) -> Option<MessageId> {
        match self {
            WireEvent::Message { id, .. }
            | WireEvent::File { id, .. }
            | WireEvent::Delivered { id }
            | WireEvent::Seen { id }
            | WireEvent::Delete { id } => Some(*id),
            _ => None,
        }
    }
}
