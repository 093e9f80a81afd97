use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque per-session client identifier.
///
/// Generated once when a session starts and never changed afterwards; the
/// sole basis for attributing messages and typing events as own vs other.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ClientId(pub String);

impl ClientId {
    /// Generate a fresh random id (UUID v4, best-effort unique).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message identifier, assigned by the sender at compose time
/// (epoch milliseconds, monotonic per sender).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub i64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Delivery status of a message.
///
/// Advances only forward along `Sent < Delivered < Seen`; the variant order
/// here drives that comparison.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Delivered,
    Seen,
}

/// A file attachment as carried on the wire: a self-describing
/// `data:<mime>;base64,<payload>` blob plus its metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilePayload {
    pub data: String,
    pub mime_type: String,
    pub file_name: Option<String>,
}
