//! The message log: the ordered, deduplicated, mutable record of the
//! conversation.
//!
//! Arrival order (for remote messages) or creation order (for local ones)
//! defines display order; the log never re-sorts by timestamp. Every
//! mutating operation is idempotent so reordered or duplicated events from
//! the relay are absorbed without special casing at the call sites.

use serde::Serialize;
use tracing::debug;

use causerie_shared::protocol::MessageRecord;
use causerie_shared::types::{ClientId, DeliveryStatus, FilePayload, MessageId};

/// What a message carries: plain text or an encoded file.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub enum MessageBody {
    Text(String),
    File(FilePayload),
}

/// A single entry in the message log.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub client_id: ClientId,
    pub display_name: String,
    /// Pre-formatted display timestamp carried on the wire.
    pub time: String,
    pub body: MessageBody,
    pub status: DeliveryStatus,
}

impl From<MessageRecord> for ChatMessage {
    fn from(record: MessageRecord) -> Self {
        let body = match record.file {
            Some(data) => MessageBody::File(FilePayload {
                data,
                mime_type: record.file_type.unwrap_or_default(),
                file_name: record.file_name,
            }),
            None => MessageBody::Text(record.message.unwrap_or_default()),
        };
        Self {
            id: record.id,
            client_id: record.client_id,
            display_name: record.username,
            time: record.time,
            body,
            status: record.status,
        }
    }
}

/// Append-ordered message log.
#[derive(Debug, Default)]
pub struct MessageLog {
    entries: Vec<ChatMessage>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Append a message if its id is new.
    ///
    /// A duplicate id leaves the existing entry's body and attribution
    /// untouched; only receipts and deletes may update an entry after
    /// creation. Returns `true` if an entry was added.
    pub fn append(&mut self, message: ChatMessage) -> bool {
        if self.position(message.id).is_some() {
            debug!(id = %message.id, "Duplicate message id, keeping existing entry");
            return false;
        }
        self.entries.push(message);
        true
    }

    /// Advance a message's status.
    ///
    /// Only strictly forward moves along `Sent < Delivered < Seen` apply;
    /// anything else, including receipts for unknown ids, is a no-op.
    /// Returns `true` if the status changed.
    pub fn apply_status(&mut self, id: MessageId, status: DeliveryStatus) -> bool {
        let Some(idx) = self.position(id) else {
            debug!(id = %id, status = ?status, "Receipt for unknown message id");
            return false;
        };
        let entry = &mut self.entries[idx];
        if status <= entry.status {
            return false;
        }
        entry.status = status;
        true
    }

    /// Remove a message. Removing an absent id is a no-op.
    pub fn remove(&mut self, id: MessageId) -> bool {
        match self.position(id) {
            Some(idx) => {
                self.entries.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: MessageId) -> Option<&ChatMessage> {
        self.position(id).map(|idx| &self.entries[idx])
    }

    /// All messages in display order.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, id: MessageId) -> Option<usize> {
        self.entries.iter().position(|m| m.id == id)
    }
}
