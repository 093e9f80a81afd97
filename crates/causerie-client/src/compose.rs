//! Building well-formed outbound events from local user actions.
//!
//! Everything here validates locally and never touches the network; the
//! engine pairs the composed events with optimistic local state updates and
//! hands them to the channel session.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{Local, Utc};

use causerie_shared::constants::MAX_FILE_BYTES;
use causerie_shared::error::ValidationError;
use causerie_shared::identity::SessionIdentity;
use causerie_shared::protocol::WireEvent;
use causerie_shared::types::{DeliveryStatus, MessageId};

/// Fresh message id: epoch milliseconds at compose time.
///
/// Monotonic per sender and best-effort unique across participants,
/// mirroring the caller-assigned timestamp scheme of the wire contract.
pub fn next_message_id() -> MessageId {
    MessageId(Utc::now().timestamp_millis())
}

/// Display timestamp carried on the wire (`HH:MM` local time).
pub fn display_time() -> String {
    Local::now().format("%H:%M").to_string()
}

pub fn join(identity: &SessionIdentity) -> WireEvent {
    WireEvent::Join {
        username: identity.display_name.clone(),
        client_id: identity.client_id.clone(),
    }
}

/// Compose a text message event.
///
/// Empty or whitespace-only text is rejected before any send.
pub fn text(
    identity: &SessionIdentity,
    body: &str,
    id: MessageId,
    time: String,
) -> Result<WireEvent, ValidationError> {
    if body.trim().is_empty() {
        return Err(ValidationError::EmptyMessage);
    }
    Ok(WireEvent::Message {
        id,
        client_id: identity.client_id.clone(),
        username: identity.display_name.clone(),
        message: body.to_string(),
        time,
        status: DeliveryStatus::Sent,
    })
}

/// Compose a file message event.
///
/// The raw payload is size-checked before encoding; an oversized file is a
/// local validation error with no partial transmission. The accepted
/// payload is wrapped in a self-describing `data:<mime>;base64,...` blob.
pub fn file(
    identity: &SessionIdentity,
    bytes: &[u8],
    mime_type: &str,
    file_name: Option<String>,
    id: MessageId,
    time: String,
) -> Result<WireEvent, ValidationError> {
    if bytes.len() > MAX_FILE_BYTES {
        return Err(ValidationError::FileTooLarge {
            size: bytes.len(),
            max: MAX_FILE_BYTES,
        });
    }
    let data = format!("data:{mime_type};base64,{}", BASE64.encode(bytes));
    Ok(WireEvent::File {
        id,
        client_id: identity.client_id.clone(),
        username: identity.display_name.clone(),
        file: data,
        file_type: mime_type.to_string(),
        file_name,
        time,
        status: DeliveryStatus::Sent,
    })
}

/// Typing pulse, fired on every local input change.
///
/// No local debounce: rate limiting, if any, is the relay's responsibility.
pub fn typing(identity: &SessionIdentity) -> WireEvent {
    WireEvent::Typing {
        username: identity.display_name.clone(),
        client_id: identity.client_id.clone(),
    }
}

pub fn delete(id: MessageId) -> WireEvent {
    WireEvent::Delete { id }
}
