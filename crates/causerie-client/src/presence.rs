//! Presence count and the ephemeral typing indicator.
//!
//! The presence count is fully owned by the relay's `users` events; the
//! client never counts locally. The typing indicator is a single slot (last
//! typist wins) armed with an expiry deadline; the engine loop schedules a
//! sleep on that deadline and calls [`PresenceTracker::clear_expired`] when
//! it fires.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use causerie_shared::constants::TYPING_EXPIRY;
use causerie_shared::types::ClientId;

/// The "who is typing" indicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingIndicator {
    pub display_name: String,
    pub expires_at: Instant,
}

/// Tracks the relay's presence count and the typing indicator.
#[derive(Debug)]
pub struct PresenceTracker {
    online: u32,
    typing: Option<TypingIndicator>,
    typing_ttl: Duration,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::with_typing_ttl(TYPING_EXPIRY)
    }

    /// Tracker with a custom typing quiet window.
    pub fn with_typing_ttl(ttl: Duration) -> Self {
        Self {
            online: 0,
            typing: None,
            typing_ttl: ttl,
        }
    }

    /// Overwrite the online count with the relay's latest figure.
    pub fn set_online_count(&mut self, count: u32) {
        self.online = count;
    }

    pub fn online_count(&self) -> u32 {
        self.online
    }

    /// Record a typing pulse.
    ///
    /// A pulse echoing our own `client_id` is ignored — a sender never sees
    /// its own typing indicator. Any other pulse takes over the slot and
    /// re-arms the expiry deadline. Returns `true` if the indicator changed.
    pub fn note_typing(
        &mut self,
        display_name: &str,
        self_client_id: &ClientId,
        event_client_id: &ClientId,
        now: Instant,
    ) -> bool {
        if event_client_id == self_client_id {
            return false;
        }
        self.typing = Some(TypingIndicator {
            display_name: display_name.to_string(),
            expires_at: now + self.typing_ttl,
        });
        true
    }

    /// The armed expiry deadline, if an indicator is showing.
    pub fn typing_deadline(&self) -> Option<Instant> {
        self.typing.as_ref().map(|t| t.expires_at)
    }

    /// Name currently shown as typing, if any.
    pub fn typing_name(&self) -> Option<&str> {
        self.typing.as_ref().map(|t| t.display_name.as_str())
    }

    /// Clear the indicator if its deadline has passed.
    ///
    /// Idempotent: a pulse that re-armed the deadline in the meantime keeps
    /// the indicator alive, and clearing an empty slot does nothing. Returns
    /// `true` if the indicator was cleared.
    pub fn clear_expired(&mut self, now: Instant) -> bool {
        match &self.typing {
            Some(t) if now >= t.expires_at => {
                debug!(name = %t.display_name, "Typing indicator expired");
                self.typing = None;
                true
            }
            _ => false,
        }
    }

    /// Drop the indicator unconditionally (session teardown).
    pub fn clear_typing(&mut self) {
        self.typing = None;
    }
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new()
    }
}
