//! Receipt coordination: deriving delivered/seen signals for messages from
//! other participants.
//!
//! Receipts are one-way; nothing acknowledges a receipt. If one is lost the
//! sender's status simply never advances — an accepted degradation. The
//! bookkeeping here keeps emission to once per message id per session; the
//! receiving side's status application is idempotent anyway, so at-least-once
//! on the wire is harmless.

use std::collections::HashSet;

use causerie_shared::identity::SessionIdentity;
use causerie_shared::protocol::WireEvent;
use causerie_shared::types::{DeliveryStatus, MessageId};

use crate::log::MessageLog;

/// Derives receipt events for inbound messages.
#[derive(Debug, Default)]
pub struct ReceiptCoordinator {
    delivered_sent: HashSet<MessageId>,
    seen_sent: HashSet<MessageId>,
}

impl ReceiptCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receipt to emit for a freshly appended remote message, if it has not
    /// been acknowledged yet this session.
    pub fn on_remote_append(&mut self, id: MessageId) -> Option<WireEvent> {
        self.delivered_sent
            .insert(id)
            .then_some(WireEvent::Delivered { id })
    }

    /// Receipts for every not-yet-seen message from another participant.
    ///
    /// Called after each dispatch that grew the log. The view a user
    /// observes is the log itself, so "rendered and seen" collapses to
    /// "present in the log". Entries already at `Seen` need no receipt.
    pub fn collect_seen(
        &mut self,
        log: &MessageLog,
        identity: &SessionIdentity,
    ) -> Vec<WireEvent> {
        let mut receipts = Vec::new();
        for message in log.messages() {
            if identity.is_self(&message.client_id) {
                continue;
            }
            if message.status == DeliveryStatus::Seen {
                continue;
            }
            if self.seen_sent.insert(message.id) {
                receipts.push(WireEvent::Seen { id: message.id });
            }
        }
        receipts
    }

    /// Forget a removed message so a fresh append of the same id would be
    /// acknowledged again.
    pub fn on_remove(&mut self, id: MessageId) {
        self.delivered_sent.remove(&id);
        self.seen_sent.remove(&id);
    }
}
