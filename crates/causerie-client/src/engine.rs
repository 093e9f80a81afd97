//! The chat engine: single-threaded dispatch of wire events onto the
//! message log, presence tracker, and receipt coordinator, plus the run
//! loop bridging a channel session to a presentation layer.
//!
//! All inbound events are processed one at a time, in receipt order, inside
//! one task; mutating operations are fast and non-blocking, so no locks are
//! needed. The only other timeline is the typing expiry deadline, whose
//! firing performs a single idempotent clear.

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use causerie_net::{ChannelSession, SessionNotification, SessionState};
use causerie_shared::constants::ENGINE_CHANNEL_CAPACITY;
use causerie_shared::error::ValidationError;
use causerie_shared::identity::SessionIdentity;
use causerie_shared::protocol::WireEvent;
use causerie_shared::types::{DeliveryStatus, FilePayload, MessageId};

use crate::compose;
use crate::log::{ChatMessage, MessageBody, MessageLog};
use crate::presence::PresenceTracker;
use crate::receipts::ReceiptCoordinator;

// ---------------------------------------------------------------------------
// Commands / notifications
// ---------------------------------------------------------------------------

/// Local user actions fed into the run loop.
#[derive(Debug)]
pub enum EngineCommand {
    SendText(String),
    SendFile {
        bytes: Vec<u8>,
        mime_type: String,
        file_name: Option<String>,
    },
    /// Typing pulse; callers fire this on every input change.
    PulseTyping,
    DeleteMessage(MessageId),
    Shutdown,
}

/// State changes a presentation layer observes and renders.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub enum EngineNotification {
    MessageAppended(MessageId),
    StatusChanged {
        id: MessageId,
        status: DeliveryStatus,
    },
    MessageRemoved(MessageId),
    HistoryLoaded {
        count: usize,
    },
    OnlineCount(u32),
    TypingStarted(String),
    TypingCleared,
    ConnectionChanged(SessionState),
    /// A compose was rejected locally; nothing went on the wire.
    ValidationFailed(String),
    /// A composed event could not be handed to the session.
    SendFailed(String),
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The message synchronization state machine.
///
/// Owns the log, presence tracker, and receipt coordinator. Inbound events
/// go through [`ChatEngine::handle_event`]; local actions compose an event,
/// apply it optimistically, and return it for sending. Receipts produced as
/// side effects are queued on an outbox the run loop drains after each
/// dispatch.
#[derive(Debug)]
pub struct ChatEngine {
    identity: SessionIdentity,
    log: MessageLog,
    presence: PresenceTracker,
    receipts: ReceiptCoordinator,
    outbox: Vec<WireEvent>,
}

impl ChatEngine {
    pub fn new(identity: SessionIdentity) -> Self {
        Self {
            identity,
            log: MessageLog::new(),
            presence: PresenceTracker::new(),
            receipts: ReceiptCoordinator::new(),
            outbox: Vec::new(),
        }
    }

    /// Engine with a custom typing quiet window.
    pub fn with_typing_ttl(identity: SessionIdentity, ttl: std::time::Duration) -> Self {
        Self {
            presence: PresenceTracker::with_typing_ttl(ttl),
            ..Self::new(identity)
        }
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    /// Dispatch one inbound event.
    ///
    /// Returns the notifications the presentation layer should observe;
    /// receipts derived from the event are queued for [`Self::drain_outbox`].
    pub fn handle_event(&mut self, event: WireEvent, now: Instant) -> Vec<EngineNotification> {
        let mut notes = Vec::new();

        match event {
            WireEvent::Join {
                username,
                client_id,
            } => {
                // The relay folds joins into `users` updates; nothing to
                // track beyond the log line.
                debug!(username = %username, client_id = %client_id, "Participant joined");
            }

            WireEvent::Message {
                id,
                client_id,
                username,
                message,
                time,
                status,
            } => {
                let entry = ChatMessage {
                    id,
                    client_id,
                    display_name: username,
                    time,
                    body: MessageBody::Text(message),
                    status,
                };
                self.ingest(entry, true, &mut notes);
            }

            WireEvent::File {
                id,
                client_id,
                username,
                file,
                file_type,
                file_name,
                time,
                status,
            } => {
                let entry = ChatMessage {
                    id,
                    client_id,
                    display_name: username,
                    time,
                    body: MessageBody::File(FilePayload {
                        data: file,
                        mime_type: file_type,
                        file_name,
                    }),
                    status,
                };
                self.ingest(entry, true, &mut notes);
            }

            WireEvent::Typing {
                username,
                client_id,
            } => {
                if self
                    .presence
                    .note_typing(&username, &self.identity.client_id, &client_id, now)
                {
                    notes.push(EngineNotification::TypingStarted(username));
                }
            }

            WireEvent::Delivered { id } => {
                if self.log.apply_status(id, DeliveryStatus::Delivered) {
                    notes.push(EngineNotification::StatusChanged {
                        id,
                        status: DeliveryStatus::Delivered,
                    });
                }
            }

            WireEvent::Seen { id } => {
                if self.log.apply_status(id, DeliveryStatus::Seen) {
                    notes.push(EngineNotification::StatusChanged {
                        id,
                        status: DeliveryStatus::Seen,
                    });
                }
            }

            WireEvent::Delete { id } => {
                if self.log.remove(id) {
                    self.receipts.on_remove(id);
                    notes.push(EngineNotification::MessageRemoved(id));
                }
            }

            WireEvent::Users { count } => {
                self.presence.set_online_count(count);
                notes.push(EngineNotification::OnlineCount(count));
            }

            WireEvent::History { messages } => {
                let mut added = 0;
                for record in messages {
                    if self.log.append(ChatMessage::from(record)) {
                        added += 1;
                    }
                }
                if added > 0 {
                    info!(count = added, "Seeded log from history");
                    notes.push(EngineNotification::HistoryLoaded { count: added });
                }
                // Seeded entries predate this session, so no delivered
                // receipts; seen receipts still apply to the new view.
                let seen = self.receipts.collect_seen(&self.log, &self.identity);
                self.outbox.extend(seen);
            }
        }

        notes
    }

    /// Receipts queued by the last dispatch, in emission order.
    pub fn drain_outbox(&mut self) -> Vec<WireEvent> {
        std::mem::take(&mut self.outbox)
    }

    /// Compose a text message and apply it optimistically (status `Sent`).
    ///
    /// Returns the event to put on the wire.
    pub fn send_text(&mut self, body: &str) -> Result<WireEvent, ValidationError> {
        let event = compose::text(
            &self.identity,
            body,
            compose::next_message_id(),
            compose::display_time(),
        )?;
        self.apply_own(&event);
        Ok(event)
    }

    /// Compose a file message and apply it optimistically (status `Sent`).
    pub fn send_file(
        &mut self,
        bytes: &[u8],
        mime_type: &str,
        file_name: Option<String>,
    ) -> Result<WireEvent, ValidationError> {
        let event = compose::file(
            &self.identity,
            bytes,
            mime_type,
            file_name,
            compose::next_message_id(),
            compose::display_time(),
        )?;
        self.apply_own(&event);
        Ok(event)
    }

    /// Typing pulse for the local participant.
    pub fn pulse_typing(&self) -> WireEvent {
        compose::typing(&self.identity)
    }

    /// Compose a delete and optimistically remove the local entry without
    /// waiting for the relay echo; the echo collapses into a no-op.
    pub fn delete_message(&mut self, id: MessageId) -> WireEvent {
        if self.log.remove(id) {
            self.receipts.on_remove(id);
        }
        compose::delete(id)
    }

    /// Clear the typing indicator if its deadline has passed.
    pub fn expire_typing(&mut self, now: Instant) -> bool {
        self.presence.clear_expired(now)
    }

    /// Cancel the typing indicator outright (session teardown).
    pub fn clear_typing(&mut self) {
        self.presence.clear_typing();
    }

    fn ingest(&mut self, entry: ChatMessage, live: bool, notes: &mut Vec<EngineNotification>) {
        let id = entry.id;
        let remote = !self.identity.is_self(&entry.client_id);

        if !self.log.append(entry) {
            // Duplicate or our own echo; already accounted for.
            return;
        }
        notes.push(EngineNotification::MessageAppended(id));

        if remote {
            if live {
                if let Some(receipt) = self.receipts.on_remote_append(id) {
                    self.outbox.push(receipt);
                }
            }
            let seen = self.receipts.collect_seen(&self.log, &self.identity);
            self.outbox.extend(seen);
        }
    }

    fn apply_own(&mut self, event: &WireEvent) {
        let entry = match event {
            WireEvent::Message {
                id,
                client_id,
                username,
                message,
                time,
                status,
            } => ChatMessage {
                id: *id,
                client_id: client_id.clone(),
                display_name: username.clone(),
                time: time.clone(),
                body: MessageBody::Text(message.clone()),
                status: *status,
            },
            WireEvent::File {
                id,
                client_id,
                username,
                file,
                file_type,
                file_name,
                time,
                status,
            } => ChatMessage {
                id: *id,
                client_id: client_id.clone(),
                display_name: username.clone(),
                time: time.clone(),
                body: MessageBody::File(FilePayload {
                    data: file.clone(),
                    mime_type: file_type.clone(),
                    file_name: file_name.clone(),
                }),
                status: *status,
            },
            _ => return,
        };
        self.log.append(entry);
    }
}

// ---------------------------------------------------------------------------
// Run loop
// ---------------------------------------------------------------------------

/// Drive a [`ChatEngine`] against a running channel session.
///
/// Spawns the cooperative event loop: inbound session notifications and
/// local commands are processed one at a time, receipts go through the
/// session's fail-fast `send`, and the typing expiry deadline is scheduled
/// between events. The loop ends when the session disconnects or a
/// [`EngineCommand::Shutdown`] arrives; teardown cancels the typing
/// deadline. The finished engine is returned for inspection.
pub fn run_engine(
    mut engine: ChatEngine,
    session: ChannelSession,
    mut session_rx: mpsc::Receiver<SessionNotification>,
    mut command_rx: mpsc::Receiver<EngineCommand>,
) -> (mpsc::Receiver<EngineNotification>, JoinHandle<ChatEngine>) {
    let (notif_tx, notif_rx) = mpsc::channel(ENGINE_CHANNEL_CAPACITY);

    let handle = tokio::spawn(async move {
        info!(client_id = %engine.identity().client_id, "Engine loop started");

        loop {
            let deadline = engine.presence().typing_deadline();

            tokio::select! {
                notification = session_rx.recv() => match notification {
                    Some(SessionNotification::Event(event)) => {
                        let notes = engine.handle_event(event, Instant::now());
                        flush_receipts(&mut engine, &session);
                        forward(&notif_tx, notes).await;
                    }
                    Some(SessionNotification::StateChanged(state)) => {
                        forward(
                            &notif_tx,
                            vec![EngineNotification::ConnectionChanged(state)],
                        )
                        .await;
                        if state == SessionState::Disconnected {
                            engine.clear_typing();
                            break;
                        }
                    }
                    None => {
                        engine.clear_typing();
                        break;
                    }
                },

                command = command_rx.recv() => match command {
                    Some(EngineCommand::Shutdown) | None => {
                        info!("Engine shutdown requested");
                        session.shutdown();
                        engine.clear_typing();
                        break;
                    }
                    Some(command) => {
                        let notes = handle_command(&mut engine, &session, command);
                        forward(&notif_tx, notes).await;
                    }
                },

                _ = typing_expiry(deadline) => {
                    if engine.expire_typing(Instant::now()) {
                        forward(&notif_tx, vec![EngineNotification::TypingCleared]).await;
                    }
                }
            }
        }

        info!("Engine loop terminated");
        engine
    });

    (notif_rx, handle)
}

/// Process one local command, returning the notifications it produced.
fn handle_command(
    engine: &mut ChatEngine,
    session: &ChannelSession,
    command: EngineCommand,
) -> Vec<EngineNotification> {
    let composed = match command {
        EngineCommand::SendText(text) => engine.send_text(&text),
        EngineCommand::SendFile {
            bytes,
            mime_type,
            file_name,
        } => engine.send_file(&bytes, &mime_type, file_name),
        EngineCommand::PulseTyping => Ok(engine.pulse_typing()),
        EngineCommand::DeleteMessage(id) => {
            let event = engine.delete_message(id);
            let mut notes = vec![EngineNotification::MessageRemoved(id)];
            notes.extend(deliver(session, event));
            return notes;
        }
        EngineCommand::Shutdown => unreachable!("handled by the run loop"),
    };

    match composed {
        Ok(event) => {
            let mut notes = Vec::new();
            if let Some(id) = event.message_id() {
                notes.push(EngineNotification::MessageAppended(id));
            }
            notes.extend(deliver(session, event));
            notes
        }
        Err(e) => {
            debug!(error = %e, "Compose rejected");
            vec![EngineNotification::ValidationFailed(e.to_string())]
        }
    }
}

/// Hand an event to the session, mapping failures to a notification.
fn deliver(session: &ChannelSession, event: WireEvent) -> Option<EngineNotification> {
    match session.send(event) {
        Ok(()) => None,
        Err(e) => {
            warn!(error = %e, "Send failed");
            Some(EngineNotification::SendFailed(e.to_string()))
        }
    }
}

/// Push queued receipts through the session.
///
/// Failures are logged and dropped: receipts are at-least-once signals with
/// no delivery guarantee of their own.
fn flush_receipts(engine: &mut ChatEngine, session: &ChannelSession) {
    for receipt in engine.drain_outbox() {
        if let Err(e) = session.send(receipt) {
            warn!(error = %e, "Dropping receipt");
        }
    }
}

async fn forward(notif_tx: &mpsc::Sender<EngineNotification>, notes: Vec<EngineNotification>) {
    for note in notes {
        let _ = notif_tx.send(note).await;
    }
}

async fn typing_expiry(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use futures::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    use causerie_net::SessionConfig;
    use causerie_shared::protocol::MessageRecord;
    use causerie_shared::types::ClientId;

    fn identity() -> SessionIdentity {
        SessionIdentity {
            client_id: ClientId("self".into()),
            display_name: "alice".into(),
        }
    }

    fn remote_text(id: i64, client_id: &str, body: &str) -> WireEvent {
        WireEvent::Message {
            id: MessageId(id),
            client_id: ClientId(client_id.into()),
            username: client_id.to_uppercase(),
            message: body.into(),
            time: "12:00".into(),
            status: DeliveryStatus::Sent,
        }
    }

    #[test]
    fn test_reordered_duplicate_receipts_settle_on_seen() {
        let mut engine = ChatEngine::new(identity());
        let now = Instant::now();

        engine.send_text("mine").unwrap();
        let id = engine.log().messages()[0].id;

        engine.handle_event(WireEvent::Delivered { id }, now);
        engine.handle_event(WireEvent::Seen { id }, now);
        let notes = engine.handle_event(WireEvent::Delivered { id }, now);

        assert!(notes.is_empty());
        assert_eq!(engine.log().get(id).unwrap().status, DeliveryStatus::Seen);
    }

    #[test]
    fn test_remote_message_emits_one_delivered_and_one_seen() {
        let mut engine = ChatEngine::new(identity());
        let now = Instant::now();

        let notes = engine.handle_event(remote_text(5, "b", "hello"), now);
        assert_eq!(
            notes,
            vec![EngineNotification::MessageAppended(MessageId(5))]
        );

        let outbox = engine.drain_outbox();
        assert_eq!(
            outbox,
            vec![
                WireEvent::Delivered { id: MessageId(5) },
                WireEvent::Seen { id: MessageId(5) },
            ]
        );

        // The same event again: no new entry, no new receipts
        let notes = engine.handle_event(remote_text(5, "b", "hello"), now);
        assert!(notes.is_empty());
        assert!(engine.drain_outbox().is_empty());
        assert_eq!(engine.log().len(), 1);
    }

    #[test]
    fn test_own_echo_produces_no_receipts() {
        let mut engine = ChatEngine::new(identity());
        let now = Instant::now();

        let event = engine.send_text("mine").unwrap();
        let notes = engine.handle_event(event, now);

        assert!(notes.is_empty());
        assert!(engine.drain_outbox().is_empty());
        assert_eq!(engine.log().len(), 1);
    }

    #[test]
    fn test_delete_for_unknown_id_changes_nothing() {
        let mut engine = ChatEngine::new(identity());
        let now = Instant::now();

        let notes = engine.handle_event(WireEvent::Delete { id: MessageId(9) }, now);
        assert!(notes.is_empty());
        assert!(engine.log().is_empty());
    }

    #[test]
    fn test_users_count_last_write_wins() {
        let mut engine = ChatEngine::new(identity());
        let now = Instant::now();

        engine.handle_event(WireEvent::Users { count: 7 }, now);
        engine.handle_event(WireEvent::Users { count: 3 }, now);
        assert_eq!(engine.presence().online_count(), 3);
    }

    #[test]
    fn test_own_typing_echo_is_filtered() {
        let mut engine = ChatEngine::new(identity());
        let now = Instant::now();

        let notes = engine.handle_event(
            WireEvent::Typing {
                username: "alice".into(),
                client_id: ClientId("self".into()),
            },
            now,
        );
        assert!(notes.is_empty());
        assert_eq!(engine.presence().typing_name(), None);

        let notes = engine.handle_event(
            WireEvent::Typing {
                username: "bob".into(),
                client_id: ClientId("b".into()),
            },
            now,
        );
        assert_eq!(notes, vec![EngineNotification::TypingStarted("bob".into())]);
        assert_eq!(engine.presence().typing_name(), Some("bob"));
    }

    #[test]
    fn test_history_seeds_without_delivered_receipts() {
        let mut engine = ChatEngine::new(identity());
        let now = Instant::now();

        let history = WireEvent::History {
            messages: vec![
                MessageRecord {
                    id: MessageId(1),
                    client_id: ClientId("b".into()),
                    username: "bob".into(),
                    message: Some("old".into()),
                    file: None,
                    file_type: None,
                    file_name: None,
                    time: "09:00".into(),
                    status: DeliveryStatus::Delivered,
                },
                MessageRecord {
                    id: MessageId(2),
                    client_id: ClientId("self".into()),
                    username: "alice".into(),
                    message: Some("older".into()),
                    file: None,
                    file_type: None,
                    file_name: None,
                    time: "09:01".into(),
                    status: DeliveryStatus::Seen,
                },
            ],
        };

        let notes = engine.handle_event(history, now);
        assert_eq!(notes, vec![EngineNotification::HistoryLoaded { count: 2 }]);

        // Only a seen receipt for the remote, not-yet-seen entry
        assert_eq!(
            engine.drain_outbox(),
            vec![WireEvent::Seen { id: MessageId(1) }]
        );

        // A live duplicate of a seeded message is absorbed
        let notes = engine.handle_event(remote_text(1, "b", "old"), now);
        assert!(notes.is_empty());
        assert_eq!(engine.log().len(), 2);
    }

    #[test]
    fn test_send_text_applies_optimistically() {
        let mut engine = ChatEngine::new(identity());

        let event = engine.send_text("salut").unwrap();
        assert_eq!(event.tag(), "message");
        assert_eq!(engine.log().len(), 1);

        let entry = &engine.log().messages()[0];
        assert_eq!(entry.status, DeliveryStatus::Sent);
        assert_eq!(entry.client_id, ClientId("self".into()));

        assert!(matches!(
            engine.send_text("   "),
            Err(ValidationError::EmptyMessage)
        ));
        assert_eq!(engine.log().len(), 1);
    }

    #[test]
    fn test_optimistic_delete_absorbs_the_echo() {
        let mut engine = ChatEngine::new(identity());
        let now = Instant::now();

        engine.handle_event(remote_text(4, "b", "soon gone"), now);
        engine.drain_outbox();

        let event = engine.delete_message(MessageId(4));
        assert_eq!(event, WireEvent::Delete { id: MessageId(4) });
        assert!(engine.log().is_empty());

        // The relay echoes the delete back: nothing further happens
        let notes = engine.handle_event(WireEvent::Delete { id: MessageId(4) }, now);
        assert!(notes.is_empty());
    }

    #[test]
    fn test_typing_expires_via_deadline() {
        let mut engine = ChatEngine::with_typing_ttl(identity(), Duration::ZERO);
        let now = Instant::now();

        engine.handle_event(
            WireEvent::Typing {
                username: "bob".into(),
                client_id: ClientId("b".into()),
            },
            now,
        );
        assert!(engine.presence().typing_deadline().is_some());

        assert!(engine.expire_typing(now));
        assert_eq!(engine.presence().typing_name(), None);
        assert!(engine.presence().typing_deadline().is_none());

        // Firing again is idempotent
        assert!(!engine.expire_typing(now));
    }

    // -- run loop ----------------------------------------------------------

    /// Relay stub for run-loop tests: accepts one connection, pushes the
    /// given frames after the client's join arrives, then records every
    /// frame it receives until the socket closes.
    async fn relay_stub(
        push: Vec<String>,
    ) -> (String, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let mut received = Vec::new();

            // First frame is always the join handshake
            if let Some(Ok(WsMessage::Text(text))) = ws.next().await {
                received.push(text);
            }

            for frame in push {
                ws.send(WsMessage::Text(frame)).await.unwrap();
            }

            while let Some(Ok(msg)) = ws.next().await {
                match msg {
                    WsMessage::Text(text) => received.push(text),
                    WsMessage::Close(_) => break,
                    _ => {}
                }
            }
            received
        });

        (format!("ws://{addr}"), handle)
    }

    async fn next_matching<F>(
        notif_rx: &mut mpsc::Receiver<EngineNotification>,
        mut predicate: F,
    ) -> EngineNotification
    where
        F: FnMut(&EngineNotification) -> bool,
    {
        loop {
            let note = notif_rx.recv().await.expect("engine loop ended early");
            if predicate(&note) {
                return note;
            }
        }
    }

    #[tokio::test]
    async fn test_run_loop_acks_inbound_and_sends_local_messages() {
        let push = vec![
            r#"{"type":"users","count":2}"#.to_string(),
            r#"{"type":"message","id":5,"clientId":"b","username":"bob","message":"hi","time":"10:00","status":"sent"}"#
                .to_string(),
        ];
        let (url, relay) = relay_stub(push).await;

        let (session, session_rx) =
            ChannelSession::connect(SessionConfig::new(url), identity());
        let (command_tx, command_rx) = mpsc::channel(16);
        let (mut notif_rx, handle) =
            run_engine(ChatEngine::new(identity()), session, session_rx, command_rx);

        next_matching(&mut notif_rx, |n| {
            matches!(n, EngineNotification::MessageAppended(MessageId(5)))
        })
        .await;

        command_tx
            .send(EngineCommand::SendText("hello back".into()))
            .await
            .unwrap();
        next_matching(&mut notif_rx, |n| {
            matches!(n, EngineNotification::MessageAppended(_))
        })
        .await;

        command_tx.send(EngineCommand::Shutdown).await.unwrap();
        let engine = handle.await.unwrap();

        assert_eq!(engine.log().len(), 2);
        assert_eq!(engine.presence().online_count(), 2);

        let frames = relay.await.unwrap();
        assert!(frames[0].contains("\"type\":\"join\""));
        assert!(frames.iter().any(|f| f.contains("\"type\":\"delivered\"") && f.contains("\"id\":5")));
        assert!(frames.iter().any(|f| f.contains("\"type\":\"seen\"") && f.contains("\"id\":5")));
        assert!(frames.iter().any(|f| f.contains("\"type\":\"message\"") && f.contains("hello back")));
    }

    #[tokio::test]
    async fn test_run_loop_clears_typing_after_quiet_window() {
        let push = vec![r#"{"type":"typing","username":"bob","clientId":"b"}"#.to_string()];
        let (url, _relay) = relay_stub(push).await;

        let engine = ChatEngine::with_typing_ttl(identity(), Duration::from_millis(40));
        let (session, session_rx) =
            ChannelSession::connect(SessionConfig::new(url), identity());
        let (command_tx, command_rx) = mpsc::channel(16);
        let (mut notif_rx, handle) = run_engine(engine, session, session_rx, command_rx);

        next_matching(&mut notif_rx, |n| {
            matches!(n, EngineNotification::TypingStarted(_))
        })
        .await;
        next_matching(&mut notif_rx, |n| {
            matches!(n, EngineNotification::TypingCleared)
        })
        .await;

        command_tx.send(EngineCommand::Shutdown).await.unwrap();
        let engine = handle.await.unwrap();
        assert_eq!(engine.presence().typing_name(), None);
    }

    #[tokio::test]
    async fn test_run_loop_reports_validation_failures() {
        let (url, _relay) = relay_stub(Vec::new()).await;

        let (session, session_rx) =
            ChannelSession::connect(SessionConfig::new(url), identity());
        let (command_tx, command_rx) = mpsc::channel(16);
        let (mut notif_rx, handle) =
            run_engine(ChatEngine::new(identity()), session, session_rx, command_rx);

        command_tx
            .send(EngineCommand::SendText("   ".into()))
            .await
            .unwrap();
        let note = next_matching(&mut notif_rx, |n| {
            matches!(n, EngineNotification::ValidationFailed(_))
        })
        .await;
        assert_eq!(
            note,
            EngineNotification::ValidationFailed("Message text is empty".into())
        );

        command_tx.send(EngineCommand::Shutdown).await.unwrap();
        let engine = handle.await.unwrap();
        assert!(engine.log().is_empty());
    }

    #[tokio::test]
    async fn test_run_loop_ends_when_relay_disconnects() {
        // A relay that drops the connection right after the handshake
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let _ = ws.next().await;
            let _ = ws.close(None).await;
        });

        let (session, session_rx) = ChannelSession::connect(
            SessionConfig::new(format!("ws://{addr}")),
            identity(),
        );
        let (_command_tx, command_rx) = mpsc::channel(16);
        let (mut notif_rx, handle) =
            run_engine(ChatEngine::new(identity()), session, session_rx, command_rx);

        next_matching(&mut notif_rx, |n| {
            matches!(
                n,
                EngineNotification::ConnectionChanged(SessionState::Disconnected)
            )
        })
        .await;

        handle.await.unwrap();
    }
}
