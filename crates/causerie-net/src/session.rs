//! The channel session: owner of the single WebSocket connection.
//!
//! The session runs in a dedicated tokio task. External code talks to it
//! through a fail-fast [`ChannelSession::send`] handle and receives decoded
//! inbound events on a notification channel, keeping the networking layer
//! fully asynchronous and decoupled from the engine.

use anyhow::Context;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use causerie_shared::constants::{COMMAND_CHANNEL_CAPACITY, NOTIFICATION_CHANNEL_CAPACITY};
use causerie_shared::error::SessionError;
use causerie_shared::identity::SessionIdentity;
use causerie_shared::protocol::WireEvent;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ---------------------------------------------------------------------------
// Command / notification types
// ---------------------------------------------------------------------------

/// Lifecycle of a channel session.
///
/// `Disconnected` is terminal: a session instance never reconnects.
/// Construct a new one to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Connecting,
    Connected,
    Disconnected,
}

/// Commands sent *into* the session task.
#[derive(Debug)]
enum SessionCommand {
    /// Put an event on the wire.
    Send(WireEvent),
    /// Close the connection and end the task.
    Shutdown,
}

/// Notifications sent *from* the session task.
#[derive(Debug, Clone)]
pub enum SessionNotification {
    /// A decoded inbound event.
    Event(WireEvent),
    /// The session changed state.
    StateChanged(SessionState),
}

/// Configuration for opening a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WebSocket URL of the relay (e.g. `wss://relay.example/ws`).
    pub url: String,
    /// Capacity of the outbound command channel.
    pub command_capacity: usize,
    /// Capacity of the inbound notification channel.
    pub notification_capacity: usize,
}

impl SessionConfig {
    /// Config for `url` with default channel capacities.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            command_capacity: COMMAND_CHANNEL_CAPACITY,
            notification_capacity: NOTIFICATION_CHANNEL_CAPACITY,
        }
    }
}

// ---------------------------------------------------------------------------
// Session handle
// ---------------------------------------------------------------------------

/// Handle to a running channel session.
#[derive(Debug)]
pub struct ChannelSession {
    cmd_tx: mpsc::Sender<SessionCommand>,
    state_rx: watch::Receiver<SessionState>,
}

impl ChannelSession {
    /// Open a session to the relay.
    ///
    /// Returns immediately with the handle (state `Connecting`) and the
    /// notification receiver; the connection is established in a background
    /// task. `Connected` is reported only after the socket is open and the
    /// `join` event for `identity` has been sent.
    pub fn connect(
        config: SessionConfig,
        identity: SessionIdentity,
    ) -> (Self, mpsc::Receiver<SessionNotification>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_capacity);
        let (notif_tx, notif_rx) = mpsc::channel(config.notification_capacity);
        let (state_tx, state_rx) = watch::channel(SessionState::Connecting);

        tokio::spawn(session_task(config, identity, cmd_rx, notif_tx, state_tx));

        (Self { cmd_tx, state_rx }, notif_rx)
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Queue an event for sending.
    ///
    /// Fails fast and never blocks: `NotConnected` while the session is not
    /// in `Connected`, `SendQueueFull` when the outbound queue has no room.
    /// Callers must not assume buffering across states.
    pub fn send(&self, event: WireEvent) -> Result<(), SessionError> {
        if self.state() != SessionState::Connected {
            return Err(SessionError::NotConnected);
        }
        self.cmd_tx
            .try_send(SessionCommand::Send(event))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => SessionError::SendQueueFull,
                mpsc::error::TrySendError::Closed(_) => SessionError::NotConnected,
            })
    }

    /// Close the connection and end the session task.
    pub fn shutdown(&self) {
        let _ = self.cmd_tx.try_send(SessionCommand::Shutdown);
    }
}

// ---------------------------------------------------------------------------
// Session task
// ---------------------------------------------------------------------------

async fn session_task(
    config: SessionConfig,
    identity: SessionIdentity,
    mut cmd_rx: mpsc::Receiver<SessionCommand>,
    notif_tx: mpsc::Sender<SessionNotification>,
    state_tx: watch::Sender<SessionState>,
) {
    let ws = match establish(&config, &identity).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(url = %config.url, error = %e, "Session establishment failed");
            set_state(&state_tx, &notif_tx, SessionState::Disconnected).await;
            return;
        }
    };

    info!(url = %config.url, client_id = %identity.client_id, "Session connected");
    set_state(&state_tx, &notif_tx, SessionState::Connected).await;

    let (mut ws_tx, mut ws_rx) = ws.split();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                if !handle_command(cmd, &mut ws_tx).await {
                    break;
                }
            }

            frame = ws_rx.next() => {
                if !handle_frame(frame, &notif_tx).await {
                    break;
                }
            }
        }
    }

    set_state(&state_tx, &notif_tx, SessionState::Disconnected).await;
    info!("Session task terminated");
}

/// Connect the socket and announce presence.
async fn establish(config: &SessionConfig, identity: &SessionIdentity) -> anyhow::Result<WsStream> {
    let (mut ws, _) = connect_async(&config.url)
        .await
        .with_context(|| format!("failed to connect to {}", config.url))?;

    let join = WireEvent::Join {
        username: identity.display_name.clone(),
        client_id: identity.client_id.clone(),
    };
    let frame = join.encode().context("failed to encode join event")?;
    ws.send(WsMessage::Text(frame))
        .await
        .context("failed to send join event")?;

    Ok(ws)
}

/// Process one command. Returns `false` when the session should end.
async fn handle_command(
    cmd: Option<SessionCommand>,
    ws_tx: &mut SplitSink<WsStream, WsMessage>,
) -> bool {
    match cmd {
        Some(SessionCommand::Send(event)) => {
            let frame = match event.encode() {
                Ok(f) => f,
                Err(e) => {
                    warn!(event = event.tag(), error = %e, "Failed to encode outbound event");
                    return true;
                }
            };
            debug!(event = event.tag(), len = frame.len(), "Sending frame");
            if let Err(e) = ws_tx.send(WsMessage::Text(frame)).await {
                warn!(error = %e, "Send failed, closing session");
                return false;
            }
            true
        }
        Some(SessionCommand::Shutdown) => {
            info!("Session shutdown requested");
            let _ = ws_tx.close().await;
            false
        }
        None => {
            // All handles dropped
            debug!("Command channel closed, ending session");
            let _ = ws_tx.close().await;
            false
        }
    }
}

/// Process one inbound frame. Returns `false` when the session should end.
async fn handle_frame(
    frame: Option<Result<WsMessage, tokio_tungstenite::tungstenite::Error>>,
    notif_tx: &mpsc::Sender<SessionNotification>,
) -> bool {
    match frame {
        Some(Ok(WsMessage::Text(text))) => {
            match WireEvent::decode(&text) {
                Ok(Some(event)) => {
                    debug!(event = event.tag(), "Inbound event");
                    if notif_tx
                        .send(SessionNotification::Event(event))
                        .await
                        .is_err()
                    {
                        // Receiver gone; nobody is listening anymore
                        return false;
                    }
                }
                Ok(None) => debug!(frame = %text, "Ignoring unrecognized event type"),
                Err(e) => warn!(error = %e, "Dropping malformed frame"),
            }
            true
        }
        Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => true,
        Some(Ok(WsMessage::Close(_))) => {
            info!("Relay closed the connection");
            false
        }
        Some(Ok(other)) => {
            debug!(len = other.len(), "Ignoring non-text frame");
            true
        }
        Some(Err(e)) => {
            warn!(error = %e, "Transport error");
            false
        }
        None => {
            info!("Connection stream ended");
            false
        }
    }
}

async fn set_state(
    state_tx: &watch::Sender<SessionState>,
    notif_tx: &mpsc::Sender<SessionNotification>,
    state: SessionState,
) {
    let _ = state_tx.send(state);
    let _ = notif_tx
        .send(SessionNotification::StateChanged(state))
        .await;
}
