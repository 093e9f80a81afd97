use thiserror::Error;

#[derive(Error, Debug)]
pub enum CauserieError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Transport-level failures of the channel session.
///
/// None of these are fatal to the process: the session reports
/// `Disconnected` and stops there, and sends fail fast instead of queuing.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Not connected to the relay")]
    NotConnected,

    #[error("Outbound send queue is full")]
    SendQueueFull,

    #[error("WebSocket handshake failed: {0}")]
    Handshake(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// A frame that could not be decoded into a wire event.
///
/// Always recoverable: the caller logs and drops the frame, the channel
/// stays open.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Invalid JSON frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Frame is missing the `type` discriminator")]
    MissingType,
}

/// Local rejection of an outbound compose, before any network activity.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Message text is empty")]
    EmptyMessage,

    #[error("File too large: {size} bytes (max {max})")]
    FileTooLarge { size: usize, max: usize },
}
