// Relay networking layer: one WebSocket channel session per chat session.

pub mod session;

pub use session::{ChannelSession, SessionConfig, SessionNotification, SessionState};
