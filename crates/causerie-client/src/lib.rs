//! Causerie client core: the message synchronization engine.
//!
//! Turns a stream of out-of-order, possibly duplicated wire events from the
//! relay into a coherent message log with delivery status, a live presence
//! count, and an ephemeral typing indicator. Presentation layers observe
//! [`EngineNotification`]s and render whatever the engine currently believes
//! to be true.

pub mod compose;
pub mod engine;
pub mod log;
pub mod presence;
pub mod receipts;

pub use engine::{run_engine, ChatEngine, EngineCommand, EngineNotification};
pub use log::{ChatMessage, MessageBody, MessageLog};
pub use presence::PresenceTracker;
pub use receipts::ReceiptCoordinator;

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize tracing for embedders.
///
/// Respects `RUST_LOG`; defaults to debug for the causerie crates and warn
/// for everything else.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("causerie_client=debug,causerie_net=debug,warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
