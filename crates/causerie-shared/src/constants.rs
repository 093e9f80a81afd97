use std::time::Duration;

/// Maximum raw file size accepted for an outbound file event (10 MiB)
pub const MAX_FILE_BYTES: usize = 10 * 1024 * 1024;

/// Quiet window after which the typing indicator self-clears
pub const TYPING_EXPIRY: Duration = Duration::from_millis(1500);

/// Capacity of the session's outbound command channel
pub const COMMAND_CHANNEL_CAPACITY: usize = 256;

/// Capacity of the session's inbound notification channel
pub const NOTIFICATION_CHANNEL_CAPACITY: usize = 256;

/// Capacity of the engine's notification channel to the presentation layer
pub const ENGINE_CHANNEL_CAPACITY: usize = 256;
