// Wire protocol and core types shared by the Causerie client crates.

pub mod constants;
pub mod error;
pub mod identity;
pub mod protocol;
pub mod types;

pub use error::{CauserieError, ParseError, SessionError, ValidationError};
pub use identity::SessionIdentity;
pub use protocol::{MessageRecord, WireEvent};
pub use types::{ClientId, DeliveryStatus, FilePayload, MessageId};
