use serde::{Deserialize, Serialize};

use crate::types::ClientId;

/// A user's session identity: a display name plus a random per-session
/// client id. No account, no password — the relay trusts both as given.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionIdentity {
    pub client_id: ClientId,
    pub display_name: String,
}

impl SessionIdentity {
    /// Generate a new identity with a random client id.
    pub fn generate(display_name: impl Into<String>) -> Self {
        Self {
            client_id: ClientId::generate(),
            display_name: display_name.into(),
        }
    }

    /// Whether an event carrying `client_id` originated from this session.
    pub fn is_self(&self, client_id: &ClientId) -> bool {
        &self.client_id == client_id
    }
}
