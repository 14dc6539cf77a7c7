//! Session tokens owned exclusively by the SessionKeeper.

use serde::{Deserialize, Serialize};

/// Bearer credentials for one authenticated session.
///
/// `expires_at` must be strictly greater on every rotation; SessionKeeper is
/// the sole writer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionTokens {
    /// Bearer token attached to every authenticated control-plane request.
    pub access_token: String,
    /// Token used to obtain a fresh `access_token`, if any.
    pub refresh_token: Option<String>,
    /// Milliseconds since the epoch at which `access_token` expires.
    pub expires_at: u64,
    /// The authenticated user.
    pub user_id: String,
    /// The user's organization.
    pub org_id: String,
}

impl SessionTokens {
    /// Milliseconds remaining until expiry, relative to `now_ms`. Saturates
    /// to zero if already expired.
    #[must_use]
    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        self.expires_at.saturating_sub(now_ms)
    }
}
