//! Wire types for the three control-plane endpoints.

use serde::{Deserialize, Serialize};

/// The grant presented to `/api/v1/auth/exchange`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "grantType", rename_all = "snake_case")]
pub enum AuthGrant {
    /// Exchange an OAuth authorization code.
    AuthorizationCode {
        /// The authorization code.
        code: String,
    },
    /// Exchange an OIDC id token.
    IdToken {
        /// The id token.
        #[serde(rename = "idToken")]
        id_token: String,
    },
    /// Exchange a refresh token for a new access token.
    RefreshToken {
        /// The refresh token.
        #[serde(rename = "refreshToken")]
        refresh_token: String,
    },
}

/// Response body from `/api/v1/auth/exchange`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    /// Bearer token for subsequent authenticated calls.
    pub access_token: String,
    /// Token usable to obtain a fresh access token, if any.
    pub refresh_token: Option<String>,
    /// Milliseconds since the epoch at which `access_token` expires.
    pub expires_at: u64,
    /// The authenticated user.
    pub user_id: String,
    /// The user's organization.
    pub org_id: String,
}

/// Response body from `/api/v1/heartbeat/{orgId}/{userId}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    /// The policy version currently in effect server-side.
    pub policy_version: u64,
    /// Whether the organization's kill switch is active.
    pub kill_switch: bool,
    /// Operator-supplied message to surface when the kill switch is active.
    pub kill_switch_message: Option<String>,
    /// Whether the caller should fetch the full policy body now, regardless
    /// of whether `policy_version` changed.
    pub refresh_policy_now: bool,
}

/// Request body for `/api/v1/audit/{orgId}/events`.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEventsRequest<'a> {
    /// The batch of events, in enqueue order.
    pub events: &'a [clawforge_core::AuditEvent],
}
