//! Connection status types shared between the FSM, Heartbeat, and Enforcer.

use serde::{Deserialize, Serialize};

/// Control-plane reachability state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Heartbeats are succeeding.
    Connected,
    /// Heartbeats are failing but below the offline threshold.
    Degraded,
    /// Heartbeats have failed at or beyond the offline threshold.
    Offline,
    /// The control plane rejected credentials; re-login is required.
    Unauthenticated,
}

/// A point-in-time snapshot of connection health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    /// Current reachability state.
    pub state: ConnectionState,
    /// Milliseconds since the epoch of the last successful heartbeat, if any.
    pub last_successful_heartbeat: Option<u64>,
    /// Consecutive heartbeat failures since the last success.
    pub consecutive_failures: u32,
    /// Age of the cached policy in milliseconds, if a policy is loaded.
    pub cached_policy_age_ms: Option<u64>,
}

impl ConnectionStatus {
    /// The initial status: connected, since the FSM is only constructed
    /// after a successful authentication and policy fetch.
    #[must_use]
    pub fn initial() -> Self {
        Self {
            state: ConnectionState::Connected,
            last_successful_heartbeat: None,
            consecutive_failures: 0,
            cached_policy_age_ms: None,
        }
    }
}
