//! A pure, observable connection-health state machine.
//!
//! No I/O: the Heartbeat decides when to call `record_success`/
//! `record_failure`/`set_unauthenticated` and is responsible for acting on
//! the returned audit event, if any.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use clawforge_core::{ConnectionState, ConnectionStatus, EventType, Outcome, PartialAuditEvent};
use serde_json::json;

/// The connection-health state machine.
#[derive(Debug, Clone)]
pub struct ConnectionFsm {
    status: ConnectionStatus,
}

impl Default for ConnectionFsm {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionFsm {
    /// Construct the FSM in its initial `connected` state. Only call this
    /// after a successful authentication and policy fetch.
    #[must_use]
    pub fn new() -> Self {
        Self { status: ConnectionStatus::initial() }
    }

    /// Current status snapshot.
    #[must_use]
    pub fn get_status(&self) -> ConnectionStatus {
        self.status.clone()
    }

    /// Record a successful heartbeat. Always transitions to `connected`.
    /// Returns the governance audit event to emit, if the state changed.
    pub fn record_success(&mut self, now_ms: u64) -> Option<PartialAuditEvent> {
        let from = self.status.state;
        self.status.state = ConnectionState::Connected;
        self.status.consecutive_failures = 0;
        self.status.last_successful_heartbeat = Some(now_ms);
        self.transition_event(from, ConnectionState::Connected)
    }

    /// Record a failed heartbeat. Transitions to `degraded` while
    /// `consecutive_failures < threshold`, and to `offline` once it reaches
    /// `threshold`. Returns the governance audit event to emit, if the state
    /// changed.
    pub fn record_failure(&mut self, threshold: u32) -> Option<PartialAuditEvent> {
        let from = self.status.state;
        self.status.consecutive_failures = self.status.consecutive_failures.saturating_add(1);
        self.status.state = if self.status.consecutive_failures >= threshold {
            ConnectionState::Offline
        } else {
            ConnectionState::Degraded
        };
        self.transition_event(from, self.status.state)
    }

    /// Record that the control plane rejected credentials. Always
    /// transitions to `unauthenticated`. Returns the governance audit event
    /// to emit, if the state changed.
    pub fn set_unauthenticated(&mut self) -> Option<PartialAuditEvent> {
        let from = self.status.state;
        self.status.state = ConnectionState::Unauthenticated;
        self.transition_event(from, ConnectionState::Unauthenticated)
    }

    fn transition_event(&self, from: ConnectionState, to: ConnectionState) -> Option<PartialAuditEvent> {
        if from == to {
            return None;
        }
        tracing::info!(?from, ?to, consecutive_failures = self.status.consecutive_failures, "connection state changed");
        let outcome = if to == ConnectionState::Connected { Outcome::Success } else { Outcome::Error };
        Some(PartialAuditEvent {
            agent_id: None,
            session_key: None,
            event_type: EventType::KillSwitchActivated,
            tool_name: None,
            outcome,
            reason: Some("connection_state_change".to_string()),
            metadata: Some(json!({
                "transitionType": "connection_state_change",
                "kind": "connection_state",
                "from": from,
                "to": to,
                "consecutiveFailures": self.status.consecutive_failures,
            })),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_connected() {
        let fsm = ConnectionFsm::new();
        assert_eq!(fsm.get_status().state, ConnectionState::Connected);
    }

    #[test]
    fn failures_below_threshold_degrade() {
        let mut fsm = ConnectionFsm::new();
        let ev = fsm.record_failure(3).unwrap();
        assert_eq!(fsm.get_status().state, ConnectionState::Degraded);
        assert_eq!(ev.outcome, Outcome::Error);
    }

    #[test]
    fn failures_at_threshold_go_offline() {
        let mut fsm = ConnectionFsm::new();
        fsm.record_failure(2);
        let ev = fsm.record_failure(2).unwrap();
        assert_eq!(fsm.get_status().state, ConnectionState::Offline);
        assert_eq!(ev.outcome, Outcome::Error);
    }

    #[test]
    fn success_resets_failures_and_emits_connected_event() {
        let mut fsm = ConnectionFsm::new();
        fsm.record_failure(2);
        let ev = fsm.record_success(1234).unwrap();
        assert_eq!(fsm.get_status().state, ConnectionState::Connected);
        assert_eq!(fsm.get_status().consecutive_failures, 0);
        assert_eq!(fsm.get_status().last_successful_heartbeat, Some(1234));
        assert_eq!(ev.outcome, Outcome::Success);
    }

    #[test]
    fn no_event_when_state_unchanged() {
        let mut fsm = ConnectionFsm::new();
        assert!(fsm.record_success(1).is_none());
    }

    #[test]
    fn unauthenticated_overrides_any_state() {
        let mut fsm = ConnectionFsm::new();
        fsm.record_failure(2);
        let ev = fsm.set_unauthenticated().unwrap();
        assert_eq!(fsm.get_status().state, ConnectionState::Unauthenticated);
        assert_eq!(ev.outcome, Outcome::Error);
    }
}
