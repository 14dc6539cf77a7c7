//! The shared mutable state read by the Enforcer's hot path and written by
//! background tasks.
//!
//! A single `authorize` call must see one consistent snapshot of
//! `(policy, kill_switch, offline_override)`. We hold an immutable snapshot
//! struct behind an `Arc<RwLock<_>>`; readers clone the `Arc` out from under
//! the lock so the lock is never held across the caller's own logic, and
//! writers never hold the lock across I/O.

use std::sync::{Arc, RwLock};

use crate::policy::{KillSwitchState, OfflineOverride, OrgPolicy};

/// One consistent snapshot of governance state.
#[derive(Debug, Clone, Default)]
pub struct EnforcerSnapshot {
    /// The currently loaded policy, if any.
    pub policy: Option<Arc<OrgPolicy>>,
    /// The current kill switch state.
    pub kill_switch: KillSwitchState,
    /// The current offline override.
    pub offline_override: OfflineOverride,
}

/// A cheap-to-clone handle to the shared `EnforcerSnapshot`.
#[derive(Debug, Clone, Default)]
pub struct EnforcerState {
    inner: Arc<RwLock<EnforcerSnapshot>>,
}

impl EnforcerState {
    /// Construct state with no policy loaded, kill switch inactive, no
    /// offline override.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a consistent snapshot for a single `authorize` call.
    #[must_use]
    pub fn snapshot(&self) -> EnforcerSnapshot {
        self.inner.read().expect("enforcer state lock poisoned").clone()
    }

    /// Replace the loaded policy, but only if `new_policy.version` is
    /// strictly greater than the currently loaded version (monotone).
    /// Returns `true` if the policy was applied.
    pub fn apply_policy_if_newer(&self, new_policy: OrgPolicy) -> bool {
        let mut guard = self.inner.write().expect("enforcer state lock poisoned");
        let should_apply = match &guard.policy {
            Some(p) => new_policy.version > p.version,
            None => true,
        };
        if should_apply {
            guard.policy = Some(Arc::new(new_policy));
        }
        should_apply
    }

    /// Set the kill switch state (Heartbeat-only in practice).
    pub fn set_kill_switch(&self, kill_switch: KillSwitchState) {
        self.inner.write().expect("enforcer state lock poisoned").kill_switch = kill_switch;
    }

    /// Set the offline override (Heartbeat-only in practice).
    pub fn set_offline_override(&self, offline_override: OfflineOverride) {
        self.inner.write().expect("enforcer state lock poisoned").offline_override = offline_override;
    }

    /// Read the current kill switch state.
    #[must_use]
    pub fn kill_switch(&self) -> KillSwitchState {
        self.inner.read().expect("enforcer state lock poisoned").kill_switch.clone()
    }

    /// Read the current offline override.
    #[must_use]
    pub fn offline_override(&self) -> OfflineOverride {
        self.inner.read().expect("enforcer state lock poisoned").offline_override
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotone_policy_rejects_older_version() {
        let state = EnforcerState::new();
        assert!(state.apply_policy_if_newer(OrgPolicy::empty(2, 0)));
        assert!(!state.apply_policy_if_newer(OrgPolicy::empty(1, 0)));
        assert_eq!(state.snapshot().policy.unwrap().version, 2);
    }

    #[test]
    fn kill_switch_round_trips() {
        let state = EnforcerState::new();
        state.set_kill_switch(KillSwitchState { active: true, message: Some("x".into()) });
        assert!(state.kill_switch().active);
    }
}
