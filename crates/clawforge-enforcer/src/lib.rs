//! Synchronous tool-call authorization: the governance engine's hot path.
//!
//! `Enforcer::authorize` must never block on I/O. It enqueues exactly one
//! audit event per call through the non-blocking `AuditPipeline::enqueue`
//! and returns a [`Decision`] immediately.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;

use clawforge_audit::AuditPipeline;
use clawforge_core::policy::{expand_selectors, normalize_tool_name};
use clawforge_core::{EnforcerState, Outcome, PartialAuditEvent};

/// The outcome of authorizing one tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The call may proceed.
    Allow,
    /// The call is denied, with a user-facing reason.
    Block(String),
}

impl Decision {
    /// Whether the call may proceed.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Authorizes tool calls against the shared `EnforcerState`.
pub struct Enforcer {
    state: EnforcerState,
    audit: Arc<AuditPipeline>,
}

impl Enforcer {
    /// Construct an Enforcer over the given shared state and audit pipeline.
    #[must_use]
    pub fn new(state: EnforcerState, audit: Arc<AuditPipeline>) -> Self {
        Self { state, audit }
    }

    /// Authorize one tool call. Never blocks, never panics on malformed
    /// policy: the failure mode is always `allow, reason=no_policy`.
    pub fn authorize(
        &self,
        tool_name: &str,
        agent_id: Option<String>,
        session_key: Option<String>,
    ) -> Decision {
        let span = tracing::debug_span!("governance.authorize", tool = tool_name);
        let _enter = span.enter();

        let normalized = normalize_tool_name(tool_name);
        let snapshot = self.state.snapshot();

        let (decision, reason) = if snapshot.offline_override == clawforge_core::OfflineOverride::Allow {
            (Decision::Allow, "offline_allow_mode")
        } else if snapshot.offline_override != clawforge_core::OfflineOverride::Cached
            && snapshot.kill_switch.active
        {
            let message = snapshot
                .kill_switch
                .message
                .clone()
                .unwrap_or_else(|| "tool calls are currently blocked by the organization".to_string());
            (Decision::Block(message), "kill_switch")
        } else {
            self.evaluate_policy(&snapshot, &normalized)
        };

        tracing::debug!(tool = %normalized, decision = ?decision, reason, "governance decision");

        let outcome = if decision.is_allowed() { Outcome::Allowed } else { Outcome::Blocked };
        let mut partial = PartialAuditEvent::tool_call(normalized, outcome, reason);
        partial.agent_id = agent_id;
        partial.session_key = session_key;
        self.audit.enqueue(partial);

        decision
    }

    fn evaluate_policy(
        &self,
        snapshot: &clawforge_core::EnforcerSnapshot,
        normalized: &str,
    ) -> (Decision, &'static str) {
        let Some(policy) = &snapshot.policy else {
            return (Decision::Allow, "no_policy");
        };

        let deny = expand_selectors(&policy.deny, |group| {
            tracing::warn!(group, "unknown tool group in policy deny list, skipping");
        });
        if deny.contains(normalized) {
            return (Decision::Block("tool is blocked by org policy".to_string()), "deny_list");
        }

        if !policy.allow.is_empty() {
            let allow = expand_selectors(&policy.allow, |group| {
                tracing::warn!(group, "unknown tool group in policy allow list, skipping");
            });
            if !allow.contains(normalized) {
                return (
                    Decision::Block("tool is not in allowed list".to_string()),
                    "policy_not_allowed",
                );
            }
        }

        (Decision::Allow, "policy_allow")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clawforge_core::policy::{AuditLevel, OrgPolicy, ToolSelector};
    use clawforge_core::{EnforcerState, KillSwitchState};
    use std::time::Duration;

    fn audit() -> Arc<AuditPipeline> {
        let client = Arc::new(clawforge_client::ControlPlaneClient::new("http://localhost:1").unwrap());
        Arc::new(
            AuditPipeline::new(
                client,
                false,
                std::env::temp_dir().join(format!("clawforge-test-{:?}.jsonl", std::thread::current().id())),
                AuditLevel::Off,
                "u",
                "o",
                100,
                1000,
                Duration::from_secs(30),
            )
            .unwrap(),
        )
    }

    #[test]
    fn no_policy_allows() {
        let enforcer = Enforcer::new(EnforcerState::new(), audit());
        assert_eq!(enforcer.authorize("read", None, None), Decision::Allow);
    }

    #[test]
    fn kill_switch_blocks_everything() {
        let state = EnforcerState::new();
        state.set_kill_switch(KillSwitchState { active: true, message: Some("frozen".into()) });
        let enforcer = Enforcer::new(state, audit());
        assert_eq!(enforcer.authorize("read", None, None), Decision::Block("frozen".into()));
    }

    #[test]
    fn offline_allow_override_bypasses_kill_switch() {
        let state = EnforcerState::new();
        state.set_kill_switch(KillSwitchState { active: true, message: None });
        state.set_offline_override(clawforge_core::OfflineOverride::Allow);
        let enforcer = Enforcer::new(state, audit());
        assert_eq!(enforcer.authorize("read", None, None), Decision::Allow);
    }

    #[test]
    fn deny_list_blocks_normalized_alias() {
        let state = EnforcerState::new();
        state.apply_policy_if_newer(OrgPolicy {
            version: 1,
            allow: Vec::new(),
            deny: vec![ToolSelector("exec".into())],
            audit_level: AuditLevel::Off,
            fetched_at: 0,
        });
        let enforcer = Enforcer::new(state, audit());
        assert_eq!(enforcer.authorize("Bash", None, None), Decision::Block("tool is blocked by org policy".into()));
    }

    #[test]
    fn deny_group_expands_and_blocks() {
        let state = EnforcerState::new();
        state.apply_policy_if_newer(OrgPolicy {
            version: 1,
            allow: Vec::new(),
            deny: vec![ToolSelector("group:fs".into())],
            audit_level: AuditLevel::Off,
            fetched_at: 0,
        });
        let enforcer = Enforcer::new(state, audit());
        assert!(!enforcer.authorize("read", None, None).is_allowed());
    }

    #[test]
    fn empty_allow_list_permits_anything_not_denied() {
        let state = EnforcerState::new();
        state.apply_policy_if_newer(OrgPolicy::empty(1, 0));
        let enforcer = Enforcer::new(state, audit());
        assert!(enforcer.authorize("read", None, None).is_allowed());
    }

    #[test]
    fn nonempty_allow_list_blocks_anything_not_listed() {
        let state = EnforcerState::new();
        state.apply_policy_if_newer(OrgPolicy {
            version: 1,
            allow: vec![ToolSelector("read".into())],
            deny: Vec::new(),
            audit_level: AuditLevel::Off,
            fetched_at: 0,
        });
        let enforcer = Enforcer::new(state, audit());
        assert!(enforcer.authorize("read", None, None).is_allowed());
        assert!(!enforcer.authorize("exec", None, None).is_allowed());
    }

    #[test]
    fn unknown_group_in_deny_is_skipped_not_fail_closed() {
        let state = EnforcerState::new();
        state.apply_policy_if_newer(OrgPolicy {
            version: 1,
            allow: Vec::new(),
            deny: vec![ToolSelector("group:bogus".into())],
            audit_level: AuditLevel::Off,
            fetched_at: 0,
        });
        let enforcer = Enforcer::new(state, audit());
        assert!(enforcer.authorize("read", None, None).is_allowed());
    }

    #[test]
    fn cached_override_skips_kill_switch_but_uses_policy() {
        let state = EnforcerState::new();
        state.set_kill_switch(KillSwitchState { active: true, message: None });
        state.set_offline_override(clawforge_core::OfflineOverride::Cached);
        state.apply_policy_if_newer(OrgPolicy::empty(1, 0));
        let enforcer = Enforcer::new(state, audit());
        assert!(enforcer.authorize("read", None, None).is_allowed());
    }
}
