//! The audit event record shipped to the control plane.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Classification of an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A tool invocation was evaluated by the Enforcer.
    ToolCallAttempt,
    /// A kill switch or connection-state transition fired. Legacy name
    /// retained for wire compatibility; `metadata.kind` disambiguates.
    KillSwitchActivated,
    /// A session lifecycle event (refresh success/failure, etc).
    SessionEvent,
}

/// The outcome recorded on an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The governed action was permitted.
    Allowed,
    /// The governed action was denied.
    Blocked,
    /// The governed action failed for a reason unrelated to policy.
    Error,
    /// A non-decision event (e.g. session refresh) completed successfully.
    Success,
}

/// An immutable audit record. Created exactly once, identified by
/// `enqueue_seq`, delivered at-least-once, and never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Monotonic sequence number assigned at enqueue time; proves ordering.
    pub enqueue_seq: u64,
    /// The user this event is attributed to.
    pub user_id: String,
    /// The organization this event is attributed to.
    pub org_id: String,
    /// The agent that triggered the event, if any.
    pub agent_id: Option<String>,
    /// The session key in effect, if any.
    pub session_key: Option<String>,
    /// The kind of event.
    pub event_type: EventType,
    /// The tool name involved, if any.
    pub tool_name: Option<String>,
    /// The decision outcome.
    pub outcome: Outcome,
    /// A short tag describing which rule produced the outcome.
    pub reason: Option<String>,
    /// Milliseconds since the epoch.
    pub timestamp: u64,
    /// Opaque metadata, only populated when `audit_level == full`.
    pub metadata: Option<Value>,
}

/// A partially-populated event as constructed by a caller of `enqueue`;
/// `user_id`, `org_id`, `timestamp`, and `enqueue_seq` are stamped by the
/// pipeline itself.
#[derive(Debug, Clone)]
pub struct PartialAuditEvent {
    /// The agent that triggered the event, if any.
    pub agent_id: Option<String>,
    /// The session key in effect, if any.
    pub session_key: Option<String>,
    /// The kind of event.
    pub event_type: EventType,
    /// The tool name involved, if any.
    pub tool_name: Option<String>,
    /// The decision outcome.
    pub outcome: Outcome,
    /// A short tag describing which rule produced the outcome.
    pub reason: Option<String>,
    /// Opaque metadata; stripped by the pipeline unless `audit_level == full`.
    pub metadata: Option<Value>,
}

impl PartialAuditEvent {
    /// Construct a minimal tool-call-attempt event.
    #[must_use]
    pub fn tool_call(tool_name: impl Into<String>, outcome: Outcome, reason: impl Into<String>) -> Self {
        Self {
            agent_id: None,
            session_key: None,
            event_type: EventType::ToolCallAttempt,
            tool_name: Some(tool_name.into()),
            outcome,
            reason: Some(reason.into()),
            metadata: None,
        }
    }
}
