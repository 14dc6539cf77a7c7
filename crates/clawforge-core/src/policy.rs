//! Org policy, tool selectors, and the closed group/alias tables.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// How much detail the audit pipeline records per event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditLevel {
    /// Nothing is recorded.
    Off,
    /// Events are recorded without payload metadata.
    Metadata,
    /// Events are recorded with payload metadata.
    Full,
}

/// Either a concrete tool name or a `group:<id>` selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolSelector(pub String);

impl ToolSelector {
    /// Whether this selector is a group reference (`group:<id>`).
    #[must_use]
    pub fn is_group(&self) -> bool {
        self.0.starts_with("group:")
    }
}

/// The authoritative rule set for one organization at one version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgPolicy {
    /// Monotone per-org version number.
    pub version: u64,
    /// Tool selectors explicitly allowed.
    pub allow: Vec<ToolSelector>,
    /// Tool selectors explicitly denied.
    pub deny: Vec<ToolSelector>,
    /// How much detail the audit pipeline records.
    pub audit_level: AuditLevel,
    /// When this policy was fetched, in milliseconds since the epoch.
    pub fetched_at: u64,
}

impl OrgPolicy {
    /// An empty policy: nothing allowed/denied explicitly, full audit.
    #[must_use]
    pub fn empty(version: u64, fetched_at: u64) -> Self {
        Self { version, allow: Vec::new(), deny: Vec::new(), audit_level: AuditLevel::Full, fetched_at }
    }
}

/// Organization-wide kill switch, owned by the `EnforcerState` and mutated
/// only by the Heartbeat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillSwitchState {
    /// When true, all tool calls are denied regardless of policy.
    pub active: bool,
    /// Operator-supplied message surfaced in the block reason.
    pub message: Option<String>,
}

/// Local, heartbeat-failure-driven enforcement override.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfflineOverride {
    /// No override in effect.
    #[default]
    None,
    /// Bypass all checks.
    Allow,
    /// Evaluate against the last cached policy, skipping the kill switch.
    Cached,
}

/// Normalize a tool name: lowercase, trim, then apply the alias table.
#[must_use]
pub fn normalize_tool_name(raw: &str) -> String {
    let trimmed = raw.trim().to_lowercase();
    match trimmed.as_str() {
        "bash" => "exec".to_string(),
        "apply-patch" => "apply_patch".to_string(),
        other => other.to_string(),
    }
}

/// Expand a group name to its fixed set of concrete tool names. Returns
/// `None` for an unknown group (caller should skip it, not fail open/closed).
#[must_use]
pub fn expand_group(group: &str) -> Option<&'static [&'static str]> {
    match group {
        "group:memory" => Some(&["memory_search", "memory_get"]),
        "group:web" => Some(&["web_search", "web_fetch"]),
        "group:fs" => Some(&["read", "write", "edit", "apply_patch"]),
        "group:runtime" => Some(&["exec", "process"]),
        "group:sessions" => Some(&[
            "sessions_list",
            "sessions_history",
            "sessions_send",
            "sessions_spawn",
            "subagents",
            "session_status",
        ]),
        "group:ui" => Some(&["browser", "canvas"]),
        "group:automation" => Some(&["cron", "gateway"]),
        "group:messaging" => Some(&["message"]),
        "group:nodes" => Some(&["nodes"]),
        _ => None,
    }
}

/// Expand a list of selectors into a flat set of concrete tool names.
/// Unknown groups are skipped; `on_unknown_group` is called once per
/// distinct unknown group name encountered (for logging by the caller).
pub fn expand_selectors(
    selectors: &[ToolSelector],
    mut on_unknown_group: impl FnMut(&str),
) -> HashSet<String> {
    let mut out = HashSet::new();
    for sel in selectors {
        if sel.is_group() {
            match expand_group(&sel.0) {
                Some(names) => out.extend(names.iter().map(|s| (*s).to_string())),
                None => on_unknown_group(&sel.0),
            }
        } else {
            out.insert(sel.0.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_aliases_and_case() {
        assert_eq!(normalize_tool_name("Bash"), "exec");
        assert_eq!(normalize_tool_name(" apply-patch "), "apply_patch");
        assert_eq!(normalize_tool_name("Read"), "read");
    }

    #[test]
    fn expands_known_group() {
        let names = expand_group("group:fs").unwrap();
        assert!(names.contains(&"read"));
        assert!(names.contains(&"apply_patch"));
    }

    #[test]
    fn unknown_group_returns_none() {
        assert!(expand_group("group:nope").is_none());
    }

    #[test]
    fn expand_selectors_skips_unknown_and_reports() {
        let sels = vec![ToolSelector("group:fs".into()), ToolSelector("group:bogus".into())];
        let mut unknown = Vec::new();
        let set = expand_selectors(&sels, |g| unknown.push(g.to_string()));
        assert!(set.contains("read"));
        assert_eq!(unknown, vec!["group:bogus".to_string()]);
    }
}
