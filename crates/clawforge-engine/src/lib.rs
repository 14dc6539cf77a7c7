//! `GovernanceEngine`: wires the five governance components into one facade
//! the host process constructs once, after a successful enrollment or login.
//!
//! This is the only crate that aggregates errors with `anyhow` — everything
//! below `authorize` reduces its own errors to state changes and log lines
//! (§7); `anyhow` only appears at this host boundary, during construction.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use clawforge_audit::AuditPipeline;
use clawforge_client::{AuthGrant, ClientResponse, ControlPlaneClient};
use clawforge_connection::ConnectionFsm;
use clawforge_core::{EngineConfig, EnforcerState, SessionTokens};
use clawforge_enforcer::{Decision, Enforcer};
use clawforge_heartbeat::{Heartbeat, PolicyRefreshCallback};
use clawforge_session::SessionKeeper;

/// Everything the host needs to construct a `GovernanceEngine`: the loaded
/// config plus the session established by enrollment or login.
pub struct EngineBootstrap {
    /// The validated, env-overridden configuration.
    pub config: EngineConfig,
    /// The session tokens obtained from the initial auth exchange.
    pub session: SessionTokens,
    /// Invoked when a heartbeat reports `refreshPolicyNow`; the host's
    /// policy client fetches the new `OrgPolicy` out of band and applies it
    /// via `GovernanceEngine::apply_policy`. `None` if the host doesn't need
    /// out-of-band refresh (e.g. it always applies the policy carried on
    /// every heartbeat response regardless of this flag).
    pub policy_refresh: Option<PolicyRefreshCallback>,
}

/// The governance engine facade: one `authorize` hot path, three background
/// tasks, and a shared `EnforcerState`.
pub struct GovernanceEngine {
    state: EnforcerState,
    enforcer: Enforcer,
    audit: Arc<AuditPipeline>,
    client: Arc<ControlPlaneClient>,
    heartbeat: Option<Arc<Heartbeat>>,
    session_keeper: Option<Arc<SessionKeeper>>,
}

impl GovernanceEngine {
    /// Construct every component from `bootstrap`. Does not start any
    /// background task; call `start()` once construction succeeds.
    pub fn new(bootstrap: EngineBootstrap) -> anyhow::Result<Self> {
        let EngineBootstrap { config, session, policy_refresh } = bootstrap;
        let control_plane_configured = !config.control_plane_url.is_empty();

        let client = Arc::new(
            ControlPlaneClient::new(config.control_plane_url.clone())
                .context("failed to build control-plane http client")?,
        );
        client.set_access_token(session.access_token.clone());

        let state = EnforcerState::new();
        let fsm = Arc::new(Mutex::new(ConnectionFsm::new()));

        let audit = Arc::new(
            AuditPipeline::new(
                Arc::clone(&client),
                control_plane_configured,
                config.audit_buffer_path(),
                clawforge_core::policy::AuditLevel::Full,
                session.user_id.clone(),
                session.org_id.clone(),
                config.audit_batch_size,
                config.max_audit_buffer_size,
                Duration::from_millis(config.audit_flush_interval_ms),
            )
            .context("failed to construct audit pipeline")?,
        );

        let enforcer = Enforcer::new(state.clone(), Arc::clone(&audit));

        let (heartbeat, session_keeper) = if control_plane_configured {
            let heartbeat = Arc::new(Heartbeat::new(
                Arc::clone(&client),
                Arc::clone(&fsm),
                state.clone(),
                Arc::clone(&audit),
                config.org_id.clone(),
                session.user_id.clone(),
                Duration::from_millis(config.heartbeat_interval_ms),
                config.heartbeat_failure_threshold,
                config.offline_mode,
                policy_refresh,
            ));

            let audit_for_callback = Arc::clone(&audit);
            let client_for_callback = Arc::clone(&client);
            let session_keeper = Arc::new(SessionKeeper::new(
                Arc::clone(&client),
                Arc::clone(&fsm),
                Arc::clone(&audit),
                Some(session),
                config.session_path(),
                Duration::from_secs(60),
                Some(Box::new(move |tokens: &SessionTokens| {
                    client_for_callback.set_access_token(tokens.access_token.clone());
                    audit_for_callback.update_access_token(tokens.access_token.clone());
                    audit_for_callback.update_identity(tokens.user_id.clone(), tokens.org_id.clone());
                })),
            ));

            (Some(heartbeat), Some(session_keeper))
        } else {
            (None, None)
        };

        Ok(Self { state, enforcer, audit, client, heartbeat, session_keeper })
    }

    /// Authorize one tool call. Never blocks on I/O.
    pub fn authorize(&self, tool_name: &str, agent_id: Option<String>, session_key: Option<String>) -> Decision {
        self.enforcer.authorize(tool_name, agent_id, session_key)
    }

    /// Apply a freshly-fetched policy. Applied only if its version is newer
    /// than whatever is currently loaded (monotone).
    pub fn apply_policy(&self, policy: clawforge_core::OrgPolicy) -> bool {
        self.state.apply_policy_if_newer(policy)
    }

    /// Exchange a grant for a session directly through the engine's client,
    /// for hosts that want to re-authenticate without standing up a new
    /// engine (e.g. after an `unauthenticated` transition).
    pub async fn reauthenticate(&self, grant: &AuthGrant) -> ClientResponse<clawforge_client::AuthResponse> {
        self.client.exchange_token(grant).await
    }

    /// Start the three background tasks (a no-op for any that are inactive
    /// because `controlPlaneUrl` is empty).
    pub fn start(&self) {
        self.audit.start();
        if let Some(heartbeat) = &self.heartbeat {
            heartbeat.start();
        }
        if let Some(session_keeper) = &self.session_keeper {
            session_keeper.start();
        }
    }

    /// Stop all background tasks in dependency order: Heartbeat and
    /// SessionKeeper first, so AuditPipeline's final flush captures their
    /// last events.
    pub async fn shutdown(&self) {
        if let Some(heartbeat) = &self.heartbeat {
            heartbeat.stop();
        }
        if let Some(session_keeper) = &self.session_keeper {
            session_keeper.stop();
        }
        self.audit.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bootstrap(dir: &std::path::Path, control_plane_url: &str) -> EngineBootstrap {
        let mut config = EngineConfig::default();
        config.control_plane_url = control_plane_url.to_string();
        config.org_id = "org1".to_string();
        config.config_root = dir.to_path_buf();
        EngineBootstrap {
            config,
            session: SessionTokens {
                access_token: "token".into(),
                refresh_token: Some("refresh".into()),
                expires_at: clawforge_core::ids::now_ms() + 3_600_000,
                user_id: "user1".into(),
                org_id: "org1".into(),
            },
            policy_refresh: None,
        }
    }

    #[tokio::test]
    async fn empty_control_plane_url_leaves_heartbeat_and_session_keeper_inactive() {
        let dir = tempfile::tempdir().unwrap();
        let engine = GovernanceEngine::new(bootstrap(dir.path(), "")).unwrap();
        assert!(engine.heartbeat.is_none());
        assert!(engine.session_keeper.is_none());
        assert_eq!(engine.authorize("read", None, None), Decision::Allow);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn configured_control_plane_activates_background_components() {
        let dir = tempfile::tempdir().unwrap();
        let engine = GovernanceEngine::new(bootstrap(dir.path(), "http://localhost:1")).unwrap();
        assert!(engine.heartbeat.is_some());
        assert!(engine.session_keeper.is_some());
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn policy_refresh_callback_is_threaded_to_heartbeat() {
        let dir = tempfile::tempdir().unwrap();
        let mut b = bootstrap(dir.path(), "http://localhost:1");
        let called = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let called_clone = Arc::clone(&called);
        b.policy_refresh = Some(Box::new(move || {
            called_clone.store(true, std::sync::atomic::Ordering::SeqCst);
        }));
        let engine = GovernanceEngine::new(b).unwrap();
        assert!(engine.heartbeat.is_some());
        // Not fired yet: no heartbeat tick has run.
        assert!(!called.load(std::sync::atomic::Ordering::SeqCst));
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn apply_policy_is_monotone() {
        let dir = tempfile::tempdir().unwrap();
        let engine = GovernanceEngine::new(bootstrap(dir.path(), "")).unwrap();
        assert!(engine.apply_policy(clawforge_core::OrgPolicy::empty(2, 0)));
        assert!(!engine.apply_policy(clawforge_core::OrgPolicy::empty(1, 0)));
        engine.shutdown().await;
    }
}
