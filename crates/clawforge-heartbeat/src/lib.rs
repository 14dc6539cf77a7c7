//! Periodic control-plane liveness poll.
//!
//! Drives the `ConnectionFSM`, mirrors the kill switch into `EnforcerState`,
//! and applies the configured offline behavior once heartbeat failures cross
//! the threshold.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clawforge_audit::AuditPipeline;
use clawforge_client::{ClientResponse, ControlPlaneClient};
use clawforge_connection::ConnectionFsm;
use clawforge_core::{ConnectionState, EnforcerState, KillSwitchState, OfflineMode, OfflineOverride};
use tokio::task::JoinHandle;

/// What the Enforcer should do once the control plane is judged offline.
pub type OfflineBehavior = OfflineMode;

/// Invoked when the heartbeat reports `refreshPolicyNow`; the policy client
/// fetches the new `OrgPolicy` out of band and applies it to `EnforcerState`.
pub type PolicyRefreshCallback = Box<dyn Fn() + Send + Sync>;

/// Periodically polls the control plane and drives the connection FSM.
///
/// The FSM itself is shared (`Arc<Mutex<_>>`) with `SessionKeeper`, which
/// also calls `set_unauthenticated` on an explicit 401 from its own refresh
/// call. One `Mutex` guards the single FSM instance regardless of which
/// component is writing to it.
pub struct Heartbeat {
    client: Arc<ControlPlaneClient>,
    fsm: Arc<Mutex<ConnectionFsm>>,
    state: EnforcerState,
    audit: Arc<AuditPipeline>,
    org_id: String,
    user_id: String,
    interval: Duration,
    failure_threshold: u32,
    offline_mode: OfflineMode,
    on_policy_refresh_needed: Option<PolicyRefreshCallback>,
    generation: Arc<AtomicU64>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Heartbeat {
    /// Construct a Heartbeat. Does not start polling until `start()`.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        client: Arc<ControlPlaneClient>,
        fsm: Arc<Mutex<ConnectionFsm>>,
        state: EnforcerState,
        audit: Arc<AuditPipeline>,
        org_id: impl Into<String>,
        user_id: impl Into<String>,
        interval: Duration,
        failure_threshold: u32,
        offline_mode: OfflineMode,
        on_policy_refresh_needed: Option<PolicyRefreshCallback>,
    ) -> Self {
        Self {
            client,
            fsm,
            state,
            audit,
            org_id: org_id.into(),
            user_id: user_id.into(),
            interval,
            failure_threshold,
            offline_mode,
            on_policy_refresh_needed,
            generation: Arc::new(AtomicU64::new(0)),
            task: Mutex::new(None),
        }
    }

    /// Current connection status, as observed by the last heartbeat tick.
    /// `cached_policy_age_ms` is filled in from the currently loaded
    /// policy's `fetched_at`, since the FSM itself has no notion of policy
    /// freshness.
    #[must_use]
    pub fn connection_status(&self) -> clawforge_core::ConnectionStatus {
        let mut status = self.fsm.lock().expect("fsm lock poisoned").get_status();
        status.cached_policy_age_ms = self
            .state
            .snapshot()
            .policy
            .map(|policy| clawforge_core::ids::now_ms().saturating_sub(policy.fetched_at));
        status
    }

    /// Start the periodic polling task.
    pub fn start(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(this.interval);
            loop {
                interval.tick().await;
                let generation = this.generation.load(Ordering::SeqCst);
                this.tick(generation).await;
            }
        });
        *self.task.lock().expect("task lock poisoned") = Some(handle);
    }

    /// Stop polling. Bumps the generation counter first so any in-flight
    /// tick's outcome is discarded rather than applied.
    pub fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.task.lock().expect("task lock poisoned").take() {
            handle.abort();
        }
    }

    async fn tick(&self, generation: u64) {
        let response = self.client.get_heartbeat(&self.org_id, &self.user_id).await;

        if generation != self.generation.load(Ordering::SeqCst) {
            tracing::debug!("discarding heartbeat outcome from stale generation");
            return;
        }

        match response {
            ClientResponse::Success(body) => self.on_success(body),
            ClientResponse::Unauthorized => self.on_unauthorized(),
            ClientResponse::HttpError(status) => {
                tracing::warn!(status, "heartbeat returned non-2xx");
                self.on_failure();
            }
            ClientResponse::TransportError(err) => {
                tracing::warn!(error = %err, "heartbeat transport error");
                self.on_failure();
            }
        }
    }

    fn on_success(&self, body: clawforge_client::HeartbeatResponse) {
        let event = self.fsm.lock().expect("fsm lock poisoned").record_success(clawforge_core::ids::now_ms());
        self.emit(event);

        if self.state.offline_override() != OfflineOverride::None {
            self.state.set_offline_override(OfflineOverride::None);
            tracing::info!("connection restored, clearing offline override");
        }

        let was_active = self.state.kill_switch().active;
        if was_active != body.kill_switch {
            tracing::info!(active = body.kill_switch, "kill switch state changed");
        }
        self.state.set_kill_switch(KillSwitchState { active: body.kill_switch, message: body.kill_switch_message });

        if body.refresh_policy_now {
            if let Some(cb) = &self.on_policy_refresh_needed {
                cb();
            }
        }
    }

    fn on_unauthorized(&self) {
        let (failure_event, unauth_event) = {
            let mut fsm = self.fsm.lock().expect("fsm lock poisoned");
            let failure_event = fsm.record_failure(self.failure_threshold);
            let unauth_event = fsm.set_unauthenticated();
            (failure_event, unauth_event)
        };
        self.emit(failure_event);
        self.emit(unauth_event);
        self.stop();
    }

    fn on_failure(&self) {
        let (event, new_state) = {
            let mut fsm = self.fsm.lock().expect("fsm lock poisoned");
            let event = fsm.record_failure(self.failure_threshold);
            (event, fsm.get_status().state)
        };
        self.emit(event);

        if new_state != ConnectionState::Offline {
            return;
        }

        match self.offline_mode {
            OfflineMode::Block => {
                self.state.set_kill_switch(KillSwitchState {
                    active: true,
                    message: Some("cannot reach control plane".to_string()),
                });
                self.state.set_offline_override(OfflineOverride::None);
            }
            OfflineMode::Allow => self.state.set_offline_override(OfflineOverride::Allow),
            OfflineMode::Cached => self.state.set_offline_override(OfflineOverride::Cached),
        }
    }

    fn emit(&self, event: Option<clawforge_core::PartialAuditEvent>) {
        if let Some(event) = event {
            self.audit.enqueue(event);
        }
    }
}
