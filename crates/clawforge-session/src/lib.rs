//! Proactive access-token refresh.
//!
//! Checks `session.expiresAt` every 60 s; refreshes at most 5 minutes before
//! expiry with up to 3 attempts of exponential backoff. Reentrancy-safe: a
//! tick that finds a refresh already in progress is a no-op.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clawforge_audit::AuditPipeline;
use clawforge_client::{AuthGrant, ClientResponse, ControlPlaneClient};
use clawforge_connection::ConnectionFsm;
use clawforge_core::atomic_write::write_owner_only;
use clawforge_core::ids::now_ms;
use clawforge_core::SessionTokens;
use tokio::task::JoinHandle;

const EXPIRY_THRESHOLD_MS: u64 = 5 * 60 * 1000;
const RETRY_DELAYS: [Duration; 3] =
    [Duration::from_secs(5), Duration::from_secs(10), Duration::from_secs(20)];

/// Invoked after a successful refresh; downstream components update their
/// own cached access token from the published `SessionTokens`.
pub type TokenRefreshedCallback = Box<dyn Fn(&SessionTokens) + Send + Sync>;

/// Proactively refreshes the access token before it expires.
pub struct SessionKeeper {
    client: Arc<ControlPlaneClient>,
    fsm: Arc<Mutex<ConnectionFsm>>,
    audit: Arc<AuditPipeline>,
    session: Mutex<Option<SessionTokens>>,
    session_path: PathBuf,
    check_interval: Duration,
    refreshing: AtomicBool,
    on_token_refreshed: Option<TokenRefreshedCallback>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionKeeper {
    /// Construct a SessionKeeper over the given initial session (if any).
    #[must_use]
    pub fn new(
        client: Arc<ControlPlaneClient>,
        fsm: Arc<Mutex<ConnectionFsm>>,
        audit: Arc<AuditPipeline>,
        initial_session: Option<SessionTokens>,
        session_path: impl Into<PathBuf>,
        check_interval: Duration,
        on_token_refreshed: Option<TokenRefreshedCallback>,
    ) -> Self {
        Self {
            client,
            fsm,
            audit,
            session: Mutex::new(initial_session),
            session_path: session_path.into(),
            check_interval,
            refreshing: AtomicBool::new(false),
            on_token_refreshed,
            task: Mutex::new(None),
        }
    }

    /// The currently held session, if any.
    #[must_use]
    pub fn current_session(&self) -> Option<SessionTokens> {
        self.session.lock().expect("session lock poisoned").clone()
    }

    /// Start the periodic check task.
    pub fn start(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(this.check_interval);
            loop {
                interval.tick().await;
                this.check().await;
            }
        });
        *self.task.lock().expect("task lock poisoned") = Some(handle);
    }

    /// Stop the periodic check task. Does not abort an in-flight refresh.
    pub fn stop(&self) {
        if let Some(handle) = self.task.lock().expect("task lock poisoned").take() {
            handle.abort();
        }
    }

    /// Check whether a refresh is due and perform it if so. A no-op if a
    /// refresh is already in progress, or if there is no session / refresh
    /// token to refresh with.
    pub async fn check(&self) {
        let refresh_token = {
            let guard = self.session.lock().expect("session lock poisoned");
            let Some(session) = guard.as_ref() else { return };
            if session.remaining_ms(now_ms()) > EXPIRY_THRESHOLD_MS {
                return;
            }
            let Some(token) = session.refresh_token.clone() else { return };
            token
        };

        if self.refreshing.swap(true, Ordering::SeqCst) {
            tracing::debug!("refresh already in progress, skipping tick");
            return;
        }

        self.run_refresh_loop(refresh_token).await;
        self.refreshing.store(false, Ordering::SeqCst);
    }

    async fn run_refresh_loop(&self, refresh_token: String) {
        for (attempt, delay) in std::iter::once(None).chain(RETRY_DELAYS.iter().map(|d| Some(*d))).enumerate() {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let grant = AuthGrant::RefreshToken { refresh_token: refresh_token.clone() };
            match self.client.exchange_token(&grant).await {
                ClientResponse::Success(body) => {
                    self.apply_refreshed(body);
                    return;
                }
                ClientResponse::Unauthorized => {
                    tracing::warn!("session refresh rejected, marking connection unauthenticated");
                    let event = self.fsm.lock().expect("fsm lock poisoned").set_unauthenticated();
                    if let Some(event) = event {
                        self.audit.enqueue(event);
                    }
                    return;
                }
                ClientResponse::HttpError(status) => {
                    tracing::warn!(status, attempt, "session refresh attempt failed");
                }
                ClientResponse::TransportError(err) => {
                    tracing::warn!(error = %err, attempt, "session refresh attempt errored");
                }
            }
        }
        tracing::error!("session refresh exhausted all attempts");
    }

    fn apply_refreshed(&self, body: clawforge_client::AuthResponse) {
        let tokens = SessionTokens {
            access_token: body.access_token,
            refresh_token: body.refresh_token,
            expires_at: body.expires_at,
            user_id: body.user_id,
            org_id: body.org_id,
        };

        if let Ok(bytes) = serde_json::to_vec(&tokens) {
            if let Err(e) = write_owner_only(&self.session_path, &bytes) {
                tracing::error!(error = %e, "failed to persist refreshed session to disk");
            }
        }

        *self.session.lock().expect("session lock poisoned") = Some(tokens.clone());
        self.client.set_access_token(tokens.access_token.clone());

        if let Some(cb) = &self.on_token_refreshed {
            cb(&tokens);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fsm() -> Arc<Mutex<ConnectionFsm>> {
        Arc::new(Mutex::new(ConnectionFsm::new()))
    }

    fn audit() -> Arc<AuditPipeline> {
        let client = Arc::new(ControlPlaneClient::new("http://localhost:1").unwrap());
        Arc::new(
            AuditPipeline::new(
                client,
                false,
                std::env::temp_dir().join(format!("clawforge-sk-test-{:?}.jsonl", std::thread::current().id())),
                clawforge_core::policy::AuditLevel::Off,
                "u",
                "o",
                100,
                1000,
                Duration::from_secs(30),
            )
            .unwrap(),
        )
    }

    fn session(expires_in_ms: i64) -> SessionTokens {
        SessionTokens {
            access_token: "old".into(),
            refresh_token: Some("refresh".into()),
            expires_at: (now_ms() as i64 + expires_in_ms).max(0) as u64,
            user_id: "u".into(),
            org_id: "o".into(),
        }
    }

    #[tokio::test]
    async fn not_due_is_a_no_op() {
        let client = Arc::new(ControlPlaneClient::new("http://localhost:1").unwrap());
        let dir = tempfile::tempdir().unwrap();
        let keeper = SessionKeeper::new(
            client,
            fsm(),
            audit(),
            Some(session(60 * 60 * 1000)),
            dir.path().join("session.json"),
            Duration::from_secs(60),
            None,
        );
        keeper.check().await;
        assert_eq!(keeper.current_session().unwrap().access_token, "old");
    }

    #[tokio::test]
    async fn due_refresh_persists_and_invokes_callback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/exchange"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "accessToken": "new",
                "refreshToken": "new-refresh",
                "expiresAt": now_ms() + 3_600_000,
                "userId": "u",
                "orgId": "o",
            })))
            .mount(&server)
            .await;

        let client = Arc::new(ControlPlaneClient::new(server.uri()).unwrap());
        let dir = tempfile::tempdir().unwrap();
        let session_path = dir.path().join("session.json");
        let called = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let called_clone = called.clone();
        let keeper = SessionKeeper::new(
            client,
            fsm(),
            audit(),
            Some(session(1000)),
            session_path.clone(),
            Duration::from_secs(60),
            Some(Box::new(move |_| called_clone.store(true, Ordering::SeqCst))),
        );
        keeper.check().await;

        assert_eq!(keeper.current_session().unwrap().access_token, "new");
        assert!(called.load(Ordering::SeqCst));
        assert!(session_path.exists());
    }

    #[tokio::test]
    async fn unauthorized_refresh_sets_fsm_unauthenticated() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).and(path("/api/v1/auth/exchange")).respond_with(ResponseTemplate::new(401)).mount(&server).await;

        let client = Arc::new(ControlPlaneClient::new(server.uri()).unwrap());
        let dir = tempfile::tempdir().unwrap();
        let fsm_handle = fsm();
        let keeper = SessionKeeper::new(
            client,
            fsm_handle.clone(),
            audit(),
            Some(session(1000)),
            dir.path().join("session.json"),
            Duration::from_secs(60),
            None,
        );
        keeper.check().await;

        assert_eq!(
            fsm_handle.lock().unwrap().get_status().state,
            clawforge_core::ConnectionState::Unauthenticated
        );
    }

    #[tokio::test]
    async fn missing_refresh_token_is_a_no_op() {
        let client = Arc::new(ControlPlaneClient::new("http://localhost:1").unwrap());
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(1000);
        s.refresh_token = None;
        let keeper = SessionKeeper::new(client, fsm(), audit(), Some(s), dir.path().join("session.json"), Duration::from_secs(60), None);
        keeper.check().await;
        assert_eq!(keeper.current_session().unwrap().access_token, "old");
    }
}
