//! Typed HTTP client for the control plane, shared by Heartbeat,
//! SessionKeeper, and AuditPipeline.
//!
//! Holds one `reqwest::Client` and the current access token behind a lock
//! that rotation (`set_access_token`) swaps under. Only `post_audit_events`
//! retries at this layer (see [`retry`]); the other two endpoints are single
//! attempts, since their callers already have their own tick-level cadence.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod retry;
pub mod types;

use std::sync::RwLock;
use std::time::Duration;

use reqwest::StatusCode;

pub use error::ClientError;
pub use retry::RetryConfig;
pub use types::{AuditEventsRequest, AuthGrant, AuthResponse, HeartbeatResponse};

use clawforge_core::AuditEvent;

/// The result of one control-plane call, classified so callers never need to
/// re-parse a status code.
#[derive(Debug)]
pub enum ClientResponse<T> {
    /// 2xx response, body decoded into `T`.
    Success(T),
    /// Non-2xx response other than 401.
    HttpError(u16),
    /// 401: the access token was rejected.
    Unauthorized,
    /// The request never reached the server, or the connection failed.
    TransportError(String),
}

/// A typed, token-aware control-plane client.
pub struct ControlPlaneClient {
    http: reqwest::Client,
    base_url: String,
    access_token: RwLock<Option<String>>,
    audit_retry: RetryConfig,
}

impl ControlPlaneClient {
    /// Build a client pointed at `base_url` with a 10-second connect/request
    /// timeout.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(ClientError::Build)?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            access_token: RwLock::new(None),
            audit_retry: RetryConfig::default(),
        })
    }

    /// Rotate the bearer token attached to every subsequent authenticated
    /// call. Called by SessionKeeper's refresh callback.
    pub fn set_access_token(&self, token: impl Into<String>) {
        *self.access_token.write().expect("access token lock poisoned") = Some(token.into());
    }

    fn bearer(&self) -> Option<String> {
        self.access_token.read().expect("access token lock poisoned").clone()
    }

    /// `POST /api/v1/auth/exchange`.
    pub async fn exchange_token(&self, grant: &AuthGrant) -> ClientResponse<AuthResponse> {
        let url = format!("{}/api/v1/auth/exchange", self.base_url);
        let result = self.http.post(&url).json(grant).send().await;
        self.classify(result).await
    }

    /// `GET /api/v1/heartbeat/{orgId}/{userId}`.
    pub async fn get_heartbeat(&self, org_id: &str, user_id: &str) -> ClientResponse<HeartbeatResponse> {
        let url = format!("{}/api/v1/heartbeat/{org_id}/{user_id}", self.base_url);
        let mut req = self.http.get(&url);
        if let Some(token) = self.bearer() {
            req = req.bearer_auth(token);
        }
        let result = req.send().await;
        self.classify(result).await
    }

    /// `POST /api/v1/audit/{orgId}/events`. The only endpoint that retries
    /// transport-level failures within the call.
    pub async fn post_audit_events(&self, org_id: &str, events: &[AuditEvent]) -> ClientResponse<()> {
        let url = format!("{}/api/v1/audit/{org_id}/events", self.base_url);
        let body = AuditEventsRequest { events };
        let token = self.bearer();
        let outcome = retry::send_with_retry(
            || {
                let mut req = self.http.post(&url).json(&body);
                if let Some(token) = &token {
                    req = req.bearer_auth(token);
                }
                req
            },
            &self.audit_retry,
        )
        .await;

        match outcome {
            retry::RetryOutcome::Success(_) => ClientResponse::Success(()),
            retry::RetryOutcome::HttpError(resp) if resp.status() == StatusCode::UNAUTHORIZED => {
                ClientResponse::Unauthorized
            }
            retry::RetryOutcome::HttpError(resp) => ClientResponse::HttpError(resp.status().as_u16()),
            retry::RetryOutcome::TransportError(e) => ClientResponse::TransportError(e.to_string()),
        }
    }

    async fn classify<T: serde::de::DeserializeOwned>(
        &self,
        result: Result<reqwest::Response, reqwest::Error>,
    ) -> ClientResponse<T> {
        let response = match result {
            Ok(r) => r,
            Err(e) => return ClientResponse::TransportError(e.to_string()),
        };
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return ClientResponse::Unauthorized;
        }
        if !status.is_success() {
            return ClientResponse::HttpError(status.as_u16());
        }
        match response.json::<T>().await {
            Ok(body) => ClientResponse::Success(body),
            Err(e) => ClientResponse::TransportError(e.to_string()),
        }
    }
}
