//! Exponential backoff with jitter for the audit-ship call.
//!
//! Only `post_audit_events` retries at this layer. Heartbeat and
//! SessionKeeper each have their own tick-level cadence and must not be
//! retried here too, or a single tick could silently turn into minutes of
//! blocking.

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};

/// Retry policy for a single logical HTTP call.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries (not counting the initial attempt).
    pub max_retries: u32,
    /// Initial backoff delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum backoff delay.
    pub max_delay: Duration,
    /// Jitter factor for down-jitter (0.25 = up to 25% reduction).
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter_factor: 0.25,
        }
    }
}

/// Whether an HTTP status is worth retrying.
#[must_use]
pub fn should_retry(status: StatusCode) -> bool {
    matches!(status.as_u16(), 408 | 409 | 429 | 500 | 502 | 503 | 504 | 520..=599)
}

/// Exponential backoff with down-jitter, capped at `max_delay`.
#[must_use]
pub fn calculate_retry_delay(backoff_step: u32, config: &RetryConfig) -> Duration {
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(backoff_step as i32);
    let capped = base.min(config.max_delay.as_secs_f64());
    let jitter = 1.0 - rand::random::<f64>() * config.jitter_factor;
    Duration::from_secs_f64(capped * jitter)
}

/// Outcome of a retried send, structurally distinguishing success from every
/// kind of failure so callers can't mistake one for the other.
#[derive(Debug)]
pub enum RetryOutcome {
    /// 2xx response.
    Success(Response),
    /// Non-2xx response after exhausting retries (or a non-retryable status).
    HttpError(Response),
    /// Transport failure (connect/timeout) after exhausting retries.
    TransportError(reqwest::Error),
}

fn is_retryable_transport_error(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout() || error.is_request()
}

/// Send a request, retrying on retryable statuses and transport errors.
pub async fn send_with_retry<F>(build_request: F, config: &RetryConfig) -> RetryOutcome
where
    F: Fn() -> RequestBuilder,
{
    for attempt in 0..=config.max_retries {
        match build_request().send().await {
            Ok(response) => {
                if response.status().is_success() {
                    return RetryOutcome::Success(response);
                }
                if attempt < config.max_retries && should_retry(response.status()) {
                    let delay = calculate_retry_delay(attempt, config);
                    tracing::debug!(status = %response.status(), attempt, delay_ms = delay.as_millis(), "retrying audit ship");
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return RetryOutcome::HttpError(response);
            }
            Err(e) => {
                if attempt < config.max_retries && is_retryable_transport_error(&e) {
                    let delay = calculate_retry_delay(attempt, config);
                    tracing::debug!(error = %e, attempt, delay_ms = delay.as_millis(), "retrying audit ship after transport error");
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return RetryOutcome::TransportError(e);
            }
        }
    }
    unreachable!("loop always returns by the final attempt")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        assert!(should_retry(StatusCode::TOO_MANY_REQUESTS));
        assert!(should_retry(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!should_retry(StatusCode::BAD_REQUEST));
        assert!(!should_retry(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn delay_grows_and_is_capped() {
        let config = RetryConfig::default();
        for _ in 0..50 {
            let d0 = calculate_retry_delay(0, &config);
            assert!(d0 >= Duration::from_millis(375) && d0 <= Duration::from_millis(500));
            let d1 = calculate_retry_delay(1, &config);
            assert!(d1 >= Duration::from_millis(750) && d1 <= Duration::from_millis(1000));
        }
        let capped = calculate_retry_delay(20, &config);
        assert!(capped <= config.max_delay);
    }
}
