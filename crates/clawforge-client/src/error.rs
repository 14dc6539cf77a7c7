//! Errors produced directly by `clawforge-client` (as opposed to classified
//! HTTP outcomes, which use `ClientResponse` instead of `Result`).

use thiserror::Error;

/// Construction/serialization failures, not per-call HTTP outcomes.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The response body was not valid JSON / did not match the expected shape.
    #[error("invalid response body: {0}")]
    InvalidBody(#[from] serde_json::Error),

    /// Failed to build the underlying `reqwest::Client`.
    #[error("failed to build http client: {0}")]
    Build(reqwest::Error),
}
