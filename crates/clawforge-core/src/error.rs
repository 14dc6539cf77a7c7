//! The shared error type returned by `clawforge-core`'s own fallible calls.
//!
//! Downstream crates define their own `thiserror` enums and wrap `CoreError`
//! via `#[from]` where they call into this crate.

use thiserror::Error;

/// Errors produced by `clawforge-core`.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Failed to read or write a file under the config root.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// `config.toml` did not parse as valid TOML / `EngineConfig`.
    #[error("invalid config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// A JSON payload failed to (de)serialize.
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}
