//! `clawforge-audit`'s own error type.
//!
//! Only construction can fail; once running, the pipeline reduces every
//! runtime error (write failure, ship failure) to a log line and a requeue,
//! never to a propagated `Result`.

use thiserror::Error;

/// Errors that can occur while constructing an `AuditPipeline`.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Failed to read or write the durable audit buffer file.
    #[error(transparent)]
    Core(#[from] clawforge_core::CoreError),
}
