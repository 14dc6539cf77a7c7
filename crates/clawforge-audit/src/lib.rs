//! Durable, batched audit-event pipeline.
//!
//! Accepts events from the Enforcer and other components on a non-blocking
//! hot path, ships them to the control plane in batches, and survives both
//! network partitions and process crashes.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod buffer;
pub mod error;
pub mod pipeline;

pub use buffer::DurableAuditBuffer;
pub use error::AuditError;
pub use pipeline::{AuditPipeline, FlushOutcome};
