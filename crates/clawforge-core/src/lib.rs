//! clawforge core primitives and shared types.
//!
//! This crate has no governance logic of its own: it holds the data model
//! (`policy`, `audit`, `session`, `connection`), the shared mutable state
//! handle (`state`), configuration (`config`), id/clock helpers (`ids`), and
//! the atomic-write primitive (`atomic_write`) that every other
//! `clawforge-*` crate builds on.

pub mod atomic_write;
pub mod audit;
pub mod config;
pub mod connection;
pub mod error;
pub mod ids;
pub mod policy;
pub mod session;
pub mod state;

pub use audit::{AuditEvent, EventType, Outcome, PartialAuditEvent};
pub use config::{EngineConfig, OfflineMode};
pub use connection::{ConnectionState, ConnectionStatus};
pub use error::CoreError;
pub use policy::{AuditLevel, KillSwitchState, OfflineOverride, OrgPolicy, ToolSelector};
pub use session::SessionTokens;
pub use state::{EnforcerSnapshot, EnforcerState};
