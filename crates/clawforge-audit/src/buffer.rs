//! `DurableAuditBuffer`: the on-disk overflow/crash-recovery store for
//! not-yet-acknowledged audit events.

use std::path::{Path, PathBuf};

use clawforge_core::AuditEvent;

/// Reads, rewrites, and clears the whole-file JSONL buffer on disk.
pub struct DurableAuditBuffer {
    path: PathBuf,
}

impl DurableAuditBuffer {
    /// Bind to the buffer file at `path`. Does not touch the disk.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load events from disk, skipping malformed lines silently. Returns an
    /// empty vec if the file does not exist.
    pub fn load(&self) -> std::io::Result<Vec<AuditEvent>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        Ok(contents
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<AuditEvent>(line) {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed audit buffer line");
                    None
                }
            })
            .collect())
    }

    /// Overwrite the file with exactly `events`, one JSON object per line.
    pub fn persist(&self, events: &[AuditEvent]) -> std::io::Result<()> {
        let mut out = String::new();
        for event in events {
            out.push_str(&serde_json::to_string(event).expect("AuditEvent always serializes"));
            out.push('\n');
        }
        clawforge_core::atomic_write::write_owner_only(&self.path, out.as_bytes())
    }

    /// Remove all events from disk (called after a fully-acknowledged flush).
    pub fn clear(&self) -> std::io::Result<()> {
        self.persist(&[])
    }

    /// The bound file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
