//! `AuditPipeline`: buffers, batches, and ships audit events.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use clawforge_client::ControlPlaneClient;
use clawforge_core::{AuditEvent, AuditLevel, PartialAuditEvent};
use tokio::task::JoinHandle;

use crate::buffer::DurableAuditBuffer;
use crate::error::AuditError;

const WARN_FRACTION: f64 = 0.8;

/// What happened on a given flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing buffered; nothing to do.
    Empty,
    /// No control plane configured; the batch was persisted to disk.
    PersistedOffline,
    /// The batch was accepted by the control plane (2xx).
    Sent,
    /// The control plane rejected or was unreachable; the batch was
    /// prepended back onto the in-memory buffer and re-persisted.
    Failed,
}

struct Identity {
    user_id: String,
    org_id: String,
}

/// Buffers audit events in memory, persists them durably, and ships batches
/// to the control plane.
pub struct AuditPipeline {
    client: Arc<ControlPlaneClient>,
    control_plane_configured: bool,
    buffer: Mutex<VecDeque<AuditEvent>>,
    disk: DurableAuditBuffer,
    audit_level: RwLock<AuditLevel>,
    identity: RwLock<Identity>,
    batch_size: usize,
    max_buffer_size: usize,
    flush_interval: Duration,
    warned_high_water: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl AuditPipeline {
    /// Construct the pipeline, recovering any events left on disk from a
    /// prior process's unclean shutdown.
    pub fn new(
        client: Arc<ControlPlaneClient>,
        control_plane_configured: bool,
        disk_path: impl Into<std::path::PathBuf>,
        audit_level: AuditLevel,
        user_id: impl Into<String>,
        org_id: impl Into<String>,
        batch_size: usize,
        max_buffer_size: usize,
        flush_interval: Duration,
    ) -> Result<Self, AuditError> {
        let disk = DurableAuditBuffer::new(disk_path);
        let mut recovered: VecDeque<AuditEvent> = disk
            .load()
            .map_err(clawforge_core::CoreError::Io)?
            .into();
        while recovered.len() > max_buffer_size {
            recovered.pop_front();
        }
        Ok(Self {
            client,
            control_plane_configured,
            buffer: Mutex::new(recovered),
            disk,
            audit_level: RwLock::new(audit_level),
            identity: RwLock::new(Identity { user_id: user_id.into(), org_id: org_id.into() }),
            batch_size,
            max_buffer_size,
            flush_interval,
            warned_high_water: AtomicBool::new(false),
            task: Mutex::new(None),
        })
    }

    /// Update the bearer token attached to audit-ship requests. Delegates to
    /// the shared client.
    pub fn update_access_token(&self, token: impl Into<String>) {
        self.client.set_access_token(token);
    }

    /// Hot reconfiguration of how much detail gets recorded.
    pub fn update_audit_level(&self, level: AuditLevel) {
        *self.audit_level.write().expect("audit level lock poisoned") = level;
    }

    /// Update the user/org a subsequently-enqueued event is attributed to
    /// (e.g. after SessionKeeper rotates identity).
    pub fn update_identity(&self, user_id: impl Into<String>, org_id: impl Into<String>) {
        let mut guard = self.identity.write().expect("identity lock poisoned");
        guard.user_id = user_id.into();
        guard.org_id = org_id.into();
    }

    /// Stamp and enqueue a partial event. Non-blocking; never touches I/O.
    /// A no-op when the audit level is `off`.
    pub fn enqueue(&self, mut partial: PartialAuditEvent) {
        let level = *self.audit_level.read().expect("audit level lock poisoned");
        if level == AuditLevel::Off {
            return;
        }
        if level != AuditLevel::Full {
            partial.metadata = None;
        }
        let identity = self.identity.read().expect("identity lock poisoned");
        let event = AuditEvent {
            enqueue_seq: clawforge_core::ids::next_enqueue_seq(),
            user_id: identity.user_id.clone(),
            org_id: identity.org_id.clone(),
            agent_id: partial.agent_id,
            session_key: partial.session_key,
            event_type: partial.event_type,
            tool_name: partial.tool_name,
            outcome: partial.outcome,
            reason: partial.reason,
            timestamp: clawforge_core::ids::now_ms(),
            metadata: partial.metadata,
        };
        drop(identity);

        let mut buffer = self.buffer.lock().expect("audit buffer lock poisoned");
        buffer.push_back(event);
        while buffer.len() > self.max_buffer_size {
            buffer.pop_front();
            tracing::warn!("audit buffer overflow, dropped oldest event");
        }
        self.maybe_warn_high_water(buffer.len());
    }

    fn maybe_warn_high_water(&self, len: usize) {
        let high_water = (self.max_buffer_size as f64 * WARN_FRACTION) as usize;
        if len >= high_water {
            if !self.warned_high_water.swap(true, Ordering::Relaxed) {
                tracing::warn!(len, capacity = self.max_buffer_size, "audit buffer above 80% capacity");
            }
        } else {
            self.warned_high_water.store(false, Ordering::Relaxed);
        }
    }

    /// Whether a flush is currently due because the buffer reached the
    /// batch-size trigger.
    #[must_use]
    pub fn batch_size_reached(&self) -> bool {
        self.buffer.lock().expect("audit buffer lock poisoned").len() >= self.batch_size
    }

    /// Ship (or persist) all currently-buffered events as one batch.
    pub async fn flush(&self) -> FlushOutcome {
        let batch: Vec<AuditEvent> = {
            let mut buffer = self.buffer.lock().expect("audit buffer lock poisoned");
            if buffer.is_empty() {
                return FlushOutcome::Empty;
            }
            buffer.drain(..).collect()
        };

        if !self.control_plane_configured {
            if let Err(e) = self.disk.persist(&batch) {
                tracing::error!(error = %e, "failed to persist audit batch to disk");
            }
            return FlushOutcome::PersistedOffline;
        }

        let org_id = self.identity.read().expect("identity lock poisoned").org_id.clone();
        match self.client.post_audit_events(&org_id, &batch).await {
            clawforge_client::ClientResponse::Success(()) => {
                if let Err(e) = self.disk.clear() {
                    tracing::error!(error = %e, "failed to clear durable audit buffer after flush");
                }
                FlushOutcome::Sent
            }
            other => {
                tracing::warn!(outcome = ?other, "audit ship failed, requeuing batch");
                self.requeue_failed_batch(batch);
                FlushOutcome::Failed
            }
        }
    }

    fn requeue_failed_batch(&self, batch: Vec<AuditEvent>) {
        let mut buffer = self.buffer.lock().expect("audit buffer lock poisoned");
        for event in batch.into_iter().rev() {
            buffer.push_front(event);
        }
        while buffer.len() > self.max_buffer_size {
            buffer.pop_front();
        }
        if let Err(e) = self.disk.persist(&buffer.iter().cloned().collect::<Vec<_>>()) {
            tracing::error!(error = %e, "failed to re-persist audit buffer after failed flush");
        }
    }

    /// Start the periodic flush task. The pipeline must be held behind an
    /// `Arc` so the task can outlive the calling scope.
    pub fn start(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(this.flush_interval);
            loop {
                interval.tick().await;
                let _ = this.flush().await;
            }
        });
        *self.task.lock().expect("task lock poisoned") = Some(handle);
    }

    /// Stop the periodic task and perform one final flush.
    pub async fn stop(&self) {
        if let Some(handle) = self.task.lock().expect("task lock poisoned").take() {
            handle.abort();
        }
        let _ = self.flush().await;
    }
}
