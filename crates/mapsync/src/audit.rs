//! Audit trail of writes.
//!
//! The engine reports every row write (successful or failed), every column it
//! wrote and the end of each run to an [`AuditSink`]. Recording is
//! fire-and-forget: sinks never block the run and never report errors back.
//!
//! # Design Pattern
//!
//! Strategy: the engine holds an `Arc<dyn AuditSink>` and does not know where
//! events end up.
//!
//! - [`TracingAuditSink`]: structured `tracing` events (target `mapsync::audit`)
//! - [`ChannelAuditSink`]: unbounded tokio channel, for a separate persister task
//! - [`MemoryAuditSink`]: in-memory buffer for tests
//! - [`NoOpAuditSink`]: discards events, warning once

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// How a row reached the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteAction {
    Inserted,
    Upserted,
    Updated,
    Linked,
    Unlinked,
}

/// One audit event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEvent {
    RowWritten {
        run_id: Uuid,
        table: String,
        scope: String,
        action: WriteAction,
        generated_id: Option<i64>,
    },
    RowFailed {
        run_id: Uuid,
        table: String,
        scope: String,
        category: String,
        error: String,
    },
    FieldWritten {
        run_id: Uuid,
        table: String,
        scope: String,
        column: String,
        value: String,
        /// Where the value came from (`constant`, a path, `fixed`, `backfill`, ...).
        origin: String,
    },
    RunFinished {
        run_id: Uuid,
        record_id: String,
        diagnostics: usize,
        duration_ms: u64,
    },
}

impl AuditEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            AuditEvent::RowWritten { .. } => "row_written",
            AuditEvent::RowFailed { .. } => "row_failed",
            AuditEvent::FieldWritten { .. } => "field_written",
            AuditEvent::RunFinished { .. } => "run_finished",
        }
    }
}

/// Destination for audit events.
pub trait AuditSink: Send + Sync {
    /// Record one event. Must not block and must not fail.
    fn record(&self, event: AuditEvent);
}

/// Emits audit events as `tracing` events.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        match &event {
            AuditEvent::RowWritten {
                run_id,
                table,
                scope,
                action,
                generated_id,
            } => info!(
                target: "mapsync::audit",
                %run_id, table = %table, scope = %scope, action = ?action, generated_id = ?generated_id,
                "row written"
            ),
            AuditEvent::RowFailed {
                run_id,
                table,
                scope,
                category,
                error,
            } => warn!(
                target: "mapsync::audit",
                %run_id, table = %table, scope = %scope, category = %category,
                "row failed: {}", error
            ),
            AuditEvent::FieldWritten {
                run_id,
                table,
                scope,
                column,
                value,
                origin,
            } => tracing::debug!(
                target: "mapsync::audit",
                %run_id, table = %table, scope = %scope, column = %column, origin = %origin,
                "field = {}", value
            ),
            AuditEvent::RunFinished {
                run_id,
                record_id,
                diagnostics,
                duration_ms,
            } => info!(
                target: "mapsync::audit",
                %run_id, record_id = %record_id, diagnostics, duration_ms,
                "run finished"
            ),
        }
    }
}

/// Forwards events to an unbounded channel.
///
/// Sending never blocks; events are dropped silently once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelAuditSink {
    tx: mpsc::UnboundedSender<AuditEvent>,
}

impl ChannelAuditSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AuditEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl AuditSink for ChannelAuditSink {
    fn record(&self, event: AuditEvent) {
        let _ = self.tx.send(event);
    }
}

/// Buffers events in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Recorded events of one kind.
    pub fn of_kind(&self, kind: &str) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.kind() == kind)
            .collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Discards events. Logs a warning on first use.
pub struct NoOpAuditSink {
    warned: AtomicBool,
}

impl NoOpAuditSink {
    pub fn new() -> Self {
        Self {
            warned: AtomicBool::new(false),
        }
    }
}

impl Default for NoOpAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for NoOpAuditSink {
    fn record(&self, _event: AuditEvent) {
        if !self.warned.swap(true, Ordering::SeqCst) {
            warn!("Using no-op audit sink: writes will not be audited.");
        }
    }
}
