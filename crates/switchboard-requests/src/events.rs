//! Broadcast of request lifecycle events.
//!
//! The registry never calls out to deliver a request to its parent. A
//! delivery collaborator subscribes here instead, reacts to `Created`, and
//! reports back through `mark_notified`.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::broadcast;

use crate::types::{OrchestratorRequestRecord, RequestStatus};

/// Default broadcast channel capacity.
const DEFAULT_CAPACITY: usize = 256;

/// A state change, carrying the post-transition record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "record", rename_all = "snake_case")]
pub enum RequestEvent {
    /// A request was admitted.
    Created(OrchestratorRequestRecord),
    /// The parent has been told about it.
    Notified(OrchestratorRequestRecord),
    /// The parent answered.
    Resolved(OrchestratorRequestRecord),
    /// The deadline passed first.
    TimedOut(OrchestratorRequestRecord),
    /// The child session went away.
    Cancelled(OrchestratorRequestRecord),
    /// The parent session went away.
    Orphaned(OrchestratorRequestRecord),
}

impl RequestEvent {
    /// Event for a record that just became terminal.
    pub(crate) fn settled(record: OrchestratorRequestRecord) -> Self {
        match record.status {
            RequestStatus::Resolved => Self::Resolved(record),
            RequestStatus::Timeout => Self::TimedOut(record),
            RequestStatus::Cancelled => Self::Cancelled(record),
            RequestStatus::Orphaned => Self::Orphaned(record),
            RequestStatus::Pending => Self::Created(record),
            RequestStatus::Notified => Self::Notified(record),
        }
    }

    /// The record this event carries.
    pub fn record(&self) -> &OrchestratorRequestRecord {
        match self {
            Self::Created(r)
            | Self::Notified(r)
            | Self::Resolved(r)
            | Self::TimedOut(r)
            | Self::Cancelled(r)
            | Self::Orphaned(r) => r,
        }
    }

    /// Event type string.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::Notified(_) => "notified",
            Self::Resolved(_) => "resolved",
            Self::TimedOut(_) => "timed_out",
            Self::Cancelled(_) => "cancelled",
            Self::Orphaned(_) => "orphaned",
        }
    }
}

/// Non-blocking fan-out of [`RequestEvent`]s.
///
/// Slow receivers lag and lose events rather than blocking the registry.
pub struct RequestEventEmitter {
    tx: broadcast::Sender<RequestEvent>,
    emit_count: AtomicU64,
}

impl RequestEventEmitter {
    /// Create an emitter with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create an emitter with a custom capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            emit_count: AtomicU64::new(0),
        }
    }

    /// Emit to all current subscribers. Returns how many received it.
    pub fn emit(&self, event: RequestEvent) -> usize {
        let _ = self.emit_count.fetch_add(1, Ordering::Relaxed);
        self.tx.send(event).unwrap_or(0)
    }

    /// Receive every event emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<RequestEvent> {
        self.tx.subscribe()
    }

    /// Total events emitted.
    pub fn emit_count(&self) -> u64 {
        self.emit_count.load(Ordering::Relaxed)
    }
}

impl Default for RequestEventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
