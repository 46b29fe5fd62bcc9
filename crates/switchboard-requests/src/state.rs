//! Record store and state machine.
//!
//! [`RegistryState`] is the table the registry guards with a single mutex.
//! Every method here runs synchronously under that lock, so each
//! check-then-transition is atomic and the first terminal transition for a
//! request is the only one that lands.

use std::collections::HashMap;

use switchboard_core::RequestId;
use tokio::sync::watch;

use crate::admission::RateLimitLog;
use crate::errors::RequestError;
use crate::types::{OrchestratorRequestRecord, RegistryStats, RequestStatus, RequestTable};

/// Sender half of a request's waiter channel. Holds `Some(record)` once the
/// request is terminal.
pub(crate) type WaiterSender = watch::Sender<Option<OrchestratorRequestRecord>>;

/// How an open request ends.
#[derive(Clone, Debug)]
pub(crate) enum Settlement {
    Resolved { response: String, resolved_by: String },
    TimedOut { error: String },
    Cancelled { error: String },
    Orphaned { error: String },
}

impl Settlement {
    fn status(&self) -> RequestStatus {
        match self {
            Self::Resolved { .. } => RequestStatus::Resolved,
            Self::TimedOut { .. } => RequestStatus::Timeout,
            Self::Cancelled { .. } => RequestStatus::Cancelled,
            Self::Orphaned { .. } => RequestStatus::Orphaned,
        }
    }
}

/// The in-memory table plus everything keyed off it.
#[derive(Default)]
pub(crate) struct RegistryState {
    pub(crate) records: RequestTable,
    pub(crate) rate_log: RateLimitLog,
    waiters: HashMap<RequestId, WaiterSender>,
}

impl RegistryState {
    /// Open records matching `pred`, oldest first.
    pub(crate) fn open_where<F>(&self, pred: F) -> Vec<OrchestratorRequestRecord>
    where
        F: Fn(&OrchestratorRequestRecord) -> bool,
    {
        let mut open: Vec<_> = self
            .records
            .values()
            .filter(|r| r.is_open() && pred(r))
            .cloned()
            .collect();
        open.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.request_id.cmp(&b.request_id))
        });
        open
    }

    /// Move an open record to its terminal state and wake its waiters.
    ///
    /// Returns `None` when the record is missing or already terminal.
    pub(crate) fn settle(
        &mut self,
        id: &RequestId,
        settlement: Settlement,
        now: i64,
    ) -> Option<OrchestratorRequestRecord> {
        let record = self.records.get_mut(id)?;
        if record.is_terminal() {
            return None;
        }
        record.status = settlement.status();
        record.resolved_at = Some(now);
        match settlement {
            Settlement::Resolved {
                response,
                resolved_by,
            } => {
                record.response = Some(response);
                record.resolved_by_session_key = Some(resolved_by);
            }
            Settlement::TimedOut { error }
            | Settlement::Cancelled { error }
            | Settlement::Orphaned { error } => {
                record.error = Some(error);
            }
        }
        let settled = record.clone();
        self.wake(&settled);
        Some(settled)
    }

    /// Flip `pending` to `notified`. Returns the record and whether it changed.
    pub(crate) fn mark_notified(
        &mut self,
        id: &RequestId,
    ) -> Result<(OrchestratorRequestRecord, bool), RequestError> {
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| RequestError::NotFound(id.clone()))?;
        match record.status {
            RequestStatus::Pending => {
                record.status = RequestStatus::Notified;
                Ok((record.clone(), true))
            }
            RequestStatus::Notified => Ok((record.clone(), false)),
            status => Err(RequestError::AlreadyTerminal {
                request_id: id.clone(),
                status,
            }),
        }
    }

    /// IDs of open records whose deadline is at or before `now`.
    pub(crate) fn overdue(&self, now: i64) -> Vec<RequestId> {
        self.records
            .values()
            .filter(|r| r.is_open() && r.timeout_at <= now)
            .map(|r| r.request_id.clone())
            .collect()
    }

    /// Delete terminal records older than `retention_ms`. Returns how many went.
    pub(crate) fn evict_expired(&mut self, now: i64, retention_ms: i64) -> usize {
        let before = self.records.len();
        self.records
            .retain(|_, r| r.is_open() || now - r.terminal_since() <= retention_ms);
        before - self.records.len()
    }

    /// Insert restored records whose IDs are not already live.
    pub(crate) fn merge_restored(&mut self, restored: RequestTable) -> usize {
        let mut merged = 0;
        for (id, record) in restored {
            if let std::collections::hash_map::Entry::Vacant(slot) = self.records.entry(id) {
                let _ = slot.insert(record);
                merged += 1;
            }
        }
        merged
    }

    // ── waiters ─────────────────────────────────────────────────────

    /// Register interest in an open request.
    pub(crate) fn subscribe(
        &mut self,
        id: &RequestId,
    ) -> watch::Receiver<Option<OrchestratorRequestRecord>> {
        self.waiters
            .entry(id.clone())
            .or_insert_with(|| watch::channel(None).0)
            .subscribe()
    }

    /// Drop the registration for `id` once no receiver is left.
    pub(crate) fn release(&mut self, id: &RequestId) {
        if self
            .waiters
            .get(id)
            .is_some_and(|tx| tx.receiver_count() == 0)
        {
            let _ = self.waiters.remove(id);
        }
    }

    fn wake(&mut self, record: &OrchestratorRequestRecord) {
        if let Some(tx) = self.waiters.remove(&record.request_id) {
            // no receivers left is fine; the registration just goes away
            let _ = tx.send(Some(record.clone()));
        }
    }

    /// Drop every waiter registration. Suspended waiters observe a closed channel.
    pub(crate) fn clear_waiters(&mut self) {
        self.waiters.clear();
    }

    /// Requests with a live waiter registration.
    pub(crate) fn waiter_count(&self) -> usize {
        self.waiters.len()
    }

    pub(crate) fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            total: self.records.len(),
            waiters: self.waiters.len(),
            ..RegistryStats::default()
        };
        for record in self.records.values() {
            match record.status {
                RequestStatus::Pending => stats.pending += 1,
                RequestStatus::Notified => stats.notified += 1,
                RequestStatus::Resolved => stats.resolved += 1,
                RequestStatus::Timeout => stats.timed_out += 1,
                RequestStatus::Cancelled => stats.cancelled += 1,
                RequestStatus::Orphaned => stats.orphaned += 1,
            }
        }
        stats
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
