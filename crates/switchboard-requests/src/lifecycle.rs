//! Session teardown hooks.
//!
//! Whoever tears down a session calls one of these so that no request tied
//! to it stays open. They are the only paths to `cancelled` and `orphaned`.

use tracing::info;

use crate::registry::OrchestratorRequestRegistry;
use crate::state::Settlement;
use crate::types::OrchestratorRequestRecord;

const CHILD_TERMINATED: &str = "child session terminated";
const PARENT_TERMINATED: &str = "parent session terminated";

impl OrchestratorRequestRegistry {
    /// Cancel every open request raised by `child_session_key`.
    ///
    /// Waiters receive the cancelled record. Returns the records that changed.
    pub fn cancel_requests_for_child(
        &self,
        child_session_key: &str,
    ) -> Vec<OrchestratorRequestRecord> {
        let cancelled = self.settle_all(
            |r| r.child_session_key == child_session_key,
            || Settlement::Cancelled {
                error: CHILD_TERMINATED.into(),
            },
        );
        if !cancelled.is_empty() {
            info!(
                child_session_key,
                count = cancelled.len(),
                "cancelled orchestrator requests for child"
            );
        }
        cancelled
    }

    /// Orphan every open request addressed to `parent_session_key`.
    ///
    /// Waiters receive the orphaned record. Returns the records that changed.
    pub fn orphan_requests_for_parent(
        &self,
        parent_session_key: &str,
    ) -> Vec<OrchestratorRequestRecord> {
        let orphaned = self.settle_all(
            |r| r.parent_session_key == parent_session_key,
            || Settlement::Orphaned {
                error: PARENT_TERMINATED.into(),
            },
        );
        if !orphaned.is_empty() {
            info!(
                parent_session_key,
                count = orphaned.len(),
                "orphaned orchestrator requests for parent"
            );
        }
        orphaned
    }

    fn settle_all<P, S>(&self, pred: P, settlement: S) -> Vec<OrchestratorRequestRecord>
    where
        P: Fn(&OrchestratorRequestRecord) -> bool,
        S: Fn() -> Settlement,
    {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();
        let targets = state.open_where(pred);

        let mut settled = Vec::with_capacity(targets.len());
        for target in targets {
            if let Some(record) = state.settle(&target.request_id, settlement(), now) {
                self.emit_settled(record.clone());
                settled.push(record);
            }
        }
        if !settled.is_empty() {
            self.persist(&state);
        }
        settled
    }
}
