//! The orchestrator request registry.
//!
//! One [`OrchestratorRequestRegistry`] owns the request table, the per-child
//! rate log and the waiter registrations. It is constructed once by the
//! surrounding service and shared behind an `Arc`.
//!
//! Every mutation takes the table lock, checks, transitions, queues a
//! persistence snapshot and emits an event before releasing it. Nothing
//! awaits while the lock is held.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use switchboard_core::{Clock, RequestId, SystemClock};
use switchboard_settings::RequestSettings;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use crate::admission::{admit, clamp_timeout};
use crate::config::{RegistryConfig, as_millis_i64};
use crate::errors::{ConfigError, RequestError};
use crate::events::{RequestEvent, RequestEventEmitter};
use crate::persister::RecordPersister;
use crate::state::{RegistryState, Settlement};
use crate::store::{RequestStore, open_store};
use crate::sweeper::SweeperHandle;
use crate::types::{
    CreateRequestParams, OrchestratorRequestRecord, RegistryStats, RequestStatus,
};

/// Tracks child-to-parent questions from creation to a single terminal state.
pub struct OrchestratorRequestRegistry {
    pub(crate) config: RegistryConfig,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) state: Mutex<RegistryState>,
    persister: RecordPersister,
    events: RequestEventEmitter,
    pub(crate) sweeper: Mutex<Option<SweeperHandle>>,
    restored: AtomicBool,
}

impl OrchestratorRequestRegistry {
    /// Registry on the system clock. Must be called from within a tokio runtime.
    pub fn new(config: RegistryConfig, store: Arc<dyn RequestStore>) -> Result<Self, ConfigError> {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    /// Registry on an explicit clock. Fails if `config` does not validate.
    pub fn with_clock(
        config: RegistryConfig,
        store: Arc<dyn RequestStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            clock,
            state: Mutex::new(RegistryState::default()),
            persister: RecordPersister::new(store),
            events: RequestEventEmitter::new(),
            sweeper: Mutex::new(None),
            restored: AtomicBool::new(false),
        })
    }

    /// Build from settings, opening the configured store.
    pub fn from_settings(settings: &RequestSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        let store = open_store(settings)?;
        info!(store = store.name(), "orchestrator request registry configured");
        Self::new(RegistryConfig::from(settings), store)
    }

    /// Active limits.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    // ── admission ───────────────────────────────────────────────────

    /// Admit a new request. Nothing is recorded when admission fails.
    pub fn create(&self, params: CreateRequestParams) -> Result<RequestId, RequestError> {
        let now = self.clock.now_ms();
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let evicted = state.evict_expired(now, as_millis_i64(self.config.retention));
        if let Err(e) = admit(
            &state.records,
            &mut state.rate_log,
            &params.child_session_key,
            &params.parent_session_key,
            now,
            &self.config,
        ) {
            if evicted > 0 {
                self.persist(state);
            }
            warn!(
                child_session_key = %params.child_session_key,
                parent_session_key = %params.parent_session_key,
                category = e.category(),
                error = %e,
                "orchestrator request denied"
            );
            return Err(e);
        }

        let timeout = clamp_timeout(params.timeout_ms, &self.config);
        let request_id = RequestId::new();
        let record = OrchestratorRequestRecord {
            request_id: request_id.clone(),
            child_session_key: params.child_session_key,
            parent_session_key: params.parent_session_key,
            run_id: params.run_id,
            message: params.message,
            context: params.context,
            priority: params.priority.unwrap_or_default(),
            status: RequestStatus::Pending,
            created_at: now,
            timeout_at: now + as_millis_i64(timeout),
            response: None,
            resolved_by_session_key: None,
            resolved_at: None,
            error: None,
        };

        state.rate_log.record(&record.child_session_key, now);
        info!(
            request_id = %request_id,
            child_session_key = %record.child_session_key,
            parent_session_key = %record.parent_session_key,
            priority = record.priority.as_str(),
            timeout_ms = timeout.as_millis(),
            "orchestrator request created"
        );
        let _ = state.records.insert(request_id.clone(), record.clone());
        self.persist(state);
        let _ = self.events.emit(RequestEvent::Created(record));
        Ok(request_id)
    }

    // ── queries ─────────────────────────────────────────────────────

    /// Current record, if the ID is known.
    pub fn get(&self, request_id: &str) -> Option<OrchestratorRequestRecord> {
        self.state.lock().records.get(request_id).cloned()
    }

    /// Open requests addressed to `parent_session_key`, oldest first.
    pub fn list_pending_requests_for_parent(
        &self,
        parent_session_key: &str,
    ) -> Vec<OrchestratorRequestRecord> {
        self.state
            .lock()
            .open_where(|r| r.parent_session_key == parent_session_key)
    }

    /// Open requests raised by `child_session_key`, oldest first.
    pub fn list_pending_requests_for_child(
        &self,
        child_session_key: &str,
    ) -> Vec<OrchestratorRequestRecord> {
        self.state
            .lock()
            .open_where(|r| r.child_session_key == child_session_key)
    }

    /// Counts by status plus live waiter registrations.
    pub fn stats(&self) -> RegistryStats {
        self.state.lock().stats()
    }

    /// Receive every state change from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RequestEvent> {
        self.events.subscribe()
    }

    // ── transitions ─────────────────────────────────────────────────

    /// Record that the parent has been told about the request.
    ///
    /// Already-notified requests are returned unchanged.
    pub fn mark_notified(
        &self,
        request_id: &RequestId,
    ) -> Result<OrchestratorRequestRecord, RequestError> {
        let mut state = self.state.lock();
        let (record, changed) = state.mark_notified(request_id)?;
        if changed {
            debug!(request_id = %request_id, "orchestrator request notified");
            self.persist(&state);
            let _ = self.events.emit(RequestEvent::Notified(record.clone()));
        }
        Ok(record)
    }

    /// Answer a request.
    ///
    /// An answer that arrives after the request's deadline is rejected with
    /// [`RequestError::Expired`] and the request is timed out instead.
    #[instrument(skip_all, fields(request_id = %request_id))]
    pub fn resolve(
        &self,
        request_id: &RequestId,
        response: impl Into<String>,
        resolved_by_session_key: impl Into<String>,
    ) -> Result<OrchestratorRequestRecord, RequestError> {
        let now = self.clock.now_ms();
        let resolved_by = resolved_by_session_key.into();
        let mut state = self.state.lock();

        let record = state
            .records
            .get(request_id)
            .ok_or_else(|| RequestError::NotFound(request_id.clone()))?;
        if record.is_terminal() {
            return Err(RequestError::AlreadyTerminal {
                request_id: request_id.clone(),
                status: record.status,
            });
        }

        if now >= record.timeout_at {
            let late_by = now - record.timeout_at;
            let settlement = Settlement::TimedOut {
                error: format!(
                    "response from {resolved_by} arrived {late_by}ms after the deadline"
                ),
            };
            if let Some(timed_out) = state.settle(request_id, settlement, now) {
                warn!(
                    request_id = %request_id,
                    resolved_by_session_key = %resolved_by,
                    late_by_ms = late_by,
                    "orchestrator request expired before resolution"
                );
                self.persist(&state);
                let _ = self.events.emit(RequestEvent::settled(timed_out));
            }
            return Err(RequestError::Expired {
                request_id: request_id.clone(),
            });
        }

        let settlement = Settlement::Resolved {
            response: response.into(),
            resolved_by,
        };
        let resolved = state
            .settle(request_id, settlement, now)
            .ok_or_else(|| RequestError::NotFound(request_id.clone()))?;
        info!(
            request_id = %request_id,
            child_session_key = %resolved.child_session_key,
            parent_session_key = %resolved.parent_session_key,
            status = %resolved.status,
            "orchestrator request resolved"
        );
        self.persist(&state);
        let _ = self.events.emit(RequestEvent::settled(resolved.clone()));
        Ok(resolved)
    }

    /// Force an open request to `timeout`. No-op when missing or terminal.
    pub(crate) fn timeout(&self, request_id: &RequestId) -> Option<OrchestratorRequestRecord> {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();
        let timed_out = self.force_timeout(&mut state, request_id, now)?;
        self.persist(&state);
        Some(timed_out)
    }

    /// Time out one record under an already-held lock. The caller persists.
    pub(crate) fn force_timeout(
        &self,
        state: &mut RegistryState,
        request_id: &RequestId,
        now: i64,
    ) -> Option<OrchestratorRequestRecord> {
        let created_at = state.records.get(request_id)?.created_at;
        let error = format!(
            "request timed out after {}ms without a response",
            (now - created_at).max(0)
        );
        let timed_out = state.settle(request_id, Settlement::TimedOut { error }, now)?;
        info!(
            request_id = %request_id,
            child_session_key = %timed_out.child_session_key,
            parent_session_key = %timed_out.parent_session_key,
            status = %timed_out.status,
            "orchestrator request timed out"
        );
        let _ = self.events.emit(RequestEvent::settled(timed_out.clone()));
        Some(timed_out)
    }

    /// Publish a settled record to subscribers.
    pub(crate) fn emit_settled(&self, record: OrchestratorRequestRecord) {
        let _ = self.events.emit(RequestEvent::settled(record));
    }

    /// Queue a snapshot of the table for the store.
    pub(crate) fn persist(&self, state: &RegistryState) {
        self.persister.save(state.records.clone());
    }

    // ── restore, reset, shutdown ────────────────────────────────────

    /// Load persisted records once, merging only IDs not already live.
    ///
    /// Returns the number of records merged. Later calls are no-ops until
    /// [`reset_for_tests`](Self::reset_for_tests). Load failures are logged
    /// and treated as an empty store.
    pub fn init(&self) -> usize {
        if self.restored.swap(true, Ordering::SeqCst) {
            return 0;
        }
        let store = self.persister.store();
        let restored = match store.load() {
            Ok(table) => table,
            Err(e) => {
                warn!(store = store.name(), error = %e, "failed to restore orchestrator requests");
                return 0;
            }
        };
        let loaded = restored.len();
        let merged = self.state.lock().merge_restored(restored);
        info!(store = store.name(), loaded, merged, "orchestrator requests restored");
        merged
    }

    /// Clear every record, waiter and rate-log entry, stop the sweeper and
    /// allow `init` to run again. The empty table is persisted.
    pub fn reset_for_tests(&self) {
        let _ = self.stop_sweeper();
        let mut state = self.state.lock();
        state.records.clear();
        state.rate_log.clear();
        state.clear_waiters();
        self.restored.store(false, Ordering::SeqCst);
        self.persist(&state);
    }

    /// Stop the sweeper, release every waiter registration and wait for
    /// pending writes. Suspended waiters return [`RequestError::WaitCancelled`].
    pub async fn shutdown(&self) {
        let _ = self.stop_sweeper();
        let released = {
            let mut state = self.state.lock();
            let released = state.waiter_count();
            state.clear_waiters();
            released
        };
        self.flush().await;
        info!(released_waiters = released, "orchestrator request registry shut down");
    }

    /// Wait for every queued snapshot to reach the store.
    pub async fn flush(&self) {
        self.persister.flush().await;
    }
}

impl std::fmt::Debug for OrchestratorRequestRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorRequestRegistry")
            .field("config", &self.config)
            .field("store", &self.persister.store().name())
            .field("sweeper_running", &self.is_sweeper_running())
            .finish_non_exhaustive()
    }
}
