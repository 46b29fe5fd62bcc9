//! Deadline sweeper and garbage collector.
//!
//! A background task ticks every `sweep_interval`, forcing overdue open
//! requests to `timeout` and evicting terminal requests past retention. It
//! holds only a weak reference, so an idle sweeper never keeps the registry
//! alive.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::as_millis_i64;
use crate::registry::OrchestratorRequestRegistry;

/// Running sweeper task.
pub(crate) struct SweeperHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// What one sweep changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Open requests forced to `timeout`.
    pub timed_out: usize,
    /// Terminal requests removed.
    pub evicted: usize,
}

impl SweepReport {
    /// Whether the sweep touched anything.
    pub fn is_empty(&self) -> bool {
        self.timed_out == 0 && self.evicted == 0
    }
}

impl OrchestratorRequestRegistry {
    /// Run one sweep now.
    pub fn sweep(&self) -> SweepReport {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();

        let mut report = SweepReport::default();
        for request_id in state.overdue(now) {
            if self.force_timeout(&mut state, &request_id, now).is_some() {
                report.timed_out += 1;
            }
        }
        report.evicted = state.evict_expired(now, as_millis_i64(self.config.retention));

        if !report.is_empty() {
            self.persist(&state);
            debug!(
                timed_out = report.timed_out,
                evicted = report.evicted,
                "orchestrator request sweep"
            );
        }
        report
    }

    /// Start the background sweeper. Returns `false` if it was already running.
    pub fn start_sweeper(self: &Arc<Self>) -> bool {
        let mut slot = self.sweeper.lock();
        if slot.is_some() {
            return false;
        }
        let cancel = CancellationToken::new();
        let interval = self.config.sweep_interval;
        let task = tokio::spawn(run_sweeper(Arc::downgrade(self), interval, cancel.clone()));
        *slot = Some(SweeperHandle { cancel, task });
        info!(interval_ms = interval.as_millis(), "orchestrator request sweeper started");
        true
    }

    /// Stop the background sweeper. Returns `false` if it was not running.
    pub fn stop_sweeper(&self) -> bool {
        let Some(handle) = self.sweeper.lock().take() else {
            return false;
        };
        handle.cancel.cancel();
        drop(handle.task);
        info!("orchestrator request sweeper stopped");
        true
    }

    /// Whether the background sweeper is running.
    pub fn is_sweeper_running(&self) -> bool {
        self.sweeper
            .lock()
            .as_ref()
            .is_some_and(|h| !h.task.is_finished())
    }
}

async fn run_sweeper(
    registry: Weak<OrchestratorRequestRegistry>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                let _ = registry.sweep();
            }
            () = cancel.cancelled() => break,
        }
    }
}
