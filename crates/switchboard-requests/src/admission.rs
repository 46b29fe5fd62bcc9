//! Admission control: pending caps, per-child sliding-window rate limit,
//! and timeout clamping.
//!
//! Everything here is a pure check over the current table and rate log.
//! Nothing is recorded until [`RateLimitLog::record`] is called at commit.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crate::config::{RegistryConfig, as_millis_i64};
use crate::errors::RequestError;
use crate::types::RequestTable;

/// Per-child log of creation timestamps inside the rate window.
#[derive(Debug, Default)]
pub struct RateLimitLog {
    entries: HashMap<String, VecDeque<i64>>,
}

impl RateLimitLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop timestamps for `child` that fell out of the window ending at `now`.
    fn prune(&mut self, child: &str, now: i64, window: Duration) {
        let cutoff = now - as_millis_i64(window);
        let empty = match self.entries.get_mut(child) {
            Some(log) => {
                while log.front().is_some_and(|&t| t <= cutoff) {
                    let _ = log.pop_front();
                }
                log.is_empty()
            }
            None => return,
        };
        if empty {
            let _ = self.entries.remove(child);
        }
    }

    /// Check whether `child` may create another request at `now`.
    ///
    /// Prunes the child's log to the window but never consumes a slot.
    pub fn check(
        &mut self,
        child: &str,
        now: i64,
        limit: usize,
        window: Duration,
    ) -> Result<(), RequestError> {
        self.prune(child, now, window);
        let log = self.entries.get(child);
        if log.map_or(0, VecDeque::len) < limit {
            return Ok(());
        }
        let oldest = log.and_then(|l| l.front().copied()).unwrap_or(now);
        let retry_after = (oldest + as_millis_i64(window) - now).max(0);
        Err(RequestError::RateLimited {
            child_session_key: child.to_owned(),
            limit,
            window_ms: u64::try_from(as_millis_i64(window)).unwrap_or(u64::MAX),
            retry_after_ms: u64::try_from(retry_after).unwrap_or(0),
        })
    }

    /// Record a committed creation.
    pub fn record(&mut self, child: &str, now: i64) {
        self.entries.entry(child.to_owned()).or_default().push_back(now);
    }

    /// Creations currently logged for `child` (unpruned).
    pub fn len_for(&self, child: &str) -> usize {
        self.entries.get(child).map_or(0, VecDeque::len)
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Clamp a requested wait into `[min_timeout, max_timeout]`, defaulting when absent.
pub fn clamp_timeout(requested_ms: Option<u64>, config: &RegistryConfig) -> Duration {
    let requested = requested_ms.map_or(config.default_timeout, Duration::from_millis);
    requested.clamp(config.min_timeout, config.max_timeout)
}

/// Run the cap and rate checks for a prospective request, in order:
/// child cap, parent cap, child rate limit.
pub fn admit(
    records: &RequestTable,
    rate_log: &mut RateLimitLog,
    child: &str,
    parent: &str,
    now: i64,
    config: &RegistryConfig,
) -> Result<(), RequestError> {
    let child_open = records
        .values()
        .filter(|r| r.is_open() && r.child_session_key == child)
        .count();
    if child_open >= config.max_pending_per_child {
        return Err(RequestError::ChildCapacity {
            child_session_key: child.to_owned(),
            limit: config.max_pending_per_child,
        });
    }

    let parent_open = records
        .values()
        .filter(|r| r.is_open() && r.parent_session_key == parent)
        .count();
    if parent_open >= config.max_pending_per_parent {
        return Err(RequestError::ParentCapacity {
            parent_session_key: parent.to_owned(),
            limit: config.max_pending_per_parent,
        });
    }

    rate_log.check(child, now, config.rate_limit_per_child, config.rate_limit_window)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
