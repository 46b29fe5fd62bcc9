//! Runtime configuration for the registry.

use std::time::Duration;

use switchboard_settings::RequestSettings;

use crate::errors::ConfigError;

/// Tunables the registry runs with.
///
/// Built from [`RequestSettings`]; defaults match the compiled settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Open requests a single child may hold.
    pub max_pending_per_child: usize,
    /// Open requests a single parent may be asked at once.
    pub max_pending_per_parent: usize,
    /// Creations allowed per child inside `rate_limit_window`.
    pub rate_limit_per_child: usize,
    /// Sliding rate window.
    pub rate_limit_window: Duration,
    /// Wait used when the caller does not ask for one.
    pub default_timeout: Duration,
    /// Lower clamp for requested waits.
    pub min_timeout: Duration,
    /// Upper clamp for requested waits.
    pub max_timeout: Duration,
    /// How long terminal records are kept.
    pub retention: Duration,
    /// Interval between sweeper passes.
    pub sweep_interval: Duration,
}

impl RegistryConfig {
    /// Check that every limit is usable and the timeout clamp is well formed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason: String| Err(ConfigError::Invalid { field, reason });

        if self.max_pending_per_child == 0 {
            return invalid("maxPendingPerChild", "must be at least 1".into());
        }
        if self.max_pending_per_parent == 0 {
            return invalid("maxPendingPerParent", "must be at least 1".into());
        }
        if self.rate_limit_per_child == 0 {
            return invalid("rateLimitPerChild", "must be at least 1".into());
        }
        if self.rate_limit_window.is_zero() {
            return invalid("rateLimitWindow", "must be positive".into());
        }
        if self.sweep_interval.is_zero() {
            return invalid("sweepInterval", "must be positive".into());
        }
        if self.min_timeout > self.max_timeout {
            return invalid(
                "minTimeout",
                format!(
                    "{:?} exceeds maxTimeout {:?}",
                    self.min_timeout, self.max_timeout
                ),
            );
        }
        if !(self.min_timeout..=self.max_timeout).contains(&self.default_timeout) {
            return invalid(
                "defaultTimeout",
                format!(
                    "{:?} is outside [{:?}, {:?}]",
                    self.default_timeout, self.min_timeout, self.max_timeout
                ),
            );
        }
        Ok(())
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::from(&RequestSettings::default())
    }
}

impl From<&RequestSettings> for RegistryConfig {
    fn from(s: &RequestSettings) -> Self {
        Self {
            max_pending_per_child: s.max_pending_per_child,
            max_pending_per_parent: s.max_pending_per_parent,
            rate_limit_per_child: s.rate_limit_per_child,
            rate_limit_window: Duration::from_millis(s.rate_limit_window_ms),
            default_timeout: Duration::from_millis(s.default_timeout_ms),
            min_timeout: Duration::from_millis(s.min_timeout_ms),
            max_timeout: Duration::from_millis(s.max_timeout_ms),
            retention: Duration::from_millis(s.retention_ms),
            sweep_interval: Duration::from_millis(s.sweep_interval_ms),
        }
    }
}

/// Convert a duration to signed epoch-millisecond arithmetic.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub(crate) fn as_millis_i64(d: Duration) -> i64 {
    d.as_millis().min(i64::MAX as u128) as i64
}
