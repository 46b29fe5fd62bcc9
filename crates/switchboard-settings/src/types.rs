//! Settings type definitions.
//!
//! All types use camelCase JSON and `#[serde(default)]`, so a partial
//! settings file only needs to mention the values it changes.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type for the Switchboard gateway.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SwitchboardSettings {
    /// Settings schema version.
    pub version: String,
    /// Application name.
    pub name: String,
    /// Logging configuration.
    pub logging: LoggingSettings,
    /// Orchestrator request registry tunables.
    pub requests: RequestSettings,
}

impl Default for SwitchboardSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            name: "switchboard".to_string(),
            logging: LoggingSettings::default(),
            requests: RequestSettings::default(),
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level (`trace`..`error`); `RUST_LOG` still wins.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Where the request registry mirrors its table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Single JSON document, rewritten atomically.
    #[default]
    Json,
    /// `SQLite` database file.
    Sqlite,
    /// Nothing survives a restart.
    Memory,
}

/// Orchestrator request registry tunables.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestSettings {
    /// Open requests a single child session may hold.
    pub max_pending_per_child: usize,
    /// Open requests a single parent session may be asked at once.
    pub max_pending_per_parent: usize,
    /// Creations allowed per child inside one rate window.
    pub rate_limit_per_child: usize,
    /// Length of the sliding rate window in milliseconds.
    pub rate_limit_window_ms: u64,
    /// Wait timeout used when the caller does not ask for one.
    pub default_timeout_ms: u64,
    /// Lower clamp for requested timeouts.
    pub min_timeout_ms: u64,
    /// Upper clamp for requested timeouts.
    pub max_timeout_ms: u64,
    /// How long terminal requests are kept before eviction.
    pub retention_ms: u64,
    /// Interval between sweeper passes.
    pub sweep_interval_ms: u64,
    /// Persistence backend.
    pub store_backend: StoreBackend,
    /// Store location, relative to `~/.switchboard` unless absolute.
    pub store_path: String,
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            max_pending_per_child: 3,
            max_pending_per_parent: 20,
            rate_limit_per_child: 5,
            rate_limit_window_ms: 60_000,
            default_timeout_ms: 300_000,
            min_timeout_ms: 10_000,
            max_timeout_ms: 3_600_000,
            retention_ms: 86_400_000,
            sweep_interval_ms: 5_000,
            store_backend: StoreBackend::Json,
            store_path: "orchestrator-requests.json".to_string(),
        }
    }
}

impl RequestSettings {
    /// Check internal consistency.
    pub fn validate(&self) -> Result<()> {
        if self.max_pending_per_child == 0 {
            return Err(SettingsError::invalid(
                "requests.maxPendingPerChild",
                "must be at least 1",
            ));
        }
        if self.max_pending_per_parent == 0 {
            return Err(SettingsError::invalid(
                "requests.maxPendingPerParent",
                "must be at least 1",
            ));
        }
        if self.rate_limit_per_child == 0 {
            return Err(SettingsError::invalid(
                "requests.rateLimitPerChild",
                "must be at least 1",
            ));
        }
        if self.rate_limit_window_ms == 0 {
            return Err(SettingsError::invalid(
                "requests.rateLimitWindowMs",
                "must be positive",
            ));
        }
        if self.sweep_interval_ms == 0 {
            return Err(SettingsError::invalid(
                "requests.sweepIntervalMs",
                "must be positive",
            ));
        }
        if self.min_timeout_ms > self.max_timeout_ms {
            return Err(SettingsError::invalid(
                "requests.minTimeoutMs",
                format!(
                    "{} exceeds maxTimeoutMs {}",
                    self.min_timeout_ms, self.max_timeout_ms
                ),
            ));
        }
        if !(self.min_timeout_ms..=self.max_timeout_ms).contains(&self.default_timeout_ms) {
            return Err(SettingsError::invalid(
                "requests.defaultTimeoutMs",
                format!(
                    "{} is outside [{}, {}]",
                    self.default_timeout_ms, self.min_timeout_ms, self.max_timeout_ms
                ),
            ));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn request_defaults() {
        let s = RequestSettings::default();
        assert_eq!(s.max_pending_per_child, 3);
        assert_eq!(s.max_pending_per_parent, 20);
        assert_eq!(s.rate_limit_per_child, 5);
        assert_eq!(s.rate_limit_window_ms, 60_000);
        assert_eq!(s.default_timeout_ms, 300_000);
        assert_eq!(s.min_timeout_ms, 10_000);
        assert_eq!(s.max_timeout_ms, 3_600_000);
        assert_eq!(s.retention_ms, 86_400_000);
        assert_eq!(s.sweep_interval_ms, 5_000);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn camel_case_wire_format() {
        let json = serde_json::to_value(RequestSettings::default()).unwrap();
        assert_eq!(json["maxPendingPerChild"], 3);
        assert_eq!(json["storeBackend"], "json");
        assert_eq!(json["sweepIntervalMs"], 5000);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: SwitchboardSettings =
            serde_json::from_str(r#"{"requests": {"maxPendingPerChild": 7}}"#).unwrap();
        assert_eq!(s.requests.max_pending_per_child, 7);
        assert_eq!(s.requests.max_pending_per_parent, 20);
        assert_eq!(s.logging.level, "info");
    }

    #[test]
    fn store_backend_parses_lowercase() {
        let b: StoreBackend = serde_json::from_str("\"sqlite\"").unwrap();
        assert_eq!(b, StoreBackend::Sqlite);
    }

    #[test]
    fn validate_rejects_inverted_clamp() {
        let s = RequestSettings {
            min_timeout_ms: 10,
            max_timeout_ms: 5,
            default_timeout_ms: 5,
            ..RequestSettings::default()
        };
        assert_matches!(
            s.validate(),
            Err(SettingsError::InvalidValue { field: "requests.minTimeoutMs", .. })
        );
    }

    #[test]
    fn validate_rejects_default_outside_clamp() {
        let s = RequestSettings {
            default_timeout_ms: 1,
            ..RequestSettings::default()
        };
        assert_matches!(
            s.validate(),
            Err(SettingsError::InvalidValue { field: "requests.defaultTimeoutMs", .. })
        );
    }

    #[test]
    fn validate_rejects_zero_caps() {
        let s = RequestSettings {
            max_pending_per_child: 0,
            ..RequestSettings::default()
        };
        assert!(s.validate().is_err());

        let s = RequestSettings {
            sweep_interval_ms: 0,
            ..RequestSettings::default()
        };
        assert!(s.validate().is_err());
    }
}
