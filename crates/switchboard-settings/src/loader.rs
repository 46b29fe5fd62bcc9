//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`SwitchboardSettings::default()`]
//! 2. If `~/.switchboard/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `SWITCHBOARD_*` environment overrides (highest priority)
//! 4. Validate the request tunables
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{StoreBackend, SwitchboardSettings};

/// Resolve the Switchboard home directory (`~/.switchboard`).
pub fn settings_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".switchboard")
}

/// Resolve the path to the settings file (`~/.switchboard/settings.json`).
pub fn settings_path() -> PathBuf {
    settings_dir().join("settings.json")
}

/// Resolve a configured path against the Switchboard home directory.
pub fn resolve_path(configured: &str) -> PathBuf {
    let path = Path::new(configured);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        settings_dir().join(path)
    }
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<SwitchboardSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON or inconsistent request
/// tunables are errors.
pub fn load_settings_from_path(path: &Path) -> Result<SwitchboardSettings> {
    let defaults = serde_json::to_value(SwitchboardSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: SwitchboardSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.requests.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply process environment overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut SwitchboardSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Invalid values are ignored with a warning and the file/default value
/// stays in effect.
pub fn apply_overrides_from<F>(settings: &mut SwitchboardSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };
    let requests = &mut settings.requests;

    if let Some(v) = env.usize("SWITCHBOARD_MAX_PENDING_PER_CHILD", 1, 1_000) {
        requests.max_pending_per_child = v;
    }
    if let Some(v) = env.usize("SWITCHBOARD_MAX_PENDING_PER_PARENT", 1, 100_000) {
        requests.max_pending_per_parent = v;
    }
    if let Some(v) = env.usize("SWITCHBOARD_RATE_LIMIT_PER_CHILD", 1, 10_000) {
        requests.rate_limit_per_child = v;
    }
    // bounded by the clamp already in effect
    if let Some(v) = env.u64(
        "SWITCHBOARD_REQUEST_TIMEOUT_MS",
        requests.min_timeout_ms,
        requests.max_timeout_ms,
    ) {
        requests.default_timeout_ms = v;
    }
    if let Some(v) = env.u64("SWITCHBOARD_SWEEP_INTERVAL_MS", 10, 3_600_000) {
        requests.sweep_interval_ms = v;
    }
    if let Some(v) = env.string("SWITCHBOARD_REQUEST_STORE") {
        match serde_json::from_value::<StoreBackend>(Value::String(v.clone())) {
            Ok(backend) => requests.store_backend = backend,
            Err(_) => {
                tracing::warn!(key = "SWITCHBOARD_REQUEST_STORE", value = %v, "unknown store backend, ignoring");
            }
        }
    }
    if let Some(v) = env.string("SWITCHBOARD_REQUEST_STORE_PATH") {
        requests.store_path = v;
    }
    if let Some(v) = env.string("SWITCHBOARD_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("SWITCHBOARD_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = self.string(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = self.string(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        let val = self.string(name)?;
        let result = parse_usize_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::errors::SettingsError;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"requests": {"a": 1, "b": 2}});
        let source = serde_json::json!({"requests": {"a": 10}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["requests"]["a"], 10);
        assert_eq!(merged["requests"]["b"], 2);
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1});
        let source = serde_json::json!({"a": null});
        assert_eq!(deep_merge(target, source)["a"], 1);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4]});
        assert_eq!(deep_merge(target, source)["items"], serde_json::json!([4]));
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        assert_eq!(deep_merge(target, source)["a"], 42);
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings = load_settings_from_path(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings.requests.max_pending_per_child, 3);
        assert_eq!(settings.name, "switchboard");
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"requests": {"maxPendingPerParent": 50, "storeBackend": "sqlite"}}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.requests.max_pending_per_parent, 50);
        assert_eq!(settings.requests.store_backend, StoreBackend::Sqlite);
        assert_eq!(settings.requests.max_pending_per_child, 3);
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::Json(_)));
    }

    #[test]
    fn load_inconsistent_values_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"requests": {"minTimeoutMs": 5000000}}"#).unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(
            result.unwrap_err(),
            SettingsError::InvalidValue { .. }
        ));
    }

    // ── overrides ───────────────────────────────────────────────────

    #[test]
    fn overrides_apply_valid_values() {
        let mut settings = SwitchboardSettings::default();
        apply_overrides_from(
            &mut settings,
            lookup(&[
                ("SWITCHBOARD_MAX_PENDING_PER_CHILD", "4"),
                ("SWITCHBOARD_RATE_LIMIT_PER_CHILD", "9"),
                ("SWITCHBOARD_SWEEP_INTERVAL_MS", "250"),
                ("SWITCHBOARD_REQUEST_STORE", "memory"),
                ("SWITCHBOARD_LOG_LEVEL", "debug"),
                ("SWITCHBOARD_LOG_JSON", "yes"),
            ]),
        );
        assert_eq!(settings.requests.max_pending_per_child, 4);
        assert_eq!(settings.requests.rate_limit_per_child, 9);
        assert_eq!(settings.requests.sweep_interval_ms, 250);
        assert_eq!(settings.requests.store_backend, StoreBackend::Memory);
        assert_eq!(settings.logging.level, "debug");
        assert!(settings.logging.json);
    }

    #[test]
    fn overrides_ignore_invalid_values() {
        let mut settings = SwitchboardSettings::default();
        apply_overrides_from(
            &mut settings,
            lookup(&[
                ("SWITCHBOARD_MAX_PENDING_PER_CHILD", "0"),
                ("SWITCHBOARD_REQUEST_TIMEOUT_MS", "soon"),
                ("SWITCHBOARD_REQUEST_STORE", "postgres"),
                ("SWITCHBOARD_LOG_JSON", "maybe"),
            ]),
        );
        assert_eq!(settings.requests.max_pending_per_child, 3);
        assert_eq!(settings.requests.default_timeout_ms, 300_000);
        assert_eq!(settings.requests.store_backend, StoreBackend::Json);
        assert!(!settings.logging.json);
    }

    #[test]
    fn timeout_override_outside_clamp_is_ignored() {
        let mut settings = SwitchboardSettings::default();
        apply_overrides_from(
            &mut settings,
            lookup(&[("SWITCHBOARD_REQUEST_TIMEOUT_MS", "5")]),
        );
        assert_eq!(settings.requests.default_timeout_ms, 300_000);
        assert!(settings.requests.validate().is_ok());

        apply_overrides_from(
            &mut settings,
            lookup(&[("SWITCHBOARD_REQUEST_TIMEOUT_MS", "45000")]),
        );
        assert_eq!(settings.requests.default_timeout_ms, 45_000);
    }

    #[test]
    fn timeout_override_follows_file_clamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"requests": {"minTimeoutMs": 1000}}"#).unwrap();

        let mut settings = load_settings_from_path(&path).unwrap();
        apply_overrides_from(
            &mut settings,
            lookup(&[("SWITCHBOARD_REQUEST_TIMEOUT_MS", "5000")]),
        );
        assert_eq!(settings.requests.default_timeout_ms, 5_000);
        assert!(settings.requests.validate().is_ok());
    }

    #[test]
    fn empty_override_is_ignored() {
        let mut settings = SwitchboardSettings::default();
        apply_overrides_from(&mut settings, lookup(&[("SWITCHBOARD_LOG_LEVEL", "")]));
        assert_eq!(settings.logging.level, "info");
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for val in &["true", "1", "yes", "ON"] {
            assert_eq!(parse_bool(val), Some(true), "failed for {val}");
        }
        for val in &["false", "0", "no", "Off"] {
            assert_eq!(parse_bool(val), Some(false), "failed for {val}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u64_range("30000", 1000, 600_000), Some(30_000));
        assert_eq!(parse_u64_range("500", 1000, 600_000), None);
        assert_eq!(parse_usize_range("50", 1, 10_000), Some(50));
        assert_eq!(parse_usize_range("abc", 1, 10_000), None);
    }

    #[test]
    fn resolve_path_keeps_absolute() {
        assert_eq!(resolve_path("/var/lib/x.json"), PathBuf::from("/var/lib/x.json"));
        assert!(resolve_path("x.json").ends_with(".switchboard/x.json"));
    }
}
