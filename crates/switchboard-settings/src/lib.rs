//! # switchboard-settings
//!
//! Layered configuration for the Switchboard gateway.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`SwitchboardSettings::default()`]
//! 2. **User file**: `~/.switchboard/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `SWITCHBOARD_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_from, deep_merge, load_settings, load_settings_from_path,
    resolve_path, settings_dir, settings_path,
};
pub use types::*;

use std::sync::OnceLock;

static SETTINGS: OnceLock<SwitchboardSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// On first call, loads settings from disk with env var overrides. If
/// loading fails, compiled defaults are used.
pub fn get_settings() -> &'static SwitchboardSettings {
    SETTINGS.get_or_init(|| {
        load_settings().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            SwitchboardSettings::default()
        })
    })
}

/// Initialize the global settings with a specific value.
///
/// Returns the settings back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: SwitchboardSettings) -> std::result::Result<(), SwitchboardSettings> {
    SETTINGS.set(settings)
}

/// Install the global tracing subscriber described by [`LoggingSettings`].
///
/// `RUST_LOG` still takes precedence over `level`. A second call is a no-op.
pub fn init_logging(logging: &LoggingSettings) {
    if logging.json {
        switchboard_core::logging::init_json_subscriber(&logging.level);
    } else {
        switchboard_core::logging::init_subscriber(&logging.level);
    }
}
