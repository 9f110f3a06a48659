//! # craft-settings
//!
//! Configuration for the craft client, loaded from three layers (in
//! priority order):
//! 1. **Compiled defaults**: [`ClientSettings::default()`]
//! 2. **User file**: `~/.craft/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `CRAFT_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::{ClientSettings, Scheme};

use std::sync::OnceLock;

static SETTINGS: OnceLock<ClientSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// The first call loads from `~/.craft/settings.json` with env overrides and
/// falls back to compiled defaults if loading fails.
pub fn get_settings() -> &'static ClientSettings {
    SETTINGS.get_or_init(|| {
        load_settings().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            ClientSettings::default()
        })
    })
}

/// Initialize the global settings with a specific value.
///
/// Returns the settings back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: ClientSettings) -> std::result::Result<(), ClientSettings> {
    SETTINGS.set(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = ClientSettings::default();
        let _path = settings_path();
    }

    #[test]
    fn settings_path_under_dot_craft() {
        let path = settings_path();
        assert!(path.ends_with(".craft/settings.json"));
    }
}
