//! Configuration module for Backdrop.
//!
//! This module provides the configuration types, the [`ConfigStore`] seam
//! used by the reconciliation driver, and file watching for external edits.
//!
//! The configuration file supports JSONC format (JSON with comments).
//! Both single-line (`//`) and multi-line (`/* */`) comments are allowed.

mod store;
pub mod types;
mod watcher;

use std::path::PathBuf;
use std::sync::OnceLock;

pub use store::{ConfigStore, JsonFileStore, MemoryStore};
pub use types::{
    AppConfig, ConfigError, PlaylistValue, ScreenConfig, config_paths, find_config_file,
    load_config_from_path,
};
pub use watcher::watch_config_file;

use crate::constants::CONFIG_ENV;

/// Custom config path override (set via CLI --config flag).
static CUSTOM_CONFIG_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Sets a custom configuration file path to use instead of the default search paths.
///
/// This must be called before [`config_path`] to take effect.
///
/// # Returns
///
/// `true` if the path was set successfully, `false` if a path was already set.
pub fn set_custom_config_path(path: PathBuf) -> bool { CUSTOM_CONFIG_PATH.set(path).is_ok() }

/// Returns the configuration file path in effect.
///
/// Priority: `--config`, `BACKDROP_CONFIG`, the first existing file in
/// [`config_paths`], then the preferred default location (which may not
/// exist yet).
#[must_use]
pub fn config_path() -> PathBuf {
    if let Some(path) = CUSTOM_CONFIG_PATH.get() {
        return path.clone();
    }

    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|value| !value.is_empty()) {
        return PathBuf::from(path);
    }

    find_config_file()
        .or_else(|| config_paths().into_iter().find(|p| p.extension().is_some_and(|e| e == "json")))
        .unwrap_or_else(|| PathBuf::from("config.json"))
}

/// Returns a file-backed store for [`config_path`].
#[must_use]
pub fn default_store() -> JsonFileStore { JsonFileStore::new(config_path()) }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_is_a_json_file() {
        let path = config_path();
        let ext = path.extension().unwrap().to_string_lossy().into_owned();
        assert!(ext == "json" || ext == "jsonc");
    }

    #[test]
    fn test_default_store_points_at_config_path() {
        assert_eq!(default_store().path(), config_path().as_path());
    }

    #[test]
    fn test_config_error_message() {
        assert!(ConfigError::NotFound.to_string().contains("No configuration file found"));
    }
}
