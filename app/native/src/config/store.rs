//! Configuration persistence seam.
//!
//! The reconciliation code only ever sees an [`AppConfig`] value handed out by
//! a [`ConfigStore`]; where it lives is the store's business.

use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use super::types::{AppConfig, ConfigError, load_config_from_path};

/// Source of truth for the configuration document.
pub trait ConfigStore: Send + Sync {
    /// Reads the current configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the backing document cannot be read or parsed.
    fn load(&self) -> Result<AppConfig, ConfigError>;

    /// Replaces the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the document cannot be written.
    fn save(&self, config: &AppConfig) -> Result<(), ConfigError>;

    /// Backing file, if any.
    fn location(&self) -> Option<&Path> { None }
}

/// JSONC file on disk. A missing file reads as the default configuration.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    #[must_use]
    pub const fn new(path: PathBuf) -> Self { Self { path } }

    #[must_use]
    pub fn path(&self) -> &Path { &self.path }
}

impl ConfigStore for JsonFileStore {
    fn load(&self) -> Result<AppConfig, ConfigError> {
        match load_config_from_path(&self.path) {
            Err(ConfigError::NotFound) => Ok(AppConfig::default()),
            other => other,
        }
    }

    fn save(&self, config: &AppConfig) -> Result<(), ConfigError> {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;

        // Write next to the target and rename so readers never see a partial file
        let mut file = tempfile::NamedTempFile::new_in(parent)?;
        serde_json::to_writer_pretty(&mut file, config)?;
        file.write_all(b"\n")?;
        file.persist(&self.path).map_err(|err| ConfigError::IoError(err.error))?;

        tracing::debug!(path = %self.path.display(), "configuration written");
        Ok(())
    }

    fn location(&self) -> Option<&Path> { Some(&self.path) }
}

/// In-memory store, used when no file should be touched.
#[derive(Debug, Default)]
pub struct MemoryStore {
    config: RwLock<AppConfig>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(config: AppConfig) -> Self { Self { config: RwLock::new(config) } }
}

impl ConfigStore for MemoryStore {
    fn load(&self) -> Result<AppConfig, ConfigError> { Ok(self.config.read().clone()) }

    fn save(&self, config: &AppConfig) -> Result<(), ConfigError> {
        *self.config.write() = config.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScreenConfig;

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("config.json"));
        assert_eq!(store.load().unwrap(), AppConfig::default());
    }

    #[test]
    fn save_then_load_preserves_bindings() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("config.json"));

        let config = AppConfig {
            screens: vec![ScreenConfig::new("DP-1", Some("123".into()))],
            fps: Some(30),
            ..Default::default()
        };
        store.save(&config).unwrap();

        assert_eq!(store.load().unwrap(), config);
        assert_eq!(store.location(), Some(dir.path().join("nested/config.json").as_path()));
    }

    #[test]
    fn saved_file_uses_wire_key_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("config.json"));
        store
            .save(&AppConfig {
                fps: Some(24),
                clone_mode: true,
                ..Default::default()
            })
            .unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"FPS\": 24"));
        assert!(raw.contains("\"cloneMode\": true"));
        assert!(raw.contains("\"SILENCE\": false"));
    }

    #[test]
    fn invalid_json_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = JsonFileStore::new(path).load().unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryStore::default();
        let mut config = store.load().unwrap();
        config.bind("HDMI-A-1", Some("42".into()));
        store.save(&config).unwrap();

        assert_eq!(store.load().unwrap().screens.len(), 1);
        assert!(store.location().is_none());
    }
}
