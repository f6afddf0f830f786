//! Configuration types for Backdrop.
//!
//! The document keeps the key names used by existing `linux-wallpaperengine`
//! front-ends (including the upper-case `FPS` and `SILENCE` keys) so a config
//! written by one of them loads unchanged. Keys this crate does not model are
//! preserved verbatim through `extra`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::constants::{APP_NAME, DEFAULT_FPS, DEFAULT_RENDERER, DEFAULT_WORKSHOP_DIR};
use crate::utils::path::expand;

/// Per-display entry of the configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct ScreenConfig {
    /// Output name as reported by the display server (e.g. `DP-1`).
    pub name: String,

    /// Bound wallpaper id (Workshop folder name or path), `null` for none.
    pub wallpaper: Option<String>,

    /// Playlist assigned to this display.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playlist: Option<String>,

    /// Playlist rotation interval in minutes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playlist_interval: Option<f64>,
}

impl ScreenConfig {
    /// Creates an entry for `name` bound to `wallpaper`.
    #[must_use]
    pub fn new(name: impl Into<String>, wallpaper: Option<String>) -> Self {
        Self {
            name: name.into(),
            wallpaper,
            ..Default::default()
        }
    }
}

/// Playlist setting: a single path or a list of paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum PlaylistValue {
    /// A single playlist path.
    Single(String),
    /// Multiple playlist paths.
    Multiple(Vec<String>),
}

impl Default for PlaylistValue {
    fn default() -> Self { Self::Multiple(Vec::new()) }
}

impl PlaylistValue {
    /// Returns the non-empty playlist entries in declaration order.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        match self {
            Self::Single(path) => {
                if path.trim().is_empty() {
                    Vec::new()
                } else {
                    vec![path.clone()]
                }
            }
            Self::Multiple(paths) => {
                paths.iter().filter(|p| !p.trim().is_empty()).cloned().collect()
            }
        }
    }
}

/// Root configuration document.
///
/// Every field has a default, so an empty object `{}` is a valid config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)]
pub struct AppConfig {
    /// Renderer frame rate. Defaults to 60 when unset or zero.
    #[serde(rename = "FPS", skip_serializing_if = "Option::is_none")]
    pub fps: Option<u32>,

    /// Mute all audio. Takes precedence over `volume`.
    #[serde(rename = "SILENCE")]
    pub silence: bool,

    /// Audio volume (0-100).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,

    pub no_automute: bool,
    pub no_audio_processing: bool,

    /// Scaling mode (`stretch`, `fit`, `fill`, `default`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scaling: Option<String>,

    /// Texture clamping mode (`clamp`, `border`, `repeat`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clamping: Option<String>,

    pub disable_mouse: bool,
    pub disable_parallax: bool,
    pub disable_particles: bool,
    pub no_fullscreen_pause: bool,
    pub fullscreen_pause_only_active: bool,

    /// App ids that never pause the renderer when fullscreen.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fullscreen_pause_ignore_app_ids: Vec<String>,

    /// Screenshot output path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,

    /// Frames to wait before taking the screenshot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_delay: Option<u32>,

    /// Wallpaper Engine assets directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assets_dir: Option<String>,

    pub dump_structure: bool,

    /// Playlist path(s) passed to every renderer.
    pub playlist: PlaylistValue,

    /// Global property overrides (`--set-property key=value`).
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,

    /// Property overrides keyed by wallpaper id. A wallpaper with an entry here
    /// uses it instead of `properties`.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub wallpaper_properties: BTreeMap<String, BTreeMap<String, String>>,

    /// Raw arguments appended verbatim when `customArgsEnabled` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_args: Option<String>,
    pub custom_args_enabled: bool,

    /// Display bindings in user order.
    pub screens: Vec<ScreenConfig>,

    /// Render `globalWallpaper` on every display.
    pub clone_mode: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_wallpaper: Option<String>,

    /// Renderer binary. Defaults to `linux-wallpaperengine` on `PATH`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_executable_location: Option<String>,

    /// Wallpaper library directory. Defaults to the Steam Workshop folder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallpaper_engine_dir: Option<String>,

    /// Unmodelled keys, kept so round-trips do not lose front-end settings.
    #[serde(flatten)]
    #[schemars(skip)]
    pub extra: Map<String, Value>,
}

/// Returns `Some(trimmed)` for non-blank strings.
pub(crate) fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

impl AppConfig {
    /// Effective frame rate.
    #[must_use]
    pub fn effective_fps(&self) -> u32 { self.fps.filter(|fps| *fps > 0).unwrap_or(DEFAULT_FPS) }

    /// Renderer executable to launch.
    #[must_use]
    pub fn executable(&self) -> String {
        non_blank(self.custom_executable_location.as_ref()).map_or_else(
            || DEFAULT_RENDERER.to_string(),
            |path| expand(path).to_string_lossy().into_owned(),
        )
    }

    /// Wallpaper library directory, tilde-expanded.
    #[must_use]
    pub fn wallpaper_base_path(&self) -> PathBuf {
        let raw = non_blank(self.wallpaper_engine_dir.as_ref()).unwrap_or(DEFAULT_WORKSHOP_DIR);
        expand(raw)
    }

    /// Looks up the binding for a display.
    #[must_use]
    pub fn screen(&self, name: &str) -> Option<&ScreenConfig> {
        self.screens.iter().find(|screen| screen.name == name)
    }

    /// Sets (or clears) the wallpaper bound to `name`, adding the entry if it
    /// does not exist yet.
    pub fn bind(&mut self, name: &str, wallpaper: Option<String>) {
        if let Some(screen) = self.screens.iter_mut().find(|screen| screen.name == name) {
            screen.wallpaper = wallpaper;
        } else {
            self.screens.push(ScreenConfig::new(name, wallpaper));
        }
    }

    /// First bound wallpaper in display order, used for newly connected
    /// displays.
    #[must_use]
    pub fn fallback_wallpaper(&self) -> Option<&str> {
        self.screens.iter().find_map(|screen| non_blank(screen.wallpaper.as_ref()))
    }
}

/// Errors that can occur when loading or saving the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No configuration file was found in any of the expected locations.
    #[error(
        "No configuration file found. Expected at $XDG_CONFIG_HOME/backdrop/config.json or \
         ~/.config/backdrop/config.json"
    )]
    NotFound,
    /// The configuration file exists but could not be read or written.
    #[error("Failed to access configuration file: {0}")]
    IoError(#[from] std::io::Error),
    /// The configuration file contains invalid JSON.
    #[error("Failed to parse configuration file: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// Configuration file names to search for (in priority order).
const CONFIG_FILE_NAMES: &[&str] = &["config.jsonc", "config.json"];

/// Returns the possible configuration file paths in priority order.
///
/// 1. `$XDG_CONFIG_HOME/backdrop/` when set
/// 2. `~/.config/backdrop/`
/// 3. The platform config directory reported by `dirs`
#[must_use]
pub fn config_paths() -> Vec<PathBuf> {
    let mut dirs_to_check = Vec::new();

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME")
        && !xdg_config.is_empty()
    {
        dirs_to_check.push(PathBuf::from(xdg_config).join(APP_NAME));
    }

    if let Some(home) = dirs::home_dir() {
        dirs_to_check.push(home.join(".config").join(APP_NAME));
    }

    if let Some(config_dir) = dirs::config_dir() {
        let dir = config_dir.join(APP_NAME);
        if !dirs_to_check.contains(&dir) {
            dirs_to_check.push(dir);
        }
    }

    dirs_to_check
        .into_iter()
        .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
        .collect()
}

/// Loads the configuration from a specific path.
///
/// # Errors
///
/// Returns `ConfigError::NotFound` if the file does not exist,
/// `ConfigError::IoError` if it cannot be read and `ConfigError::ParseError`
/// if it is not valid JSONC.
pub fn load_config_from_path(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound);
    }

    let file = fs::File::open(path)?;
    // Strip comments from JSONC before parsing
    let reader = json_comments::StripComments::new(file);
    Ok(serde_json::from_reader(reader)?)
}

/// Finds the first existing configuration file in [`config_paths`].
#[must_use]
pub fn find_config_file() -> Option<PathBuf> { config_paths().into_iter().find(|p| p.exists()) }
