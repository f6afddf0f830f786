//! Application-wide constants.

use std::path::PathBuf;

/// Application name, used for directories and the socket file.
pub const APP_NAME: &str = "backdrop";

/// Socket filename within the temporary directory.
pub const SOCKET_FILENAME: &str = "backdrop.sock";

/// Environment variable that overrides the socket path.
pub const SOCKET_ENV: &str = "BACKDROP_SOCKET";

/// Environment variable that overrides the configuration file path.
pub const CONFIG_ENV: &str = "BACKDROP_CONFIG";

/// Environment variable holding the tracing filter directive.
pub const LOG_ENV: &str = "BACKDROP_LOG";

/// Default renderer executable name.
pub const DEFAULT_RENDERER: &str = "linux-wallpaperengine";

/// Default frame rate passed to the renderer.
pub const DEFAULT_FPS: u32 = 60;

/// Steam Workshop content folder for Wallpaper Engine (app id 431960).
pub const DEFAULT_WORKSHOP_DIR: &str = "~/.local/share/Steam/steamapps/workshop/content/431960";

/// Returns the default socket path (`$TMPDIR/backdrop.sock`), honouring
/// `BACKDROP_SOCKET` when set.
#[must_use]
pub fn socket_path() -> PathBuf {
    std::env::var_os(SOCKET_ENV)
        .filter(|value| !value.is_empty())
        .map_or_else(|| std::env::temp_dir().join(SOCKET_FILENAME), PathBuf::from)
}
