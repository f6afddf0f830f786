//! Configuration file watcher.
//!
//! External edits to the config file (a text editor, another front-end)
//! schedule a reconciliation pass through the supplied callback.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};

use crate::utils::thread::spawn_named_thread;

/// Debounce duration for config file changes.
/// Some editors trigger multiple events per save (write to temp, rename, etc.).
const CONFIG_DEBOUNCE_MS: u64 = 200;

/// Starts watching `config_path` and calls `on_change` whenever it is
/// modified. The watcher runs on its own thread for the life of the process.
pub fn watch_config_file<F>(config_path: PathBuf, on_change: F)
where F: Fn() + Send + 'static {
    let Some(config_filename) = config_path.file_name().map(std::ffi::OsStr::to_os_string) else {
        tracing::warn!(path = %config_path.display(), "config path has no file name, not watching");
        return;
    };

    spawn_named_thread("config-watcher", move || {
        let (tx, rx) = std::sync::mpsc::channel();

        let mut watcher: RecommendedWatcher = match notify::recommended_watcher(tx) {
            Ok(w) => w,
            Err(err) => {
                tracing::warn!(error = %err, "failed to create config watcher");
                return;
            }
        };

        // Watch the parent directory to catch editors that save by renaming
        // a temp file over the original (and our own atomic writes).
        let watch_path = config_path.parent().map_or_else(|| config_path.clone(), PathBuf::from);
        if let Err(err) = std::fs::create_dir_all(&watch_path) {
            tracing::warn!(error = %err, path = %watch_path.display(), "failed to create config directory");
            return;
        }

        if let Err(err) = watcher.watch(&watch_path, RecursiveMode::NonRecursive) {
            tracing::warn!(error = %err, "failed to watch config file");
            return;
        }

        tracing::debug!(path = %config_path.display(), "watching configuration file");

        let mut last_event_time: Option<Instant> = None;
        let debounce_duration = Duration::from_millis(CONFIG_DEBOUNCE_MS);

        for result in &rx {
            match result {
                Ok(event) => {
                    let affects_config = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().is_some_and(|name| name == config_filename));

                    if !affects_config || event.kind.is_access() {
                        continue;
                    }

                    let now = Instant::now();
                    if last_event_time.is_some_and(|t| now.duration_since(t) < debounce_duration) {
                        continue;
                    }
                    last_event_time = Some(now);

                    tracing::info!(path = %config_path.display(), "configuration file changed");
                    on_change();
                }
                Err(err) => tracing::warn!(error = %err, "config watch error"),
            }
        }
    });
}
