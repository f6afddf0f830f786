//! Connected-display discovery.
//!
//! [`XrandrTopology`] reads `xrandr --query`; [`StaticTopology`] is a fixed
//! list for tests and headless runs. [`watch_topology`] polls a topology and
//! reports changes.

use std::process::Command;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use parking_lot::RwLock;
use regex::Regex;
use thiserror::Error;
use tokio::task::JoinHandle;

/// Poll interval of the topology watcher.
pub const TOPOLOGY_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// `<name> connected ...` lines of `xrandr --query`.
static CONNECTED_LINE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(\S+) connected\b").ok());

/// Errors reading the display topology.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("topology query was cancelled")]
    Cancelled,
}

/// Source of the connected display names, in output order.
pub trait DisplayTopology: Send + Sync {
    /// Lists connected displays.
    ///
    /// # Errors
    ///
    /// Returns an error when the display server cannot be queried.
    fn screens(&self) -> Result<Vec<String>, TopologyError>;
}

/// Queries a topology off the async executor.
///
/// # Errors
///
/// Returns the topology's error, or [`TopologyError::Cancelled`] if the
/// blocking task was dropped.
pub async fn connected_screens(
    topology: &Arc<dyn DisplayTopology>,
) -> Result<Vec<String>, TopologyError> {
    let topology = Arc::clone(topology);
    tokio::task::spawn_blocking(move || topology.screens())
        .await
        .map_err(|_| TopologyError::Cancelled)?
}

/// Parses `xrandr --query` output into connected display names.
#[must_use]
pub fn parse_xrandr(output: &str) -> Vec<String> {
    let Some(pattern) = CONNECTED_LINE.as_ref() else {
        tracing::error!("xrandr output pattern failed to compile");
        return Vec::new();
    };
    output
        .lines()
        .filter_map(|line| pattern.captures(line))
        .filter_map(|caps| caps.get(1))
        .map(|name| name.as_str().to_string())
        .collect()
}

/// Reads the topology from `xrandr`.
#[derive(Debug, Clone)]
pub struct XrandrTopology {
    program: String,
}

impl Default for XrandrTopology {
    fn default() -> Self { Self { program: "xrandr".to_string() } }
}

impl XrandrTopology {
    /// Uses a different `xrandr`-compatible program.
    #[must_use]
    pub fn with_program(program: impl Into<String>) -> Self { Self { program: program.into() } }
}

impl DisplayTopology for XrandrTopology {
    fn screens(&self) -> Result<Vec<String>, TopologyError> {
        let output = Command::new(&self.program).arg("--query").output().map_err(|source| {
            TopologyError::Spawn { program: self.program.clone(), source }
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(TopologyError::Failed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }
        if !stderr.trim().is_empty() {
            tracing::debug!(stderr = %stderr.trim(), "xrandr reported warnings");
        }

        Ok(parse_xrandr(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Fixed display list that can be changed at runtime.
#[derive(Debug, Default)]
pub struct StaticTopology {
    screens: RwLock<Vec<String>>,
}

impl StaticTopology {
    #[must_use]
    pub fn new<S: Into<String>>(screens: impl IntoIterator<Item = S>) -> Self {
        Self {
            screens: RwLock::new(screens.into_iter().map(Into::into).collect()),
        }
    }

    /// Replaces the display list.
    pub fn set<S: Into<String>>(&self, screens: impl IntoIterator<Item = S>) {
        *self.screens.write() = screens.into_iter().map(Into::into).collect();
    }
}

impl DisplayTopology for StaticTopology {
    fn screens(&self) -> Result<Vec<String>, TopologyError> { Ok(self.screens.read().clone()) }
}

/// Polls `topology` every `interval` and calls `on_change` with the new list
/// whenever it differs from the previous poll. Failed polls are skipped.
pub fn watch_topology<F>(
    topology: Arc<dyn DisplayTopology>,
    interval: Duration,
    mut on_change: F,
) -> JoinHandle<()>
where
    F: FnMut(Vec<String>) + Send + 'static,
{
    tokio::spawn(async move {
        let mut last = connected_screens(&topology).await.unwrap_or_default();
        tracing::debug!(screens = ?last, "topology watcher started");

        loop {
            tokio::time::sleep(interval).await;

            let current = match connected_screens(&topology).await {
                Ok(screens) => screens,
                Err(err) => {
                    tracing::debug!(error = %err, "topology poll failed");
                    continue;
                }
            };

            if current != last {
                tracing::info!(screens = ?current, "display topology changed");
                last.clone_from(&current);
                on_change(current);
            }
        }
    })
}
