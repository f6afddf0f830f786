//! Reconciliation driver.
//!
//! Turns "something changed" into one reconciliation pass:
//!
//! 1. read the configuration and the connected displays
//! 2. give newly connected displays the fallback wallpaper and persist it
//! 3. build one renderer command per live display
//! 4. hand the desired list to the supervisor, locally or over the socket
//!
//! Triggers are debounced on the trailing edge: every trigger re-arms the
//! timer, and a burst collapses into a single pass once it goes quiet.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::topology::{DisplayTopology, connected_screens};
use crate::config::{AppConfig, ConfigStore};
use crate::error::BackdropError;
use crate::renderer::{
    DesiredProcess, DisplayBinding, ReconcileReport, RenderSettings, SupervisorHandle,
    build_command,
};
use crate::rpc::{RpcClient, methods};

/// Quiet period before a burst of triggers turns into a pass.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Why a pass was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Trigger {
    Startup,
    ConfigWritten,
    TopologyChanged,
    SubscriptionChanged,
    Manual,
}

/// Adds a binding for every live display the config doesn't know yet, using
/// the fallback wallpaper when there is one. Returns the displays added.
pub fn auto_assign(config: &mut AppConfig, screens: &[String]) -> Vec<String> {
    let fallback = config.fallback_wallpaper().map(str::to_string);

    let added: Vec<String> = screens
        .iter()
        .filter(|name| config.screen(name).is_none())
        .cloned()
        .collect();

    for name in &added {
        if let Some(wallpaper) = &fallback {
            tracing::info!(display = %name, wallpaper = %wallpaper, "auto-assigning wallpaper to new display");
        } else {
            tracing::info!(display = %name, "new display detected, no wallpaper to assign");
        }
        config.bind(name, fallback.clone());
    }

    added
}

/// Desired renderers for the live `screens`, in display order.
///
/// Displays without a binding still get the global wallpaper in clone mode.
#[must_use]
pub fn desired_processes(config: &AppConfig, screens: &[String]) -> Vec<DesiredProcess> {
    let settings = RenderSettings::from(config);

    screens
        .iter()
        .filter_map(|name| {
            let binding = config
                .screen(name)
                .map_or_else(|| DisplayBinding::new(name.as_str(), None), DisplayBinding::from);
            build_command(&binding, &settings).map(|command| DesiredProcess::new(name.as_str(), command))
        })
        .collect()
}

/// Where desired processes are applied.
#[derive(Clone)]
pub enum ApplyTarget {
    /// The supervisor actor in this process.
    Local(SupervisorHandle),
    /// A daemon reached over the socket.
    Remote(RpcClient),
}

impl ApplyTarget {
    /// Applies a desired list and returns what changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the supervisor or the daemon cannot be reached.
    pub async fn apply(&self, desired: Vec<DesiredProcess>) -> Result<ReconcileReport, BackdropError> {
        match self {
            Self::Local(handle) => Ok(handle.reconcile(desired).await?),
            Self::Remote(client) => Ok(client
                .call(methods::APPLY_WALLPAPERS, json!({ "processes": desired }))
                .await?),
        }
    }
}

/// Runs reconciliation passes.
pub struct ReconciliationDriver {
    store: Arc<dyn ConfigStore>,
    topology: Arc<dyn DisplayTopology>,
    target: ApplyTarget,
    debounce: Duration,
    passes: Arc<AtomicU64>,
}

impl ReconciliationDriver {
    #[must_use]
    pub fn new(
        store: Arc<dyn ConfigStore>,
        topology: Arc<dyn DisplayTopology>,
        target: ApplyTarget,
    ) -> Self {
        Self {
            store,
            topology,
            target,
            debounce: DEFAULT_DEBOUNCE,
            passes: Arc::new(AtomicU64::new(0)),
        }
    }

    #[must_use]
    pub const fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Reads config and topology, persists auto-assigned bindings, and
    /// returns the desired renderers.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be loaded or saved, or the
    /// topology cannot be read.
    pub async fn prepare(&self) -> Result<Vec<DesiredProcess>, BackdropError> {
        prepare_pass(self.store.as_ref(), &self.topology).await
    }

    /// Runs one pass immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the pass could not be prepared or applied. Spawn
    /// failures are not errors; they are listed in the report.
    pub async fn run_pass(&self) -> Result<ReconcileReport, BackdropError> {
        let desired = self.prepare().await?;
        let report = self.target.apply(desired).await?;
        self.passes.fetch_add(1, Ordering::Relaxed);
        Ok(report)
    }

    /// Starts the trigger loop and returns a handle to feed it.
    #[must_use]
    pub fn spawn(self) -> DriverHandle {
        let (sender, receiver) = mpsc::unbounded_channel();
        let passes = Arc::clone(&self.passes);
        let task = tokio::spawn(self.run(receiver));
        DriverHandle { sender, passes, task: Arc::new(task) }
    }

    async fn run(self, mut triggers: mpsc::UnboundedReceiver<Trigger>) {
        while let Some(first) = triggers.recv().await {
            let mut reasons = vec![first];

            loop {
                tokio::select! {
                    next = triggers.recv() => match next {
                        Some(trigger) => {
                            if !reasons.contains(&trigger) {
                                reasons.push(trigger);
                            }
                        }
                        None => break,
                    },
                    () = tokio::time::sleep(self.debounce) => break,
                }
            }

            match self.run_pass().await {
                Ok(report) => {
                    if report.changes() == 0 && report.success() {
                        tracing::debug!(triggers = ?reasons, "reconciled, no change");
                    } else {
                        tracing::info!(
                            triggers = ?reasons,
                            started = report.started.len(),
                            restarted = report.restarted.len(),
                            stopped = report.stopped.len(),
                            failed = report.failed.len(),
                            "reconciled"
                        );
                    }
                    if let Some(error) = report.error() {
                        tracing::warn!(error = %error, "some renderers failed to start");
                    }
                }
                Err(err) => tracing::warn!(triggers = ?reasons, error = %err, "reconciliation pass failed"),
            }
        }

        tracing::debug!("driver stopped");
    }
}

/// Shared pass preparation, also used by the daemon's `apply-wallpapers`
/// handler.
///
/// # Errors
///
/// Returns an error if the config cannot be loaded or saved, or the topology
/// cannot be read.
pub async fn prepare_pass(
    store: &dyn ConfigStore,
    topology: &Arc<dyn DisplayTopology>,
) -> Result<Vec<DesiredProcess>, BackdropError> {
    let mut config = store.load()?;
    let screens = connected_screens(topology).await?;

    let added = auto_assign(&mut config, &screens);
    if !added.is_empty() {
        store.save(&config)?;
    }

    Ok(desired_processes(&config, &screens))
}

/// Feeds triggers to a running driver. Cheap to clone.
#[derive(Clone)]
pub struct DriverHandle {
    sender: mpsc::UnboundedSender<Trigger>,
    passes: Arc<AtomicU64>,
    task: Arc<JoinHandle<()>>,
}

impl DriverHandle {
    /// Requests a pass. Returns `false` if the driver has stopped.
    pub fn trigger(&self, trigger: Trigger) -> bool {
        tracing::trace!(?trigger, "reconcile requested");
        self.sender.send(trigger).is_ok()
    }

    /// Completed passes so far.
    #[must_use]
    pub fn passes(&self) -> u64 { self.passes.load(Ordering::Relaxed) }

    /// Stops the trigger loop.
    pub fn stop(&self) { self.task.abort(); }
}
