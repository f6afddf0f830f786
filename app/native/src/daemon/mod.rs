//! The long-lived backend process.
//!
//! Wires the collaborators together and serves the socket until SIGINT or
//! SIGTERM:
//!
//! - supervisor actor with the OS launcher
//! - reconciliation driver, triggered at startup and by the watchers
//! - config file, display topology and wallpaper library watchers
//! - download poller
//! - RPC server answering [`handlers::DaemonHandler`] methods
//!
//! On shutdown every renderer is stopped and the socket file is removed.

pub mod handlers;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;

use self::handlers::DaemonHandler;
use crate::config::{self, ConfigStore, watch_config_file};
use crate::error::BackdropError;
use crate::events::{EventBus, library, screens};
use crate::reconcile::topology::TOPOLOGY_POLL_INTERVAL;
use crate::reconcile::{
    ApplyTarget, DisplayTopology, ReconciliationDriver, Trigger, XrandrTopology, watch_topology,
};
use crate::renderer::{OsLauncher, SupervisorActor, SupervisorHandle};
use crate::rpc::{RetryPolicy, RpcClient, RpcServer, methods};
use crate::utils::command::resolve_binary;
use crate::workshop::poller::POLL_INTERVAL;
use crate::workshop::{
    DiskProbe, DownloadPoller, FolderChange, NoProgressBackend, spawn_poller, watch_library,
};

/// Returns `true` when a daemon already answers `ping` on `socket`.
pub async fn is_running(socket: &Path) -> bool {
    let client = RpcClient::new(socket, RetryPolicy::once());
    if client.connect().await.is_err() {
        return false;
    }
    let alive = client.send(methods::PING, serde_json::Value::Null).await.is_ok();
    client.disconnect().await;
    alive
}

/// Warns when the renderer executable cannot be found. Returns the resolved
/// path when it can.
pub fn check_renderer(executable: &str) -> Option<PathBuf> {
    match resolve_binary(executable) {
        Ok(path) => {
            tracing::debug!(path = %path.display(), "renderer executable found");
            Some(path)
        }
        Err(err) => {
            tracing::warn!(executable, error = %err, "renderer executable not found, wallpapers will fail to start");
            None
        }
    }
}

/// Runs the daemon until a termination signal arrives.
///
/// # Errors
///
/// Returns an error if another daemon is already serving `socket` or the
/// socket cannot be bound.
pub async fn run(socket: PathBuf, bus: EventBus) -> Result<(), BackdropError> {
    if is_running(&socket).await {
        return Err(BackdropError::CommandError(format!(
            "daemon already running on {}",
            socket.display()
        )));
    }

    let store: Arc<dyn ConfigStore> = Arc::new(config::default_store());
    let initial = store.load().unwrap_or_else(|err| {
        tracing::warn!(error = %err, "failed to load configuration, using defaults");
        config::AppConfig::default()
    });
    if let Some(path) = store.location() {
        tracing::info!(path = %path.display(), "using configuration");
    }
    check_renderer(&initial.executable());

    let (exit_tx, exit_rx) = mpsc::unbounded_channel();
    let supervisor = SupervisorActor::spawn(OsLauncher::new(bus.clone(), exit_tx), Some(exit_rx));

    let topology: Arc<dyn DisplayTopology> = Arc::new(XrandrTopology::default());
    let driver = ReconciliationDriver::new(
        Arc::clone(&store),
        Arc::clone(&topology),
        ApplyTarget::Local(supervisor.clone()),
    )
    .spawn();
    driver.trigger(Trigger::Startup);

    if let Some(path) = store.location() {
        let driver = driver.clone();
        watch_config_file(path.to_path_buf(), move || {
            driver.trigger(Trigger::ConfigWritten);
        });
    }

    let topology_task = {
        let bus = bus.clone();
        let driver = driver.clone();
        watch_topology(Arc::clone(&topology), TOPOLOGY_POLL_INTERVAL, move |connected| {
            bus.emit(screens::CHANGED, &connected);
            driver.trigger(Trigger::TopologyChanged);
        })
    };

    let base = initial.wallpaper_base_path();
    let poller = Arc::new(Mutex::new(DownloadPoller::new(NoProgressBackend, DiskProbe::new(base.clone()))));
    let poller_task = {
        let driver = driver.clone();
        spawn_poller(Arc::clone(&poller), bus.clone(), POLL_INTERVAL, move || {
            driver.trigger(Trigger::SubscriptionChanged);
        })
    };

    let (folder_tx, folder_rx) = mpsc::unbounded_channel();
    watch_library(base, move |change| {
        let _ = folder_tx.send(change);
    });
    let library_task = tokio::spawn(forward_library_changes(folder_rx, bus.clone(), supervisor.clone()));

    let handler = DaemonHandler {
        store: Arc::clone(&store),
        topology,
        supervisor: supervisor.clone(),
        driver: driver.clone(),
        poller,
        socket: socket.clone(),
        started_at: Instant::now(),
    };
    let server = RpcServer::bind(&socket, handler, bus)?;
    server.serve(shutdown_signal()).await;

    tracing::info!("shutting down, stopping renderers");
    driver.stop();
    topology_task.abort();
    poller_task.abort();
    library_task.abort();

    let executable = store.load().map_or_else(|_| initial.executable(), |c| c.executable());
    if let Err(err) = supervisor.kill_all(executable).await {
        tracing::warn!(error = %err, "failed to stop renderers");
    }
    let _ = supervisor.shutdown().await;

    Ok(())
}

/// Publishes library changes and stops renderers whose folder disappeared.
async fn forward_library_changes(
    mut changes: mpsc::UnboundedReceiver<FolderChange>,
    bus: EventBus,
    supervisor: SupervisorHandle,
) {
    while let Some(change) = changes.recv().await {
        bus.emit(
            library::FOLDER_CHANGED,
            json!({ "path": change.path.to_string_lossy(), "op": change.op }),
        );

        if change.is_gone()
            && let Some(folder) = change.folder_name()
        {
            match supervisor.kill_matching(folder).await {
                Ok(stopped) if !stopped.is_empty() => {
                    tracing::info!(folder, displays = ?stopped, "wallpaper folder removed, renderers stopped");
                }
                Ok(_) => {}
                Err(err) => tracing::warn!(folder, error = %err, "failed to stop renderers for removed folder"),
            }
        }
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let (Ok(mut interrupt), Ok(mut terminate)) =
        (signal(SignalKind::interrupt()), signal(SignalKind::terminate()))
    else {
        tracing::warn!("failed to install signal handlers, falling back to ctrl-c");
        let _ = tokio::signal::ctrl_c().await;
        return;
    };

    tokio::select! {
        _ = interrupt.recv() => tracing::info!("received SIGINT"),
        _ = terminate.recv() => tracing::info!("received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn nothing_is_running_on_a_fresh_path() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_running(&dir.path().join("backdrop.sock")).await);
    }

    #[test]
    fn missing_renderer_is_reported() {
        assert!(check_renderer("backdrop-test-no-such-renderer").is_none());
        assert!(check_renderer("sh").is_some());
    }

    #[tokio::test]
    async fn removed_folder_stops_its_renderer() {
        use crate::renderer::supervisor::testing::RecordingLauncher;
        use crate::renderer::{DesiredProcess, RendererCommand};
        use crate::workshop::FolderOp;

        let supervisor = SupervisorActor::spawn(RecordingLauncher::default(), None);
        supervisor
            .reconcile(vec![DesiredProcess::new(
                "DP-1",
                RendererCommand { executable: "linux-wallpaperengine".into(), args: vec!["999".into()] },
            )])
            .await
            .unwrap();

        let bus = EventBus::new();
        let mut events = bus.subscribe();
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(forward_library_changes(rx, bus, supervisor.clone()));

        tx.send(FolderChange { path: PathBuf::from("/nonexistent/lib/999"), op: FolderOp::Remove })
            .unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event.method, "wallpaper-folder-changed");
        assert_eq!(event.params["op"], "remove");

        drop(tx);
        task.await.unwrap();
        assert!(supervisor.snapshot().await.unwrap().is_empty());
    }
}
