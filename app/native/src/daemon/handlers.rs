//! Method dispatch for the daemon's socket.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::config::{AppConfig, ConfigStore};
use crate::error::BackdropError;
use crate::reconcile::{DisplayTopology, DriverHandle, Trigger, connected_screens, prepare_pass};
use crate::renderer::{DesiredProcess, ReconcileReport, SupervisorHandle};
use crate::rpc::{CallHandler, methods};
use crate::workshop::SharedPoller;

#[derive(Debug, Default, Deserialize)]
struct ApplyParams {
    #[serde(default)]
    processes: Option<Vec<DesiredProcess>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KillWallpaperParams {
    folder_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackDownloadParams {
    file_id: String,
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, BackdropError> {
    serde_json::from_value(params)
        .map_err(|err| BackdropError::InvalidArguments(format!("invalid params: {err}")))
}

/// Report plus the `success`/`error` summary clients check first.
fn report_json(report: &ReconcileReport) -> Value {
    let mut value = serde_json::to_value(report).unwrap_or_else(|_| json!({}));
    if let Some(object) = value.as_object_mut() {
        object.insert("success".into(), json!(report.success()));
        if let Some(error) = report.error() {
            object.insert("error".into(), json!(error));
        }
    }
    value
}

/// Everything the daemon's methods act on.
pub struct DaemonHandler {
    pub store: Arc<dyn ConfigStore>,
    pub topology: Arc<dyn DisplayTopology>,
    pub supervisor: SupervisorHandle,
    pub driver: DriverHandle,
    pub poller: SharedPoller,
    pub socket: PathBuf,
    pub started_at: Instant,
}

impl DaemonHandler {
    fn config(&self) -> Result<AppConfig, BackdropError> { Ok(self.store.load()?) }

    async fn dispatch(&self, method: &str, params: Value) -> Result<Value, BackdropError> {
        match method {
            methods::PING => Ok(json!("pong")),

            methods::APPLY_WALLPAPERS => {
                let ApplyParams { processes } = if params.is_null() {
                    ApplyParams::default()
                } else {
                    parse_params(params)?
                };
                let desired = match processes {
                    Some(processes) => processes,
                    None => prepare_pass(self.store.as_ref(), &self.topology).await?,
                };
                let report = self.supervisor.reconcile(desired).await?;
                Ok(report_json(&report))
            }

            methods::GET_CONFIG => Ok(serde_json::to_value(self.config()?)?),

            methods::WRITE_CONFIG => {
                let config: AppConfig = parse_params(params)?;
                self.store.save(&config)?;
                self.driver.trigger(Trigger::ConfigWritten);
                Ok(json!({ "success": true }))
            }

            methods::GET_SCREENS => {
                let screens = connected_screens(&self.topology).await?;
                Ok(json!({ "success": true, "screens": screens }))
            }

            methods::GET_WALLPAPER_BASE_PATH => {
                Ok(json!(self.config()?.wallpaper_base_path().to_string_lossy()))
            }

            methods::KILL_ALL_WALLPAPERS => {
                let executable = self.config().map(|c| c.executable()).unwrap_or_default();
                let stopped = self.supervisor.kill_all(executable).await?;
                Ok(json!({ "success": true, "stopped": stopped }))
            }

            methods::KILL_WALLPAPER => {
                let KillWallpaperParams { folder_name } = parse_params(params)?;
                if folder_name.trim().is_empty() {
                    return Err(BackdropError::InvalidArguments("folderName must not be empty".into()));
                }
                let stopped = self.supervisor.kill_matching(folder_name).await?;
                Ok(json!({ "success": true, "stopped": stopped }))
            }

            methods::GET_STATUS => {
                let processes = self.supervisor.snapshot().await?;
                let downloads = self.poller.lock().states().len();
                Ok(json!({
                    "pid": std::process::id(),
                    "uptimeSecs": self.started_at.elapsed().as_secs(),
                    "socket": self.socket.to_string_lossy(),
                    "configPath": self.store.location().map(|p| p.to_string_lossy().into_owned()),
                    "passes": self.driver.passes(),
                    "processes": processes,
                    "downloads": downloads,
                }))
            }

            methods::TRACK_DOWNLOAD => {
                let TrackDownloadParams { file_id } = parse_params(params)?;
                let tracked = self.poller.lock().track(file_id);
                Ok(json!({ "tracked": tracked }))
            }

            methods::GET_DOWNLOADS => Ok(serde_json::to_value(self.poller.lock().states())?),

            other => Err(BackdropError::InvalidArguments(format!("Unknown method: {other}"))),
        }
    }
}

impl CallHandler for DaemonHandler {
    async fn handle(&self, method: &str, params: Value) -> Result<Value, String> {
        self.dispatch(method, params).await.map_err(|err| {
            tracing::debug!(method, error = %err, "call failed");
            err.to_string()
        })
    }
}
