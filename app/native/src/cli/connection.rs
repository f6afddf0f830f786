//! Client side of the control socket for CLI commands.

use std::path::Path;

use colored::Colorize;
use serde_json::Value;

use crate::daemon;
use crate::error::BackdropError;
use crate::rpc::{RetryPolicy, RpcClient, RpcError};

/// Builds a current-thread runtime for one command.
///
/// # Errors
///
/// Returns an error if the runtime cannot be created.
pub fn runtime() -> Result<tokio::runtime::Runtime, BackdropError> {
    Ok(tokio::runtime::Builder::new_current_thread().enable_all().build()?)
}

/// Connects to the daemon, reporting each retry on stderr.
///
/// # Errors
///
/// Returns an error once every attempt allowed by the default retry policy
/// has failed.
pub async fn connect(socket: &Path) -> Result<RpcClient, BackdropError> {
    let policy = RetryPolicy::default();
    let client = RpcClient::new(socket, policy);

    let max = policy.max_attempts;
    client.on_retry(move |attempt, err| {
        tracing::debug!(attempt, error = %err, "connect failed");
        eprintln!("{} (attempt {attempt}/{max})", "reconnecting".yellow());
    });

    match client.connect().await {
        Ok(()) => Ok(client),
        Err(err @ RpcError::BackendUnavailable { .. }) => Err(BackdropError::RpcError(format!(
            "{err}\nIs the daemon running? Start it with `backdrop daemon`."
        ))),
        Err(err) => Err(err.into()),
    }
}

/// Sends one call on a fresh connection and closes it.
///
/// # Errors
///
/// Returns an error if the daemon is unreachable or answers with an error.
pub async fn request(socket: &Path, method: &str, params: Value) -> Result<Value, BackdropError> {
    let client = connect(socket).await?;
    let result = client.send(method, params).await;
    client.disconnect().await;
    Ok(result?)
}

/// Like [`request`], but returns `None` without retrying when no daemon is
/// listening.
///
/// # Errors
///
/// Returns an error if a daemon is running but the call fails.
pub async fn request_if_running(
    socket: &Path,
    method: &str,
    params: Value,
) -> Result<Option<Value>, BackdropError> {
    if !daemon::is_running(socket).await {
        return Ok(None);
    }
    request(socket, method, params).await.map(Some)
}
