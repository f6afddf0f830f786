//! Error types for Backdrop.
//!
//! `BackdropError` is the top-level error surfaced by the CLI and the daemon
//! entry point. Each subsystem keeps its own narrower error type and converts
//! into this one at the boundary.

use thiserror::Error;

use crate::config::ConfigError;
use crate::reconcile::TopologyError;
use crate::renderer::ActorError;
use crate::rpc::RpcError;

/// Errors that can occur during application execution.
#[derive(Debug, Error)]
pub enum BackdropError {
    /// Invalid command arguments.
    #[error("{0}")]
    InvalidArguments(String),
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),
    /// RPC transport error.
    #[error("RPC error: {0}")]
    RpcError(String),
    /// Renderer supervision failed.
    #[error("Renderer error: {0}")]
    RendererError(String),
    /// Display topology could not be read.
    #[error("Display error: {0}")]
    DisplayError(String),
    /// IO error.
    #[error("IO error: {0}")]
    IoError(String),
    /// Generic command error.
    #[error("{0}")]
    CommandError(String),
}

impl From<std::io::Error> for BackdropError {
    fn from(err: std::io::Error) -> Self { Self::IoError(err.to_string()) }
}

impl From<serde_json::Error> for BackdropError {
    fn from(err: serde_json::Error) -> Self { Self::CommandError(err.to_string()) }
}

impl From<ConfigError> for BackdropError {
    fn from(err: ConfigError) -> Self { Self::ConfigError(err.to_string()) }
}

impl From<RpcError> for BackdropError {
    fn from(err: RpcError) -> Self { Self::RpcError(err.to_string()) }
}

impl From<ActorError> for BackdropError {
    fn from(err: ActorError) -> Self { Self::RendererError(err.to_string()) }
}

impl From<TopologyError> for BackdropError {
    fn from(err: TopologyError) -> Self { Self::DisplayError(err.to_string()) }
}

impl From<String> for BackdropError {
    fn from(msg: String) -> Self { Self::CommandError(msg) }
}

impl From<&str> for BackdropError {
    fn from(msg: &str) -> Self { Self::CommandError(msg.to_string()) }
}
