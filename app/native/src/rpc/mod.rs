//! Control-plane transport between the CLI and the daemon.
//!
//! Newline-delimited JSON over a Unix domain socket. Calls are correlated by
//! id and fully multiplexed; events flow from the daemon to every connected
//! client.

mod buffer;
pub mod client;
mod pending;
pub mod protocol;
pub mod server;

pub use buffer::LineBuffer;
pub use client::{Backoff, ConnectionState, RetryPolicy, RpcClient};
pub use pending::PendingCalls;
pub use protocol::{Call, Event, Inbound, ProtocolError, RequestId, Response, methods};
pub use server::{CallHandler, RpcServer};
use thiserror::Error;

/// Errors surfaced by the transport.
#[derive(Debug, Error)]
pub enum RpcError {
    /// A call was attempted while no connection is established.
    #[error("backend not connected")]
    NotConnected,

    /// Every connection attempt failed.
    #[error("backend unavailable after {attempts} attempts: {last_error}")]
    BackendUnavailable { attempts: u32, last_error: String },

    /// The connection dropped before the call was answered.
    #[error("connection closed before a response arrived")]
    ConnectionClosed,

    /// The backend answered with an error.
    #[error("{0}")]
    Remote(String),

    /// The call could not be serialized.
    #[error("failed to encode call: {0}")]
    Encode(String),

    /// Socket I/O failed.
    #[error("socket error: {0}")]
    Io(String),

    /// The backend answered with something unexpected.
    #[error("unexpected response: {0}")]
    Protocol(String),
}

impl From<std::io::Error> for RpcError {
    fn from(err: std::io::Error) -> Self { Self::Io(err.to_string()) }
}
