//! Wire protocol: newline-delimited JSON over a Unix socket.
//!
//! Three message shapes travel on a connection:
//!
//! ```json
//! {"id": 1, "method": "get-screens", "params": {}}     // call (client -> backend)
//! {"id": 1, "result": ["DP-1", "HDMI-A-1"]}            // response
//! {"id": 2, "error": "unknown method: frobnicate"}     // response
//! {"method": "log", "params": {"type": "wallpaper", "message": "DP-1: ready"}}  // event
//! ```
//!
//! A document carrying an `id` is a response; one without is an event.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Request identifier, unique per connection.
pub type RequestId = u64;

/// Method names understood by the backend.
pub mod methods {
    pub const PING: &str = "ping";
    pub const APPLY_WALLPAPERS: &str = "apply-wallpapers";
    pub const GET_CONFIG: &str = "get-config";
    pub const WRITE_CONFIG: &str = "write-config";
    pub const GET_SCREENS: &str = "get-screens";
    pub const GET_WALLPAPER_BASE_PATH: &str = "get-wallpaper-base-path";
    pub const KILL_ALL_WALLPAPERS: &str = "kill-all-wallpapers";
    pub const KILL_WALLPAPER: &str = "kill-wallpaper";
    pub const GET_STATUS: &str = "get-status";
    pub const TRACK_DOWNLOAD: &str = "track-download";
    pub const GET_DOWNLOADS: &str = "get-downloads";
}

/// Errors decoding a wire line.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message has neither an id nor a method")]
    Unrecognized,
    #[error("call is missing its {0}")]
    MissingField(&'static str),
}

/// Every field any message shape can carry.
#[derive(Debug, Default, Deserialize)]
struct RawMessage {
    id: Option<RequestId>,
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// A correlated request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub id: RequestId,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl Call {
    /// Decodes a call received by the backend.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] for invalid JSON or a missing id/method.
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        let raw: RawMessage = serde_json::from_str(line)?;
        let id = raw.id.ok_or(ProtocolError::MissingField("id"))?;
        let method = raw.method.ok_or(ProtocolError::MissingField("method"))?;
        Ok(Self {
            id,
            method,
            params: raw.params.unwrap_or(Value::Null),
        })
    }
}

/// The single answer to a [`Call`].
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: RequestId,
    pub outcome: Result<Value, String>,
}

impl Response {
    /// Creates a success response.
    pub fn success(id: RequestId, result: impl Serialize) -> Self {
        Self {
            id,
            outcome: Ok(serde_json::to_value(result).unwrap_or(Value::Null)),
        }
    }

    /// Creates an error response.
    pub fn error(id: RequestId, message: impl Into<String>) -> Self {
        Self { id, outcome: Err(message.into()) }
    }
}

#[derive(Serialize)]
struct WireResponse<'a> {
    id: RequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

impl Serialize for Response {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match &self.outcome {
            Ok(result) => WireResponse { id: self.id, result: Some(result), error: None },
            Err(error) => WireResponse { id: self.id, result: None, error: Some(error) },
        };
        wire.serialize(serializer)
    }
}

/// An uncorrelated push from the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl Event {
    #[must_use]
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self { method: method.into(), params }
    }
}

/// A message received by the client, classified once at decode time.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Response(Response),
    Event(Event),
}

impl Inbound {
    /// Decodes one line received by the client.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] for invalid JSON or a document that is
    /// neither a response nor an event.
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        let raw: RawMessage = serde_json::from_str(line)?;

        if let Some(id) = raw.id {
            let outcome = match raw.error {
                Some(Value::Null) | None => Ok(raw.result.unwrap_or(Value::Null)),
                Some(Value::String(message)) => Err(message),
                Some(other) => Err(other.to_string()),
            };
            return Ok(Self::Response(Response { id, outcome }));
        }

        let method = raw.method.ok_or(ProtocolError::Unrecognized)?;
        Ok(Self::Event(Event {
            method,
            params: raw.params.unwrap_or(Value::Null),
        }))
    }
}

/// Serializes a message as one wire line, newline included.
///
/// # Errors
///
/// Returns an error if the value cannot be represented as JSON.
pub fn encode_line(message: &impl Serialize) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}
