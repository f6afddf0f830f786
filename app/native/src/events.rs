//! Centralized event definitions and the in-process event bus.
//!
//! Every event pushed to connected clients is named here so the daemon, the
//! CLI and any other consumer agree on the wire names.
//!
//! ## Naming Convention
//!
//! Event names are kebab-case. Each event's payload is documented on its
//! constant.

use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::broadcast;

use crate::rpc::Event;

/// Capacity of the broadcast channel backing the bus. Slow receivers that
/// fall this far behind skip events.
const BUS_CAPACITY: usize = 256;

/// Log forwarding events.
pub mod log {
    /// A line of output from a renderer or the daemon itself.
    ///
    /// Payload: `{ type: "wallpaper" | "backend", message: String }`
    pub const NAME: &str = "log";

    /// Log type for lines captured from renderer stdout/stderr.
    pub const KIND_WALLPAPER: &str = "wallpaper";

    /// Log type for daemon-side tracing events.
    pub const KIND_BACKEND: &str = "backend";
}

/// Display topology events.
pub mod screens {
    /// Emitted when the set of connected displays changes.
    ///
    /// Payload: `String[]` - connected display names.
    pub const CHANGED: &str = "screens-changed";
}

/// Wallpaper library events.
pub mod library {
    /// Emitted when a folder is created, removed or renamed in the wallpaper
    /// base directory.
    ///
    /// Payload: `{ path: String, op: "create" | "remove" | "rename" }`
    pub const FOLDER_CHANGED: &str = "wallpaper-folder-changed";
}

/// Workshop download events.
pub mod downloads {
    /// Payload: `{ fileId: String, current: u64, total: u64 }`
    pub const PROGRESS: &str = "download-progress";

    /// Payload: `{ fileId: String, outcome: "completed" | "abandoned" }`
    pub const FINISHED: &str = "download-finished";
}

/// Broadcast bus carrying outbound events to every connected client.
///
/// Cloning the bus is cheap; every clone publishes into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self { Self::new() }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self { sender }
    }

    /// Subscribes to every event published after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> { self.sender.subscribe() }

    /// Publishes an event. Events with no subscribers are dropped silently.
    pub fn emit(&self, method: &str, params: impl Serialize) {
        let params = serde_json::to_value(params).unwrap_or(Value::Null);
        let _ = self.sender.send(Event::new(method, params));
    }

    /// Publishes a `log` event.
    pub fn log(&self, kind: &str, message: impl Into<String>) {
        self.emit(log::NAME, json!({ "type": kind, "message": message.into() }));
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize { self.sender.receiver_count() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_are_kebab_case() {
        for name in [
            log::NAME,
            screens::CHANGED,
            library::FOLDER_CHANGED,
            downloads::PROGRESS,
            downloads::FINISHED,
        ] {
            assert!(name.chars().all(|c| c.is_ascii_lowercase() || c == '-'), "{name}");
        }
    }

    #[tokio::test]
    async fn log_event_carries_type_and_message() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.log(log::KIND_WALLPAPER, "DP-1: ready");

        let event = rx.recv().await.unwrap();
        assert_eq!(event.method, "log");
        assert_eq!(event.params["type"], "wallpaper");
        assert_eq!(event.params["message"], "DP-1: ready");
    }

    #[test]
    fn emit_without_subscribers_is_silent() {
        let bus = EventBus::new();
        assert_eq!(bus.receiver_count(), 0);
        bus.emit(screens::CHANGED, vec!["HDMI-A-1"]);
    }
}
