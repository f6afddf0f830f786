//! Logging initialization using the `tracing` crate.
//!
//! - `BACKDROP_LOG` controls filtering (default: `info` for this crate, `warn`
//!   for everything else)
//! - Output goes to stderr so command output on stdout stays parseable
//! - In the daemon, INFO and above are also forwarded to connected clients as
//!   `log` events of type `backend`

use std::fmt::{self, Write as _};

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, fmt as tracing_fmt};

use crate::constants::LOG_ENV;
use crate::events::{EventBus, log};

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        EnvFilter::new(format!("warn,backdrop={default_level},backdrop_lib={default_level}"))
    })
}

/// Initializes logging for one-shot CLI commands.
///
/// Quiet by default; `verbose` raises the default level to `debug`.
pub fn init_cli(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let layer = tracing_fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .compact();

    let _ = tracing_subscriber::registry().with(env_filter(level)).with(layer).try_init();
}

/// Initializes logging for the daemon, forwarding to `bus` as well.
pub fn init_daemon(bus: EventBus) {
    let default_level = if cfg!(debug_assertions) { "debug" } else { "info" };

    let layer = tracing_fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    let _ = tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(layer)
        .with(EventBusLayer::new(bus))
        .try_init();
}

/// Forwards tracing events at INFO and above to the event bus.
pub struct EventBusLayer {
    bus: EventBus,
}

impl EventBusLayer {
    #[must_use]
    pub const fn new(bus: EventBus) -> Self { Self { bus } }
}

impl<S: Subscriber> Layer<S> for EventBusLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        // More verbose levels compare greater
        if *event.metadata().level() > Level::INFO || self.bus.receiver_count() == 0 {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.bus.log(log::KIND_BACKEND, visitor.finish(*event.metadata().level()));
    }
}

/// Flattens an event into `LEVEL message key=value ...`.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self, level: Level) -> String {
        let mut line = match level {
            Level::ERROR => "error: ".to_string(),
            Level::WARN => "warning: ".to_string(),
            _ => String::new(),
        };
        line.push_str(&self.message);
        line.push_str(&self.fields);
        line
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={value}", field.name());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={value:?}", field.name());
        }
    }
}
