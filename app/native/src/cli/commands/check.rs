//! `backdrop check`: environment diagnostics.

use std::path::Path;
use std::sync::Arc;

use colored::Colorize;
use tabled::settings::object::Columns;
use tabled::settings::{Alignment, Modify, Style};
use tabled::{Table, Tabled};

use crate::cli::connection::runtime;
use crate::cli::output;
use crate::config::{self, AppConfig, ConfigStore};
use crate::daemon;
use crate::error::BackdropError;
use crate::reconcile::{DisplayTopology, XrandrTopology, connected_screens};
use crate::utils::command::resolve_binary;

#[derive(Tabled)]
struct CheckRow {
    #[tabled(rename = "Check")]
    name: &'static str,
    #[tabled(rename = "OK")]
    ok: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

struct Outcome {
    name: &'static str,
    ok: bool,
    required: bool,
    detail: String,
}

impl Outcome {
    fn required(name: &'static str, result: Result<String, String>) -> Self {
        let (ok, detail) = split(result);
        Self { name, ok, required: true, detail }
    }

    fn optional(name: &'static str, result: Result<String, String>) -> Self {
        let (ok, detail) = split(result);
        Self { name, ok, required: false, detail }
    }
}

fn split(result: Result<String, String>) -> (bool, String) {
    match result {
        Ok(detail) => (true, detail),
        Err(detail) => (false, detail),
    }
}

/// Runs every check and prints a table.
///
/// # Errors
///
/// Returns an error when a required check fails.
pub fn execute(socket: &Path) -> Result<(), BackdropError> {
    let store = config::default_store();
    let loaded = store.load();
    let config = loaded.as_ref().cloned().unwrap_or_default();

    let mut outcomes = vec![Outcome::required(
        "config",
        loaded
            .as_ref()
            .map(|_| store.path().display().to_string())
            .map_err(ToString::to_string),
    )];
    outcomes.push(Outcome::required("renderer", check_renderer(&config)));
    outcomes.push(Outcome::optional("library", check_library(&config)));

    let (screens, running) = runtime()?.block_on(async {
        let topology: Arc<dyn DisplayTopology> = Arc::new(XrandrTopology::default());
        let screens = connected_screens(&topology).await;
        (screens, daemon::is_running(socket).await)
    });

    outcomes.push(Outcome::required(
        "displays",
        screens.map_err(|err| err.to_string()).and_then(|screens| {
            if screens.is_empty() {
                Err("no connected displays".to_string())
            } else {
                Ok(screens.join(", "))
            }
        }),
    ));
    outcomes.push(Outcome::optional(
        "daemon",
        if running {
            Ok(format!("listening on {}", socket.display()))
        } else {
            Err(format!("not running ({})", socket.display()))
        },
    ));

    let failed = outcomes.iter().filter(|o| o.required && !o.ok).count();
    let rows: Vec<CheckRow> = outcomes
        .into_iter()
        .map(|o| CheckRow { name: o.name, ok: output::format_bool(o.ok), detail: o.detail })
        .collect();

    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..2)).with(Alignment::center()))
        .to_string();
    println!("{table}");

    if failed == 0 {
        println!("{}", "Ready.".green().bold());
        Ok(())
    } else {
        Err(BackdropError::CommandError(format!("{failed} required check(s) failed")))
    }
}

fn check_renderer(config: &AppConfig) -> Result<String, String> {
    let executable = config.executable();
    resolve_binary(&executable).map(|path| path.display().to_string())
}

fn check_library(config: &AppConfig) -> Result<String, String> {
    let base = config.wallpaper_base_path();
    if base.is_dir() {
        Ok(base.display().to_string())
    } else {
        Err(format!("{} does not exist", base.display()))
    }
}
