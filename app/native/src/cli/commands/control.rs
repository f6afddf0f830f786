//! Commands that drive the running daemon.

use std::path::Path;

use colored::Colorize;
use serde_json::{Value, json};
use tabled::settings::object::Columns;
use tabled::settings::{Alignment, Modify, Style};
use tabled::{Table, Tabled};

use crate::cli::connection::{connect, request, request_if_running, runtime};
use crate::cli::output;
use crate::config::{self, AppConfig, ConfigStore};
use crate::error::BackdropError;
use crate::reconcile::{DisplayTopology, XrandrTopology, connected_screens};
use crate::renderer::{ActiveProcess, ReconcileReport};
use crate::rpc::{ConnectionState, Event, methods};

/// `backdrop apply`: runs one reconciliation pass now.
///
/// # Errors
///
/// Returns an error if the daemon is unreachable or a renderer failed to
/// start.
pub fn apply(socket: &Path, json: bool) -> Result<(), BackdropError> {
    let result = runtime()?.block_on(request(socket, methods::APPLY_WALLPAPERS, Value::Null))?;

    if json {
        output::print_highlighted_json(&result);
    } else {
        let report: ReconcileReport = serde_json::from_value(result.clone())?;
        print_report(&report);
    }

    match result.get("error").and_then(Value::as_str) {
        Some(error) => Err(BackdropError::RendererError(error.to_string())),
        None => Ok(()),
    }
}

fn print_report(report: &ReconcileReport) {
    let sections = [
        ("started", &report.started),
        ("restarted", &report.restarted),
        ("stopped", &report.stopped),
        ("unchanged", &report.unchanged),
    ];

    if report.changes() == 0 && report.failed.is_empty() {
        println!("{}", "Nothing to do, every display is up to date.".dimmed());
    }
    for (label, displays) in sections {
        if !displays.is_empty() {
            println!("{:>10} {}", label.green().bold(), displays.join(", "));
        }
    }
    for failed in &report.failed {
        println!("{:>10} {}: {}", "failed".red().bold(), failed.display, failed.error);
    }
}

/// `backdrop set`: binds (or clears) a display's wallpaper.
///
/// Goes through the daemon when it is running so the change applies right
/// away; otherwise the configuration file is edited directly.
///
/// # Errors
///
/// Returns an error if the configuration cannot be read or written.
pub fn set(socket: &Path, display: &str, wallpaper: Option<String>) -> Result<(), BackdropError> {
    let summary = wallpaper.as_deref().map_or_else(
        || format!("Cleared wallpaper for {display}"),
        |id| format!("Bound {id} to {display}"),
    );

    runtime()?.block_on(async {
        if let Some(current) = request_if_running(socket, methods::GET_CONFIG, Value::Null).await? {
            let mut config: AppConfig = serde_json::from_value(current)?;
            config.bind(display, wallpaper);
            request(socket, methods::WRITE_CONFIG, serde_json::to_value(&config)?).await?;
            println!("{summary}");
        } else {
            let store = config::default_store();
            let mut config = store.load()?;
            config.bind(display, wallpaper);
            store.save(&config)?;
            println!("{summary}");
            println!(
                "{}",
                format!("Daemon not running; saved to {}", store.path().display()).dimmed()
            );
        }
        Ok::<(), BackdropError>(())
    })
}

/// `backdrop status`: daemon summary and the renderers it supervises.
///
/// # Errors
///
/// Returns an error if the daemon is unreachable.
pub fn status(socket: &Path, json: bool) -> Result<(), BackdropError> {
    #[derive(Tabled)]
    struct ProcessRow {
        #[tabled(rename = "Display")]
        display: String,
        #[tabled(rename = "PID")]
        pid: u32,
        #[tabled(rename = "Wallpaper")]
        wallpaper: String,
        #[tabled(rename = "Command")]
        command: String,
    }

    let status = runtime()?.block_on(request(socket, methods::GET_STATUS, Value::Null))?;
    if json {
        output::print_highlighted_json(&status);
        return Ok(());
    }

    let uptime = status["uptimeSecs"].as_u64().unwrap_or_default();
    println!("{}", "Daemon".bold());
    println!("  pid:      {}", status["pid"]);
    println!("  uptime:   {}", output::format_uptime(uptime));
    println!("  socket:   {}", status["socket"].as_str().unwrap_or("-"));
    println!("  config:   {}", status["configPath"].as_str().unwrap_or("-"));
    println!("  passes:   {}", status["passes"]);
    println!("  downloads: {}", status["downloads"]);
    println!();

    let mut processes: Vec<ActiveProcess> =
        serde_json::from_value(status["processes"].clone()).unwrap_or_default();
    if processes.is_empty() {
        println!("{}", "No renderers running.".dimmed());
        return Ok(());
    }
    processes.sort_by(|a, b| natord::compare(&a.display, &b.display));

    let count = processes.len();
    let rows: Vec<ProcessRow> = processes
        .into_iter()
        .map(|p| ProcessRow {
            wallpaper: p.command.args.first().cloned().unwrap_or_default(),
            command: output::truncate(&p.command.args.join(" "), 60),
            display: p.display,
            pid: p.pid,
        })
        .collect();

    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..2)).with(Alignment::right()))
        .to_string();

    println!("{}", format!("Renderers ({count})").bold());
    println!("{table}");
    Ok(())
}

/// `backdrop screens`: connected displays with their bindings.
///
/// # Errors
///
/// Returns an error if the display topology cannot be read.
pub fn screens(socket: &Path, json: bool) -> Result<(), BackdropError> {
    #[derive(Tabled)]
    struct ScreenRow {
        #[tabled(rename = "Display")]
        display: String,
        #[tabled(rename = "Wallpaper")]
        wallpaper: String,
        #[tabled(rename = "Running")]
        running: String,
    }

    let (mut screens, config, running) = runtime()?.block_on(async {
        if let Some(listed) = request_if_running(socket, methods::GET_SCREENS, Value::Null).await? {
            let screens: Vec<String> =
                serde_json::from_value(listed["screens"].clone()).unwrap_or_default();
            let config: AppConfig =
                serde_json::from_value(request(socket, methods::GET_CONFIG, Value::Null).await?)?;
            let status = request(socket, methods::GET_STATUS, Value::Null).await?;
            let processes: Vec<ActiveProcess> =
                serde_json::from_value(status["processes"].clone()).unwrap_or_default();
            let running: Vec<String> = processes.into_iter().map(|p| p.display).collect();
            Ok::<_, BackdropError>((screens, config, running))
        } else {
            let topology: std::sync::Arc<dyn DisplayTopology> =
                std::sync::Arc::new(XrandrTopology::default());
            let screens = connected_screens(&topology).await?;
            Ok((screens, config::default_store().load()?, Vec::new()))
        }
    })?;
    screens.sort_by(|a, b| natord::compare(a, b));

    if json {
        output::print_highlighted_json(&json!(screens));
        return Ok(());
    }

    if screens.is_empty() {
        println!("{}", "No connected displays detected.".dimmed());
        return Ok(());
    }

    let count = screens.len();
    let rows: Vec<ScreenRow> = screens
        .into_iter()
        .map(|name| {
            let wallpaper = if config.clone_mode {
                config.global_wallpaper.clone()
            } else {
                config.screen(&name).and_then(|s| s.wallpaper.clone())
            };
            ScreenRow {
                running: output::format_bool(running.contains(&name)),
                wallpaper: wallpaper.unwrap_or_else(|| "-".to_string()),
                display: name,
            }
        })
        .collect();

    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..3)).with(Alignment::center()))
        .to_string();

    println!("{}", format!("Screens ({count})").bold());
    println!("{table}");
    Ok(())
}

/// `backdrop kill <folder>`: stops renderers showing a wallpaper folder.
///
/// # Errors
///
/// Returns an error if the daemon is unreachable or rejects the folder name.
pub fn kill(socket: &Path, folder: &str) -> Result<(), BackdropError> {
    let result = runtime()?.block_on(request(
        socket,
        methods::KILL_WALLPAPER,
        json!({ "folderName": folder }),
    ))?;
    print_stopped(&result);
    Ok(())
}

/// `backdrop kill-all`: stops every renderer.
///
/// # Errors
///
/// Returns an error if the daemon is unreachable.
pub fn kill_all(socket: &Path) -> Result<(), BackdropError> {
    let result = runtime()?.block_on(request(socket, methods::KILL_ALL_WALLPAPERS, Value::Null))?;
    print_stopped(&result);
    Ok(())
}

fn print_stopped(result: &Value) {
    let stopped: Vec<String> =
        serde_json::from_value(result["stopped"].clone()).unwrap_or_default();
    if stopped.is_empty() {
        println!("{}", "No matching renderers were running.".dimmed());
    } else {
        println!("{} {}", "stopped".green().bold(), stopped.join(", "));
    }
}

/// `backdrop logs`: streams daemon events until interrupted.
///
/// Reconnects when the daemon goes away; gives up once the retry budget is
/// exhausted.
///
/// # Errors
///
/// Returns an error when the daemon cannot be reached.
pub fn logs(socket: &Path, json: bool) -> Result<(), BackdropError> {
    runtime()?.block_on(async {
        loop {
            let client = connect(socket).await?;
            client.on_event(move |event| print_event(&event, json));
            let mut state = client.subscribe_state();
            eprintln!("{}", format!("connected to {}", socket.display()).dimmed());

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    client.disconnect().await;
                    return Ok::<(), BackdropError>(());
                }
                () = async {
                    while state.get() == ConnectionState::Connected {
                        if state.next().await.is_none() {
                            break;
                        }
                    }
                } => {
                    eprintln!("{}", "connection lost".yellow());
                }
            }
        }
    })
}

fn print_event(event: &Event, json: bool) {
    if json {
        output::print_json(&json!({ "method": event.method, "params": event.params }));
        return;
    }

    if event.method == crate::events::log::NAME {
        let kind = event.params["type"].as_str().unwrap_or("log");
        let message = event.params["message"].as_str().unwrap_or_default();
        println!("{} {message}", format!("[{kind}]").cyan());
    } else {
        println!("{} {}", event.method.magenta(), event.params);
    }
}
