//! Config CLI commands.
//!
//! Commands for inspecting the Backdrop configuration file.

use std::path::Path;

use clap::Subcommand;
use serde_json::Value;

use crate::cli::connection::{request_if_running, runtime};
use crate::cli::output;
use crate::config::{self, ConfigStore, config_paths};
use crate::constants::CONFIG_ENV;
use crate::error::BackdropError;
use crate::rpc::methods;

/// Config inspection commands.
#[derive(Subcommand, Debug)]
#[command(next_display_order = None)]
pub enum ConfigCommands {
    /// Print the effective configuration.
    ///
    /// Asks the running daemon when there is one, otherwise reads the
    /// configuration file directly. A missing file prints the defaults.
    #[command(after_long_help = r"Examples:
  backdrop config get
  backdrop config get --compact | jq .screens")]
    Get {
        /// Print compact JSON without colours.
        #[arg(long)]
        compact: bool,
    },

    /// Show the path to the configuration file.
    ///
    /// Displays the paths where Backdrop looks for configuration files and
    /// marks the one currently in use.
    Path,
}

/// Execute config subcommands.
///
/// # Errors
///
/// Returns an error if the configuration cannot be read.
pub fn execute(cmd: &ConfigCommands, socket: &Path) -> Result<(), BackdropError> {
    match cmd {
        ConfigCommands::Get { compact } => show_config(socket, *compact),
        ConfigCommands::Path => {
            show_config_path();
            Ok(())
        }
    }
}

fn show_config(socket: &Path, compact: bool) -> Result<(), BackdropError> {
    let value = runtime()?.block_on(async {
        match request_if_running(socket, methods::GET_CONFIG, Value::Null).await? {
            Some(value) => Ok::<_, BackdropError>(value),
            None => Ok(serde_json::to_value(config::default_store().load()?)?),
        }
    })?;

    if compact {
        output::print_json(&value);
    } else {
        output::print_highlighted_json(&value);
    }
    Ok(())
}

fn show_config_path() {
    let active = config::config_path();

    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
        println!("{CONFIG_ENV} is set: {}\n", Path::new(&path).display());
    }

    println!("Configuration file search paths (in priority order):\n");

    for (i, path) in config_paths().iter().enumerate() {
        let marker = if *path == active {
            " (active)"
        } else if path.exists() {
            " (exists)"
        } else {
            ""
        };
        println!("  {}. {}{}", i + 1, path.display(), marker);
    }

    if !active.exists() {
        println!("\nNo configuration file found; defaults are in use.");
        println!("It will be created at {} on the first write.", active.display());
    }
}
