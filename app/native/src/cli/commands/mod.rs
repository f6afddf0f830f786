//! CLI command definitions using Clap.
//!
//! - `control` - commands that drive the running daemon
//! - `config_cmd` - configuration file inspection
//! - `check` - environment diagnostics

use std::io;
use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Generator, Shell, generate};

use crate::constants::{self, SOCKET_ENV};
use crate::error::BackdropError;
use crate::events::EventBus;
use crate::{config, daemon, logging, schema};

pub mod check;
pub mod config_cmd;
pub mod control;

pub use config_cmd::ConfigCommands;

/// Application version from Cargo.toml.
const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Backdrop - per-display wallpaper supervisor for linux-wallpaperengine.
#[derive(Parser, Debug)]
#[command(name = "backdrop")]
#[command(author, version = APP_VERSION, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to a custom configuration file.
    ///
    /// Overrides the default configuration file search paths.
    /// Supports JSONC format (JSON with comments).
    #[arg(long, short, global = true, value_name = "PATH")]
    pub config: Option<String>,

    /// Path to the daemon's control socket.
    #[arg(long, global = true, value_name = "PATH", env = SOCKET_ENV)]
    pub socket: Option<PathBuf>,

    /// Show debug logging on stderr.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
#[command(next_display_order = None)]
pub enum Commands {
    /// Run the backend daemon.
    ///
    /// Supervises one renderer per connected display, watches the
    /// configuration, display topology and wallpaper library, and serves the
    /// control socket. Stops every renderer on SIGINT or SIGTERM.
    Daemon,

    /// Reconcile renderers with the configuration now.
    Apply {
        /// Print the raw report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Bind a wallpaper to a display.
    #[command(after_long_help = r"Examples:
  backdrop set DP-1 1234567890          # Workshop folder name
  backdrop set HDMI-A-1 ~/walls/scene   # Folder path
  backdrop set DP-1 --clear             # Remove the binding")]
    Set {
        /// Display output name (see `backdrop screens`).
        display: String,

        /// Wallpaper folder name or path.
        #[arg(required_unless_present = "clear")]
        wallpaper: Option<String>,

        /// Remove the display's binding instead.
        #[arg(long, conflicts_with = "wallpaper")]
        clear: bool,
    },

    /// Show the daemon status and running renderers.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List connected displays and their bindings.
    Screens {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Configuration file commands.
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Stop renderers showing a wallpaper folder.
    Kill {
        /// Wallpaper folder name.
        folder: String,
    },

    /// Stop every renderer.
    KillAll,

    /// Stream daemon logs and events.
    Logs {
        /// One JSON object per line.
        #[arg(long)]
        json: bool,
    },

    /// Check the renderer, displays, library and daemon.
    Check,

    /// Output the configuration JSON Schema.
    ///
    /// Can be redirected to a file for use with editors that support JSON
    /// Schema validation.
    Schema,

    /// Generate shell completions.
    ///
    /// Usage:
    ///   eval "$(backdrop completions --shell zsh)"
    ///   backdrop completions --shell fish > ~/.config/fish/completions/backdrop.fish
    Completions {
        /// The shell to generate completions for.
        #[arg(long, short, value_enum)]
        shell: Shell,
    },
}

impl Cli {
    /// Returns the socket path in effect.
    #[must_use]
    pub fn socket_path(&self) -> PathBuf {
        self.socket.clone().unwrap_or_else(constants::socket_path)
    }

    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command execution fails.
    pub fn execute(&self) -> Result<(), BackdropError> {
        if let Some(ref path) = self.config {
            let path_buf = PathBuf::from(path);
            if !path_buf.exists() {
                return Err(BackdropError::ConfigError(format!(
                    "Configuration file not found: {path}"
                )));
            }
            config::set_custom_config_path(path_buf);
        }

        if !matches!(self.command, Commands::Daemon) {
            logging::init_cli(self.verbose);
        }

        let socket = self.socket_path();

        match &self.command {
            Commands::Daemon => {
                let bus = EventBus::new();
                logging::init_daemon(bus.clone());
                crate::cli::connection::runtime()?.block_on(daemon::run(socket, bus))
            }
            Commands::Apply { json } => control::apply(&socket, *json),
            Commands::Set { display, wallpaper, clear } => {
                let wallpaper = if *clear { None } else { wallpaper.clone() };
                control::set(&socket, display, wallpaper)
            }
            Commands::Status { json } => control::status(&socket, *json),
            Commands::Screens { json } => control::screens(&socket, *json),
            Commands::Config(cmd) => config_cmd::execute(cmd, &socket),
            Commands::Kill { folder } => control::kill(&socket, folder),
            Commands::KillAll => control::kill_all(&socket),
            Commands::Logs { json } => control::logs(&socket, *json),
            Commands::Check => check::execute(&socket),

            Commands::Schema => {
                println!("{}", schema::print_schema());
                Ok(())
            }

            Commands::Completions { shell } => {
                Self::print_completions(*shell);
                Ok(())
            }
        }
    }

    /// Print shell completions to stdout.
    fn print_completions<G: Generator>(generator: G) {
        let mut cmd = Self::command();
        generate(generator, &mut cmd, "backdrop", &mut io::stdout());
    }
}
