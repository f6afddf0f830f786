//! Command-line interface for Backdrop.
//!
//! `backdrop daemon` runs the backend. Every other command is a thin client
//! that talks to it over the control socket, falling back to local reads for
//! the few commands that make sense without a running daemon.

mod commands;
mod connection;
mod output;

use clap::Parser;
pub use commands::Cli;

use crate::error::BackdropError;

/// Runs the CLI.
///
/// Parses command-line arguments and executes the appropriate command.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn run() -> Result<(), BackdropError> {
    let cli = Cli::parse();
    cli.execute()
}
