//! Backdrop - per-display wallpaper supervisor for linux-wallpaperengine.
//!
//! Keeps exactly one renderer process per connected display in line with the
//! configuration. The daemon owns the processes and answers newline-delimited
//! JSON calls on a Unix socket; the CLI is a client of that socket.

// Core modules
pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod logging;
pub mod schema;

// Backend modules
pub mod daemon;
pub mod reconcile;
pub mod renderer;
pub mod rpc;
pub mod workshop;

mod utils;
