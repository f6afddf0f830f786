//! Backdrop - per-display wallpaper supervisor for linux-wallpaperengine.
//!
//! A single binary serves both roles:
//! - `backdrop daemon` runs the backend that owns the renderer processes
//! - every other subcommand is a client of that daemon's control socket

// Emit a clear compile-time error if attempted to compile on unsupported platforms
#[cfg(not(unix))]
compile_error!("Backdrop requires a Unix platform.");

fn main() {
    if let Err(err) = backdrop_lib::cli::run() {
        eprintln!("backdrop: {err}");
        std::process::exit(1);
    }
}
