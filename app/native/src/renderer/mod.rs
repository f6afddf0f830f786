//! Renderer process management.
//!
//! - [`command`] builds the `linux-wallpaperengine` invocation for a display
//! - [`launcher`] starts and signals OS processes
//! - [`supervisor`] keeps one renderer per display in line with a desired set
//! - [`actor`] serializes access to the supervisor

pub mod actor;
pub mod command;
pub mod launcher;
pub mod supervisor;

pub use actor::{ActorError, SupervisorActor, SupervisorHandle};
pub use command::{DisplayBinding, RenderSettings, RendererCommand, build_command};
pub use launcher::{KillOutcome, OsLauncher, ProcessExit, ProcessLauncher, SpawnError};
pub use supervisor::{ActiveProcess, DesiredProcess, ReconcileReport, Supervisor};
