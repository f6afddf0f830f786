//! OS process seam for the supervisor.
//!
//! [`OsLauncher`] starts renderers through `sh -c` in their own process group,
//! forwards their output to the event bus line by line and reports exits on a
//! channel so the supervisor can forget processes that die on their own.

use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::Stdio;

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, Signal, System, UpdateKind};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use super::command::RendererCommand;
use crate::events::{self, EventBus};

/// Errors raised while starting a renderer.
#[derive(Debug, Error)]
pub enum SpawnError {
    /// The shell could not be started.
    #[error("failed to spawn renderer for {display}: {source}")]
    Io {
        display: String,
        #[source]
        source: std::io::Error,
    },
    /// The child exited before a pid could be read.
    #[error("renderer for {display} exited before reporting a pid")]
    NoPid { display: String },
}

/// How a termination attempt went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KillOutcome {
    /// SIGTERM delivered to the whole process group.
    Group,
    /// Group signal failed; SIGTERM delivered to the leaf pid.
    Leaf,
    /// Neither signal could be delivered (usually the process is gone).
    Failed(String),
}

/// A tracked renderer exited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessExit {
    pub display: String,
    pub pid: u32,
    pub code: Option<i32>,
}

/// Starts and stops renderer processes.
///
/// Implementations must not block the calling thread: the supervisor runs on
/// the daemon's single control thread.
pub trait ProcessLauncher: Send {
    /// Starts `command` for `display` and returns the OS pid.
    ///
    /// # Errors
    ///
    /// Returns [`SpawnError`] when no process could be started.
    fn spawn(&mut self, display: &str, command: &RendererCommand) -> Result<u32, SpawnError>;

    /// Requests SIGTERM for the process group led by `pid`, falling back to
    /// the pid alone. Fire-and-forget: the outcome is only logged.
    fn terminate(&mut self, display: &str, pid: u32);

    /// Requests termination of untracked processes running `executable`.
    fn sweep(&mut self, _executable: &str) {}
}

/// Output stream of a renderer.
#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Real launcher backed by `tokio::process`.
pub struct OsLauncher {
    bus: EventBus,
    exits: mpsc::UnboundedSender<ProcessExit>,
}

impl OsLauncher {
    #[must_use]
    pub const fn new(bus: EventBus, exits: mpsc::UnboundedSender<ProcessExit>) -> Self {
        Self { bus, exits }
    }
}

impl ProcessLauncher for OsLauncher {
    fn spawn(&mut self, display: &str, command: &RendererCommand) -> Result<u32, SpawnError> {
        let line = command.command_line();

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&line)
            .process_group(0)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false)
            .spawn()
            .map_err(|source| SpawnError::Io {
                display: display.to_string(),
                source,
            })?;

        let Some(pid) = child.id() else {
            return Err(SpawnError::NoPid {
                display: display.to_string(),
            });
        };

        if let Some(stdout) = child.stdout.take() {
            let bus = self.bus.clone();
            tokio::spawn(forward_lines(stdout, bus, display.to_string(), Stream::Stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            let bus = self.bus.clone();
            tokio::spawn(forward_lines(stderr, bus, display.to_string(), Stream::Stderr));
        }

        let exits = self.exits.clone();
        let name = display.to_string();
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => {
                    tracing::info!(display = %name, pid, %status, "renderer exited");
                    status.code()
                }
                Err(err) => {
                    tracing::warn!(display = %name, pid, error = %err, "failed to wait for renderer");
                    None
                }
            };
            let _ = exits.send(ProcessExit { display: name, pid, code });
        });

        Ok(pid)
    }

    fn terminate(&mut self, display: &str, pid: u32) {
        let name = display.to_string();
        tokio::task::spawn_blocking(move || match terminate_process(pid) {
            KillOutcome::Group => {
                tracing::info!(display = %name, pid, "sent SIGTERM to renderer process group");
            }
            KillOutcome::Leaf => {
                tracing::info!(display = %name, pid, "sent SIGTERM to renderer pid");
            }
            KillOutcome::Failed(err) => {
                tracing::warn!(display = %name, pid, error = %err, "renderer could not be signalled");
            }
        });
    }

    fn sweep(&mut self, executable: &str) {
        let executable = executable.to_string();
        tokio::task::spawn_blocking(move || {
            let killed = sweep_processes(&executable);
            if killed > 0 {
                tracing::info!(executable = %executable, killed, "terminated stray renderer processes");
            }
        });
    }
}

/// Sends SIGTERM to the process group led by `pid`, then to `pid` alone if
/// the group could not be signalled. Blocks while `kill` runs.
#[must_use]
pub fn terminate_process(pid: u32) -> KillOutcome {
    match signal_group(pid) {
        Ok(()) => KillOutcome::Group,
        Err(group_err) => {
            tracing::debug!(pid, error = %group_err, "process group kill failed, signalling pid");
            if signal_pid(pid) { KillOutcome::Leaf } else { KillOutcome::Failed(group_err) }
        }
    }
}

/// Sends SIGTERM to every process other than this one whose executable file
/// name is `executable`. Returns how many were signalled.
///
/// Matches on the executable path and `argv[0]` as well as the process name,
/// which the kernel truncates to 15 bytes.
#[must_use]
pub fn sweep_processes(executable: &str) -> usize {
    let name = Path::new(executable)
        .file_name()
        .map_or_else(|| OsStr::new(executable).to_os_string(), OsStr::to_os_string);

    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::nothing()
            .with_exe(UpdateKind::OnlyIfNotSet)
            .with_cmd(UpdateKind::OnlyIfNotSet),
    );

    let own_pid = std::process::id();
    system
        .processes()
        .values()
        .filter(|process| process.pid().as_u32() != own_pid)
        .filter(|process| {
            runs_executable(
                &name,
                process.name(),
                process.exe(),
                process.cmd().first().map(OsString::as_os_str),
            )
        })
        .filter(|process| process.kill_with(Signal::Term).unwrap_or(false))
        .count()
}

/// Whether a process with the given name, executable path and `argv[0]` is
/// running the executable called `name`.
fn runs_executable(name: &OsStr, comm: &OsStr, exe: Option<&Path>, argv0: Option<&OsStr>) -> bool {
    comm == name
        || exe.and_then(Path::file_name) == Some(name)
        || argv0.map(Path::new).and_then(Path::file_name) == Some(name)
}

/// Sends SIGTERM to the process group `pgid` through the shell's `kill`.
fn signal_group(pgid: u32) -> Result<(), String> {
    let output = std::process::Command::new("sh")
        .args(["-c", &format!("kill -TERM -{pgid}")])
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|err| err.to_string())?;

    if output.status.success() {
        Ok(())
    } else {
        Err(String::from_utf8_lossy(&output.stderr).trim().to_string())
    }
}

/// Sends SIGTERM to a single pid. Returns whether the signal was delivered.
fn signal_pid(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system
        .process(pid)
        .and_then(|process| process.kill_with(Signal::Term))
        .unwrap_or(false)
}

/// Forwards each line of a renderer stream to the event bus as a `log` event.
async fn forward_lines<R>(reader: R, bus: EventBus, name: String, stream: Stream)
where R: AsyncRead + Unpin {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let message = match stream {
                    Stream::Stdout => format!("{name}: {line}"),
                    Stream::Stderr => format!("{name} (stderr): {line}"),
                };
                tracing::debug!(target: "backdrop::renderer", "{message}");
                bus.log(events::log::KIND_WALLPAPER, message);
            }
            Ok(None) => break,
            Err(err) => {
                tracing::debug!(display = %name, error = %err, "renderer output stream closed");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn shell(line: &str) -> RendererCommand {
        RendererCommand {
            executable: "sh".into(),
            args: vec!["-c".into(), format!("'{line}'")],
        }
    }

    #[tokio::test]
    async fn stdout_and_stderr_lines_become_log_events() {
        let bus = EventBus::new();
        let mut logs = bus.subscribe();
        let (tx, mut exits) = mpsc::unbounded_channel();
        let mut launcher = OsLauncher::new(bus, tx);

        let pid = launcher.spawn("DP-1", &shell("echo hello; echo oops >&2")).unwrap();
        assert!(pid > 0);

        let mut messages = Vec::new();
        for _ in 0..2 {
            let event =
                tokio::time::timeout(Duration::from_secs(5), logs.recv()).await.unwrap().unwrap();
            assert_eq!(event.params["type"], "wallpaper");
            messages.push(event.params["message"].as_str().unwrap().to_string());
        }
        messages.sort();
        assert_eq!(messages, vec!["DP-1 (stderr): oops", "DP-1: hello"]);

        let exit = tokio::time::timeout(Duration::from_secs(5), exits.recv()).await.unwrap().unwrap();
        assert_eq!(exit.display, "DP-1");
        assert_eq!(exit.pid, pid);
        assert_eq!(exit.code, Some(0));
    }

    #[tokio::test]
    async fn terminate_stops_process_group() {
        let (tx, mut exits) = mpsc::unbounded_channel();
        let mut launcher = OsLauncher::new(EventBus::new(), tx);

        let pid = launcher.spawn("DP-2", &shell("sleep 30")).unwrap();
        launcher.terminate("DP-2", pid);

        let exit = tokio::time::timeout(Duration::from_secs(5), exits.recv()).await.unwrap().unwrap();
        assert_eq!(exit.pid, pid);
        assert_ne!(exit.code, Some(0));
    }

    #[test]
    fn group_signal_is_preferred() {
        use std::os::unix::process::CommandExt;

        let mut child = std::process::Command::new("sh")
            .args(["-c", "sleep 30"])
            .process_group(0)
            .spawn()
            .unwrap();

        assert_eq!(terminate_process(child.id()), KillOutcome::Group);
        assert!(!child.wait().unwrap().success());
    }

    #[test]
    fn terminate_unknown_pid_reports_failure() {
        // pid_max on Linux is at most 2^22, so this pid cannot exist
        let outcome = terminate_process(4_194_999);
        assert!(matches!(outcome, KillOutcome::Failed(_)));
    }

    #[test]
    fn executable_is_matched_beyond_truncated_process_name() {
        let name = OsStr::new("linux-wallpaperengine");
        // The kernel keeps only the first 15 bytes of the name
        let comm = OsStr::new("linux-wallpaper");

        assert!(runs_executable(
            name,
            comm,
            Some(Path::new("/usr/bin/linux-wallpaperengine")),
            None
        ));
        assert!(runs_executable(
            name,
            comm,
            None,
            Some(OsStr::new("/opt/lwe/linux-wallpaperengine"))
        ));
        assert!(!runs_executable(name, OsStr::new("sleep"), Some(Path::new("/usr/bin/sleep")), None));
    }

    #[test]
    fn sweep_finds_processes_with_long_executable_names() {
        let dir = tempfile::tempdir().unwrap();
        let sleep = crate::utils::command::resolve_binary("sleep").unwrap();
        let renderer = dir.path().join("backdrop-sweep-renderer");
        std::fs::copy(&sleep, &renderer).unwrap();

        // Other tests fork concurrently and may briefly hold the copy open
        let mut child = (0..20)
            .find_map(|_| {
                std::process::Command::new(&renderer).arg("30").spawn().map_or_else(
                    |_| {
                        std::thread::sleep(Duration::from_millis(50));
                        None
                    },
                    Some,
                )
            })
            .unwrap();
        std::thread::sleep(Duration::from_millis(200));

        let swept = sweep_processes("backdrop-sweep-renderer");
        assert_eq!(swept, 1);
        assert!(!child.wait().unwrap().success());
    }

    #[test]
    fn spawn_error_mentions_display() {
        let err = SpawnError::NoPid { display: "DP-1".into() };
        assert!(err.to_string().contains("DP-1"));
    }
}
