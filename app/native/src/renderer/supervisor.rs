//! Renderer process supervisor.
//!
//! The supervisor owns the table of running renderers, at most one per
//! display. [`Supervisor::reconcile`] diffs a desired list against that table
//! and applies the smallest set of stops and spawns that makes them equal.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::command::RendererCommand;
use super::launcher::ProcessLauncher;

/// One display and the command that should be running on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredProcess {
    pub display: String,
    pub command: RendererCommand,
}

impl DesiredProcess {
    #[must_use]
    pub fn new(display: impl Into<String>, command: RendererCommand) -> Self {
        Self { display: display.into(), command }
    }
}

/// A renderer the supervisor started and still tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveProcess {
    pub display: String,
    pub pid: u32,
    pub command: RendererCommand,
}

/// A display whose renderer could not be started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedSpawn {
    pub display: String,
    pub error: String,
}

/// What a reconciliation pass did, per display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub started: Vec<String>,
    pub restarted: Vec<String>,
    pub stopped: Vec<String>,
    pub unchanged: Vec<String>,
    pub failed: Vec<FailedSpawn>,
}

impl ReconcileReport {
    /// `true` when every desired display ended up running.
    #[must_use]
    pub fn success(&self) -> bool { self.failed.is_empty() }

    /// Joined spawn errors, if any.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        if self.failed.is_empty() {
            return None;
        }
        Some(
            self.failed
                .iter()
                .map(|f| format!("{}: {}", f.display, f.error))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Number of spawn and kill actions taken.
    #[must_use]
    pub fn changes(&self) -> usize {
        self.started.len() + self.restarted.len() * 2 + self.stopped.len()
    }
}

/// Owns the display to renderer table.
pub struct Supervisor<L: ProcessLauncher> {
    launcher: L,
    processes: HashMap<String, ActiveProcess>,
}

impl<L: ProcessLauncher> Supervisor<L> {
    #[must_use]
    pub fn new(launcher: L) -> Self {
        Self {
            launcher,
            processes: HashMap::new(),
        }
    }

    /// Brings the running set in line with `desired`.
    ///
    /// Displays missing from `desired` are stopped, new displays are spawned,
    /// displays whose command changed are restarted and identical commands are
    /// left alone. A failed spawn is recorded in the report and leaves that
    /// display without a renderer; the rest of the pass continues.
    pub fn reconcile(&mut self, desired: &[DesiredProcess]) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        let mut seen = HashSet::new();
        let desired: Vec<&DesiredProcess> = desired
            .iter()
            .filter(|entry| {
                let first = seen.insert(entry.display.as_str());
                if !first {
                    tracing::warn!(display = %entry.display, "duplicate display in desired set, ignoring");
                }
                first
            })
            .collect();

        let mut to_stop: Vec<String> =
            self.processes.keys().filter(|display| !seen.contains(display.as_str())).cloned().collect();
        to_stop.sort_by(|a, b| natord::compare(a, b));

        for name in to_stop {
            self.stop(&name);
            report.stopped.push(name);
        }

        for entry in desired {
            let name = entry.display.as_str();
            let restart = match self.processes.get(name) {
                Some(active) if active.command == entry.command => {
                    tracing::info!(display = name, pid = active.pid, "no change, renderer already running");
                    report.unchanged.push(name.to_string());
                    continue;
                }
                Some(_) => {
                    tracing::info!(display = name, "renderer command changed, restarting");
                    self.stop(name);
                    true
                }
                None => false,
            };

            match self.launcher.spawn(name, &entry.command) {
                Ok(pid) => {
                    tracing::info!(display = name, pid, command = %entry.command, "renderer started");
                    self.processes.insert(
                        name.to_string(),
                        ActiveProcess {
                            display: name.to_string(),
                            pid,
                            command: entry.command.clone(),
                        },
                    );
                    if restart {
                        report.restarted.push(name.to_string());
                    } else {
                        report.started.push(name.to_string());
                    }
                }
                Err(err) => {
                    tracing::error!(display = name, error = %err, "failed to start renderer");
                    report.failed.push(FailedSpawn {
                        display: name.to_string(),
                        error: err.to_string(),
                    });
                }
            }
        }

        report
    }

    /// Forgets the renderer on `name` and asks the launcher to stop it. The
    /// entry is removed whatever the signal outcome.
    fn stop(&mut self, name: &str) {
        if let Some(active) = self.processes.remove(name) {
            tracing::debug!(display = name, pid = active.pid, "stopping renderer");
            self.launcher.terminate(name, active.pid);
        }
    }

    /// Stops every tracked renderer, then terminates stray processes running
    /// `executable`. Returns the displays that were stopped.
    pub fn kill_all(&mut self, executable: &str) -> Vec<String> {
        let mut displays: Vec<String> = self.processes.keys().cloned().collect();
        displays.sort_by(|a, b| natord::compare(a, b));

        for display in &displays {
            self.stop(display);
        }

        self.launcher.sweep(executable);
        tracing::info!(stopped = displays.len(), "all renderers stopped");
        displays
    }

    /// Stops renderers whose wallpaper argument references `folder`.
    /// Returns the displays that were stopped.
    pub fn kill_matching(&mut self, folder: &str) -> Vec<String> {
        let mut displays: Vec<String> = self
            .processes
            .values()
            .filter(|active| active.command.references(folder))
            .map(|active| active.display.clone())
            .collect();
        displays.sort_by(|a, b| natord::compare(a, b));

        for name in &displays {
            tracing::info!(display = %name, folder, "stopping renderer for wallpaper folder");
            self.stop(name);
        }
        displays
    }

    /// Forgets a renderer that exited on its own. Exits of processes that
    /// have since been replaced are ignored.
    pub fn process_exited(&mut self, name: &str, pid: u32) -> bool {
        if self.processes.get(name).is_some_and(|active| active.pid == pid) {
            self.processes.remove(name);
            tracing::info!(display = name, pid, "renderer exited, display is now idle");
            true
        } else {
            false
        }
    }

    /// Tracked renderers sorted by display name.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ActiveProcess> {
        let mut processes: Vec<ActiveProcess> = self.processes.values().cloned().collect();
        processes.sort_by(|a, b| natord::compare(&a.display, &b.display));
        processes
    }

    #[must_use]
    pub fn len(&self) -> usize { self.processes.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.processes.is_empty() }

    #[must_use]
    pub const fn launcher(&self) -> &L { &self.launcher }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingLauncher;
    use super::*;
    use crate::config::AppConfig;
    use crate::renderer::command::{DisplayBinding, RenderSettings, build_command};

    fn desired(display: &str, wallpaper: &str) -> DesiredProcess {
        let settings = RenderSettings::from(&AppConfig::default());
        let command = build_command(&DisplayBinding::new(display, Some(wallpaper)), &settings).unwrap();
        DesiredProcess::new(display, command)
    }

    #[test]
    fn reconcile_on_empty_table_spawns_one_process() {
        let mut supervisor = Supervisor::new(RecordingLauncher::default());

        let report = supervisor.reconcile(&[desired("DP-1", "123")]);

        assert_eq!(report.started, vec!["DP-1"]);
        assert_eq!(supervisor.launcher().spawned.len(), 1);
        let (display, line) = &supervisor.launcher().spawned[0];
        assert_eq!(display, "DP-1");
        assert!(line.contains("-r DP-1"));
        assert!(line.contains("123"));
        assert_eq!(supervisor.len(), 1);
    }

    #[test]
    fn reconcile_is_idempotent() {
        let mut supervisor = Supervisor::new(RecordingLauncher::default());
        let first = vec![desired("DP-1", "1"), desired("HDMI-A-1", "2")];
        let same_set_reordered = vec![desired("HDMI-A-1", "2"), desired("DP-1", "1")];

        supervisor.reconcile(&first);
        supervisor.launcher.clear();

        let report = supervisor.reconcile(&same_set_reordered);
        assert_eq!(report.changes(), 0);
        assert_eq!(report.unchanged.len(), 2);
        assert!(supervisor.launcher().spawned.is_empty());
        assert!(supervisor.launcher().terminated.is_empty());
    }

    #[test]
    fn removed_display_is_stopped_and_forgotten() {
        let mut supervisor = Supervisor::new(RecordingLauncher::default());
        supervisor.reconcile(&[desired("DP-1", "1"), desired("DP-2", "2")]);
        let dp2_pid = supervisor.snapshot()[1].pid;

        let report = supervisor.reconcile(&[desired("DP-1", "1")]);

        assert_eq!(report.stopped, vec!["DP-2"]);
        assert_eq!(report.unchanged, vec!["DP-1"]);
        assert_eq!(supervisor.launcher().terminated, vec![("DP-2".to_string(), dp2_pid)]);
        assert!(supervisor.snapshot().iter().all(|p| p.display != "DP-2"));
    }

    #[test]
    fn changed_command_restarts_only_that_display() {
        let mut supervisor = Supervisor::new(RecordingLauncher::default());
        supervisor.reconcile(&[desired("DP-1", "1"), desired("DP-2", "2")]);
        supervisor.launcher.clear();

        let report = supervisor.reconcile(&[desired("DP-1", "1"), desired("DP-2", "3")]);

        assert_eq!(report.restarted, vec!["DP-2"]);
        assert_eq!(report.unchanged, vec!["DP-1"]);
        assert_eq!(supervisor.launcher().terminated.len(), 1);
        assert_eq!(supervisor.launcher().spawned.len(), 1);
        assert!(supervisor.launcher().spawned[0].1.contains(" 3 "));
    }

    #[test]
    fn failed_spawn_does_not_abort_other_displays() {
        let mut supervisor = Supervisor::new(RecordingLauncher::failing(&["DP-1"]));

        let report = supervisor.reconcile(&[desired("DP-1", "1"), desired("DP-2", "2")]);

        assert!(!report.success());
        assert_eq!(report.started, vec!["DP-2"]);
        assert!(report.error().unwrap().starts_with("DP-1:"));
        assert_eq!(supervisor.len(), 1);
        assert_eq!(supervisor.snapshot()[0].display, "DP-2");
    }

    #[test]
    fn failed_restart_leaves_display_absent() {
        let mut supervisor = Supervisor::new(RecordingLauncher::default());
        supervisor.reconcile(&[desired("DP-1", "1")]);
        supervisor.launcher.fail_displays.insert("DP-1".into());

        let report = supervisor.reconcile(&[desired("DP-1", "2")]);

        assert_eq!(report.failed.len(), 1);
        assert!(supervisor.is_empty());
    }

    #[test]
    fn duplicate_displays_keep_first_entry() {
        let mut supervisor = Supervisor::new(RecordingLauncher::default());

        let report = supervisor.reconcile(&[desired("DP-1", "1"), desired("DP-1", "2")]);

        assert_eq!(report.started, vec!["DP-1"]);
        assert_eq!(supervisor.len(), 1);
        assert_eq!(supervisor.snapshot()[0].command.args[0], "1");
    }

    #[test]
    fn empty_desired_stops_everything() {
        let mut supervisor = Supervisor::new(RecordingLauncher::default());
        supervisor.reconcile(&[desired("DP-1", "1"), desired("DP-2", "2")]);

        let report = supervisor.reconcile(&[]);
        assert_eq!(report.stopped, vec!["DP-1", "DP-2"]);
        assert!(supervisor.is_empty());
    }

    #[test]
    fn kill_all_stops_tracked_and_sweeps() {
        let mut supervisor = Supervisor::new(RecordingLauncher::default());
        supervisor.reconcile(&[desired("DP-10", "1"), desired("DP-2", "2")]);

        let stopped = supervisor.kill_all("linux-wallpaperengine");

        assert_eq!(stopped, vec!["DP-2", "DP-10"]);
        assert!(supervisor.is_empty());
        assert_eq!(supervisor.launcher().swept, vec!["linux-wallpaperengine"]);
    }

    #[test]
    fn kill_matching_only_stops_that_folder() {
        let mut supervisor = Supervisor::new(RecordingLauncher::default());
        supervisor.reconcile(&[desired("DP-1", "/lib/431960/111"), desired("DP-2", "/lib/431960/222")]);

        let stopped = supervisor.kill_matching("222");

        assert_eq!(stopped, vec!["DP-2"]);
        assert_eq!(supervisor.snapshot()[0].display, "DP-1");
    }

    #[test]
    fn exit_of_current_process_clears_entry() {
        let mut supervisor = Supervisor::new(RecordingLauncher::default());
        supervisor.reconcile(&[desired("DP-1", "1")]);
        let pid = supervisor.snapshot()[0].pid;

        assert!(!supervisor.process_exited("DP-1", pid + 100));
        assert_eq!(supervisor.len(), 1);

        assert!(supervisor.process_exited("DP-1", pid));
        assert!(supervisor.is_empty());

        // The next pass starts it again
        let report = supervisor.reconcile(&[desired("DP-1", "1")]);
        assert_eq!(report.started, vec!["DP-1"]);
    }
}
