//! Supervisor actor.
//!
//! One task owns the [`Supervisor`] and handles messages strictly one at a
//! time, so reconciliation passes never overlap. Everything else talks to it
//! through a cloneable [`SupervisorHandle`].
//!
//! # Panic Recovery
//!
//! A panic inside a message handler is caught and logged and the actor keeps
//! serving later messages. The caller of the panicking request sees
//! [`ActorError::ReceiveFailed`].

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use super::launcher::{ProcessExit, ProcessLauncher};
use super::supervisor::{ActiveProcess, DesiredProcess, ReconcileReport, Supervisor};

/// Channel buffer size for the supervisor actor.
const CHANNEL_BUFFER_SIZE: usize = 256;

/// Error types for actor communication.
#[derive(Debug, thiserror::Error)]
pub enum ActorError {
    /// Failed to send message to actor.
    #[error("Failed to send message to supervisor: channel closed")]
    SendFailed,

    /// Failed to receive response from actor.
    #[error("Failed to receive response from supervisor: channel closed")]
    ReceiveFailed,

    /// Request timed out.
    #[error("Supervisor request timed out after {0:?}")]
    Timeout(Duration),
}

/// Messages handled by the supervisor actor.
#[derive(Debug)]
pub enum SupervisorMessage {
    Reconcile {
        desired: Vec<DesiredProcess>,
        respond_to: oneshot::Sender<ReconcileReport>,
    },
    KillAll {
        executable: String,
        respond_to: oneshot::Sender<Vec<String>>,
    },
    KillMatching {
        folder: String,
        respond_to: oneshot::Sender<Vec<String>>,
    },
    Snapshot {
        respond_to: oneshot::Sender<Vec<ActiveProcess>>,
    },
    ProcessExited(ProcessExit),
    Shutdown,
}

impl SupervisorMessage {
    const fn name(&self) -> &'static str {
        match self {
            Self::Reconcile { .. } => "Reconcile",
            Self::KillAll { .. } => "KillAll",
            Self::KillMatching { .. } => "KillMatching",
            Self::Snapshot { .. } => "Snapshot",
            Self::ProcessExited(_) => "ProcessExited",
            Self::Shutdown => "Shutdown",
        }
    }
}

/// Task owning the supervisor.
pub struct SupervisorActor<L: ProcessLauncher> {
    supervisor: Supervisor<L>,
    receiver: mpsc::Receiver<SupervisorMessage>,
    exits: Option<mpsc::UnboundedReceiver<ProcessExit>>,
}

impl<L: ProcessLauncher + 'static> SupervisorActor<L> {
    /// Spawns the actor on the current tokio runtime.
    ///
    /// `exits` carries process exit notifications from the launcher; pass
    /// `None` when the launcher never reports exits.
    #[must_use]
    pub fn spawn(
        launcher: L,
        exits: Option<mpsc::UnboundedReceiver<ProcessExit>>,
    ) -> SupervisorHandle {
        tracing::debug!("spawning supervisor actor");
        let (sender, receiver) = mpsc::channel(CHANNEL_BUFFER_SIZE);

        let actor = Self {
            supervisor: Supervisor::new(launcher),
            receiver,
            exits,
        };
        tokio::spawn(actor.run());

        SupervisorHandle::new(sender)
    }

    async fn run(mut self) {
        loop {
            // `None` here means the exit channel closed
            let next = match self.exits.as_mut() {
                Some(exits) => tokio::select! {
                    msg = self.receiver.recv() => Some(msg),
                    exit = exits.recv() => exit.map(|e| Some(SupervisorMessage::ProcessExited(e))),
                },
                None => Some(self.receiver.recv().await),
            };

            let Some(msg) = next else {
                self.exits = None;
                continue;
            };

            let Some(msg) = msg else {
                tracing::debug!("supervisor channel closed, exiting");
                return;
            };

            if matches!(msg, SupervisorMessage::Shutdown) {
                tracing::debug!("supervisor actor received shutdown");
                return;
            }

            let msg_name = msg.name();
            let result = catch_unwind(AssertUnwindSafe(|| self.handle_message(msg)));

            if let Err(panic_info) = result {
                let panic_msg = panic_info
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic_info.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());

                tracing::error!(
                    message = msg_name,
                    panic = %panic_msg,
                    "supervisor recovered from panic, process table may be stale"
                );
            }
        }
    }

    fn handle_message(&mut self, msg: SupervisorMessage) {
        match msg {
            SupervisorMessage::Reconcile { desired, respond_to } => {
                let report = self.supervisor.reconcile(&desired);
                let _ = respond_to.send(report);
            }
            SupervisorMessage::KillAll { executable, respond_to } => {
                let _ = respond_to.send(self.supervisor.kill_all(&executable));
            }
            SupervisorMessage::KillMatching { folder, respond_to } => {
                let _ = respond_to.send(self.supervisor.kill_matching(&folder));
            }
            SupervisorMessage::Snapshot { respond_to } => {
                let _ = respond_to.send(self.supervisor.snapshot());
            }
            SupervisorMessage::ProcessExited(exit) => {
                self.supervisor.process_exited(&exit.display, exit.pid);
            }
            SupervisorMessage::Shutdown => {}
        }
    }
}

/// Handle for communicating with the supervisor actor.
///
/// This handle is cheap to clone.
#[derive(Clone)]
pub struct SupervisorHandle {
    sender: mpsc::Sender<SupervisorMessage>,
}

impl SupervisorHandle {
    pub(crate) const fn new(sender: mpsc::Sender<SupervisorMessage>) -> Self { Self { sender } }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SupervisorMessage,
    ) -> Result<T, ActorError> {
        let (tx, rx) = oneshot::channel();
        self.sender.send(build(tx)).await.map_err(|_| ActorError::SendFailed)?;
        rx.await.map_err(|_| ActorError::ReceiveFailed)
    }

    /// Runs one reconciliation pass and waits for its report.
    ///
    /// # Errors
    ///
    /// Returns an error if communication with the actor fails.
    pub async fn reconcile(
        &self,
        desired: Vec<DesiredProcess>,
    ) -> Result<ReconcileReport, ActorError> {
        self.request(|respond_to| SupervisorMessage::Reconcile { desired, respond_to }).await
    }

    /// Runs [`Self::reconcile`] with a timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ActorError::Timeout`] if the pass doesn't finish in time, or
    /// any error from [`Self::reconcile`].
    pub async fn reconcile_timeout(
        &self,
        desired: Vec<DesiredProcess>,
        timeout: Duration,
    ) -> Result<ReconcileReport, ActorError> {
        tokio::time::timeout(timeout, self.reconcile(desired))
            .await
            .map_err(|_| ActorError::Timeout(timeout))?
    }

    /// Stops every renderer.
    ///
    /// # Errors
    ///
    /// Returns an error if communication with the actor fails.
    pub async fn kill_all(&self, executable: impl Into<String>) -> Result<Vec<String>, ActorError> {
        let executable = executable.into();
        self.request(|respond_to| SupervisorMessage::KillAll { executable, respond_to }).await
    }

    /// Stops renderers showing the given wallpaper folder.
    ///
    /// # Errors
    ///
    /// Returns an error if communication with the actor fails.
    pub async fn kill_matching(&self, folder: impl Into<String>) -> Result<Vec<String>, ActorError> {
        let folder = folder.into();
        self.request(|respond_to| SupervisorMessage::KillMatching { folder, respond_to }).await
    }

    /// Lists tracked renderers.
    ///
    /// # Errors
    ///
    /// Returns an error if communication with the actor fails.
    pub async fn snapshot(&self) -> Result<Vec<ActiveProcess>, ActorError> {
        self.request(|respond_to| SupervisorMessage::Snapshot { respond_to }).await
    }

    /// Asks the actor to stop after the messages already queued.
    ///
    /// # Errors
    ///
    /// Returns [`ActorError::SendFailed`] if the actor has already stopped.
    pub async fn shutdown(&self) -> Result<(), ActorError> {
        self.sender.send(SupervisorMessage::Shutdown).await.map_err(|_| ActorError::SendFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::command::RendererCommand;
    use crate::renderer::supervisor::testing::RecordingLauncher;

    fn desired(display: &str, wallpaper: &str) -> DesiredProcess {
        DesiredProcess::new(
            display,
            RendererCommand {
                executable: "linux-wallpaperengine".into(),
                args: vec![wallpaper.into(), "-r".into(), display.into()],
            },
        )
    }

    #[tokio::test]
    async fn reconcile_round_trip_through_handle() {
        let handle = SupervisorActor::spawn(RecordingLauncher::default(), None);

        let report = handle.reconcile(vec![desired("DP-1", "1")]).await.unwrap();
        assert_eq!(report.started, vec!["DP-1"]);

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].display, "DP-1");
    }

    #[tokio::test]
    async fn concurrent_passes_are_serialized() {
        let handle = SupervisorActor::spawn(RecordingLauncher::default(), None);

        let a = handle.clone();
        let b = handle.clone();
        let (first, second) = tokio::join!(
            a.reconcile(vec![desired("DP-1", "1")]),
            b.reconcile(vec![desired("DP-1", "1")]),
        );

        let reports = [first.unwrap(), second.unwrap()];
        let spawns: usize = reports.iter().map(|r| r.started.len()).sum();
        let unchanged: usize = reports.iter().map(|r| r.unchanged.len()).sum();
        assert_eq!(spawns, 1);
        assert_eq!(unchanged, 1);
    }

    #[tokio::test]
    async fn exit_notification_clears_entry() {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = SupervisorActor::spawn(RecordingLauncher::default(), Some(rx));

        handle.reconcile(vec![desired("DP-1", "1")]).await.unwrap();
        let pid = handle.snapshot().await.unwrap()[0].pid;

        tx.send(ProcessExit { display: "DP-1".into(), pid, code: Some(1) }).unwrap();

        // The exit is handled before any later request
        tokio::task::yield_now().await;
        let mut snapshot = handle.snapshot().await.unwrap();
        for _ in 0..10 {
            if snapshot.is_empty() {
                break;
            }
            tokio::task::yield_now().await;
            snapshot = handle.snapshot().await.unwrap();
        }
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn kill_requests_return_stopped_displays() {
        let handle = SupervisorActor::spawn(RecordingLauncher::default(), None);
        handle.reconcile(vec![desired("DP-1", "111"), desired("DP-2", "222")]).await.unwrap();

        assert_eq!(handle.kill_matching("222").await.unwrap(), vec!["DP-2"]);
        assert_eq!(handle.kill_all("linux-wallpaperengine").await.unwrap(), vec!["DP-1"]);
        assert!(handle.snapshot().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn requests_fail_after_shutdown() {
        let handle = SupervisorActor::spawn(RecordingLauncher::default(), None);
        handle.shutdown().await.unwrap();

        // Give the actor a chance to exit
        tokio::task::yield_now().await;
        let err = handle.snapshot().await.unwrap_err();
        assert!(matches!(err, ActorError::SendFailed | ActorError::ReceiveFailed));
    }

    #[test]
    fn actor_error_display() {
        let err = ActorError::Timeout(Duration::from_millis(250));
        assert!(err.to_string().contains("250ms"));
    }
}
