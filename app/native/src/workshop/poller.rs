//! Workshop download poller.
//!
//! Tracks subscribed items until they land on disk. Each tick checks every
//! tracked item:
//!
//! 1. folder present on disk: completed, whatever the counters say
//! 2. progress reported: emit it; `current >= total > 0` is completed
//! 3. nothing reported: count a missing tick and give up after the grace
//!    period

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::events::{EventBus, downloads};

/// Poll interval.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Ticks without any progress report before an item is abandoned.
pub const DEFAULT_GRACE_TICKS: u32 = 15;

/// Byte counters reported by the subscription backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    pub current: u64,
    pub total: u64,
}

/// Opaque source of download progress.
pub trait SubscriptionBackend: Send {
    /// Progress for `file_id`, or `None` if the backend knows nothing about it.
    fn progress(&self, file_id: &str) -> Option<DownloadProgress>;
}

/// Answers whether an item's folder exists on disk.
pub trait FolderProbe: Send {
    fn exists(&self, file_id: &str) -> bool;
}

/// Checks `<base>/<file_id>` for a directory.
#[derive(Debug, Clone)]
pub struct DiskProbe {
    base: PathBuf,
}

impl DiskProbe {
    #[must_use]
    pub const fn new(base: PathBuf) -> Self { Self { base } }
}

impl FolderProbe for DiskProbe {
    fn exists(&self, file_id: &str) -> bool { self.base.join(file_id).is_dir() }
}

/// Backend that never reports progress; disk presence and the grace period
/// decide every outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgressBackend;

impl SubscriptionBackend for NoProgressBackend {
    fn progress(&self, _file_id: &str) -> Option<DownloadProgress> { None }
}

/// One tracked item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadState {
    pub file_id: String,
    pub current: u64,
    pub total: u64,
    pub missing_ticks: u32,
}

/// How tracking ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadOutcome {
    Completed,
    Abandoned,
}

/// Result of one tick for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEvent {
    Progress { file_id: String, current: u64, total: u64 },
    Finished { file_id: String, outcome: DownloadOutcome },
}

impl PollEvent {
    /// Publishes this event on the bus.
    pub fn publish(&self, bus: &EventBus) {
        match self {
            Self::Progress { file_id, current, total } => bus.emit(
                downloads::PROGRESS,
                serde_json::json!({ "fileId": file_id, "current": current, "total": total }),
            ),
            Self::Finished { file_id, outcome } => bus.emit(
                downloads::FINISHED,
                serde_json::json!({ "fileId": file_id, "outcome": outcome }),
            ),
        }
    }

    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Finished { outcome: DownloadOutcome::Completed, .. })
    }
}

/// Tracked downloads and the collaborators that report on them.
pub struct DownloadPoller {
    backend: Box<dyn SubscriptionBackend>,
    probe: Box<dyn FolderProbe>,
    grace_ticks: u32,
    tracked: BTreeMap<String, DownloadState>,
}

impl DownloadPoller {
    #[must_use]
    pub fn new(backend: impl SubscriptionBackend + 'static, probe: impl FolderProbe + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            probe: Box::new(probe),
            grace_ticks: DEFAULT_GRACE_TICKS,
            tracked: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn with_grace_ticks(mut self, grace_ticks: u32) -> Self {
        self.grace_ticks = grace_ticks;
        self
    }

    /// Starts tracking `file_id`. Returns `false` if it was already tracked.
    pub fn track(&mut self, file_id: impl Into<String>) -> bool {
        let file_id = file_id.into();
        if self.tracked.contains_key(&file_id) {
            return false;
        }
        tracing::debug!(file_id = %file_id, "tracking download");
        self.tracked.insert(
            file_id.clone(),
            DownloadState { file_id, current: 0, total: 0, missing_ticks: 0 },
        );
        true
    }

    /// Tracked items, ordered by id.
    #[must_use]
    pub fn states(&self) -> Vec<DownloadState> { self.tracked.values().cloned().collect() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.tracked.is_empty() }

    /// Checks every tracked item once. Finished items stop being tracked.
    pub fn tick(&mut self) -> Vec<PollEvent> {
        let mut events = Vec::new();
        let mut finished = Vec::new();

        for (file_id, state) in &mut self.tracked {
            if self.probe.exists(file_id) {
                finished.push((file_id.clone(), DownloadOutcome::Completed));
                continue;
            }

            if let Some(progress) = self.backend.progress(file_id) {
                state.current = progress.current;
                state.total = progress.total;
                state.missing_ticks = 0;
                events.push(PollEvent::Progress {
                    file_id: file_id.clone(),
                    current: progress.current,
                    total: progress.total,
                });
                if progress.total > 0 && progress.current >= progress.total {
                    finished.push((file_id.clone(), DownloadOutcome::Completed));
                }
                continue;
            }

            state.missing_ticks += 1;
            if state.missing_ticks > self.grace_ticks {
                finished.push((file_id.clone(), DownloadOutcome::Abandoned));
            }
        }

        for (file_id, outcome) in finished {
            self.tracked.remove(&file_id);
            tracing::info!(file_id = %file_id, ?outcome, "download finished");
            events.push(PollEvent::Finished { file_id, outcome });
        }

        events
    }
}

/// Poller shared between the tick task and request handlers.
pub type SharedPoller = Arc<Mutex<DownloadPoller>>;

/// Ticks `poller` every `interval`, publishing events on `bus` and calling
/// `on_completed` after a tick that completed at least one item.
pub fn spawn_poller<F>(
    poller: SharedPoller,
    bus: EventBus,
    interval: Duration,
    on_completed: F,
) -> JoinHandle<()>
where
    F: Fn() + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let events = poller.lock().tick();
            for event in &events {
                event.publish(&bus);
            }
            if events.iter().any(PollEvent::is_completed) {
                on_completed();
            }
        }
    })
}
