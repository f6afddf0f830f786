//! Wallpaper library folder watcher.
//!
//! Reports wallpaper folders appearing, disappearing or being renamed under
//! the library directory. Events are collected until the directory has been
//! quiet for [`FOLDER_DEBOUNCE`], then delivered in arrival order with
//! duplicates dropped.

use std::path::{Path, PathBuf};
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};

use notify::event::ModifyKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;

use crate::utils::thread::spawn_named_thread;

/// Quiet period before buffered folder changes are delivered.
pub const FOLDER_DEBOUNCE: Duration = Duration::from_millis(500);

/// Kind of change to a library folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FolderOp {
    Create,
    Remove,
    Rename,
}

impl FolderOp {
    /// Maps a `notify` event kind; `None` for kinds that don't matter here.
    #[must_use]
    pub const fn from_kind(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(Self::Create),
            EventKind::Remove(_) => Some(Self::Remove),
            EventKind::Modify(ModifyKind::Name(_)) => Some(Self::Rename),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Remove => "remove",
            Self::Rename => "rename",
        }
    }
}

/// One debounced change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderChange {
    pub path: PathBuf,
    pub op: FolderOp,
}

impl FolderChange {
    /// Folder name relative to the library, which is the wallpaper id.
    #[must_use]
    pub fn folder_name(&self) -> Option<&str> { self.path.file_name().and_then(|n| n.to_str()) }

    /// `true` when the folder is gone after this change.
    #[must_use]
    pub fn is_gone(&self) -> bool {
        match self.op {
            FolderOp::Remove => true,
            FolderOp::Rename => !self.path.exists(),
            FolderOp::Create => false,
        }
    }
}

/// Collects changes and releases them once the debounce window has passed.
#[derive(Debug, Default)]
struct ChangeBuffer {
    pending: Vec<FolderChange>,
    last_event: Option<Instant>,
}

impl ChangeBuffer {
    fn push(&mut self, change: FolderChange, now: Instant) {
        if !self.pending.contains(&change) {
            self.pending.push(change);
        }
        self.last_event = Some(now);
    }

    /// Time left before the buffered changes are due, `None` when empty.
    fn remaining(&self, now: Instant, window: Duration) -> Option<Duration> {
        self.last_event.map(|at| window.saturating_sub(now.duration_since(at)))
    }

    fn take(&mut self) -> Vec<FolderChange> {
        self.last_event = None;
        std::mem::take(&mut self.pending)
    }
}

/// Direct children of `base` touched by an event.
fn library_children<'a>(base: &'a Path, paths: &'a [PathBuf]) -> impl Iterator<Item = &'a PathBuf> {
    paths.iter().filter(move |path| path.parent() == Some(base))
}

/// Watches `base` on a background thread and calls `on_change` for every
/// debounced folder change. Does nothing if `base` doesn't exist.
pub fn watch_library<F>(base: PathBuf, on_change: F)
where F: Fn(FolderChange) + Send + 'static {
    if !base.is_dir() {
        tracing::info!(path = %base.display(), "wallpaper directory does not exist, not watching");
        return;
    }

    spawn_named_thread("library-watcher", move || {
        let (tx, rx) = std::sync::mpsc::channel();

        let mut watcher: RecommendedWatcher = match notify::recommended_watcher(tx) {
            Ok(w) => w,
            Err(err) => {
                tracing::warn!(error = %err, "failed to create library watcher");
                return;
            }
        };

        if let Err(err) = watcher.watch(&base, RecursiveMode::NonRecursive) {
            tracing::warn!(error = %err, path = %base.display(), "failed to watch wallpaper directory");
            return;
        }

        tracing::info!(path = %base.display(), "watching wallpaper directory");

        let mut buffer = ChangeBuffer::default();
        loop {
            let received = match buffer.remaining(Instant::now(), FOLDER_DEBOUNCE) {
                Some(wait) => rx.recv_timeout(wait),
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match received {
                Ok(Ok(event)) => {
                    let Some(op) = FolderOp::from_kind(&event.kind) else {
                        continue;
                    };
                    let now = Instant::now();
                    for path in library_children(&base, &event.paths) {
                        buffer.push(FolderChange { path: path.clone(), op }, now);
                    }
                }
                Ok(Err(err)) => tracing::warn!(error = %err, "library watch error"),
                Err(RecvTimeoutError::Timeout) => {
                    for change in buffer.take() {
                        tracing::info!(path = %change.path.display(), op = change.op.as_str(), "wallpaper folder changed");
                        on_change(change);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use notify::event::{CreateKind, RemoveKind, RenameMode};

    use super::*;

    #[test]
    fn kinds_map_to_ops() {
        assert_eq!(FolderOp::from_kind(&EventKind::Create(CreateKind::Folder)), Some(FolderOp::Create));
        assert_eq!(FolderOp::from_kind(&EventKind::Remove(RemoveKind::Any)), Some(FolderOp::Remove));
        assert_eq!(
            FolderOp::from_kind(&EventKind::Modify(ModifyKind::Name(RenameMode::From))),
            Some(FolderOp::Rename)
        );
        assert_eq!(FolderOp::from_kind(&EventKind::Modify(ModifyKind::Any)), None);
    }

    #[test]
    fn buffer_deduplicates_and_tracks_quiet_period() {
        let start = Instant::now();
        let mut buffer = ChangeBuffer::default();
        assert!(buffer.remaining(start, FOLDER_DEBOUNCE).is_none());

        let change = FolderChange { path: PathBuf::from("/lib/123"), op: FolderOp::Create };
        buffer.push(change.clone(), start);
        buffer.push(change.clone(), start);

        assert_eq!(buffer.remaining(start, FOLDER_DEBOUNCE), Some(FOLDER_DEBOUNCE));
        assert_eq!(
            buffer.remaining(start + Duration::from_secs(1), FOLDER_DEBOUNCE),
            Some(Duration::ZERO)
        );
        assert_eq!(buffer.take(), vec![change]);
        assert!(buffer.remaining(start, FOLDER_DEBOUNCE).is_none());
    }

    #[test]
    fn only_direct_children_are_considered() {
        let base = PathBuf::from("/lib");
        let paths = vec![PathBuf::from("/lib/123"), PathBuf::from("/lib/123/scene.json")];
        let children: Vec<_> = library_children(&base, &paths).collect();
        assert_eq!(children, vec![&PathBuf::from("/lib/123")]);
    }

    #[test]
    fn removal_is_gone_and_folder_name_is_the_id() {
        let change = FolderChange { path: PathBuf::from("/lib/2817093"), op: FolderOp::Remove };
        assert!(change.is_gone());
        assert_eq!(change.folder_name(), Some("2817093"));

        let created = FolderChange { path: PathBuf::from("/lib/1"), op: FolderOp::Create };
        assert!(!created.is_gone());
    }

    #[test]
    fn new_folder_is_reported_after_debounce() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = mpsc::channel();
        watch_library(dir.path().to_path_buf(), move |change| {
            let _ = tx.send(change);
        });

        std::thread::sleep(Duration::from_millis(300));
        std::fs::create_dir(dir.path().join("431960")).unwrap();

        let change = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(change.op, FolderOp::Create);
        assert_eq!(change.folder_name(), Some("431960"));
    }
}
