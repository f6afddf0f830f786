//! Workshop library integration: download tracking and library folder
//! changes.

pub mod folder_watcher;
pub mod poller;

pub use folder_watcher::{FolderChange, FolderOp, watch_library};
pub use poller::{
    DiskProbe, DownloadOutcome, DownloadPoller, DownloadProgress, DownloadState, FolderProbe,
    NoProgressBackend, PollEvent, SharedPoller, SubscriptionBackend, spawn_poller,
};
