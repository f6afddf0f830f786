//! Outstanding calls keyed by request id.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;

use super::RpcError;
use super::protocol::RequestId;

/// Receiver side of one pending call.
pub type PendingReceiver = oneshot::Receiver<Result<Value, RpcError>>;

/// Map of in-flight calls, shared by the write path and the reader task.
#[derive(Debug)]
pub struct PendingCalls {
    next_id: AtomicU64,
    calls: DashMap<RequestId, oneshot::Sender<Result<Value, RpcError>>>,
}

impl Default for PendingCalls {
    fn default() -> Self { Self::new() }
}

impl PendingCalls {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            calls: DashMap::new(),
        }
    }

    /// Allocates the next id and registers a continuation for it.
    pub fn register(&self) -> (RequestId, PendingReceiver) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.calls.insert(id, tx);
        (id, rx)
    }

    /// Resolves call `id`. Returns `false` when no such call is pending.
    pub fn complete(&self, id: RequestId, outcome: Result<Value, RpcError>) -> bool {
        match self.calls.remove(&id) {
            Some((_, tx)) => {
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Drops call `id` without resolving it.
    pub fn forget(&self, id: RequestId) { self.calls.remove(&id); }

    /// Fails every pending call with [`RpcError::ConnectionClosed`]. Returns
    /// how many were failed.
    pub fn fail_all(&self) -> usize {
        let ids: Vec<RequestId> = self.calls.iter().map(|entry| *entry.key()).collect();
        ids.into_iter()
            .filter(|id| self.complete(*id, Err(RpcError::ConnectionClosed)))
            .count()
    }

    #[must_use]
    pub fn contains(&self, id: RequestId) -> bool { self.calls.contains_key(&id) }

    #[must_use]
    pub fn len(&self) -> usize { self.calls.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.calls.is_empty() }
}
