//! Client side of the transport.
//!
//! [`RpcClient`] connects with bounded retries, multiplexes calls by id, and
//! hands events to a single listener. The connection state is observable:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Disconnected
//! ```
//!
//! When the socket closes, every outstanding call fails immediately with
//! [`RpcError::ConnectionClosed`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use eyeball::{SharedObservable, Subscriber};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::task::JoinHandle;

use super::RpcError;
use super::buffer::LineBuffer;
use super::pending::PendingCalls;
use super::protocol::{Call, Event, Inbound, encode_line};

/// Default number of connection attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Default delay between connection attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Size of each socket read.
const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// How the retry delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    /// Same delay every time.
    #[default]
    Fixed,
    /// `delay * attempt`.
    Linear,
}

/// Bounded connection retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
            backoff: Backoff::Fixed,
        }
    }
}

impl RetryPolicy {
    /// A single attempt with no waiting.
    #[must_use]
    pub const fn once() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
            backoff: Backoff::Fixed,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Linear => self.delay.saturating_mul(attempt.max(1)),
        }
    }
}

type EventListener = Arc<dyn Fn(Event) + Send + Sync>;
type RetryObserver = Arc<dyn Fn(u32, &std::io::Error) + Send + Sync>;

struct Inner {
    path: PathBuf,
    policy: RetryPolicy,
    state: SharedObservable<ConnectionState>,
    pending: PendingCalls,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    listener: RwLock<Option<EventListener>>,
    on_retry: RwLock<Option<RetryObserver>>,
}

impl Inner {
    fn dispatch(&self, line: &str) {
        match Inbound::decode(line) {
            Ok(Inbound::Response(response)) => {
                let outcome = response.outcome.map_err(RpcError::Remote);
                if !self.pending.complete(response.id, outcome) {
                    tracing::debug!(id = response.id, "response for unknown call");
                }
            }
            Ok(Inbound::Event(event)) => {
                let listener = self.listener.read().clone();
                if let Some(listener) = listener {
                    listener(event);
                }
            }
            Err(err) => tracing::warn!(error = %err, "dropping malformed message"),
        }
    }

    fn teardown(&self) {
        self.state.set(ConnectionState::Disconnected);
        let failed = self.pending.fail_all();
        if failed > 0 {
            tracing::debug!(failed, "rejected pending calls after disconnect");
        }
    }
}

/// Client connection to the daemon. Cheap to clone; clones share the
/// connection.
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<Inner>,
}

impl RpcClient {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, policy: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                path: path.into(),
                policy,
                state: SharedObservable::new(ConnectionState::Disconnected),
                pending: PendingCalls::new(),
                writer: tokio::sync::Mutex::new(None),
                reader: Mutex::new(None),
                listener: RwLock::new(None),
                on_retry: RwLock::new(None),
            }),
        }
    }

    /// Socket path this client connects to.
    #[must_use]
    pub fn path(&self) -> &Path { &self.inner.path }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState { self.inner.state.get() }

    /// Stream of connection state changes.
    #[must_use]
    pub fn subscribe_state(&self) -> Subscriber<ConnectionState> { self.inner.state.subscribe() }

    #[must_use]
    pub fn is_connected(&self) -> bool { self.state() == ConnectionState::Connected }

    /// Registers the event listener, replacing any previous one.
    ///
    /// The listener runs inline on the reader task, so events are delivered
    /// one at a time in arrival order.
    pub fn on_event<F>(&self, listener: F)
    where F: Fn(Event) + Send + Sync + 'static {
        *self.inner.listener.write() = Some(Arc::new(listener));
    }

    /// Registers an observer for failed connection attempts that will be
    /// retried. It receives the 1-based attempt number and the error.
    pub fn on_retry<F>(&self, observer: F)
    where F: Fn(u32, &std::io::Error) + Send + Sync + 'static {
        *self.inner.on_retry.write() = Some(Arc::new(observer));
    }

    /// Connects to the daemon, retrying per the [`RetryPolicy`].
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::BackendUnavailable`] once every attempt failed.
    pub async fn connect(&self) -> Result<(), RpcError> {
        if self.is_connected() {
            return Ok(());
        }

        let policy = self.inner.policy;
        let max_attempts = policy.max_attempts.max(1);
        self.inner.state.set(ConnectionState::Connecting);

        let mut last_error = String::new();
        for attempt in 1..=max_attempts {
            match UnixStream::connect(&self.inner.path).await {
                Ok(stream) => {
                    self.attach(stream).await;
                    tracing::debug!(path = %self.inner.path.display(), attempt, "connected");
                    return Ok(());
                }
                Err(err) => {
                    last_error = err.to_string();
                    if attempt < max_attempts {
                        let observer = self.inner.on_retry.read().clone();
                        if let Some(observer) = observer {
                            observer(attempt, &err);
                        }
                        tokio::time::sleep(policy.delay_after(attempt)).await;
                    }
                }
            }
        }

        self.inner.state.set(ConnectionState::Disconnected);
        Err(RpcError::BackendUnavailable { attempts: max_attempts, last_error })
    }

    async fn attach(&self, stream: UnixStream) {
        let (read, write) = stream.into_split();
        *self.inner.writer.lock().await = Some(write);
        self.inner.state.set(ConnectionState::Connected);

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(read_loop(read, inner));
        if let Some(previous) = self.inner.reader.lock().replace(task) {
            previous.abort();
        }
    }

    /// Sends a call and waits for its response.
    ///
    /// # Errors
    ///
    /// - [`RpcError::NotConnected`] when no connection is established
    /// - [`RpcError::ConnectionClosed`] when the socket drops first
    /// - [`RpcError::Remote`] when the daemon answers with an error
    pub async fn send(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        if !self.is_connected() {
            return Err(RpcError::NotConnected);
        }

        let (id, response) = self.inner.pending.register();
        if !self.is_connected() {
            self.inner.pending.forget(id);
            return Err(RpcError::NotConnected);
        }

        let call = Call { id, method: method.to_string(), params };
        let line = match encode_line(&call) {
            Ok(line) => line,
            Err(err) => {
                self.inner.pending.forget(id);
                return Err(RpcError::Encode(err.to_string()));
            }
        };

        {
            let mut writer = self.inner.writer.lock().await;
            let Some(stream) = writer.as_mut() else {
                self.inner.pending.forget(id);
                return Err(RpcError::NotConnected);
            };
            if let Err(err) = stream.write_all(line.as_bytes()).await {
                self.inner.pending.forget(id);
                return Err(err.into());
            }
        }

        tracing::trace!(id, method, "call sent");
        response.await.unwrap_or(Err(RpcError::ConnectionClosed))
    }

    /// Typed wrapper around [`Self::send`].
    ///
    /// # Errors
    ///
    /// Any error from [`Self::send`], [`RpcError::Encode`] for unserializable
    /// params, or [`RpcError::Protocol`] when the result has the wrong shape.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: impl Serialize,
    ) -> Result<T, RpcError> {
        let params = serde_json::to_value(params).map_err(|e| RpcError::Encode(e.to_string()))?;
        let result = self.send(method, params).await?;
        serde_json::from_value(result).map_err(|e| RpcError::Protocol(e.to_string()))
    }

    /// Number of calls awaiting a response.
    #[must_use]
    pub fn pending_calls(&self) -> usize { self.inner.pending.len() }

    /// Closes the connection. Outstanding calls fail with
    /// [`RpcError::ConnectionClosed`].
    pub async fn disconnect(&self) {
        if let Some(task) = self.inner.reader.lock().take() {
            task.abort();
        }
        if let Some(mut stream) = self.inner.writer.lock().await.take() {
            let _ = stream.shutdown().await;
        }
        self.inner.teardown();
    }
}

async fn read_loop(mut read: OwnedReadHalf, inner: Arc<Inner>) {
    let mut buffer = LineBuffer::new();
    let mut chunk = vec![0u8; READ_CHUNK_BYTES];

    loop {
        match read.read(&mut chunk).await {
            Ok(0) => {
                tracing::debug!("backend closed the connection");
                break;
            }
            Ok(n) => {
                for line in buffer.push(&chunk[..n]) {
                    inner.dispatch(&line);
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "socket read failed");
                break;
            }
        }
    }

    inner.teardown();
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::UnixListener;

    use super::*;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            delay: Duration::from_millis(1),
            backoff: Backoff::Fixed,
        }
    }

    #[test]
    fn linear_backoff_grows_with_attempts() {
        let policy = RetryPolicy {
            backoff: Backoff::Linear,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(500));
        assert_eq!(policy.delay_after(3), Duration::from_millis(1500));
        assert_eq!(RetryPolicy::default().delay_after(3), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn send_fails_fast_when_not_connected() {
        let client = RpcClient::new("/nonexistent/backdrop.sock", fast_policy(1));
        let err = client.send("ping", Value::Null).await.unwrap_err();
        assert!(matches!(err, RpcError::NotConnected));
        assert_eq!(client.pending_calls(), 0);
    }

    #[tokio::test]
    async fn connect_exhausts_retries_and_notifies_observer() {
        let dir = tempfile::tempdir().unwrap();
        let client = RpcClient::new(dir.path().join("missing.sock"), fast_policy(3));

        let retries = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&retries);
        client.on_retry(move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, RpcError::BackendUnavailable { attempts: 3, .. }));
        assert_eq!(retries.load(Ordering::SeqCst), 2);
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn responses_resolve_calls_and_events_reach_listener() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();
            let call: Call = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
            // Event first, split across two writes, then the response
            write.write_all(b"{\"method\":\"screens-changed\",").await.unwrap();
            write.write_all(b"\"params\":[\"DP-1\"]}\n").await.unwrap();
            let reply = format!("{{\"id\":{},\"result\":{{\"ok\":true}}}}\n", call.id);
            write.write_all(reply.as_bytes()).await.unwrap();
            lines
        });

        let client = RpcClient::new(&path, fast_policy(1));
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        client.on_event(move |event| sink.lock().push(event));

        client.connect().await.unwrap();
        assert!(client.is_connected());

        let result = client.send("get-status", json!({})).await.unwrap();
        assert_eq!(result, json!({"ok": true}));
        assert_eq!(client.pending_calls(), 0);

        let events = events.lock().clone();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].method, "screens-changed");

        drop(server.await.unwrap());
    }

    #[tokio::test]
    async fn disconnect_rejects_outstanding_calls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sock");
        let listener = UnixListener::bind(&path).unwrap();

        // Accept and read, never answer, then hang up
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, _write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();
            let _ = lines.next_line().await;
        });

        let client = RpcClient::new(&path, fast_policy(1));
        client.connect().await.unwrap();

        let err = client.send("ping", Value::Null).await.unwrap_err();
        assert!(matches!(err, RpcError::ConnectionClosed));
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(client.pending_calls(), 0);

        server.await.unwrap();
    }

    #[tokio::test]
    async fn remote_error_rejects_only_that_call() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();
            let call: Call = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
            let reply = format!("{{\"id\":{},\"error\":\"unknown method: frob\"}}\n", call.id);
            write.write_all(reply.as_bytes()).await.unwrap();
            (lines, write)
        });

        let client = RpcClient::new(&path, fast_policy(1));
        client.connect().await.unwrap();

        let err = client.send("frob", Value::Null).await.unwrap_err();
        assert!(matches!(err, RpcError::Remote(ref msg) if msg == "unknown method: frob"));
        assert!(client.is_connected());

        drop(server.await.unwrap());
    }
}
