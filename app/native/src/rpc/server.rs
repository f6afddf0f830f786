//! Daemon side of the transport.
//!
//! # Architecture
//!
//! - One task accepts connections on the Unix socket
//! - Each connection gets a reader loop and a writer task fed by a channel
//! - Every call is handled in its own task so slow methods never block the
//!   connection; responses may go out in any order
//! - Events published on the [`EventBus`] are forwarded to every connection

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, watch};

use super::RpcError;
use super::buffer::LineBuffer;
use super::protocol::{Call, Response, encode_line};
use crate::events::EventBus;

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Answers calls received by the server.
pub trait CallHandler: Send + Sync + 'static {
    /// Handles one call. `Err` becomes an `error` response.
    fn handle(
        &self,
        method: &str,
        params: Value,
    ) -> impl Future<Output = Result<Value, String>> + Send;
}

/// Listening socket plus what each connection needs.
pub struct RpcServer<H: CallHandler> {
    listener: UnixListener,
    path: PathBuf,
    handler: Arc<H>,
    bus: EventBus,
}

impl<H: CallHandler> RpcServer<H> {
    /// Binds the socket at `path`, replacing a stale socket file.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Io`] if the socket cannot be bound.
    pub fn bind(path: &Path, handler: H, bus: EventBus) -> Result<Self, RpcError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if path.exists() {
            tracing::debug!(path = %path.display(), "removing stale socket");
            std::fs::remove_file(path)?;
        }

        let listener = UnixListener::bind(path)?;
        tracing::info!(path = %path.display(), "listening");

        Ok(Self {
            listener,
            path: path.to_path_buf(),
            handler: Arc::new(handler),
            bus,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path { &self.path }

    /// Accepts connections until `shutdown` resolves, then closes every open
    /// connection and removes the socket file.
    pub async fn serve(self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        let (closing, closed) = watch::channel(false);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        tracing::debug!("client connected");
                        let handler = Arc::clone(&self.handler);
                        let bus = self.bus.clone();
                        tokio::spawn(handle_connection(stream, handler, bus, closed.clone()));
                    }
                    Err(err) => tracing::warn!(error = %err, "accept failed"),
                },
            }
        }

        let _ = closing.send(true);
        if let Err(err) = std::fs::remove_file(&self.path) {
            tracing::debug!(error = %err, "socket already removed");
        }
        tracing::debug!("server stopped");
    }
}

async fn handle_connection<H: CallHandler>(
    stream: UnixStream,
    handler: Arc<H>,
    bus: EventBus,
    mut closing: watch::Receiver<bool>,
) {
    let (mut read, write) = stream.into_split();
    let (outbound, queue) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(write_loop(write, queue));

    let mut events = bus.subscribe();
    let mut events_open = true;
    let mut buffer = LineBuffer::new();
    let mut chunk = vec![0u8; READ_CHUNK_BYTES];

    loop {
        tokio::select! {
            _ = closing.changed() => break,
            received = read.read(&mut chunk) => match received {
                Ok(0) => break,
                Ok(n) => {
                    for line in buffer.push(&chunk[..n]) {
                        dispatch_call(&line, &handler, &outbound);
                    }
                }
                Err(err) => {
                    tracing::debug!(error = %err, "client read failed");
                    break;
                }
            },
            event = events.recv(), if events_open => match event {
                Ok(event) => match encode_line(&event) {
                    Ok(line) => {
                        if outbound.send(line).is_err() {
                            break;
                        }
                    }
                    Err(err) => tracing::debug!(error = %err, "failed to encode event"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "client fell behind on events");
                }
                Err(RecvError::Closed) => events_open = false,
            },
        }
    }

    drop(outbound);
    let _ = writer.await;
    tracing::debug!("client disconnected");
}

fn dispatch_call<H: CallHandler>(
    line: &str,
    handler: &Arc<H>,
    outbound: &mpsc::UnboundedSender<String>,
) {
    let call = match Call::decode(line) {
        Ok(call) => call,
        Err(err) => {
            tracing::warn!(error = %err, "dropping malformed call");
            return;
        }
    };

    let handler = Arc::clone(handler);
    let outbound = outbound.clone();
    tokio::spawn(async move {
        tracing::debug!(id = call.id, method = %call.method, "handling call");
        let response = match handler.handle(&call.method, call.params).await {
            Ok(result) => Response { id: call.id, outcome: Ok(result) },
            Err(message) => Response::error(call.id, message),
        };
        match encode_line(&response) {
            Ok(line) => {
                let _ = outbound.send(line);
            }
            Err(err) => tracing::warn!(error = %err, "failed to encode response"),
        }
    });
}

async fn write_loop(mut write: OwnedWriteHalf, mut queue: mpsc::UnboundedReceiver<String>) {
    while let Some(line) = queue.recv().await {
        if let Err(err) = write.write_all(line.as_bytes()).await {
            tracing::debug!(error = %err, "client write failed");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::sync::oneshot;

    use super::*;

    struct Echo;

    impl CallHandler for Echo {
        async fn handle(&self, method: &str, params: Value) -> Result<Value, String> {
            match method {
                "echo" => Ok(params),
                "sleep" => {
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                    Ok(json!("slept"))
                }
                other => Err(format!("unknown method: {other}")),
            }
        }
    }

    async fn start(dir: &Path, bus: EventBus) -> (PathBuf, oneshot::Sender<()>) {
        let path = dir.join("server.sock");
        let server = RpcServer::bind(&path, Echo, bus).unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        tokio::spawn(server.serve(async move {
            let _ = stopped.await;
        }));
        (path, stop)
    }

    #[tokio::test]
    async fn responses_are_correlated_and_may_reorder() {
        let dir = tempfile::tempdir().unwrap();
        let (path, _stop) = start(dir.path(), EventBus::new()).await;

        let stream = UnixStream::connect(&path).await.unwrap();
        let (read, mut write) = stream.into_split();
        write
            .write_all(b"{\"id\":1,\"method\":\"sleep\"}\n{\"id\":2,\"method\":\"echo\",\"params\":[1]}\n")
            .await
            .unwrap();

        let mut lines = BufReader::new(read).lines();
        let first = lines.next_line().await.unwrap().unwrap();
        let second = lines.next_line().await.unwrap().unwrap();
        assert_eq!(first, r#"{"id":2,"result":[1]}"#);
        assert_eq!(second, r#"{"id":1,"result":"slept"}"#);
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let (path, _stop) = start(dir.path(), EventBus::new()).await;

        let stream = UnixStream::connect(&path).await.unwrap();
        let (read, mut write) = stream.into_split();
        write.write_all(b"not json\n{\"id\":3,\"method\":\"nope\"}\n").await.unwrap();

        let mut lines = BufReader::new(read).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        assert_eq!(line, r#"{"id":3,"error":"unknown method: nope"}"#);
    }

    #[tokio::test]
    async fn bus_events_reach_connected_clients() {
        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::new();
        let (path, _stop) = start(dir.path(), bus.clone()).await;

        let stream = UnixStream::connect(&path).await.unwrap();
        let (read, mut write) = stream.into_split();

        // A round trip guarantees the connection has subscribed to the bus
        write.write_all(b"{\"id\":1,\"method\":\"echo\"}\n").await.unwrap();
        let mut lines = BufReader::new(read).lines();
        lines.next_line().await.unwrap().unwrap();

        bus.log("wallpaper", "DP-1: ready");
        let line = lines.next_line().await.unwrap().unwrap();
        let event: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(event["method"], "log");
        assert_eq!(event["params"]["message"], "DP-1: ready");
        assert!(event.get("id").is_none());
    }

    #[tokio::test]
    async fn shutdown_removes_socket_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.sock");
        std::fs::write(&path, b"stale").unwrap();

        let server = RpcServer::bind(&path, Echo, EventBus::new()).unwrap();
        assert!(path.exists());

        server.serve(async {}).await;
        assert!(!path.exists());
    }
}
