//! Integration tests for the control-socket client against a scripted peer.
//!
//! The peer is a bare `UnixListener` that writes raw protocol lines, so these
//! tests pin the wire format rather than the daemon's behaviour.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backdrop_lib::rpc::{Backoff, ConnectionState, RetryPolicy, RpcClient, RpcError};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;

fn quick_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        delay: Duration::from_millis(10),
        backoff: Backoff::Fixed,
    }
}

/// Reads `count` calls, then answers them in reverse order.
async fn answer_in_reverse(listener: UnixListener, count: usize) {
    let (stream, _) = listener.accept().await.unwrap();
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    let mut calls = Vec::new();
    while calls.len() < count {
        let line = lines.next_line().await.unwrap().unwrap();
        let call: Value = serde_json::from_str(&line).unwrap();
        calls.push(call);
    }

    for call in calls.iter().rev() {
        let reply = json!({ "id": call["id"], "result": call["params"] });
        write.write_all(format!("{reply}\n").as_bytes()).await.unwrap();
    }

    // Keep the connection open until the client hangs up
    while let Ok(Some(_)) = lines.next_line().await {}
}

#[tokio::test]
async fn out_of_order_responses_reach_their_callers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("peer.sock");
    let listener = UnixListener::bind(&path).unwrap();
    tokio::spawn(answer_in_reverse(listener, 3));

    let client = RpcClient::new(&path, quick_policy(3));
    client.connect().await.unwrap();

    let (a, b, c) = tokio::join!(
        client.send("echo", json!("first")),
        client.send("echo", json!("second")),
        client.send("echo", json!("third")),
    );

    assert_eq!(a.unwrap(), json!("first"));
    assert_eq!(b.unwrap(), json!("second"));
    assert_eq!(c.unwrap(), json!("third"));
    assert_eq!(client.pending_calls(), 0);
}

#[tokio::test]
async fn literal_response_resolves_the_matching_call() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("peer.sock");
    let listener = UnixListener::bind(&path).unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let call: Value = serde_json::from_str(&line).unwrap();
            let id = call["id"].as_u64().unwrap();
            let reply = format!("{{\"id\":{id},\"result\":{{\"ok\":true}}}}\n");
            write.write_all(reply.as_bytes()).await.unwrap();
        }
    });

    let client = RpcClient::new(&path, quick_policy(3));
    client.connect().await.unwrap();

    // Ids are allocated from 1, so the seventh call carries id 7
    for _ in 0..6 {
        client.send("ping", Value::Null).await.unwrap();
    }
    let seventh = client.send("ping", Value::Null).await.unwrap();

    assert_eq!(seventh, json!({ "ok": true }));
    assert_eq!(client.pending_calls(), 0);
}

#[tokio::test]
async fn dropped_connection_rejects_every_pending_call() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("peer.sock");
    let listener = UnixListener::bind(&path).unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read, _write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();
        // Read both calls and hang up without answering
        let _ = lines.next_line().await;
        let _ = lines.next_line().await;
    });

    let client = RpcClient::new(&path, quick_policy(3));
    client.connect().await.unwrap();

    let (a, b) = tokio::join!(
        client.send("apply-wallpapers", Value::Null),
        client.send("get-screens", Value::Null),
    );
    assert!(matches!(a, Err(RpcError::ConnectionClosed)), "unexpected result: {a:?}");
    assert!(matches!(b, Err(RpcError::ConnectionClosed)), "unexpected result: {b:?}");
    assert_eq!(client.pending_calls(), 0);
    assert_eq!(client.state(), ConnectionState::Disconnected);

    let err = client.send("ping", Value::Null).await.unwrap_err();
    assert!(matches!(err, RpcError::NotConnected));
}

#[tokio::test]
async fn events_are_delivered_to_the_listener() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("peer.sock");
    let listener = UnixListener::bind(&path).unwrap();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream
            .write_all(b"{\"method\":\"screens-changed\",\"params\":[\"DP-1\"]}\n")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let client = RpcClient::new(&path, quick_policy(3));
    client.on_event(move |event| {
        let _ = tx.send(event);
    });
    client.connect().await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    assert_eq!(event.method, "screens-changed");
    assert_eq!(event.params, json!(["DP-1"]));
}

#[tokio::test]
async fn exhausted_retries_report_backend_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nobody-home.sock");

    let retries = Arc::new(AtomicU32::new(0));
    let client = RpcClient::new(&path, quick_policy(3));
    {
        let retries = Arc::clone(&retries);
        client.on_retry(move |_, _| {
            retries.fetch_add(1, Ordering::SeqCst);
        });
    }

    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, RpcError::BackendUnavailable { attempts: 3, .. }), "unexpected error: {err}");
    assert_eq!(retries.load(Ordering::SeqCst), 2);
    assert_eq!(client.state(), ConnectionState::Disconnected);
}
