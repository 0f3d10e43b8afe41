//! Common test utilities for triggerware-session integration tests
//!
//! `MockServer` answers every request through a responder closure, records
//! what the client sent, and can push notifications to the client at any
//! time.

#![allow(dead_code)]

use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use triggerware_core::JsonStreamDecoder;
use triggerware_session::TriggerwareClient;

pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// What the server does with a request
pub enum Reply {
    Result(Value),
    Error(i32, &'static str),
}

pub struct MockServer {
    requests: Arc<Mutex<Vec<Value>>>,
    outbound: mpsc::UnboundedSender<Value>,
}

impl MockServer {
    /// Attach a fresh client to a server answering with `responder`
    pub async fn start<F>(responder: F) -> (TriggerwareClient, MockServer)
    where
        F: Fn(&str, &Value) -> Reply + Send + Sync + 'static,
    {
        Self::start_with(TriggerwareClient::new(), responder).await
    }

    pub async fn start_with<F>(client: TriggerwareClient, responder: F) -> (TriggerwareClient, MockServer)
    where
        F: Fn(&str, &Value) -> Reply + Send + Sync + 'static,
    {
        let (local, remote) = tokio::io::duplex(64 * 1024);
        client.attach(local).await.unwrap();

        let requests = Arc::new(Mutex::new(Vec::new()));
        let (outbound, mut pushes) = mpsc::unbounded_channel::<Value>();

        let log = Arc::clone(&requests);
        tokio::spawn(async move {
            let (mut reader, mut writer) = tokio::io::split(remote);
            let mut decoder = JsonStreamDecoder::new();
            let mut buf = [0u8; 4096];

            loop {
                tokio::select! {
                    read = reader.read(&mut buf) => {
                        let n = match read {
                            Ok(0) | Err(_) => break,
                            Ok(n) => n,
                        };
                        decoder.push(&buf[..n]);

                        while let Some(Ok(document)) = decoder.next_value() {
                            let Some(method) = document["method"].as_str().map(str::to_string) else {
                                // Replies to server-initiated requests are only logged.
                                log.lock().unwrap().push(document);
                                continue;
                            };
                            log.lock().unwrap().push(document.clone());

                            let id = document.get("id").cloned();
                            let Some(id) = id else { continue };

                            let params = document.get("params").cloned().unwrap_or(Value::Null);
                            let reply = match responder(&method, &params) {
                                Reply::Result(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
                                Reply::Error(code, message) => json!({
                                    "jsonrpc": "2.0",
                                    "id": id,
                                    "error": {"code": code, "message": message}
                                }),
                            };
                            if writer.write_all(reply.to_string().as_bytes()).await.is_err() {
                                return;
                            }
                        }
                    }
                    push = pushes.recv() => {
                        let Some(value) = push else { break };
                        if writer.write_all(value.to_string().as_bytes()).await.is_err() {
                            return;
                        }
                    }
                }
            }
        });

        (client, MockServer { requests, outbound })
    }

    /// Every document the client wrote, in order
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }

    /// Params of every request for `method`, in order
    pub fn params_for(&self, method: &str) -> Vec<Value> {
        self.requests()
            .into_iter()
            .filter(|r| r["method"] == method)
            .map(|r| r.get("params").cloned().unwrap_or(Value::Null))
            .collect()
    }

    pub fn count(&self, method: &str) -> usize {
        self.params_for(method).len()
    }

    /// Send a notification to the client
    pub fn notify(&self, method: &str, params: Value) {
        self.outbound
            .send(json!({"jsonrpc": "2.0", "method": method, "params": params}))
            .unwrap();
    }
}

/// A first page as sent by `execute-query` and `create-resultset`
pub fn page(handle: Option<u64>, exhausted: bool, tuples: Value) -> Value {
    let count = tuples.as_array().map(|t| t.len()).unwrap_or(0);
    json!({
        "handle": handle,
        "signature": [{"attribute": "X", "type": "integer"}],
        "batch": {"count": count, "exhausted": exhausted, "tuples": tuples}
    })
}

/// Wait for the next value on a channel
pub async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(RECV_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for delivery")
        .expect("channel closed")
}

/// Asserts nothing arrives on the channel for `ms` milliseconds
pub async fn assert_quiet<T: std::fmt::Debug>(rx: &mut mpsc::UnboundedReceiver<T>, ms: u64) {
    if let Ok(Some(value)) = tokio::time::timeout(Duration::from_millis(ms), rx.recv()).await {
        panic!("Expected nothing, got {:?}", value);
    }
}
