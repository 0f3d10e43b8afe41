//! Common test utilities for triggerware-rpc integration tests
//!
//! `MockPeer` plays the server side of a connection: it decodes whatever the
//! client writes and can write arbitrary bytes back.

#![allow(dead_code)]

use serde_json::{json, Value};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use triggerware_core::JsonStreamDecoder;
use triggerware_rpc::RpcClient;

pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

pub struct MockPeer {
    reader: Box<dyn AsyncRead + Unpin + Send>,
    writer: Box<dyn AsyncWrite + Unpin + Send>,
    decoder: JsonStreamDecoder,
}

impl MockPeer {
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            decoder: JsonStreamDecoder::new(),
        }
    }

    async fn next_document(&mut self) -> Option<Value> {
        loop {
            if let Some(value) = self.decoder.next_value() {
                return Some(value.expect("client wrote invalid JSON"));
            }
            let mut buf = [0u8; 4096];
            let n = self.reader.read(&mut buf).await.ok()?;
            if n == 0 {
                return None;
            }
            self.decoder.push(&buf[..n]);
        }
    }

    /// Next document written by the client
    pub async fn recv(&mut self) -> Value {
        tokio::time::timeout(RECV_TIMEOUT, self.next_document())
            .await
            .expect("timed out waiting for the client")
            .expect("client closed the stream")
    }

    /// Asserts the client writes nothing for `ms` milliseconds
    pub async fn assert_silent(&mut self, ms: u64) {
        let result = tokio::time::timeout(Duration::from_millis(ms), self.next_document()).await;
        if let Ok(Some(value)) = result {
            panic!("Expected no document, got {}", value);
        }
    }

    /// True once the client has closed its side of the stream
    pub async fn recv_eof(&mut self) -> bool {
        matches!(
            tokio::time::timeout(RECV_TIMEOUT, self.next_document()).await,
            Ok(None)
        )
    }

    pub async fn send(&mut self, value: Value) {
        self.send_raw(value.to_string().as_bytes()).await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Close the peer's write side; the client sees EOF
    pub async fn shutdown(&mut self) {
        let _ = self.writer.shutdown().await;
    }
}

/// A connected client and the peer at the other end
pub async fn connected_pair() -> (RpcClient, MockPeer) {
    let (local, remote) = tokio::io::duplex(64 * 1024);
    let client = RpcClient::new();
    client.attach(local).await.unwrap();
    (client, MockPeer::new(remote))
}

pub fn response(id: Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

pub fn error_response(id: Value, code: i32, message: &str) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
}

pub fn request(id: Value, method: &str, params: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params})
}

pub fn notification(method: &str, params: Value) -> Value {
    json!({"jsonrpc": "2.0", "method": method, "params": params})
}
