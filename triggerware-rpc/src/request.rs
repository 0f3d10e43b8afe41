//! Pending-call table
//!
//! Every outbound call gets the next id from a per-client counter (starting
//! at 0, never reused) and a oneshot channel. The read loop settles the
//! channel when the response with that id arrives; closing the connection
//! settles every remaining channel with `Error::ConnectionClosed`.
//!
//! Once the table has been failed it stays closed: later registrations are
//! refused, so no call can start waiting on a connection that is already gone.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use triggerware_core::{Error, JsonRpcResponse, Result};

type Completion = oneshot::Sender<Result<Value>>;

#[derive(Default)]
struct PendingTable {
    calls: HashMap<u64, Completion>,
    closed: bool,
}

/// Tracks calls that are waiting for a response
#[derive(Clone, Default)]
pub struct RequestManager {
    pending: Arc<Mutex<PendingTable>>,
    counter: Arc<AtomicU64>,
}

impl RequestManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next request id
    pub fn next_id(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a pending call and return the receiver its caller awaits
    pub async fn register(&self, id: u64) -> Result<oneshot::Receiver<Result<Value>>> {
        let mut pending = self.pending.lock().await;
        if pending.closed {
            return Err(Error::ConnectionClosed);
        }

        let (tx, rx) = oneshot::channel();
        pending.calls.insert(id, tx);
        Ok(rx)
    }

    /// Drop a pending call without settling it (the request never left)
    pub async fn remove(&self, id: u64) {
        self.pending.lock().await.calls.remove(&id);
    }

    /// Settle the call matching the response id
    ///
    /// Returns false when no call is waiting on that id (stale, duplicate or
    /// foreign responses); the response is dropped in that case.
    pub async fn complete(&self, response: JsonRpcResponse) -> bool {
        let Some(id) = response.id.as_u64() else {
            return false;
        };

        let completion = self.pending.lock().await.calls.remove(&id);
        match completion {
            Some(tx) => {
                // The caller may have given up on the future; nothing to do then.
                let _ = tx.send(response.into_result());
                true
            }
            None => false,
        }
    }

    /// Reject every pending call and refuse new registrations
    pub async fn fail_all(&self, error: Error) {
        let mut pending = self.pending.lock().await;
        pending.closed = true;
        for (_, tx) in pending.calls.drain() {
            let _ = tx.send(Err(error.clone()));
        }
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.calls.len()
    }
}
