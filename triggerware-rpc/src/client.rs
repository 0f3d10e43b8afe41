//! Bidirectional JSON-RPC client over a raw byte stream
//!
//! `RpcClient` owns one stream. Three tasks run per connection:
//!
//! - the **read loop** decodes concatenated JSON documents from the stream,
//!   settles pending calls as soon as their response arrives, and queues
//!   inbound invocations;
//! - the **dispatcher** runs queued invocations one at a time, in arrival
//!   order, and writes the reply when the invocation carried an id;
//! - the **write loop** owns the write half and writes queued documents in
//!   order. It stops on close even when a write is stuck on a peer that
//!   stopped reading.
//!
//! A handler may itself issue calls on the same client: its responses keep
//! flowing because the read loop never waits on a handler.
//!
//! # Cloning
//!
//! `RpcClient` is an `Arc` handle; clones share the connection, the pending
//! calls and the method table.
//!
//! # Example
//!
//! ```rust,no_run
//! use triggerware_rpc::{from_fn, RpcClient};
//! use serde_json::{json, Value};
//!
//! # async fn example() -> triggerware_core::Result<()> {
//! let client = RpcClient::new();
//! client
//!     .add_method("sub0", from_fn(|params| async move {
//!         tracing::info!(?params, "match");
//!         Ok(Value::Null)
//!     }))
//!     .await?;
//! client.connect("localhost", 5221).await?;
//!
//! let runtime: Value = client.call("runtime", json!({})).await?;
//! client.close().await;
//! # Ok(())
//! # }
//! ```

use crate::connection_state::{ConnectionEvent, ConnectionState};
use crate::method::{MethodHandler, MethodTable};
use crate::request::RequestManager;
use crate::ClientMetrics;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex, RwLock};
use triggerware_core::{
    codec, Error, Id, JsonRpcErrorData, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, JsonStreamDecoder, Result,
};

const READ_BUFFER_SIZE: usize = 8 * 1024;
const EVENT_CAPACITY: usize = 64;
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Inbound method invocation waiting for the dispatcher
struct Invocation {
    id: Option<Id>,
    method: String,
    params: Option<Value>,
}

/// Document waiting for the write loop, acknowledged once written
struct Outbound {
    text: String,
    written: oneshot::Sender<Result<()>>,
}

struct Inner {
    outbound: Mutex<Option<mpsc::UnboundedSender<Outbound>>>,
    requests: RequestManager,
    methods: MethodTable,
    state: RwLock<ConnectionState>,
    closed: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    events: broadcast::Sender<ConnectionEvent>,
    metrics: Option<Arc<ClientMetrics>>,
}

/// JSON-RPC client over any async byte stream
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<Inner>,
}

impl Default for RpcClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RpcClient {
    /// Create a disconnected client
    ///
    /// Methods can be registered right away; calls fail with
    /// `Error::NotConnected` until `connect` or `attach` succeeds.
    pub fn new() -> Self {
        Self::with_metrics(None)
    }

    pub(crate) fn with_metrics(metrics: Option<Arc<ClientMetrics>>) -> Self {
        let (shutdown, _) = watch::channel(false);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                outbound: Mutex::new(None),
                requests: RequestManager::new(),
                methods: MethodTable::new(),
                state: RwLock::new(ConnectionState::Disconnected),
                closed: AtomicBool::new(false),
                shutdown_tx: shutdown,
                events,
                metrics,
            }),
        }
    }

    /// Open a TCP connection to `host:port` and start the read loop
    #[tracing::instrument(skip(self))]
    pub async fn connect(&self, host: &str, port: u16) -> Result<()> {
        tracing::info!("Connecting to server");
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        self.attach(stream).await
    }

    /// Run the client over an already-open stream
    pub async fn attach<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let mut state = self.inner.state.write().await;
        match *state {
            ConnectionState::Disconnected => {}
            ConnectionState::Connected => {
                return Err(Error::InvalidState("client is already connected".into()))
            }
            ConnectionState::Closed => return Err(Error::ConnectionClosed),
        }

        let (reader, writer) = tokio::io::split(stream);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        *self.inner.outbound.lock().await = Some(outbound_tx);

        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
        let shutdown = self.inner.shutdown_tx.subscribe();
        tokio::spawn(write_loop(writer, outbound_rx, shutdown.clone()));
        tokio::spawn(read_loop(
            Arc::clone(&self.inner),
            reader,
            dispatch_tx,
            shutdown.clone(),
        ));
        tokio::spawn(dispatch_loop(Arc::clone(&self.inner), dispatch_rx, shutdown));

        *state = ConnectionState::Connected;
        if let Some(ref m) = self.inner.metrics {
            m.update_connection_state(ConnectionState::Connected);
        }
        tracing::info!("Connected");
        Ok(())
    }

    /// Call a remote method and wait for its result
    ///
    /// `params` that serialize to `null` are omitted from the request.
    /// The call settles with the `result` of the matching response, or with
    /// the error rebuilt from its `error` object, or with
    /// `Error::ConnectionClosed` if the connection goes away first.
    #[tracing::instrument(skip(self, params), fields(method = %method))]
    pub async fn call<P, R>(&self, method: &str, params: P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let start = Instant::now();
        let params = to_params(params)?;
        self.inner.ensure_connected().await?;

        let id = self.inner.requests.next_id();
        let rx = self.inner.requests.register(id).await?;

        let request = JsonRpcRequest::new(method, params, Id::from(id));
        let sent = match codec::encode_request(&request) {
            Ok(text) => self.inner.write(text).await,
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            self.inner.requests.remove(id).await;
            return Err(e);
        }

        tracing::debug!(id, "Call sent, waiting for response");

        let outcome = rx.await.unwrap_or(Err(Error::ConnectionClosed));
        let duration = start.elapsed().as_secs_f64();

        if let Some(ref m) = self.inner.metrics {
            let status = if outcome.is_ok() { "success" } else { "error" };
            m.record_call(method, status, duration);
        }

        let value = outcome.map_err(|e| {
            tracing::debug!(id, error = %e, "Call failed");
            e
        })?;

        Ok(serde_json::from_value(value)?)
    }

    /// Send a notification; no id, no response
    #[tracing::instrument(skip(self, params), fields(method = %method))]
    pub async fn notify<P>(&self, method: &str, params: P) -> Result<()>
    where
        P: Serialize,
    {
        let params = to_params(params)?;
        self.inner.ensure_connected().await?;

        let notification = JsonRpcNotification::new(method, params);
        self.inner
            .write(codec::encode_notification(&notification)?)
            .await?;

        if let Some(ref m) = self.inner.metrics {
            m.record_notification(method);
        }
        Ok(())
    }

    /// Register a local method; fails with `Error::Internal` if the name is taken
    pub async fn add_method(
        &self,
        name: impl Into<String>,
        handler: Arc<dyn MethodHandler>,
    ) -> Result<()> {
        let name = name.into();
        self.inner.methods.add(name.clone(), handler).await?;
        tracing::debug!(method = %name, "Method registered");
        Ok(())
    }

    /// Unregister a local method, reporting whether it was registered
    pub async fn remove_method(&self, name: &str) -> bool {
        let removed = self.inner.methods.remove(name).await;
        if removed {
            tracing::debug!(method = %name, "Method removed");
        }
        removed
    }

    pub async fn has_method(&self, name: &str) -> bool {
        self.inner.methods.contains(name).await
    }

    /// Close the connection
    ///
    /// Idempotent. Pending calls are rejected with `Error::ConnectionClosed`
    /// and observers receive a single `ConnectionEvent::Closed`.
    pub async fn close(&self) {
        self.inner.shutdown().await;
    }

    /// Observe decode errors, stream errors and the close
    pub fn subscribe_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    pub async fn state(&self) -> ConnectionState {
        *self.inner.state.read().await
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Connected
    }

    /// Number of calls still waiting for a response
    pub async fn pending_calls(&self) -> usize {
        self.inner.requests.pending_count().await
    }
}

fn to_params<P: Serialize>(params: P) -> Result<Option<Value>> {
    match serde_json::to_value(params)? {
        Value::Null => Ok(None),
        value => Ok(Some(value)),
    }
}

impl Inner {
    async fn ensure_connected(&self) -> Result<()> {
        match *self.state.read().await {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Disconnected => Err(Error::NotConnected),
            ConnectionState::Closed => Err(Error::ConnectionClosed),
        }
    }

    /// Queue a document and wait until the write loop has written it
    async fn write(&self, text: String) -> Result<()> {
        let queue = match self.outbound.lock().await.clone() {
            Some(queue) => queue,
            None if self.closed.load(Ordering::SeqCst) => return Err(Error::ConnectionClosed),
            None => return Err(Error::NotConnected),
        };

        let (written, done) = oneshot::channel();
        queue
            .send(Outbound { text, written })
            .map_err(|_| Error::ConnectionClosed)?;
        done.await.unwrap_or(Err(Error::ConnectionClosed))
    }

    fn emit(&self, event: ConnectionEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    fn report(&self, error: Error, error_type: &'static str) {
        if let Some(ref m) = self.metrics {
            m.record_error(error_type);
        }
        self.emit(ConnectionEvent::Error(error));
    }

    async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.shutdown_tx.send_replace(true);
        *self.state.write().await = ConnectionState::Closed;

        // The write loop sees the shutdown signal and lets go of the stream.
        self.outbound.lock().await.take();

        self.requests.fail_all(Error::ConnectionClosed).await;

        if let Some(ref m) = self.metrics {
            m.update_connection_state(ConnectionState::Closed);
        }
        self.emit(ConnectionEvent::Closed);
        tracing::info!("Connection closed");
    }

    async fn route(&self, value: Value, dispatch: &mpsc::UnboundedSender<Invocation>) {
        let message = match codec::classify(value) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unclassifiable document");
                self.report(e, "invalid_document");
                return;
            }
        };

        let invocation = match message {
            JsonRpcMessage::Response(response) => {
                let id = response.id.clone();
                if !self.requests.complete(response).await {
                    tracing::debug!(%id, "Discarding response with no pending call");
                }
                return;
            }
            JsonRpcMessage::Request(request) => Invocation {
                id: Some(request.id),
                method: request.method,
                params: request.params,
            },
            JsonRpcMessage::Notification(notification) => Invocation {
                id: None,
                method: notification.method,
                params: notification.params,
            },
        };

        if dispatch.send(invocation).is_err() {
            tracing::debug!("Dispatcher stopped, dropping invocation");
        }
    }

    async fn invoke(&self, invocation: Invocation) {
        let Invocation { id, method, params } = invocation;

        if let Some(ref m) = self.metrics {
            let kind = if id.is_some() { "request" } else { "notification" };
            m.record_inbound(&method, kind);
        }

        let outcome = match self.methods.get(&method).await {
            Some(handler) => run_handler(handler, params).await,
            None if id.is_some() => {
                tracing::warn!(method = %method, "Call to unregistered method");
                Err(Error::from(JsonRpcErrorData::method_not_found(&method)))
            }
            None => {
                tracing::debug!(method = %method, "Dropping notification for unregistered method");
                return;
            }
        };

        let Some(id) = id else {
            if let Err(e) = outcome {
                tracing::warn!(method = %method, error = %e, "Notification handler failed");
            }
            return;
        };

        let response = match outcome {
            Ok(result) => JsonRpcResponse::success(result, id),
            Err(e) => {
                tracing::debug!(method = %method, error = %e, "Replying with error");
                JsonRpcResponse::error(e.to_error_data(), id)
            }
        };

        let written = match codec::encode_response(&response) {
            Ok(text) => self.write(text).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            tracing::warn!(method = %method, error = %e, "Failed to write reply");
        }
    }
}

/// Run a handler, turning a panic into an internal error
async fn run_handler(handler: Arc<dyn MethodHandler>, params: Option<Value>) -> Result<Value> {
    match AssertUnwindSafe(async move { handler.invoke(params).await })
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(panic = %message, "Method handler panicked");
            Err(Error::internal(format!("Handler panicked: {}", message)))
        }
    }
}

async fn read_loop<R>(
    inner: Arc<Inner>,
    mut reader: R,
    dispatch: mpsc::UnboundedSender<Invocation>,
    mut shutdown: watch::Receiver<bool>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut decoder = JsonStreamDecoder::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = tokio::select! {
            _ = shutdown.changed() => break,
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    tracing::info!("Peer closed the stream");
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    tracing::error!(error = %e, "Stream read failed");
                    inner.report(Error::from(e), "io");
                    break;
                }
            },
        };

        decoder.push(&buf[..n]);
        while let Some(item) = decoder.next_value() {
            match item {
                Ok(value) => inner.route(value, &dispatch).await,
                Err(e) => {
                    tracing::warn!(error = %e, "Undecodable bytes on stream");
                    inner.report(e, "decode");
                }
            }
        }
    }

    if decoder.buffered() > 0 {
        tracing::debug!(bytes = decoder.buffered(), "Discarding partial document");
    }
    inner.shutdown().await;
}

async fn write_loop<W>(
    mut writer: W,
    mut queue: mpsc::UnboundedReceiver<Outbound>,
    mut shutdown: watch::Receiver<bool>,
) where
    W: AsyncWrite + Unpin + Send + 'static,
{
    loop {
        let Outbound { text, written } = tokio::select! {
            _ = shutdown.changed() => break,
            next = queue.recv() => match next {
                Some(outbound) => outbound,
                None => break,
            },
        };

        // Close interrupts a write stuck on a full stream.
        let result = tokio::select! {
            _ = shutdown.changed() => break,
            result = write_document(&mut writer, &text) => result,
        };
        if let Err(ref e) = result {
            tracing::warn!(error = %e, "Stream write failed");
        }
        let _ = written.send(result);
    }

    match tokio::time::timeout(SHUTDOWN_GRACE, writer.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!(error = %e, "Stream shutdown failed"),
        Err(_) => tracing::debug!("Stream shutdown timed out"),
    }
}

async fn write_document<W>(writer: &mut W, text: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(text.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

async fn dispatch_loop(
    inner: Arc<Inner>,
    mut queue: mpsc::UnboundedReceiver<Invocation>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let invocation = tokio::select! {
            _ = shutdown.changed() => break,
            next = queue.recv() => match next {
                Some(invocation) => invocation,
                None => break,
            },
        };
        inner.invoke(invocation).await;
    }
}
