//! Session client
//!
//! [`TriggerwareClient`] wraps the JSON-RPC transport with the server's
//! query operations, the default paging limits every cursor falls back to,
//! and the per-client counters that name the local methods subscriptions,
//! batches and polled queries register (`sub<N>`, `batch<N>`, `poll<N>`).
//!
//! ```rust,no_run
//! use triggerware_session::{Query, TriggerwareClient};
//!
//! # async fn example() -> triggerware_core::Result<()> {
//! let client = TriggerwareClient::builder()
//!     .default_row_limit(50)
//!     .connect("localhost", 5221)
//!     .await?;
//!
//! let mut rows = client
//!     .execute_query::<serde_json::Value>(Query::fol("((x) s.t. (inflation 1990 1995 x))"), None)
//!     .await?;
//! while let Some(row) = rows.next().await? {
//!     println!("{}", row);
//! }
//! client.close().await;
//! # Ok(())
//! # }
//! ```

use crate::query::{Query, QuerySession, Restriction};
use crate::reldata::RelDataGroup;
use crate::result_set::ResultSet;
use crate::view::View;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use triggerware_core::{ObservabilityConfig, Result};
use triggerware_rpc::{ClientBuilder, ConnectionEvent, ConnectionState, RpcClient};

/// Rows per page when neither the query nor the builder sets a limit
pub const DEFAULT_ROW_LIMIT: u64 = 100;

struct ClientInner {
    rpc: RpcClient,
    defaults: Restriction,
    subscriptions: AtomicU64,
    batches: AtomicU64,
    polls: AtomicU64,
}

/// Client for a Triggerware server
///
/// Cheap to clone; clones share the connection and the name counters.
#[derive(Clone)]
pub struct TriggerwareClient {
    inner: Arc<ClientInner>,
}

impl Default for TriggerwareClient {
    fn default() -> Self {
        Self::new()
    }
}

impl TriggerwareClient {
    /// A disconnected client with default settings
    pub fn new() -> Self {
        Self::from_parts(
            RpcClient::new(),
            Restriction::new().with_row_limit(DEFAULT_ROW_LIMIT),
        )
    }

    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    fn from_parts(rpc: RpcClient, defaults: Restriction) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                rpc,
                defaults,
                subscriptions: AtomicU64::new(0),
                batches: AtomicU64::new(0),
                polls: AtomicU64::new(0),
            }),
        }
    }

    pub async fn connect(&self, host: &str, port: u16) -> Result<()> {
        self.inner.rpc.connect(host, port).await
    }

    pub async fn attach<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        self.inner.rpc.attach(stream).await
    }

    /// The underlying transport
    pub fn rpc(&self) -> &RpcClient {
        &self.inner.rpc
    }

    /// Call any server method directly
    pub async fn call<P, R>(&self, method: &str, params: P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        self.inner.rpc.call(method, params).await
    }

    pub async fn notify<P: Serialize>(&self, method: &str, params: P) -> Result<()> {
        self.inner.rpc.notify(method, params).await
    }

    /// Row limit and timeout applied where a query sets none
    pub fn default_restriction(&self) -> Restriction {
        self.inner.defaults
    }

    pub(crate) fn resolve(&self, restriction: Option<Restriction>) -> Restriction {
        restriction.unwrap_or_default().or(self.inner.defaults)
    }

    pub(crate) fn next_subscription_label(&self) -> String {
        format!("sub{}", self.inner.subscriptions.fetch_add(1, Ordering::SeqCst))
    }

    pub(crate) fn next_batch_name(&self) -> String {
        format!("batch{}", self.inner.batches.fetch_add(1, Ordering::SeqCst))
    }

    pub(crate) fn next_poll_name(&self) -> String {
        format!("poll{}", self.inner.polls.fetch_add(1, Ordering::SeqCst))
    }

    /// Whether both handles refer to the same client
    pub fn same_client(&self, other: &TriggerwareClient) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Run a query once and return a cursor over its result
    #[tracing::instrument(skip(self, query), fields(language = %query.language.as_str()))]
    pub async fn execute_query<T>(
        &self,
        query: Query,
        restriction: Option<Restriction>,
    ) -> Result<ResultSet<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        View::with_restriction(self, query, restriction.unwrap_or_default())
            .execute()
            .await
    }

    /// Ask the server whether a query is well formed
    pub async fn validate_query(&self, query: &Query) -> Result<Value> {
        let session = QuerySession::new(query.clone(), Restriction::new());
        self.inner
            .rpc
            .call("validate", Value::Object(session.base_params().clone()))
            .await
    }

    pub async fn noop(&self) -> Result<()> {
        let _: Value = self.inner.rpc.call("noop", ()).await?;
        Ok(())
    }

    /// Server runtime statistics
    pub async fn runtime(&self) -> Result<Value> {
        self.inner.rpc.call("runtime", ()).await
    }

    /// The relations the server exposes, grouped
    pub async fn rel_data(&self) -> Result<Vec<RelDataGroup>> {
        self.inner.rpc.call("reldata2017", ()).await
    }

    pub async fn close(&self) {
        self.inner.rpc.close().await;
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.rpc.state().await
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.rpc.subscribe_events()
    }
}

impl std::fmt::Debug for TriggerwareClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerwareClient")
            .field("defaults", &self.inner.defaults)
            .finish_non_exhaustive()
    }
}

/// Configures a [`TriggerwareClient`] before it connects
#[derive(Debug)]
pub struct SessionBuilder {
    transport: ClientBuilder,
    defaults: Restriction,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self {
            transport: ClientBuilder::new(),
            defaults: Restriction::new().with_row_limit(DEFAULT_ROW_LIMIT),
        }
    }

    pub fn default_row_limit(mut self, rows: u64) -> Self {
        self.defaults.row_limit = Some(rows);
        self
    }

    /// Server time limit in seconds for every page request
    pub fn default_timeout(mut self, seconds: f64) -> Self {
        self.defaults.timeout = Some(seconds);
        self
    }

    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.transport = self.transport.with_observability(config);
        self
    }

    pub fn with_default_observability(mut self) -> Self {
        self.transport = self.transport.with_default_observability();
        self
    }

    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.transport = self.transport.service_name(name);
        self
    }

    pub fn build(self) -> Result<TriggerwareClient> {
        let rpc = self.transport.build()?;
        Ok(TriggerwareClient::from_parts(rpc, self.defaults))
    }

    pub async fn connect(self, host: &str, port: u16) -> Result<TriggerwareClient> {
        let client = self.build()?;
        client.connect(host, port).await?;
        Ok(client)
    }

    pub async fn attach<S>(self, stream: S) -> Result<TriggerwareClient>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let client = self.build()?;
        client.attach(stream).await?;
        Ok(client)
    }
}
