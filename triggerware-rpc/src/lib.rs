//! Bidirectional JSON-RPC 2.0 transport for the Triggerware client
//!
//! One [`RpcClient`] owns one byte stream (TCP, or anything implementing
//! `AsyncRead + AsyncWrite`). Documents are written back to back with no
//! framing and decoded from the inbound side as they complete.
//!
//! - **Outbound**: [`RpcClient::call`] correlates responses by id,
//!   [`RpcClient::notify`] is fire-and-forget
//! - **Inbound**: the server invokes methods registered with
//!   [`RpcClient::add_method`]; calls get a reply, notifications never do
//! - **Lifecycle**: [`ConnectionState`] and a broadcast of [`ConnectionEvent`]s
//! - **Telemetry**: [`ClientBuilder`] wires in OpenTelemetry and [`ClientMetrics`]
//!
//! ```rust,no_run
//! use triggerware_rpc::RpcClient;
//! use serde_json::{json, Value};
//!
//! # async fn example() -> triggerware_core::Result<()> {
//! let client = RpcClient::new();
//! client.connect("localhost", 5221).await?;
//!
//! let ok: Value = client
//!     .call("validate", json!({"query": "select * from t", "language": "sql", "namespace": "AP5"}))
//!     .await?;
//! client.notify("add-negative-tweet", json!(["so bad"])).await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod client_builder;
mod connection_state;
mod method;
mod metrics;
mod request;

pub use client::RpcClient;
pub use client_builder::ClientBuilder;
pub use connection_state::{ConnectionEvent, ConnectionState};
pub use method::{from_fn, from_typed_fn, MethodFuture, MethodHandler, MethodTable};
pub use metrics::ClientMetrics;
pub use request::RequestManager;
