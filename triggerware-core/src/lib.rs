//! Wire layer of the Triggerware client
//!
//! - **types**: JSON-RPC 2.0 request, notification and response documents
//! - **codec**: encoding, shape classification and the incremental decoder for
//!   unframed concatenated JSON
//! - **error**: the crate-wide error taxonomy and the wire error object
//! - **observability**: OpenTelemetry and `tracing` bootstrap
//!
//! Nothing here performs I/O. `triggerware-rpc` drives a byte stream with
//! these pieces and `triggerware-session` builds the query protocol on top.
//!
//! ```rust
//! use triggerware_core::{codec, Id, JsonRpcRequest};
//! use serde_json::json;
//!
//! let request = JsonRpcRequest::new("validate", Some(json!({"query": "select 1", "language": "sql"})), Id::Number(0));
//! let json = codec::encode_request(&request).unwrap();
//! assert!(codec::decode(&json).unwrap().is_request());
//! ```

pub mod codec;
pub mod error;
pub mod observability;
pub mod types;

pub use codec::JsonStreamDecoder;
pub use error::{Error, JsonRpcErrorData, Result};
pub use observability::{init_observability, shutdown_observability, ObservabilityConfig};
pub use types::{
    Id, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION,
};
