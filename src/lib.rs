//! Triggerware client
//!
//! This is the convenience crate that re-exports the Triggerware sub-crates.
//! Use it when a single dependency should cover both the transport and the
//! query session.
//!
//! # Architecture
//!
//! - **triggerware-core**: Wire types, stream decoder, error handling, observability
//! - **triggerware-rpc**: Bidirectional JSON-RPC client over a byte stream
//! - **triggerware-session**: Cursors, views, prepared and polled queries, subscriptions
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use triggerware::{Query, TriggerwareClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = TriggerwareClient::builder()
//!         .default_row_limit(50)
//!         .connect("localhost", 5221)
//!         .await?;
//!
//!     let mut rows = client
//!         .execute_query::<serde_json::Value>(Query::fol("((x) s.t. (inflation 1990 1995 x))"), None)
//!         .await?;
//!     while let Some(row) = rows.next().await? {
//!         println!("{}", row);
//!     }
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```

pub use triggerware_core as core;
pub use triggerware_rpc as rpc;
pub use triggerware_session as session;

pub use triggerware_core::{Error, Result};
pub use triggerware_rpc::RpcClient;
pub use triggerware_session::{Query, TriggerwareClient};
