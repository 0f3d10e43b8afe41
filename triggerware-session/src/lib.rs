//! # Triggerware Session
//!
//! Query-level client for a Triggerware server, built on
//! [`triggerware_rpc`].
//!
//! - [`View`] and [`TriggerwareClient::execute_query`] run a query and
//!   return a paged [`ResultSet`] cursor
//! - [`PreparedStatement`] binds inputs to a server-side prepared query
//! - [`PolledQuery`] re-runs a query on a [`Schedule`] and reports deltas
//! - [`Subscription`] and [`BatchSubscription`] push new matches as they
//!   happen
//!
//! ## Example
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use serde_json::Value;
//! use triggerware_session::{
//!     BatchSubscription, PreparedStatement, Query, Subscription, SubscriptionHandler,
//!     TriggerwareClient,
//! };
//!
//! struct Printer;
//!
//! #[async_trait]
//! impl SubscriptionHandler<Value> for Printer {
//!     async fn handle_notification(&self, tuple: Value) {
//!         println!("received: {}", tuple);
//!     }
//! }
//!
//! # async fn example() -> triggerware_core::Result<()> {
//! let client = TriggerwareClient::new();
//! client.connect("localhost", 5221).await?;
//!
//! let mut statement: PreparedStatement = PreparedStatement::new(
//!     &client,
//!     Query::sql("select * from inflation where year1=:y1 and year2=1995;"),
//! )
//! .await?;
//! statement.set_parameter("?y1", 1980)?;
//! let rows = statement.execute(None).await?.pull(10).await?;
//! println!("{:?}", rows);
//!
//! let tweets = Subscription::<Value>::inactive(&client, Query::fol("NEGATIVE-TWEET"), Printer);
//! let batch = BatchSubscription::new(&client).await?;
//! batch.add(&tweets).await?;
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod client;
pub mod polled;
pub mod prepared;
pub mod query;
pub mod reldata;
pub mod result_set;
pub mod schedule;
pub mod subscription;
pub mod view;

pub use batch::BatchSubscription;
pub use client::{SessionBuilder, TriggerwareClient, DEFAULT_ROW_LIMIT};
pub use polled::{PolledDelta, PolledQuery, PolledQueryHandler, PolledQueryOptions};
pub use prepared::{ParameterPosition, ParameterType, PreparedStatement};
pub use query::{Language, Query, QuerySession, Restriction, DEFAULT_NAMESPACE};
pub use reldata::{RelDataElement, RelDataGroup};
pub use result_set::{ResultPage, ResultSet, SignatureColumn};
pub use schedule::{CalendarSchedule, Schedule};
pub use subscription::{Subscription, SubscriptionHandler, SubscriptionState};
pub use view::View;
