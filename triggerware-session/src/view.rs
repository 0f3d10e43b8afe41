//! Reusable queries
//!
//! A [`View`] holds a query and its restriction. Every `execute` runs the
//! query again through `execute-query` and returns a fresh [`ResultSet`].

use crate::client::TriggerwareClient;
use crate::query::{Query, QuerySession, Restriction};
use crate::result_set::{ExecutionReply, ResultSet};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use triggerware_core::Result;

/// A query that can be executed any number of times
///
/// Each [`execute`](View::execute) runs `execute-query` and returns a fresh
/// cursor over tuples of type `T`.
pub struct View<T = Value> {
    client: TriggerwareClient,
    session: QuerySession,
    _tuple: PhantomData<fn() -> T>,
}

impl<T> View<T>
where
    T: DeserializeOwned + Send + 'static,
{
    pub fn new(client: &TriggerwareClient, query: Query) -> Self {
        Self::with_restriction(client, query, Restriction::new())
    }

    /// Unset fields of `restriction` fall back to the client's defaults
    pub fn with_restriction(client: &TriggerwareClient, query: Query, restriction: Restriction) -> Self {
        let restriction = client.resolve(Some(restriction));
        Self {
            client: client.clone(),
            session: QuerySession::new(query, restriction),
            _tuple: PhantomData,
        }
    }

    pub fn query(&self) -> &Query {
        self.session.query()
    }

    pub async fn execute(&self) -> Result<ResultSet<T>> {
        let params = self
            .session
            .params_with([("check-update", Value::Bool(false))]);

        let reply: ExecutionReply<T> = self.client.rpc().call("execute-query", params).await?;
        tracing::debug!(handle = ?reply.handle, rows = reply.batch.tuples.len(), "Query executed");

        Ok(ResultSet::from_reply(
            self.client.clone(),
            reply,
            self.session.restriction(),
        ))
    }
}
