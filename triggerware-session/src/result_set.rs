//! Paged, forward-only result cursors
//!
//! Executing a query returns its first page together with a server handle.
//! A [`ResultSet`] serves tuples from that page and asks the server for the
//! next one with `next-resultset-batch` once the buffer runs dry. When the
//! server reports the result exhausted, or never assigned a handle, the
//! cursor ends after the buffered tuples without touching the network.

use crate::client::TriggerwareClient;
use crate::query::Restriction;
use futures::stream::{self, Stream};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use triggerware_core::Result;

/// One column of a result or input signature
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SignatureColumn {
    pub attribute: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

/// A page of tuples as sent by the server
#[derive(Debug, Clone, Deserialize)]
pub struct ResultPage<T = Value> {
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub exhausted: bool,
    #[serde(default = "Vec::new")]
    pub tuples: Vec<T>,
}

/// Response of `execute-query` and `create-resultset`
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ExecutionReply<T = Value> {
    #[serde(default)]
    pub handle: Option<u64>,
    #[serde(default)]
    pub signature: Option<Vec<SignatureColumn>>,
    pub batch: ResultPage<T>,
}

/// Cursor over the tuples of an executed query
pub struct ResultSet<T = Value> {
    client: TriggerwareClient,
    handle: Option<u64>,
    buffer: VecDeque<T>,
    exhausted: bool,
    signature: Option<Vec<SignatureColumn>>,
    restriction: Restriction,
}

impl<T> ResultSet<T>
where
    T: DeserializeOwned + Send + 'static,
{
    pub(crate) fn from_reply(
        client: TriggerwareClient,
        reply: ExecutionReply<T>,
        restriction: Restriction,
    ) -> Self {
        Self {
            client,
            handle: reply.handle,
            buffer: reply.batch.tuples.into(),
            exhausted: reply.batch.exhausted,
            signature: reply.signature,
            restriction,
        }
    }

    /// Next tuple, fetching a new page when the buffer is empty
    ///
    /// `Ok(None)` marks the end of the result. A fetched page with no tuples
    /// also ends it.
    pub async fn next(&mut self) -> Result<Option<T>> {
        if let Some(tuple) = self.buffer.pop_front() {
            return Ok(Some(tuple));
        }

        let handle = match self.handle {
            Some(handle) if !self.exhausted => handle,
            _ => return Ok(None),
        };

        let mut params = Map::new();
        params.insert("handle".into(), json!(handle));
        self.restriction.write_into(&mut params);

        tracing::debug!(handle, "Fetching next result page");
        let page: ResultPage<T> = self
            .client
            .rpc()
            .call("next-resultset-batch", Value::Object(params))
            .await?;

        self.exhausted = page.exhausted || page.tuples.is_empty();
        self.buffer = page.tuples.into();
        Ok(self.buffer.pop_front())
    }

    /// Up to `n` tuples; fewer only when the result ends first
    pub async fn pull(&mut self, n: usize) -> Result<Vec<T>> {
        let mut tuples = Vec::new();
        while tuples.len() < n {
            match self.next().await? {
                Some(tuple) => tuples.push(tuple),
                None => break,
            }
        }
        Ok(tuples)
    }

    /// Release the server-side cursor
    pub async fn close(&mut self) -> Result<()> {
        if let Some(handle) = self.handle {
            let _: Value = self
                .client
                .rpc()
                .call("close-resultset", json!({ "handle": handle }))
                .await?;
            tracing::debug!(handle, "Result set closed");
        }
        Ok(())
    }

    /// The cursor as a stream of tuples
    pub fn into_stream(self) -> impl Stream<Item = Result<T>> + Send {
        stream::try_unfold(self, |mut cursor| async move {
            Ok(cursor.next().await?.map(|tuple| (tuple, cursor)))
        })
    }
}

impl<T> ResultSet<T> {
    /// Tuples buffered and not yet returned by `next`
    pub fn cache_snapshot(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.buffer.iter().cloned().collect()
    }

    pub fn signature(&self) -> Option<&[SignatureColumn]> {
        self.signature.as_deref()
    }

    pub fn handle(&self) -> Option<u64> {
        self.handle
    }

    /// True once the server has no further pages
    pub fn is_exhausted(&self) -> bool {
        self.exhausted || self.handle.is_none()
    }
}

impl<T> std::fmt::Debug for ResultSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSet")
            .field("handle", &self.handle)
            .field("buffered", &self.buffer.len())
            .field("exhausted", &self.exhausted)
            .finish()
    }
}
