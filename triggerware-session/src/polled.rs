//! Polled queries
//!
//! A polled query is re-executed by the server on a schedule (or on demand
//! through [`PolledQuery::poll`]). After each run the server calls the local
//! method `poll<N>` with the rows added and deleted since the previous run,
//! or with an `error` member when the run failed. There is no client-side
//! retry.

use crate::client::TriggerwareClient;
use crate::query::{Query, QuerySession, Restriction};
use crate::schedule::Schedule;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::marker::PhantomData;
use std::sync::Arc;
use triggerware_core::{Error, Result};
use triggerware_rpc::from_fn;

/// Rows that entered and left the result since the previous poll
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PolledDelta<T = Value> {
    #[serde(default = "Vec::new")]
    pub added: Vec<T>,
    #[serde(default = "Vec::new")]
    pub deleted: Vec<T>,
}

/// Receives the outcome of each poll
#[async_trait]
pub trait PolledQueryHandler<T>: Send + Sync + 'static {
    async fn handle_notification(&self, delta: PolledDelta<T>);

    /// The `error` member of a failed poll
    async fn handle_error(&self, error: Value) {
        tracing::warn!(%error, "Polled query reported an error");
    }
}

/// Flags sent with `create-polled-query`; unset flags are left to the server
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolledQueryOptions {
    pub schedule: Option<Schedule>,
    /// Report the rows of the first run as added
    pub report_initial: Option<bool>,
    /// Notify even when a run changed nothing
    pub report_unchanged: Option<bool>,
    /// Wait for the schedule before the first run
    pub delay: Option<bool>,
}

impl PolledQueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(mut self, schedule: impl Into<Schedule>) -> Self {
        self.schedule = Some(schedule.into());
        self
    }

    pub fn report_initial(mut self, report: bool) -> Self {
        self.report_initial = Some(report);
        self
    }

    pub fn report_unchanged(mut self, report: bool) -> Self {
        self.report_unchanged = Some(report);
        self
    }

    pub fn delay(mut self, delay: bool) -> Self {
        self.delay = Some(delay);
        self
    }

    fn request_members(&self, method: &str) -> Result<Vec<(&'static str, Value)>> {
        let mut members = vec![("method", json!(method))];
        if let Some(schedule) = &self.schedule {
            members.push(("schedule", serde_json::to_value(schedule)?));
        }
        if let Some(report) = self.report_initial {
            members.push(("report-initial", json!(report)));
        }
        if let Some(report) = self.report_unchanged {
            members.push(("report-unchanged", json!(report)));
        }
        if let Some(delay) = self.delay {
            members.push(("delay", json!(delay)));
        }
        Ok(members)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HandleReply {
    Bare(u64),
    Wrapped { handle: u64 },
}

impl HandleReply {
    fn handle(&self) -> u64 {
        match self {
            HandleReply::Bare(handle) | HandleReply::Wrapped { handle } => *handle,
        }
    }
}

/// A query the server re-runs, reporting deltas to a handler
pub struct PolledQuery<T = Value> {
    client: TriggerwareClient,
    session: QuerySession,
    method: String,
    handle: u64,
    _tuple: PhantomData<fn() -> T>,
}

impl<T> PolledQuery<T>
where
    T: DeserializeOwned + Send + 'static,
{
    /// Register the callback method and create the polled query
    ///
    /// The schedule is validated before anything is sent.
    #[tracing::instrument(skip(client, query, handler, options))]
    pub async fn new<H>(
        client: &TriggerwareClient,
        query: Query,
        handler: H,
        options: PolledQueryOptions,
    ) -> Result<Self>
    where
        H: PolledQueryHandler<T>,
    {
        if let Some(schedule) = &options.schedule {
            schedule.validate()?;
        }

        let method = client.next_poll_name();
        let mut session = QuerySession::new(query, Restriction::new());
        let params = session.params_with(options.request_members(&method)?);

        let handler: Arc<dyn PolledQueryHandler<T>> = Arc::new(handler);
        client
            .rpc()
            .add_method(
                method.clone(),
                from_fn(move |params| {
                    let handler = Arc::clone(&handler);
                    async move { deliver(handler.as_ref(), params).await }
                }),
            )
            .await?;

        let reply: HandleReply = match client.rpc().call("create-polled-query", params).await {
            Ok(reply) => reply,
            Err(e) => {
                client.rpc().remove_method(&method).await;
                return Err(e);
            }
        };

        let handle = reply.handle();
        session.set_handle(handle);
        tracing::info!(%method, handle, "Polled query created");

        Ok(Self {
            client: client.clone(),
            session,
            method,
            handle,
            _tuple: PhantomData,
        })
    }
}

impl<T> PolledQuery<T> {
    /// Ask the server to run the query now
    pub async fn poll(&self) -> Result<()> {
        let _: Value = self
            .client
            .rpc()
            .call("poll-now", json!({ "handle": self.handle }))
            .await?;
        Ok(())
    }

    /// Stop receiving reports; true if the callback was still registered
    pub async fn close(&self) -> bool {
        self.client.rpc().remove_method(&self.method).await
    }

    pub fn handle(&self) -> u64 {
        self.handle
    }

    /// Name of the local callback method (`poll<N>`)
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn query(&self) -> &Query {
        self.session.query()
    }
}

async fn deliver<T>(handler: &dyn PolledQueryHandler<T>, params: Option<Value>) -> Result<Value>
where
    T: DeserializeOwned + Send + 'static,
{
    let params = params.unwrap_or(Value::Null);
    if let Some(error) = params.get("error") {
        handler.handle_error(error.clone()).await;
        return Ok(Value::Null);
    }

    let delta: PolledDelta<T> =
        serde_json::from_value(params).map_err(|e| Error::invalid_params(e.to_string()))?;
    handler.handle_notification(delta).await;
    Ok(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        deltas: Mutex<Vec<PolledDelta<(i64,)>>>,
        errors: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl PolledQueryHandler<(i64,)> for Recorder {
        async fn handle_notification(&self, delta: PolledDelta<(i64,)>) {
            self.deltas.lock().await.push(delta);
        }

        async fn handle_error(&self, error: Value) {
            self.errors.lock().await.push(error);
        }
    }

    #[tokio::test]
    async fn test_delta_and_error_payloads_are_routed() {
        let recorder = Recorder::default();

        deliver::<(i64,)>(&recorder, Some(json!({"added": [[1], [2]], "deleted": [[0]]})))
            .await
            .unwrap();
        deliver::<(i64,)>(&recorder, Some(json!({"error": "source unavailable"})))
            .await
            .unwrap();
        deliver::<(i64,)>(&recorder, Some(json!({"added": [[3]]}))).await.unwrap();

        let deltas = recorder.deltas.lock().await;
        assert_eq!(deltas[0].added, vec![(1,), (2,)]);
        assert_eq!(deltas[0].deleted, vec![(0,)]);
        assert!(deltas[1].deleted.is_empty());
        assert_eq!(*recorder.errors.lock().await, vec![json!("source unavailable")]);
    }

    #[tokio::test]
    async fn test_malformed_delta_is_invalid_params() {
        let recorder = Recorder::default();
        let result = deliver::<(i64,)>(&recorder, Some(json!({"added": "nope"}))).await;
        assert!(matches!(result, Err(Error::InvalidParams { .. })));
    }

    #[test]
    fn test_request_members() {
        let options = PolledQueryOptions::new()
            .schedule(Schedule::every_seconds(60))
            .report_initial(true)
            .delay(false);

        let members = options.request_members("poll3").unwrap();
        assert_eq!(
            members,
            vec![
                ("method", json!("poll3")),
                ("schedule", json!(60)),
                ("report-initial", json!(true)),
                ("delay", json!(false)),
            ]
        );
    }

    #[test]
    fn test_handle_reply_forms() {
        let bare: HandleReply = serde_json::from_value(json!(12)).unwrap();
        let wrapped: HandleReply = serde_json::from_value(json!({"handle": 13})).unwrap();
        assert_eq!(bare.handle(), 12);
        assert_eq!(wrapped.handle(), 13);
    }
}
