//! Polled query tests

mod common;

use async_trait::async_trait;
use common::{assert_quiet, recv, MockServer, Reply};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use triggerware_core::Error;
use triggerware_session::{
    CalendarSchedule, PolledDelta, PolledQuery, PolledQueryHandler, PolledQueryOptions, Query,
    Schedule,
};

struct Channels {
    deltas: mpsc::UnboundedSender<PolledDelta>,
    errors: mpsc::UnboundedSender<Value>,
}

#[async_trait]
impl PolledQueryHandler<Value> for Channels {
    async fn handle_notification(&self, delta: PolledDelta) {
        let _ = self.deltas.send(delta);
    }

    async fn handle_error(&self, error: Value) {
        let _ = self.errors.send(error);
    }
}

fn channels() -> (
    Channels,
    mpsc::UnboundedReceiver<PolledDelta>,
    mpsc::UnboundedReceiver<Value>,
) {
    let (deltas, delta_rx) = mpsc::unbounded_channel();
    let (errors, error_rx) = mpsc::unbounded_channel();
    (Channels { deltas, errors }, delta_rx, error_rx)
}

fn polling_server(method: &str, _params: &Value) -> Reply {
    match method {
        "create-polled-query" => Reply::Result(json!(17)),
        "poll-now" => Reply::Result(json!(true)),
        _ => Reply::Error(-32601, "Method not found"),
    }
}

#[tokio::test]
async fn test_invalid_schedule_sends_nothing() {
    let (client, server) = MockServer::start(polling_server).await;
    let (handler, _deltas, _errors) = channels();

    let options = PolledQueryOptions::new().schedule(CalendarSchedule::new().minutes("60"));
    let result = PolledQuery::<Value>::new(&client, Query::fol("((x) s.t. (p x))"), handler, options).await;

    assert!(matches!(result, Err(Error::InvalidSchedule(_))));
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(server.requests().is_empty());
    assert!(!client.rpc().has_method("poll0").await);
}

#[tokio::test]
async fn test_create_request_shape() {
    let (client, server) = MockServer::start(polling_server).await;
    let (handler, _deltas, _errors) = channels();

    let options = PolledQueryOptions::new()
        .schedule(
            CalendarSchedule::new()
                .minutes("0,30")
                .timezone("America/New_York"),
        )
        .report_initial(true)
        .report_unchanged(false)
        .delay(true);
    let polled = PolledQuery::<Value>::new(&client, Query::fol("((x) s.t. (p x))"), handler, options)
        .await
        .unwrap();

    assert_eq!(polled.handle(), 17);
    assert_eq!(polled.method(), "poll0");
    assert!(client.rpc().has_method("poll0").await);
    assert_eq!(
        server.params_for("create-polled-query")[0],
        json!({
            "query": "((x) s.t. (p x))",
            "language": "fol",
            "namespace": "AP5",
            "method": "poll0",
            "schedule": {"minutes": "0,30", "timezone": "America/New_York"},
            "report-initial": true,
            "report-unchanged": false,
            "delay": true
        })
    );
}

#[tokio::test]
async fn test_interval_schedule_and_unset_flags() {
    let (client, server) = MockServer::start(polling_server).await;
    let (handler, _deltas, _errors) = channels();

    let options = PolledQueryOptions::new().schedule(Schedule::every_seconds(60));
    PolledQuery::<Value>::new(&client, Query::sql("select * from t"), handler, options)
        .await
        .unwrap();

    let params = &server.params_for("create-polled-query")[0];
    assert_eq!(params["schedule"], 60);
    assert!(params.get("report-initial").is_none());
    assert!(params.get("delay").is_none());
}

#[tokio::test]
async fn test_deltas_and_errors_reach_the_handler() {
    let (client, server) = MockServer::start(polling_server).await;
    let (handler, mut deltas, mut errors) = channels();

    PolledQuery::<Value>::new(&client, Query::fol("((x) s.t. (p x))"), handler, PolledQueryOptions::new())
        .await
        .unwrap();

    server.notify("poll0", json!({"added": [[1], [2]], "deleted": [[0]]}));
    let delta = recv(&mut deltas).await;
    assert_eq!(delta.added, vec![json!([1]), json!([2])]);
    assert_eq!(delta.deleted, vec![json!([0])]);

    server.notify("poll0", json!({"error": {"message": "source timed out"}}));
    assert_eq!(recv(&mut errors).await["message"], "source timed out");
    assert_quiet(&mut deltas, 50).await;
}

#[tokio::test]
async fn test_poll_now() {
    let (client, server) = MockServer::start(polling_server).await;
    let (handler, _deltas, _errors) = channels();

    let polled = PolledQuery::<Value>::new(&client, Query::fol("((x) s.t. (p x))"), handler, PolledQueryOptions::new())
        .await
        .unwrap();
    polled.poll().await.unwrap();

    assert_eq!(server.params_for("poll-now"), vec![json!({"handle": 17})]);
}

#[tokio::test]
async fn test_close_stops_delivery() {
    let (client, server) = MockServer::start(polling_server).await;
    let (handler, mut deltas, _errors) = channels();

    let polled = PolledQuery::<Value>::new(&client, Query::fol("((x) s.t. (p x))"), handler, PolledQueryOptions::new())
        .await
        .unwrap();

    assert!(polled.close().await);
    assert!(!polled.close().await);

    server.notify("poll0", json!({"added": [[1]], "deleted": []}));
    assert_quiet(&mut deltas, 100).await;
}

#[tokio::test]
async fn test_failed_creation_unregisters_the_method() {
    let (client, server) = MockServer::start(|method, _| match method {
        "create-polled-query" => Reply::Error(-32602, "unknown relation"),
        _ => Reply::Error(-32601, "Method not found"),
    })
    .await;

    let (handler, _deltas, _errors) = channels();
    let result = PolledQuery::<Value>::new(&client, Query::fol("((x) s.t. (q x))"), handler, PolledQueryOptions::new()).await;
    assert!(matches!(result, Err(Error::InvalidParams { .. })));
    assert!(!client.rpc().has_method("poll0").await);

    // Names are never reused.
    let (handler, _deltas, _errors) = channels();
    let _ = PolledQuery::<Value>::new(&client, Query::fol("((x) s.t. (q x))"), handler, PolledQueryOptions::new()).await;
    assert!(!client.rpc().has_method("poll1").await);

    let methods: Vec<Value> = server
        .params_for("create-polled-query")
        .iter()
        .map(|p| p["method"].clone())
        .collect();
    assert_eq!(methods, vec![json!("poll0"), json!("poll1")]);
}
