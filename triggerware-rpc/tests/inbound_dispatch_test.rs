//! Inbound invocation tests
//!
//! The peer invokes methods registered on the client: calls are answered,
//! notifications never are, and handler failures (including panics) turn
//! into error replies without stopping the dispatcher.

mod common;

use common::{connected_pair, notification, request, response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use triggerware_core::Error;
use triggerware_rpc::{from_fn, from_typed_fn, ConnectionEvent};

#[tokio::test]
async fn test_request_to_registered_method_is_answered() {
    #[derive(Deserialize)]
    struct Delta {
        added: Vec<Value>,
        deleted: Vec<Value>,
    }

    let (client, mut peer) = connected_pair().await;
    client
        .add_method(
            "poll0",
            from_typed_fn(|delta: Delta| async move { Ok(delta.added.len() + delta.deleted.len()) }),
        )
        .await
        .unwrap();

    peer.send(request(json!(5), "poll0", json!({"added": [[1], [2]], "deleted": [[3]]})))
        .await;

    let reply = peer.recv().await;
    assert_eq!(reply["jsonrpc"], "2.0");
    assert_eq!(reply["id"], 5);
    assert_eq!(reply["result"], 3);
    assert!(reply.get("error").is_none());
}

#[tokio::test]
async fn test_unregistered_method_gets_method_not_found() {
    let (_client, mut peer) = connected_pair().await;

    peer.send(request(json!("abc"), "sub9", json!({}))).await;

    let reply = peer.recv().await;
    assert_eq!(reply["id"], "abc");
    assert_eq!(reply["error"]["code"], -32601);
    assert_eq!(reply["error"]["message"], "Method not found: sub9");
}

#[tokio::test]
async fn test_notifications_are_never_answered() {
    let (client, mut peer) = connected_pair().await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    client
        .add_method(
            "sub0",
            from_fn(move |params| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(params);
                    Ok(json!("ignored"))
                }
            }),
        )
        .await
        .unwrap();
    client
        .add_method("failing", from_fn(|_| async { Err(Error::internal("boom")) }))
        .await
        .unwrap();

    peer.send(notification("sub0", json!([1, "a"]))).await;
    peer.send(notification("failing", json!({}))).await;
    peer.send(notification("unregistered", json!({}))).await;

    let delivered = tokio::time::timeout(common::RECV_TIMEOUT, rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivered, Some(json!([1, "a"])));

    peer.assert_silent(200).await;
}

#[tokio::test]
async fn test_handler_errors_become_error_replies() {
    let (client, mut peer) = connected_pair().await;

    client
        .add_method("typed", from_typed_fn(|n: u32| async move { Ok(n * 2) }))
        .await
        .unwrap();
    client
        .add_method(
            "usage",
            from_fn(|_| async { Err(Error::InvalidState("subscription is not active".into())) }),
        )
        .await
        .unwrap();

    peer.send(request(json!(1), "typed", json!("four"))).await;
    let reply = peer.recv().await;
    assert_eq!(reply["id"], 1);
    assert_eq!(reply["error"]["code"], -32602);

    peer.send(request(json!(2), "usage", json!(null))).await;
    let reply = peer.recv().await;
    assert_eq!(reply["id"], 2);
    assert_eq!(reply["error"]["code"], -32603);
    assert!(reply["error"]["message"]
        .as_str()
        .unwrap()
        .contains("not active"));
}

#[tokio::test]
async fn test_handler_panic_becomes_internal_error() {
    let (client, mut peer) = connected_pair().await;

    client
        .add_method(
            "explode",
            from_fn(|_| async {
                if true {
                    panic!("handler exploded");
                }
                Ok(Value::Null)
            }),
        )
        .await
        .unwrap();
    client
        .add_method("ping", from_fn(|_| async { Ok(json!("pong")) }))
        .await
        .unwrap();

    peer.send(request(json!(1), "explode", json!({}))).await;
    let reply = peer.recv().await;
    assert_eq!(reply["id"], 1);
    assert_eq!(reply["error"]["code"], -32603);
    assert!(reply["error"]["message"]
        .as_str()
        .unwrap()
        .contains("handler exploded"));

    peer.send(request(json!(2), "ping", json!({}))).await;
    let reply = peer.recv().await;
    assert_eq!(reply["result"], "pong");
}

#[tokio::test]
async fn test_handler_can_call_back_into_client() {
    let (client, mut peer) = connected_pair().await;

    let inner = client.clone();
    client
        .add_method(
            "lookup",
            from_fn(move |_| {
                let inner = inner.clone();
                async move {
                    let runtime: Value = inner.call("runtime", ()).await?;
                    Ok(json!({"seen": runtime}))
                }
            }),
        )
        .await
        .unwrap();

    peer.send(request(json!("outer"), "lookup", json!({}))).await;

    let nested = peer.recv().await;
    assert_eq!(nested["method"], "runtime");
    assert_eq!(nested["id"], 0);
    peer.send(response(json!(0), json!(99))).await;

    let reply = peer.recv().await;
    assert_eq!(reply["id"], "outer");
    assert_eq!(reply["result"]["seen"], 99);
}

#[tokio::test]
async fn test_invocations_dispatch_in_arrival_order() {
    let (client, mut peer) = connected_pair().await;
    let seen = Arc::new(Mutex::new(Vec::new()));

    let log = Arc::clone(&seen);
    client
        .add_method(
            "batch0",
            from_fn(move |params| {
                let log = Arc::clone(&log);
                async move {
                    tokio::task::yield_now().await;
                    log.lock().await.push(params.unwrap_or_default());
                    Ok(Value::Null)
                }
            }),
        )
        .await
        .unwrap();
    client
        .add_method("sync", from_fn(|_| async { Ok(json!("done")) }))
        .await
        .unwrap();

    for i in 0..5 {
        peer.send(notification("batch0", json!(i))).await;
    }
    peer.send(request(json!(1), "sync", json!({}))).await;
    assert_eq!(peer.recv().await["result"], "done");

    assert_eq!(*seen.lock().await, vec![json!(0), json!(1), json!(2), json!(3), json!(4)]);
}

#[tokio::test]
async fn test_method_table_through_client() {
    let (client, _peer) = connected_pair().await;

    client
        .add_method("sub0", from_fn(|_| async { Ok(Value::Null) }))
        .await
        .unwrap();
    let duplicate = client
        .add_method("sub0", from_fn(|_| async { Ok(Value::Null) }))
        .await;
    assert!(matches!(duplicate, Err(Error::Internal { .. })));

    assert!(client.has_method("sub0").await);
    assert!(client.remove_method("sub0").await);
    assert!(!client.remove_method("sub0").await);
    assert!(!client.remove_method("never-registered").await);
}

#[tokio::test]
async fn test_undecodable_input_is_reported_as_events() {
    let (client, mut peer) = connected_pair().await;
    let mut events = client.subscribe_events();

    peer.send_raw(b"[1, 2]").await;
    match tokio::time::timeout(common::RECV_TIMEOUT, events.recv()).await.unwrap() {
        Ok(ConnectionEvent::Error(Error::InvalidRequest { .. })) => {}
        other => panic!("Expected invalid-request event, got {:?}", other),
    }

    peer.send_raw(b"{\"id\": ]").await;
    match tokio::time::timeout(common::RECV_TIMEOUT, events.recv()).await.unwrap() {
        Ok(ConnectionEvent::Error(Error::Parse { .. })) => {}
        other => panic!("Expected parse event, got {:?}", other),
    }

    // The stream keeps working after bad input.
    let caller = client.clone();
    let call = tokio::spawn(async move { caller.call::<_, bool>("noop", ()).await });
    let request = peer.recv().await;
    peer.send(response(request["id"].clone(), json!(true))).await;
    assert!(call.await.unwrap().unwrap());
}
