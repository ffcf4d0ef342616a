mod common;

use bayeuxd::core::engine::{Counters, Engine};
use bayeuxd::core::protocol::Connection;
use common::{MockConnection, as_conn, bool_field, msg, str_field};
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;

fn engine() -> (Engine, mpsc::Receiver<Counters>) {
    let (statistics_tx, statistics_rx) = mpsc::channel(1);
    (Engine::new(25000, statistics_tx), statistics_rx)
}

#[tokio::test]
async fn test_handshake_allocates_monotonic_client_ids() {
    let (engine, _rx) = engine();
    let conn = MockConnection::streaming();

    let first = engine.handshake(
        &msg(json!({"channel": "/meta/handshake", "version": "1.0"})),
        &as_conn(&conn),
    );
    let second = engine.handshake(
        &msg(json!({"channel": "/meta/handshake", "version": "1.0"})),
        &as_conn(&conn),
    );

    assert_eq!(first, Some(1));
    assert_eq!(second, Some(2));
    assert!(engine.get_client(1).is_some());
    assert!(engine.get_client(2).is_some());
}

#[tokio::test]
async fn test_handshake_response_shape() {
    let (engine, _rx) = engine();
    let conn = MockConnection::streaming();

    engine.handshake(
        &msg(json!({"channel": "/meta/handshake", "version": "1.0", "id": "5"})),
        &as_conn(&conn),
    );

    let response = &conn.last_batch()[0];
    assert_eq!(str_field(response, "channel"), Some("/meta/handshake"));
    assert_eq!(str_field(response, "version"), Some("1.0"));
    assert_eq!(str_field(response, "clientId"), Some("client-1"));
    assert_eq!(str_field(response, "id"), Some("5"));
    assert_eq!(bool_field(response, "successful"), Some(true));
    assert_eq!(
        response.get("supportedConnectionTypes"),
        Some(&json!(["websocket"]))
    );
    assert_eq!(
        response.get("advice"),
        Some(&json!({"reconnect": "retry", "interval": 0, "timeout": 25000}))
    );
}

#[tokio::test]
async fn test_handshake_version_mismatch() {
    let (engine, _rx) = engine();
    let conn = MockConnection::streaming();

    let allocated = engine.handshake(
        &msg(json!({"channel": "/meta/handshake", "version": "0.9"})),
        &as_conn(&conn),
    );

    assert_eq!(allocated, None);
    assert!(engine.get_client(1).is_none());

    let response = &conn.last_batch()[0];
    assert_eq!(bool_field(response, "successful"), Some(false));
    assert_eq!(
        str_field(response, "error"),
        Some("Only supported version is '1.0'")
    );
    assert!(response.get("clientId").is_none());
}

#[tokio::test]
async fn test_handshake_without_version_is_rejected() {
    let (engine, _rx) = engine();
    let conn = MockConnection::streaming();

    let allocated = engine.handshake(&msg(json!({"channel": "/meta/handshake"})), &as_conn(&conn));

    assert_eq!(allocated, None);
    assert_eq!(bool_field(&conn.last_batch()[0], "successful"), Some(false));
}

#[tokio::test]
async fn test_handshake_respects_jsonp() {
    let (engine, _rx) = engine();
    let conn = MockConnection::polling();

    engine.handshake(
        &msg(json!({"channel": "/meta/handshake", "version": "1.0", "jsonp": "cb"})),
        &as_conn(&conn),
    );

    let wrapped = conn.jsonp_batches();
    assert_eq!(wrapped.len(), 1);
    assert_eq!(wrapped[0].1, "cb");
}

#[tokio::test]
async fn test_connect_parks_response_on_single_shot() {
    let (engine, _rx) = engine();
    let handshake_conn = MockConnection::streaming();
    engine.handshake(
        &msg(json!({"channel": "/meta/handshake", "version": "1.0"})),
        &as_conn(&handshake_conn),
    );
    let client = engine.get_client(1).unwrap();

    let poll = MockConnection::polling();
    client.set_connection(as_conn(&poll));
    engine.connect(
        &msg(json!({"channel": "/meta/connect", "clientId": "client-1"})),
        &client,
        &as_conn(&poll),
    );

    // Nothing written yet: the reply rides along with the next send.
    assert_eq!(poll.batch_count(), 0);
    client.send(msg(json!({"channel": "/news", "data": "x"})), None);

    let batch = poll.last_batch();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0].channel().name(), "/news");
    assert_eq!(batch[1].channel().name(), "/meta/connect");
    assert_eq!(bool_field(&batch[1], "successful"), Some(true));
    assert_eq!(
        batch[1].get("advice"),
        Some(&json!({"reconnect": "retry", "interval": 0, "timeout": 25000}))
    );
}

#[tokio::test]
async fn test_connect_replies_immediately_on_streaming() {
    let (engine, _rx) = engine();
    let conn = MockConnection::streaming();
    engine.handshake(
        &msg(json!({"channel": "/meta/handshake", "version": "1.0"})),
        &as_conn(&conn),
    );
    let client = engine.get_client(1).unwrap();
    client.set_connection(as_conn(&conn));

    engine.connect(
        &msg(json!({"channel": "/meta/connect", "clientId": "client-1"})),
        &client,
        &as_conn(&conn),
    );

    // One batch for the handshake, one for the connect reply.
    assert_eq!(conn.batch_count(), 2);
    let response = &conn.last_batch()[0];
    assert_eq!(str_field(response, "channel"), Some("/meta/connect"));
    assert_eq!(str_field(response, "clientId"), Some("client-1"));
    assert_eq!(bool_field(response, "successful"), Some(true));
}

#[tokio::test]
async fn test_subscribe_registers_patterns() {
    let (engine, _rx) = engine();
    let conn = MockConnection::streaming();
    engine.handshake(
        &msg(json!({"channel": "/meta/handshake", "version": "1.0"})),
        &as_conn(&conn),
    );
    let client = engine.get_client(1).unwrap();
    client.set_connection(as_conn(&conn));

    engine.subscribe(
        &msg(json!({
            "channel": "/meta/subscribe",
            "clientId": "client-1",
            "subscription": "/foo/**",
        })),
        &client,
    );

    let response = &conn.last_batch()[0];
    assert_eq!(bool_field(response, "successful"), Some(true));
    assert_eq!(str_field(response, "subscription"), Some("/foo/**"));
    assert_eq!(client.subscriptions(), vec!["/foo/**".to_string()]);
    assert_eq!(
        engine.client_register().subscriptions().pattern_count(),
        1
    );
}

#[tokio::test]
async fn test_subscribe_accepts_heterogeneous_lists() {
    let (engine, _rx) = engine();
    let conn = MockConnection::streaming();
    engine.handshake(
        &msg(json!({"channel": "/meta/handshake", "version": "1.0"})),
        &as_conn(&conn),
    );
    let client = engine.get_client(1).unwrap();
    client.set_connection(as_conn(&conn));

    engine.subscribe(
        &msg(json!({
            "channel": "/meta/subscribe",
            "clientId": "client-1",
            "subscription": ["/a", 42, "/b", null],
        })),
        &client,
    );

    let mut subscriptions = client.subscriptions();
    subscriptions.sort_unstable();
    assert_eq!(subscriptions, vec!["/a".to_string(), "/b".to_string()]);
    // The reply echoes the subscription field untouched.
    assert_eq!(
        conn.last_batch()[0].get("subscription"),
        Some(&json!(["/a", 42, "/b", null]))
    );
}

#[tokio::test]
async fn test_subscribe_to_service_channel_is_not_registered() {
    let (engine, _rx) = engine();
    let conn = MockConnection::streaming();
    engine.handshake(
        &msg(json!({"channel": "/meta/handshake", "version": "1.0"})),
        &as_conn(&conn),
    );
    let client = engine.get_client(1).unwrap();
    client.set_connection(as_conn(&conn));

    engine.subscribe(
        &msg(json!({
            "channel": "/meta/subscribe",
            "clientId": "client-1",
            "subscription": "/service/echo",
        })),
        &client,
    );

    let response = &conn.last_batch()[0];
    assert_eq!(bool_field(response, "successful"), Some(true));
    assert_eq!(str_field(response, "subscription"), Some("/service/echo"));
    assert!(client.subscriptions().is_empty());
    assert_eq!(
        engine.client_register().subscriptions().pattern_count(),
        0
    );
}

#[tokio::test]
async fn test_unsubscribe_round_trip() {
    let (engine, _rx) = engine();
    let conn = MockConnection::streaming();
    engine.handshake(
        &msg(json!({"channel": "/meta/handshake", "version": "1.0"})),
        &as_conn(&conn),
    );
    let client = engine.get_client(1).unwrap();
    client.set_connection(as_conn(&conn));

    engine.subscribe(
        &msg(json!({
            "channel": "/meta/subscribe",
            "clientId": "client-1",
            "subscription": ["/a", "/b"],
        })),
        &client,
    );
    engine.unsubscribe(
        &msg(json!({
            "channel": "/meta/unsubscribe",
            "clientId": "client-1",
            "subscription": ["/a", "/b"],
        })),
        &client,
    );

    assert!(client.subscriptions().is_empty());
    assert_eq!(
        engine.client_register().subscriptions().pattern_count(),
        0
    );
    let response = &conn.last_batch()[0];
    assert_eq!(str_field(response, "channel"), Some("/meta/unsubscribe"));
    assert_eq!(bool_field(response, "successful"), Some(true));
}

#[tokio::test]
async fn test_disconnect_replies_successfully() {
    let (engine, _rx) = engine();
    let conn = MockConnection::streaming();
    engine.handshake(
        &msg(json!({"channel": "/meta/handshake", "version": "1.0"})),
        &as_conn(&conn),
    );
    let client = engine.get_client(1).unwrap();
    client.set_connection(as_conn(&conn));

    engine.disconnect(
        &msg(json!({"channel": "/meta/disconnect", "clientId": "client-1"})),
        &client,
    );

    let response = &conn.last_batch()[0];
    assert_eq!(str_field(response, "channel"), Some("/meta/disconnect"));
    assert_eq!(bool_field(response, "successful"), Some(true));
}

#[tokio::test]
async fn test_publish_acknowledges_and_fans_out() {
    let (engine, _rx) = engine();
    let publisher_conn = MockConnection::streaming();
    let subscriber_conn = MockConnection::streaming();
    engine.handshake(
        &msg(json!({"channel": "/meta/handshake", "version": "1.0"})),
        &as_conn(&publisher_conn),
    );
    engine.handshake(
        &msg(json!({"channel": "/meta/handshake", "version": "1.0"})),
        &as_conn(&subscriber_conn),
    );
    let publisher = engine.get_client(1).unwrap();
    publisher.set_connection(as_conn(&publisher_conn));
    let subscriber = engine.get_client(2).unwrap();
    subscriber.set_connection(as_conn(&subscriber_conn));
    engine
        .client_register()
        .add_subscription(&subscriber, &["/news/**".to_string()]);

    engine.publish(
        &msg(json!({
            "channel": "/news/tech",
            "clientId": "client-1",
            "data": {"headline": "hello"},
        })),
        &as_conn(&publisher_conn),
    );

    // The acknowledgement reaches the publisher synchronously.
    let ack = &publisher_conn.last_batch()[0];
    assert_eq!(str_field(ack, "channel"), Some("/news/tech"));
    assert_eq!(bool_field(ack, "successful"), Some(true));

    // Fan-out runs on a background task.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let delivered = &subscriber_conn.last_batch()[0];
    assert_eq!(str_field(delivered, "channel"), Some("/news/tech"));
    assert_eq!(str_field(delivered, "clientId"), Some("client-1"));
    assert_eq!(delivered.get("data"), Some(&json!({"headline": "hello"})));
}

#[tokio::test]
async fn test_publish_from_unknown_origin_keeps_connection_open() {
    let (engine, _rx) = engine();
    let conn = MockConnection::streaming();

    engine.publish(
        &msg(json!({
            "channel": "/news/tech",
            "clientId": "client-999",
            "data": 1,
        })),
        &as_conn(&conn),
    );

    let ack = &conn.last_batch()[0];
    assert_eq!(bool_field(ack, "successful"), Some(true));
    assert!(conn.is_connected());
}

#[tokio::test]
async fn test_reap_once_pushes_counters() {
    let (engine, mut statistics_rx) = engine();
    let conn = MockConnection::streaming();
    engine.handshake(
        &msg(json!({"channel": "/meta/handshake", "version": "1.0"})),
        &as_conn(&conn),
    );
    let client = engine.get_client(1).unwrap();
    client.set_connection(as_conn(&conn));

    engine.publish(
        &msg(json!({"channel": "/x", "clientId": "client-1", "data": 1})),
        &as_conn(&conn),
    );
    tokio::time::sleep(Duration::from_millis(50)).await;

    engine.reap_once();
    let counters = statistics_rx.try_recv().unwrap();
    assert_eq!(counters.published, 1);
    assert_eq!(counters.clients, 1);

    // The published counter was swapped to zero.
    let _ = statistics_rx.try_recv();
    engine.reap_once();
    let counters = statistics_rx.try_recv().unwrap();
    assert_eq!(counters.published, 0);
}

#[tokio::test]
async fn test_reap_once_drops_sample_when_outlet_full() {
    let (engine, mut statistics_rx) = engine();

    // Capacity is one: the second sample must be dropped, not block.
    engine.reap_once();
    engine.reap_once();

    assert!(statistics_rx.try_recv().is_ok());
    assert!(statistics_rx.try_recv().is_err());
}
