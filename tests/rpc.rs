//! Request/response round-trips over an in-memory transport.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};

use common::{CountingTransport, spawn_echo_core, wait_until};
use core_client::{ChannelTransport, ConnectionToCore, Error, RequestPayload};

#[tokio::test]
async fn happy_path_rpc_round_trip() {
    let (transport, mut peer) = ChannelTransport::pair("test-core");
    let connection = ConnectionToCore::new(Arc::new(transport));

    let server = tokio::spawn(async move {
        let frame = peer.next_request().await.expect("request frame");
        peer.respond(frame.message_id.clone(), json!({ "pong": true }));
        frame
    });

    let payload = RequestPayload::new("Session.ping").with_args(json!({}));
    let data = connection.send_request(payload).await.expect("response");
    assert_eq!(data, json!({ "pong": true }));

    let frame = server.await.expect("server task");
    assert_eq!(frame.message_id.as_str(), "1");
    assert_eq!(frame.command, "Session.ping");
    assert_eq!(frame.args, json!({}));
    assert!(frame.send_time > 0);
    assert!(frame.command_id.is_none());

    assert_eq!(connection.pending_count(), 0);
    assert!(connection.is_connected());
}

#[tokio::test]
async fn auto_connect_is_coalesced_across_parallel_requests() {
    let (transport, peer) =
        CountingTransport::pair_with_connect_delay("test-core", Duration::from_millis(20));
    let connection = ConnectionToCore::new(transport.clone());
    let _server = spawn_echo_core(peer);

    let first = connection.send_request(RequestPayload::new("Session.first"));
    let second = connection.send_request(RequestPayload::new("Session.second"));
    let (first, second) = tokio::join!(first, second);

    assert_eq!(
        first.expect("first response"),
        json!({ "echo": "Session.first" })
    );
    assert_eq!(
        second.expect("second response"),
        json!({ "echo": "Session.second" })
    );
    assert_eq!(transport.connect_calls(), 1);
}

#[tokio::test]
async fn request_timeout_rejects_and_late_response_is_discarded() {
    let (transport, mut peer) = ChannelTransport::pair("test-core");
    let connection = ConnectionToCore::new(Arc::new(transport));

    let server = tokio::spawn(async move {
        let frame = peer.next_request().await.expect("request frame");
        // Answer long after the caller's deadline.
        tokio::time::sleep(Duration::from_millis(150)).await;
        peer.respond(frame.message_id.clone(), json!({ "late": true }));
        peer
    });

    let err = connection
        .send_request_with_timeout(
            RequestPayload::new("Session.slow"),
            Duration::from_millis(50),
        )
        .await
        .expect_err("deadline should win");
    assert!(matches!(err, Error::ResponseTimeout { .. }));
    assert_eq!(connection.pending_count(), 0);

    // The late response lands after the entry is gone; the connection
    // keeps working.
    let mut peer = server.await.expect("server task");
    let follow_up = tokio::spawn(async move {
        let frame = peer.next_request().await.expect("request frame");
        peer.respond(frame.message_id.clone(), json!({ "ok": true }));
        frame
    });

    let data = connection
        .send_request(RequestPayload::new("Session.next"))
        .await
        .expect("follow-up response");
    assert_eq!(data, json!({ "ok": true }));
    assert_eq!(follow_up.await.expect("frame").message_id.as_str(), "2");
}

#[tokio::test]
async fn request_ids_are_unique_and_monotonic() {
    let (transport, mut peer) = ChannelTransport::pair("test-core");
    let connection = ConnectionToCore::new(Arc::new(transport));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let server_seen = Arc::clone(&seen);
    let _server = tokio::spawn(async move {
        while let Some(frame) = peer.next_request().await {
            server_seen
                .lock()
                .expect("lock")
                .push(frame.message_id.as_str().to_string());
            peer.respond(frame.message_id, Value::Null);
        }
    });

    for _ in 0..5 {
        connection
            .send_request(RequestPayload::new("Session.tick"))
            .await
            .expect("response");
    }

    let seen = seen.lock().expect("lock").clone();
    assert_eq!(seen, vec!["1", "2", "3", "4", "5"]);
}

#[tokio::test]
async fn events_are_forwarded_verbatim() {
    let (transport, peer) = ChannelTransport::pair("test-core");
    let connection = ConnectionToCore::new(Arc::new(transport));

    let received = Arc::new(Mutex::new(Vec::<Value>::new()));
    {
        let received = Arc::clone(&received);
        connection.on_event(move |event| {
            received.lock().expect("lock").push(event.payload().clone());
        });
    }

    let by_listener = json!({ "listenerId": "l-9", "payload": { "loaded": true } });
    let by_type = json!({ "eventType": "Tab.closed", "tabId": 4 });
    peer.emit_event(by_listener.clone());
    peer.emit_event(by_type.clone());

    // Untagged frames are dropped without disturbing anything.
    peer.inject(json!({ "noise": true }));

    {
        let received = Arc::clone(&received);
        wait_until(move || received.lock().expect("lock").len() == 2).await;
    }
    let received = received.lock().expect("lock").clone();
    assert_eq!(received[0], by_listener);
    assert_eq!(received[1], by_type);
}

#[tokio::test]
async fn send_failure_surfaces_and_removes_entry() {
    let (transport, peer) = ChannelTransport::pair("test-core");
    let connection = ConnectionToCore::new(Arc::new(transport));

    // Establish the connection first, then sever the link so only the
    // send can fail.
    connection.connect().await.expect("connect");
    peer.drop_link();

    let err = connection
        .send_request(RequestPayload::new("Session.ping"))
        .await
        .expect_err("send should fail");
    // Depending on which the pump observes first this is the send
    // failure or the termination cancel; both surface.
    assert!(
        matches!(err, Error::Transport { .. }) || err.is_disconnected(),
        "unexpected error: {err}"
    );
    assert_eq!(connection.pending_count(), 0);
}
