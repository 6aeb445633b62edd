//! Inbound error delivery: verbatim pass-through, disconnect-adjacent
//! remapping, and the launch-error exclusions.

use std::sync::{Arc, Mutex};

use serde_json::{Value, json};

use core_client::{ChannelTransport, ConnectionToCore, Error, RemoteError, RequestPayload};

/// Sends one request and has the peer answer it with `data`.
async fn round_trip_with_data(data: Value) -> core_client::Result<Value> {
    let (transport, mut peer) = ChannelTransport::pair("remap-core");
    let connection = ConnectionToCore::new(Arc::new(transport));

    let _server = tokio::spawn(async move {
        let frame = peer.next_request().await.expect("request frame");
        peer.respond(frame.message_id, data);
        std::future::pending::<()>().await;
    });

    connection
        .send_request(RequestPayload::new("Session.work"))
        .await
}

#[tokio::test]
async fn remote_errors_pass_through_verbatim() {
    let err = round_trip_with_data(json!({
        "name": "ScriptError",
        "message": "undefined is not a function",
        "line": 12
    }))
    .await
    .expect_err("error response");

    match err {
        Error::Remote(remote) => {
            assert_eq!(remote.name, "ScriptError");
            assert_eq!(remote.message, "undefined is not a function");
            assert_eq!(remote.data.get("line").and_then(Value::as_u64), Some(12));
        }
        other => panic!("expected a remote error, got: {other}"),
    }
}

#[tokio::test]
async fn session_closed_errors_remap_to_disconnected() {
    let err = round_trip_with_data(json!({
        "name": RemoteError::SESSION_CLOSED,
        "message": "session 4 is gone"
    }))
    .await
    .expect_err("error response");

    assert!(err.is_disconnected());
    assert!(err.to_string().contains("remap-core"));
}

#[tokio::test]
async fn disconnecting_marker_remaps_to_disconnected() {
    let err = round_trip_with_data(json!({
        "name": "X",
        "isDisconnecting": true
    }))
    .await
    .expect_err("error response");

    // The arbitrary name does not matter; the marker does.
    assert!(err.is_disconnected());
}

#[tokio::test]
async fn browser_launch_errors_are_never_remapped() {
    let err = round_trip_with_data(json!({
        "name": RemoteError::BROWSER_LAUNCH,
        "message": "binary not found",
        "isDisconnecting": true
    }))
    .await
    .expect_err("error response");

    match err {
        Error::Remote(remote) => {
            assert_eq!(remote.name, RemoteError::BROWSER_LAUNCH);
            assert_eq!(remote.message, "binary not found");
            // The marker is scrubbed before delivery.
            assert!(remote.is_disconnecting.is_none());
            assert!(remote.data.get("isDisconnecting").is_none());
        }
        other => panic!("expected the launch error verbatim, got: {other}"),
    }
}

#[tokio::test]
async fn dependencies_missing_errors_are_never_remapped() {
    let err = round_trip_with_data(json!({
        "name": RemoteError::DEPENDENCIES_MISSING,
        "message": "libgtk missing",
        "isDisconnecting": true
    }))
    .await
    .expect_err("error response");

    match err {
        Error::Remote(remote) => assert_eq!(remote.name, RemoteError::DEPENDENCIES_MISSING),
        other => panic!("expected the dependency error verbatim, got: {other}"),
    }
}

#[tokio::test]
async fn payload_with_name_field_is_not_an_error() {
    let data = round_trip_with_data(json!({ "name": "my-session", "id": 4 }))
        .await
        .expect("plain payload");
    assert_eq!(data, json!({ "name": "my-session", "id": 4 }));
}

#[tokio::test]
async fn adjacent_error_during_teardown_resolves_hook_request_empty() {
    let (transport, mut peer) = ChannelTransport::pair("remap-core");
    let connection = ConnectionToCore::new(Arc::new(transport));
    connection.connect().await.expect("connect");

    // The goodbye request is answered with a teardown-marked error:
    // it remaps to disconnected, which the in-progress disconnect
    // swallows into an empty result.
    let hook_saw = Arc::new(Mutex::new(None::<Value>));
    {
        let hook_saw = Arc::clone(&hook_saw);
        connection.set_before_disconnect(move |connection| {
            let hook_saw = Arc::clone(&hook_saw);
            async move {
                let data = connection
                    .send_request(RequestPayload::new("Core.disconnect"))
                    .await?;
                *hook_saw.lock().expect("lock") = Some(data);
                Ok(())
            }
        });
    }

    let _server = tokio::spawn(async move {
        let frame = peer.next_request().await.expect("goodbye frame");
        peer.respond(
            frame.message_id,
            json!({ "name": "X", "message": "closing down", "isDisconnecting": true }),
        );
        std::future::pending::<()>().await;
    });

    connection.disconnect().await.expect("disconnect");
    assert_eq!(*hook_saw.lock().expect("lock"), Some(Value::Null));
}
