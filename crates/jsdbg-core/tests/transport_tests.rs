//! Transport semantics against the mock inspector: correlation, event
//! fan-out, malformed-frame tolerance, and disconnect propagation.

mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use jsdbg_core::transport::CdpTransport;
use jsdbg_core::Error;
use support::{wait_for, MockInspector};

#[tokio::test]
async fn test_send_correlates_response() {
    let server = MockInspector::start();
    let transport = CdpTransport::connect(server.url(), None).unwrap();

    let result = transport
        .send("Test.echo", Some(json!({"x": 7})))
        .await
        .unwrap();
    assert_eq!(result["x"], 7);

    let result = transport.send("Debugger.enable", None).await.unwrap();
    assert!(result.is_object());
    transport.disconnect();
}

#[tokio::test]
async fn test_events_dispatch_in_arrival_order() {
    let server = MockInspector::start();
    let transport = CdpTransport::connect(server.url(), None).unwrap();

    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = seen.clone();
    transport.on(
        "Custom.event",
        Arc::new(move |params| {
            sink.lock().unwrap().push(params["n"].as_u64().unwrap_or(0));
        }),
    );

    for n in 0..5 {
        server.inject_event("Custom.event", json!({"n": n}));
    }
    assert!(
        wait_for(
            || seen.lock().unwrap().len() == 5,
            Duration::from_secs(2)
        )
        .await
    );
    assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    transport.disconnect();
}

#[tokio::test]
async fn test_off_removes_listener() {
    let server = MockInspector::start();
    let transport = CdpTransport::connect(server.url(), None).unwrap();

    let count = Arc::new(AtomicUsize::new(0));
    let sink = count.clone();
    let token = transport.on(
        "Custom.event",
        Arc::new(move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        }),
    );

    server.inject_event("Custom.event", json!({}));
    assert!(wait_for(|| count.load(Ordering::SeqCst) == 1, Duration::from_secs(2)).await);

    transport.off("Custom.event", token);
    server.inject_event("Custom.event", json!({}));
    // Round-trip a request to be sure the event had time to arrive.
    let _ = transport.send("Test.echo", None).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);
    transport.disconnect();
}

#[tokio::test]
async fn test_malformed_frames_are_discarded() {
    let server = MockInspector::start();
    let transport = CdpTransport::connect(server.url(), None).unwrap();

    server.inject_raw("this is not json");
    server.inject_raw(r#"{"neither":"response","nor":"event"}"#);

    // The connection stays healthy.
    let result = transport
        .send("Test.echo", Some(json!({"alive": true})))
        .await
        .unwrap();
    assert_eq!(result["alive"], true);
    transport.disconnect();
}

#[tokio::test]
async fn test_disconnect_fails_pending_and_future_sends() {
    let server = MockInspector::start();
    let transport = CdpTransport::connect(server.url(), None).unwrap();

    // A request the server will never answer, cancelled by the close.
    let pending = {
        let transport = transport.clone();
        tokio::spawn(async move { transport.send("Test.noReply", None).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    let _ = transport.send("Test.close", None).await;

    let outcome = pending.await.unwrap();
    assert!(matches!(outcome, Err(Error::Disconnected)));

    assert!(
        wait_for(|| !transport.is_connected(), Duration::from_secs(2)).await,
        "transport should observe the close"
    );
    assert!(matches!(
        transport.send("Debugger.enable", None).await,
        Err(Error::NotConnected)
    ));
}

#[tokio::test]
async fn test_protocol_log_captures_traffic() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("protocol.jsonl");
    let log = jsdbg_core::transport::ProtocolLog::create(&path).unwrap();

    let server = MockInspector::start();
    let transport = CdpTransport::connect(server.url(), Some(Arc::new(log))).unwrap();
    transport.send("Test.echo", Some(json!({"a": 1}))).await.unwrap();
    server.inject_event("Custom.event", json!({"b": 2}));

    assert!(
        wait_for(
            || {
                std::fs::read_to_string(&path)
                    .map(|text| text.lines().count() >= 3)
                    .unwrap_or(false)
            },
            Duration::from_secs(2)
        )
        .await
    );

    let text = std::fs::read_to_string(&path).unwrap();
    let mut dirs = Vec::new();
    for line in text.lines() {
        let entry: serde_json::Value = serde_json::from_str(line).unwrap();
        dirs.push(entry["dir"].as_str().unwrap().to_string());
    }
    assert!(dirs.contains(&"send".to_string()));
    assert!(dirs.contains(&"recv".to_string()));
    assert!(dirs.contains(&"event".to_string()));
    transport.disconnect();
}
