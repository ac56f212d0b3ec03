//! Daemon control-socket behaviour: framing, the closed command schema,
//! idle-state errors with suggestions, and shutdown on `stop`.

use std::time::Duration;

use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use jsdbg_cli::daemon;
use jsdbg_cli::ipc::{Request, Response};
use jsdbg_cli::paths;

async fn roundtrip(stream: &mut UnixStream, request: &Request) -> Response {
    let mut payload = serde_json::to_string(request).unwrap();
    payload.push('\n');
    stream.write_all(payload.as_bytes()).await.unwrap();

    let (read_half, _) = stream.split();
    let mut line = String::new();
    BufReader::new(read_half).read_line(&mut line).await.unwrap();
    serde_json::from_str(&line).unwrap()
}

#[tokio::test]
async fn test_daemon_serves_the_closed_schema() {
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var("JSDBG_RUNTIME_DIR", dir.path());

    let daemon_task = tokio::spawn(async { daemon::run("schema-test").await });

    let sock = paths::socket_path("schema-test");
    let mut stream = loop {
        if let Ok(stream) = UnixStream::connect(&sock).await {
            break stream;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    };

    // ping
    let response = roundtrip(&mut stream, &Request::bare("ping")).await;
    assert!(response.ok);
    assert_eq!(response.data.unwrap()["pong"], true);

    // status: a fresh session is idle
    let response = roundtrip(&mut stream, &Request::bare("status")).await;
    assert!(response.ok);
    let data = response.data.unwrap();
    assert_eq!(data["state"], "idle");
    assert_eq!(data["session"], "schema-test");
    assert_eq!(data["scriptCount"], 0);

    // commands that need a target fail concisely with a suggestion
    let response = roundtrip(&mut stream, &Request::bare("continue")).await;
    assert!(!response.ok);
    assert!(response.error.unwrap().contains("paused"));
    assert!(response.suggestion.is_some());

    let response = roundtrip(
        &mut stream,
        &Request::new("break", json!({"file": "a.js", "line": 3})),
    )
    .await;
    assert!(!response.ok);
    assert!(response.error.unwrap().contains("not connected"));

    // malformed arguments are rejected at the schema boundary
    let response = roundtrip(&mut stream, &Request::new("break", json!({"file": "a.js"}))).await;
    assert!(!response.ok);
    assert!(response.error.unwrap().contains("invalid arguments"));

    // the schema is closed
    let response = roundtrip(&mut stream, &Request::bare("frobnicate")).await;
    assert!(!response.ok);
    assert!(response.error.unwrap().contains("unknown command"));

    // state on an idle session is just the status projection
    let response = roundtrip(&mut stream, &Request::bare("state")).await;
    assert!(response.ok);
    assert_eq!(response.data.unwrap()["status"], "idle");

    // stop shuts the daemon down and removes the socket
    let response = roundtrip(&mut stream, &Request::bare("stop")).await;
    assert!(response.ok);
    drop(stream); // the daemon leaves the serve loop on EOF

    daemon_task.await.unwrap().unwrap();
    assert!(!sock.exists());
}
