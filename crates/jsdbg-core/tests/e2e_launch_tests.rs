//! End-to-end tests against a real `node` binary.
//!
//! Ignored by default; run with `cargo test -- --ignored` on a machine
//! with node on PATH.

use std::time::Duration;

use jsdbg_core::session::{Session, StateOptions};
use jsdbg_core::ExecState;

fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{name}", env!("CARGO_MANIFEST_DIR"))
}

#[tokio::test]
#[ignore = "requires node on PATH"]
async fn test_launch_brk_pauses_in_user_code() {
    let session = Session::new("e2e", None);
    let status = session
        .launch(
            vec!["node".to_string(), fixture("simple-app.js")],
            true,
            None,
        )
        .await
        .unwrap();
    assert_eq!(status.state, ExecState::Paused);

    let snapshot = session.build_state(StateOptions::default()).await.unwrap();
    assert_eq!(snapshot.status, ExecState::Paused);
    let location = snapshot.location.unwrap();
    assert!(
        location.url.contains("simple-app.js"),
        "paused in {} instead of user code",
        location.url
    );
    assert!(!snapshot.stack.unwrap().is_empty());
    assert_eq!(snapshot.breakpoint_count, Some(0));

    session.stop().await;
    assert_eq!(session.state(), ExecState::Idle);
}

#[tokio::test]
#[ignore = "requires node on PATH"]
async fn test_breakpoint_hit_after_launch() {
    let session = Session::new("e2e-bp", None);
    session
        .launch(
            vec!["node".to_string(), fixture("simple-app.js")],
            true,
            None,
        )
        .await
        .unwrap();

    let set = session
        .set_breakpoint("simple-app.js", 3, Default::default())
        .await
        .unwrap();
    assert_eq!(set.handle, "BP#1");
    assert_eq!(set.location.line, 3);

    let outcome = session.resume().await.unwrap();
    assert_eq!(outcome.state, ExecState::Paused);
    assert_eq!(outcome.pause.unwrap().line, 3);

    session.stop().await;
}

#[tokio::test]
#[ignore = "requires node on PATH"]
async fn test_console_capture_while_running() {
    let session = Session::new("e2e-console", None);
    session
        .launch(
            vec!["node".to_string(), fixture("simple-app.js")],
            false,
            None,
        )
        .await
        .unwrap();

    let deadline = std::time::Instant::now() + Duration::from_secs(3);
    let mut seen = false;
    while std::time::Instant::now() < deadline {
        if session
            .console_messages(None, None, false)
            .iter()
            .any(|m| m.text.contains("Hello, world!"))
        {
            seen = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(seen, "expected the greeting on the console buffer");
    session.stop().await;
}
