//! Session behaviour against the mock inspector: state machine, script
//! registry, breakpoint round trips, volatile refs, eval interpolation,
//! and stop cleanup.

mod support;

use std::time::Duration;

use serde_json::json;

use jsdbg_core::session::{EvalOptions, Session, StateOptions, VarsOptions};
use jsdbg_core::{Error, ExecState};
use support::{paused_params, script_parsed_params, wait_for, MockInspector, SCRIPT_URL};

async fn attached_session(server: &MockInspector) -> Session {
    let session = Session::new("test", None);
    session.attach(server.url()).await.unwrap();
    session
}

async fn paused_session(server: &MockInspector, line: u32) -> Session {
    let session = attached_session(server).await;
    server.inject_event("Debugger.scriptParsed", script_parsed_params());
    server.inject_event("Debugger.paused", paused_params(line));
    assert!(
        wait_for(|| session.state() == ExecState::Paused, Duration::from_secs(2)).await,
        "session should observe the pause"
    );
    session
}

#[tokio::test]
async fn test_attach_enables_domains_and_runs() {
    let server = MockInspector::start();
    let session = attached_session(&server).await;

    assert_eq!(session.state(), ExecState::Running);
    let enabled: Vec<String> = server
        .requests()
        .into_iter()
        .map(|(m, _)| m)
        .filter(|m| m.ends_with(".enable"))
        .collect();
    assert!(enabled.contains(&"Debugger.enable".to_string()));
    assert!(enabled.contains(&"Runtime.enable".to_string()));
    session.stop().await;
}

#[tokio::test]
async fn test_script_parsed_populates_registry() {
    let server = MockInspector::start();
    let session = attached_session(&server).await;

    server.inject_event("Debugger.scriptParsed", script_parsed_params());
    assert!(wait_for(|| !session.get_scripts(None).is_empty(), Duration::from_secs(2)).await);

    let scripts = session.get_scripts(Some("main.js"));
    assert_eq!(scripts.len(), 1);
    assert_eq!(scripts[0].url, SCRIPT_URL);
    session.stop().await;
}

#[tokio::test]
async fn test_pause_event_sets_state_and_pause_info() {
    let server = MockInspector::start();
    let session = paused_session(&server, 2).await;

    let status = session.status();
    assert_eq!(status.state, ExecState::Paused);
    let pause = status.pause_info.unwrap();
    assert_eq!(pause.line, 3); // wire line 2, display is 1-based
    assert_eq!(pause.url, SCRIPT_URL);
    assert_eq!(pause.call_frame_count, 1);
    session.stop().await;
}

#[tokio::test]
async fn test_state_snapshot_sections() {
    let server = MockInspector::start();
    let session = paused_session(&server, 2).await;

    let snapshot = session.build_state(StateOptions::default()).await.unwrap();
    assert_eq!(snapshot.status, ExecState::Paused);
    assert_eq!(snapshot.reason.as_deref(), Some("other"));

    let location = snapshot.location.unwrap();
    assert_eq!(location.line, 3);
    assert!(location.url.ends_with("main.js"));

    let source = snapshot.source.unwrap();
    let current: Vec<_> = source.lines.iter().filter(|l| l.current).collect();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].line, 3);
    assert_eq!(current[0].text, "line three");

    let stack = snapshot.stack.unwrap();
    assert_eq!(stack.len(), 1);
    assert_eq!(stack[0].handle, "@f0");
    assert_eq!(stack[0].function_name, "main");

    // The local scope surfaces, double-underscore names are filtered,
    // the global scope is excluded.
    let locals = snapshot.locals.unwrap();
    let names: Vec<&str> = locals.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, vec!["obj", "count"]);
    assert!(locals.iter().all(|v| v.scope == "local"));

    assert_eq!(snapshot.breakpoint_count, Some(0));
    session.stop().await;
}

#[tokio::test]
async fn test_breakpoint_set_list_remove() {
    let server = MockInspector::start();
    let session = paused_session(&server, 2).await;

    let set = session
        .set_breakpoint("main.js", 5, Default::default())
        .await
        .unwrap();
    assert_eq!(set.handle, "BP#1");
    assert_eq!(set.location.line, 5);

    // The wire call targeted the full script URL at a 0-based line.
    let calls = server.requests_named("Debugger.setBreakpointByUrl");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0]["url"], SCRIPT_URL);
    assert_eq!(calls[0]["lineNumber"], 4);

    let listed = session.list_breakpoints();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].handle, "BP#1");
    assert_eq!(listed[0].meta.line, 5);
    assert!(!listed[0].disabled);

    session.remove_breakpoint("BP#1").await.unwrap();
    assert!(session.list_breakpoints().is_empty());
    assert!(!server.requests_named("Debugger.removeBreakpoint").is_empty());
    session.stop().await;
}

#[tokio::test]
async fn test_breakpoint_condition_synthesis_on_wire() {
    let server = MockInspector::start();
    let session = paused_session(&server, 2).await;

    session
        .set_breakpoint(
            "main.js",
            5,
            jsdbg_core::session::BreakpointOptions {
                condition: Some("x > 3".into()),
                hit_count: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let calls = server.requests_named("Debugger.setBreakpointByUrl");
    let condition = calls[0]["condition"].as_str().unwrap();
    assert!(condition.contains("__jsdbg_hits_1"));
    assert!(condition.contains(">= 2"));
    assert!(condition.ends_with("&& (x > 3)"));
    session.stop().await;
}

#[tokio::test]
async fn test_logpoint_condition_never_pauses() {
    let server = MockInspector::start();
    let session = paused_session(&server, 2).await;

    let set = session
        .set_logpoint("main.js", 7, "x is {x}", None, None)
        .await
        .unwrap();
    assert_eq!(set.handle, "LP#1");

    let calls = server.requests_named("Debugger.setBreakpointByUrl");
    assert_eq!(
        calls[0]["condition"].as_str().unwrap(),
        "console.log(`x is ${x}`), false"
    );
    session.stop().await;
}

#[tokio::test]
async fn test_toggle_round_trip_preserves_metadata() {
    let server = MockInspector::start();
    let session = paused_session(&server, 2).await;

    session
        .set_breakpoint("main.js", 5, Default::default())
        .await
        .unwrap();
    session
        .set_breakpoint("main.js", 9, Default::default())
        .await
        .unwrap();

    let toggled = session.toggle_breakpoint("all").await.unwrap();
    assert_eq!(toggled.state, "disabled");
    let listed = session.list_breakpoints();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|b| b.disabled));

    let toggled = session.toggle_breakpoint("all").await.unwrap();
    assert_eq!(toggled.state, "enabled");
    let listed = session.list_breakpoints();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|b| !b.disabled));
    let mut pairs: Vec<(String, u32)> = listed
        .iter()
        .map(|b| (b.handle.clone(), b.meta.line))
        .collect();
    pairs.sort();
    assert_eq!(pairs, vec![("BP#1".to_string(), 5), ("BP#2".to_string(), 9)]);
    session.stop().await;
}

#[tokio::test]
async fn test_wrong_kind_and_unknown_refs() {
    let server = MockInspector::start();
    let session = paused_session(&server, 2).await;

    let vars = session.get_vars(VarsOptions::default()).await.unwrap();
    let value_ref = vars[0].handle.clone();

    assert!(matches!(
        session.remove_breakpoint(&value_ref).await,
        Err(Error::BadRefKind { .. })
    ));
    assert!(matches!(
        session.remove_breakpoint("BP#99").await,
        Err(Error::UnknownRef(_))
    ));
    session.stop().await;
}

#[tokio::test]
async fn test_resume_clears_volatile_refs() {
    let server = MockInspector::start();
    let session = paused_session(&server, 2).await;
    server.set_pause_on_resume(Some(6));

    let before = session.get_vars(VarsOptions::default()).await.unwrap();
    assert_eq!(before[0].handle, "@v1");

    let outcome = session.resume().await.unwrap();
    assert_eq!(outcome.state, ExecState::Paused);
    assert_eq!(outcome.pause.unwrap().line, 7);

    // The same textual handles are reissued for the new pause, so the old
    // generation is fully invalidated.
    let after = session.get_vars(VarsOptions::default()).await.unwrap();
    assert_eq!(after[0].handle, "@v1");
    session.stop().await;
}

#[tokio::test]
async fn test_continue_requires_paused() {
    let server = MockInspector::start();
    let session = attached_session(&server).await;
    assert!(matches!(
        session.resume().await,
        Err(Error::BadState { expected: "paused", .. })
    ));
    session.stop().await;
}

#[tokio::test]
async fn test_eval_interpolates_handles() {
    let server = MockInspector::start();
    let session = paused_session(&server, 2).await;

    let vars = session.get_vars(VarsOptions::default()).await.unwrap();
    let obj_ref = vars
        .iter()
        .find(|v| v.name == "obj")
        .map(|v| v.handle.clone())
        .unwrap();

    let outcome = session
        .eval(EvalOptions {
            expression: format!("{obj_ref}.count"),
            frame: None,
            await_promise: false,
            throw_on_side_effect: false,
            timeout: None,
        })
        .await
        .unwrap();
    assert_eq!(outcome.type_name, "number");
    assert_eq!(outcome.value, "42");

    let calls = server.requests_named("Runtime.callFunctionOn");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0]["objectId"], "obj:1");
    let declaration = calls[0]["functionDeclaration"].as_str().unwrap();
    assert!(declaration.contains("__jsdbg_ref_0.count"));
    assert_eq!(calls[0]["arguments"][0]["objectId"], "obj:1");
    session.stop().await;
}

#[tokio::test]
async fn test_eval_without_handles_uses_call_frame() {
    let server = MockInspector::start();
    let session = paused_session(&server, 2).await;

    let outcome = session
        .eval(EvalOptions {
            expression: "1 + 41".into(),
            frame: None,
            await_promise: false,
            throw_on_side_effect: false,
            timeout: None,
        })
        .await
        .unwrap();
    assert_eq!(outcome.value, "42");
    assert!(outcome.handle.starts_with("@v"));
    assert!(!server.requests_named("Debugger.evaluateOnCallFrame").is_empty());
    session.stop().await;
}

#[tokio::test]
async fn test_search_reports_one_based_lines() {
    let server = MockInspector::start();
    let session = paused_session(&server, 2).await;

    let hits = session.search("answer", None, false, true).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].line, 3);
    assert_eq!(hits[0].column, 7);
    session.stop().await;
}

#[tokio::test]
async fn test_console_and_exception_buffers() {
    let server = MockInspector::start();
    let session = attached_session(&server).await;

    server.inject_event(
        "Runtime.consoleAPICalled",
        json!({
            "type": "log",
            "args": [{"type": "string", "value": "hello"}, {"type": "number", "value": 7, "description": "7"}],
            "timestamp": 1000.0
        }),
    );
    server.inject_event(
        "Runtime.exceptionThrown",
        json!({
            "timestamp": 2000.0,
            "exceptionDetails": {
                "text": "Uncaught",
                "lineNumber": 4,
                "columnNumber": 0,
                "url": SCRIPT_URL,
                "exception": {"type": "object", "className": "Error", "description": "Error: boom"}
            }
        }),
    );

    assert!(
        wait_for(
            || !session.console_messages(None, None, false).is_empty()
                && !session.exceptions(None).is_empty(),
            Duration::from_secs(2)
        )
        .await
    );
    let console = session.console_messages(None, None, false);
    assert_eq!(console[0].text, "hello 7");
    assert_eq!(console[0].level, "log");

    let exceptions = session.exceptions(None);
    assert_eq!(exceptions[0].text, "Error: boom");
    assert_eq!(exceptions[0].location.as_deref(), Some("file:///srv/app/main.js:5"));
    session.stop().await;
}

#[tokio::test]
async fn test_stop_resets_to_idle_projection() {
    let server = MockInspector::start();
    let session = paused_session(&server, 2).await;
    session
        .set_breakpoint("main.js", 5, Default::default())
        .await
        .unwrap();

    session.stop().await;

    assert_eq!(session.state(), ExecState::Idle);
    let status = session.status();
    assert!(status.pause_info.is_none());
    assert_eq!(status.script_count, 0);
    assert!(session.list_breakpoints().is_empty());
    assert!(session.get_scripts(None).is_empty());
    assert!(session.console_messages(None, None, false).is_empty());

    let snapshot = session.build_state(StateOptions::default()).await.unwrap();
    assert_eq!(snapshot.status, ExecState::Idle);
    assert!(snapshot.location.is_none());
}

#[tokio::test]
async fn test_execution_context_destroyed_goes_idle() {
    let server = MockInspector::start();
    let session = paused_session(&server, 2).await;

    server.inject_event("Runtime.executionContextDestroyed", json!({"executionContextId": 1}));
    assert!(wait_for(|| session.state() == ExecState::Idle, Duration::from_secs(2)).await);
    assert!(session.status().pause_info.is_none());
    session.stop().await;
}

#[tokio::test]
async fn test_source_mapped_breakpoint_round_trip() {
    use base64::Engine;

    let map = json!({
        "version": 3,
        "file": "main.js",
        "sources": ["src/app.ts"],
        "sourcesContent": ["let x = 1;\n\nconsole.log(x);\n"],
        "names": [],
        "mappings": "AAAA;AAEA"
    });
    let map_uri = format!(
        "data:application/json;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(map.to_string())
    );

    let server = MockInspector::start();
    let session = attached_session(&server).await;
    server.inject_event(
        "Debugger.scriptParsed",
        json!({"scriptId": "1", "url": SCRIPT_URL, "sourceMapURL": map_uri}),
    );
    assert!(
        wait_for(
            || !session.sourcemap_summaries(None).is_empty(),
            Duration::from_secs(2)
        )
        .await,
        "source map should load"
    );

    // Setting by original path targets the generated script and line.
    let set = session
        .set_breakpoint("app.ts", 3, Default::default())
        .await
        .unwrap();
    assert_eq!(set.handle, "BP#1");
    assert_eq!(set.location.url, "app.ts");
    assert_eq!(set.location.line, 3);

    let calls = server.requests_named("Debugger.setBreakpointByUrl");
    assert_eq!(calls[0]["url"], SCRIPT_URL);
    assert_eq!(calls[0]["lineNumber"], 1); // generated line 2, 0-based

    let listed = session.list_breakpoints();
    let original = listed[0].meta.original.as_ref().unwrap();
    assert!(original.original_url.ends_with("app.ts"));
    assert_eq!(original.original_line, 3);
    assert_eq!(original.generated_line, 2);

    // A pause on the mapped generated line displays the original source.
    server.inject_event("Debugger.paused", paused_params(1));
    assert!(wait_for(|| session.state() == ExecState::Paused, Duration::from_secs(2)).await);
    let pause = session.status().pause_info.unwrap();
    assert!(pause.url.ends_with("src/app.ts"), "got {}", pause.url);
    assert_eq!(pause.line, 3);
    session.stop().await;
}
