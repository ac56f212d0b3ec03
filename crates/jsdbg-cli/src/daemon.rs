//! The per-session daemon: a Unix-domain control socket serving the
//! newline-framed JSON command protocol.
//!
//! Connections are accepted and serviced one at a time; that serialisation
//! is the only mutual exclusion the engine needs. Each request gets a 30 s
//! budget.

use std::time::Duration;

use anyhow::Context;
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

use jsdbg_core::session::{
    BreakpointOptions, EvalOptions, Session, SourceOptions, StackOptions, StateOptions,
    VarsOptions,
};
use jsdbg_core::Error as CoreError;

use crate::ipc::{self, Request, Response};
use crate::paths;

const REQUEST_BUDGET: Duration = Duration::from_secs(30);

/// Run the daemon for one session until a `stop` request shuts it down.
pub async fn run(session_name: &str) -> anyhow::Result<()> {
    let dir = paths::runtime_dir();
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;

    let sock = paths::socket_path(session_name);
    if sock.exists() {
        match UnixStream::connect(&sock).await {
            Ok(_) => anyhow::bail!("a daemon is already running for session {session_name}"),
            Err(_) => {
                // Stale socket from a dead daemon.
                let _ = std::fs::remove_file(&sock);
            }
        }
    }
    let listener = UnixListener::bind(&sock)
        .with_context(|| format!("binding {}", sock.display()))?;
    info!("session {session_name}: listening on {}", sock.display());

    let protocol_log = std::env::var("JSDBG_PROTOCOL_LOG")
        .ok()
        .filter(|v| v == "1" || v == "true")
        .map(|_| paths::protocol_log_path(session_name));
    let session = Session::new(session_name, protocol_log);

    let mut shutdown = false;
    while !shutdown {
        let (stream, _) = listener.accept().await?;
        shutdown = serve_connection(stream, &session).await;
    }

    session.stop().await;
    let _ = std::fs::remove_file(&sock);
    info!("session {session_name}: stopped");
    Ok(())
}

/// Service every request on one connection. Returns `true` when the daemon
/// should shut down.
async fn serve_connection(stream: UnixStream, session: &Session) -> bool {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    let mut shutdown = false;

    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => {
                debug!("request: {}", request.cmd);
                if request.cmd == "stop" {
                    shutdown = true;
                }
                match tokio::time::timeout(REQUEST_BUDGET, dispatch(session, request)).await {
                    Ok(response) => response,
                    Err(_) => Response::failure("request timed out", None),
                }
            }
            Err(e) => Response::failure(format!("malformed request: {e}"), None),
        };

        let mut payload = match serde_json::to_string(&response) {
            Ok(p) => p,
            Err(e) => {
                warn!("unserialisable response: {e}");
                r#"{"ok":false,"error":"internal serialisation failure"}"#.to_string()
            }
        };
        payload.push('\n');
        if write_half.write_all(payload.as_bytes()).await.is_err() {
            break;
        }
    }
    shutdown
}

// ── Dispatch ─────────────────────────────────────────────────────────────────

fn ok<T: Serialize>(value: T) -> Response {
    match serde_json::to_value(value) {
        Ok(data) => Response::success(data),
        Err(e) => Response::failure(format!("internal serialisation failure: {e}"), None),
    }
}

fn fail(err: CoreError) -> Response {
    let suggestion = suggestion_for(&err);
    Response::failure(err.to_string(), suggestion)
}

fn suggestion_for(err: &CoreError) -> Option<String> {
    match err {
        CoreError::NotConnected => Some("launch or attach a target first".into()),
        CoreError::BadState { expected, .. } if *expected == "paused" => {
            Some("the target must be paused; set a breakpoint or run `jsdbg pause`".into())
        }
        CoreError::BadState { expected, .. } if *expected == "running" => {
            Some("the target is not running; `jsdbg continue` resumes it".into())
        }
        CoreError::BadState { expected, .. } if *expected == "idle" => {
            Some("a target is already active; `jsdbg stop` first".into())
        }
        CoreError::UnknownRef(_) => {
            Some("`jsdbg state` and `jsdbg break-ls` list current refs".into())
        }
        CoreError::ScriptNotFound(_) => Some("`jsdbg scripts` lists loaded scripts".into()),
        _ => None,
    }
}

/// Deserialize command arguments, treating absent args as `{}`.
fn parse<T: serde::de::DeserializeOwned>(args: Value) -> Result<T, Response> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args)
        .map_err(|e| Response::failure(format!("invalid arguments: {e}"), None))
}

macro_rules! args {
    ($ty:ty, $args:expr) => {
        match parse::<$ty>($args) {
            Ok(v) => v,
            Err(resp) => return resp,
        }
    };
}

async fn dispatch(session: &Session, request: Request) -> Response {
    let Request { cmd, args } = request;
    match cmd.as_str() {
        "ping" => ok(json!({"pong": true, "version": jsdbg_core::VERSION})),
        "status" => ok(session.status()),

        "launch" => {
            let a = args!(ipc::LaunchArgs, args);
            match session.launch(a.command, a.brk, a.port).await {
                Ok(status) => ok(status),
                Err(e) => fail(e),
            }
        }
        "attach" => {
            let a = args!(ipc::AttachArgs, args);
            match session.attach(&a.target).await {
                Ok(status) => ok(status),
                Err(e) => fail(e),
            }
        }
        "restart" => match session.restart().await {
            Ok(status) => ok(status),
            Err(e) => fail(e),
        },
        "stop" => {
            session.stop().await;
            ok(json!({"stopped": true}))
        }

        "state" => {
            let options = args!(StateOptions, args);
            match session.build_state(options).await {
                Ok(snapshot) => ok(snapshot),
                Err(e) => fail(e),
            }
        }
        "continue" => match session.resume().await {
            Ok(outcome) => ok(outcome),
            Err(e) => fail(e),
        },
        "step" => {
            let a = args!(ipc::StepArgs, args);
            match session.step(&a.mode).await {
                Ok(outcome) => ok(outcome),
                Err(e) => fail(e),
            }
        }
        "pause" => match session.pause().await {
            Ok(outcome) => ok(outcome),
            Err(e) => fail(e),
        },
        "run-to" => {
            let a = args!(ipc::RunToArgs, args);
            match session.run_to(&a.file, a.line).await {
                Ok(outcome) => ok(outcome),
                Err(e) => fail(e),
            }
        }
        "restart-frame" => {
            let a = args!(ipc::RestartFrameArgs, args);
            match session.restart_frame(a.frame_ref.as_deref()).await {
                Ok(outcome) => ok(outcome),
                Err(e) => fail(e),
            }
        }

        "break" => {
            let a = args!(ipc::BreakArgs, args);
            let options = BreakpointOptions {
                condition: a.condition,
                hit_count: a.hit_count,
                url_regex: a.url_regex,
                column: None,
            };
            match session.set_breakpoint(&a.file, a.line, options).await {
                Ok(set) => ok(set),
                Err(e) => fail(e),
            }
        }
        "break-rm" => {
            let a = args!(ipc::RefArgs, args);
            if a.handle == "all" {
                match session.remove_all_breakpoints().await {
                    Ok(count) => ok(json!({"removed": count})),
                    Err(e) => fail(e),
                }
            } else {
                match session.remove_breakpoint(&a.handle).await {
                    Ok(()) => ok(json!({"removed": a.handle})),
                    Err(e) => fail(e),
                }
            }
        }
        "break-ls" => ok(session.list_breakpoints()),
        "break-toggle" => {
            let a = args!(ipc::RefArgs, args);
            match session.toggle_breakpoint(&a.handle).await {
                Ok(outcome) => ok(outcome),
                Err(e) => fail(e),
            }
        }
        "breakable" => {
            let a = args!(ipc::BreakableArgs, args);
            match session
                .breakable_locations(&a.file, a.start_line, a.end_line)
                .await
            {
                Ok(locations) => ok(locations),
                Err(e) => fail(e),
            }
        }
        "logpoint" => {
            let a = args!(ipc::LogpointArgs, args);
            match session
                .set_logpoint(&a.file, a.line, &a.template, a.condition, a.max_emissions)
                .await
            {
                Ok(set) => ok(set),
                Err(e) => fail(e),
            }
        }
        "catch" => {
            let a = args!(ipc::CatchArgs, args);
            match session.set_exception_pause(&a.mode).await {
                Ok(mode) => ok(json!({"mode": mode})),
                Err(e) => fail(e),
            }
        }

        "source" => {
            let options = args!(SourceOptions, args);
            match session.get_source(options).await {
                Ok(source) => ok(source),
                Err(e) => fail(e),
            }
        }
        "scripts" => {
            let a = args!(ipc::ScriptsArgs, args);
            ok(session.get_scripts(a.filter.as_deref()))
        }
        "stack" => {
            let options = args!(StackOptions, args);
            match session.get_stack(options).await {
                Ok(stack) => ok(stack),
                Err(e) => fail(e),
            }
        }
        "search" => {
            let a = args!(ipc::SearchArgs, args);
            match session
                .search(&a.query, a.script_id.as_deref(), a.is_regex, a.case_sensitive)
                .await
            {
                Ok(hits) => ok(hits),
                Err(e) => fail(e),
            }
        }
        "console" => {
            let a = args!(ipc::ConsoleArgs, args);
            ok(session.console_messages(a.level.as_deref(), a.since, a.clear))
        }
        "exceptions" => {
            let a = args!(ipc::ExceptionsArgs, args);
            ok(session.exceptions(a.since))
        }

        "eval" => {
            let options = args!(EvalOptions, args);
            match session.eval(options).await {
                Ok(outcome) => ok(outcome),
                Err(e) => fail(e),
            }
        }
        "vars" => {
            let options = args!(VarsOptions, args);
            match session.get_vars(options).await {
                Ok(vars) => ok(vars),
                Err(e) => fail(e),
            }
        }
        "props" => {
            let a = args!(ipc::PropsArgs, args);
            match session.get_props(&a.handle, a.options).await {
                Ok(props) => ok(props),
                Err(e) => fail(e),
            }
        }

        "blackbox" => {
            let a = args!(ipc::BlackboxArgs, args);
            match session.blackbox_add(a.patterns).await {
                Ok(patterns) => ok(json!({"patterns": patterns})),
                Err(e) => fail(e),
            }
        }
        "blackbox-ls" => ok(json!({"patterns": session.blackbox_list()})),
        "blackbox-rm" => {
            let a = args!(ipc::BlackboxArgs, args);
            match session.blackbox_remove(a.patterns).await {
                Ok(patterns) => ok(json!({"patterns": patterns})),
                Err(e) => fail(e),
            }
        }

        "set" => {
            let a = args!(ipc::SetArgs, args);
            match session
                .set_variable(&a.name, &a.value, a.frame.as_deref())
                .await
            {
                Ok(outcome) => ok(outcome),
                Err(e) => fail(e),
            }
        }
        "set-return" => {
            let a = args!(ipc::SetReturnArgs, args);
            match session.set_return_value(&a.value).await {
                Ok(value) => ok(json!({"value": value})),
                Err(e) => fail(e),
            }
        }
        "hotpatch" => {
            let a = args!(ipc::HotpatchArgs, args);
            match session.hotpatch(&a.file, &a.source, a.dry_run).await {
                Ok(outcome) => ok(outcome),
                Err(e) => fail(e),
            }
        }

        "sourcemap" => {
            let a = args!(ipc::SourcemapArgs, args);
            ok(session.sourcemap_summaries(a.file.as_deref()))
        }
        "sourcemap-disable" => {
            session.sourcemap_disable();
            ok(json!({"disabled": true}))
        }

        // The schema is closed.
        other => Response::failure(
            format!("unknown command: {other}"),
            Some("`jsdbg --help` lists the available commands".into()),
        ),
    }
}
