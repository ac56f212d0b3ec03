//! Inspector event translation into session state.
//!
//! A fixed, closed set of event methods is wired up at connect time,
//! before any domain is enabled, so no early event can be missed. The
//! handlers run on the transport's I/O thread: they take the core lock
//! briefly, never send on the transport, and never block.

use std::sync::Arc;

use serde_json::Value;

use crate::buffers::{now_millis, ConsoleMessage, ExceptionEntry};
use crate::format::format_remote_object;
use crate::protocol::{
    ConsoleApiCalledEvent, ExceptionThrownEvent, PausedEvent, ScriptParsedEvent, StackTrace,
};
use crate::scripts::ScriptInfo;
use crate::session::{ExecState, PauseInfo, Shared};
use crate::transport::CdpTransport;

pub(crate) fn install(transport: &CdpTransport, shared: &Arc<Shared>) {
    let s = shared.clone();
    transport.on(
        "Debugger.paused",
        Arc::new(move |params| on_paused(&s, params)),
    );

    let s = shared.clone();
    transport.on(
        "Debugger.resumed",
        Arc::new(move |_params| on_resumed(&s)),
    );

    let s = shared.clone();
    transport.on(
        "Debugger.scriptParsed",
        Arc::new(move |params| on_script_parsed(&s, params)),
    );

    let s = shared.clone();
    transport.on(
        "Runtime.executionContextDestroyed",
        Arc::new(move |_params| on_context_destroyed(&s)),
    );

    let s = shared.clone();
    transport.on(
        "Runtime.consoleAPICalled",
        Arc::new(move |params| on_console(&s, params)),
    );

    let s = shared.clone();
    transport.on(
        "Runtime.exceptionThrown",
        Arc::new(move |params| on_exception(&s, params)),
    );
}

fn on_paused(shared: &Arc<Shared>, params: &Value) {
    let Ok(event) = serde_json::from_value::<PausedEvent>(params.clone()) else {
        return;
    };
    {
        let mut core = shared.core.lock().unwrap();
        let pause = event.call_frames.first().map(|top| {
            let url = if top.url.is_empty() {
                core.scripts
                    .url_of(&top.location.script_id)
                    .unwrap_or_default()
                    .to_string()
            } else {
                top.url.clone()
            };
            PauseInfo {
                reason: if event.reason.is_empty() {
                    "unknown".to_string()
                } else {
                    event.reason.clone()
                },
                script_id: top.location.script_id.clone(),
                url,
                line: top.location.line_number + 1,
                column: top.location.column_number.unwrap_or(0),
                call_frame_count: event.call_frames.len(),
            }
        });
        core.pause = pause;
        core.frames = event.call_frames;
        core.exec = ExecState::Paused;
    }
    shared.bump_pause();
}

fn on_resumed(shared: &Arc<Shared>) {
    let mut core = shared.core.lock().unwrap();
    core.exec = ExecState::Running;
    core.pause = None;
    core.frames.clear();
    core.refs.clear_volatile();
}

fn on_script_parsed(shared: &Arc<Shared>, params: &Value) {
    let Ok(event) = serde_json::from_value::<ScriptParsedEvent>(params.clone()) else {
        return;
    };
    let map_url = event.source_map_url.clone().filter(|u| !u.is_empty());
    {
        let mut core = shared.core.lock().unwrap();
        core.scripts.insert(ScriptInfo {
            script_id: event.script_id.clone(),
            url: event.url.clone(),
            source_map_url: map_url.clone(),
        });
    }
    // Fire-and-forget load; callers that race it simply miss the benefit.
    if let Some(map_url) = map_url {
        let resolver = shared.resolver.clone();
        shared.rt.spawn_blocking(move || {
            resolver.load_for_script(&event.script_id, &event.url, &map_url);
        });
    }
}

fn on_context_destroyed(shared: &Arc<Shared>) {
    // The child process may linger because the inspector keeps its loop
    // alive; debugging is over regardless.
    {
        let mut core = shared.core.lock().unwrap();
        core.exec = ExecState::Idle;
        core.pause = None;
        core.frames.clear();
    }
    shared.bump_exit();
}

fn on_console(shared: &Arc<Shared>, params: &Value) {
    let Ok(event) = serde_json::from_value::<ConsoleApiCalledEvent>(params.clone()) else {
        return;
    };
    let text = event
        .args
        .iter()
        .map(format_remote_object)
        .collect::<Vec<_>>()
        .join(" ");
    let location = event.stack_trace.as_ref().and_then(top_frame_location);
    let mut core = shared.core.lock().unwrap();
    core.console.push(ConsoleMessage {
        ts: if event.timestamp > 0.0 {
            event.timestamp as u64
        } else {
            now_millis()
        },
        level: event.level,
        text,
        location,
    });
}

fn on_exception(shared: &Arc<Shared>, params: &Value) {
    let Ok(event) = serde_json::from_value::<ExceptionThrownEvent>(params.clone()) else {
        return;
    };
    let details = &event.exception_details;
    let location = details.url.as_ref().map(|url| {
        format!("{url}:{}", details.line_number + 1)
    });
    let stack = details.stack_trace.as_ref().map(flatten_stack);
    let mut core = shared.core.lock().unwrap();
    core.exceptions.push(ExceptionEntry {
        ts: if event.timestamp > 0.0 {
            event.timestamp as u64
        } else {
            now_millis()
        },
        text: details.message(),
        location,
        stack,
    });
}

fn top_frame_location(stack: &StackTrace) -> Option<String> {
    let frame = stack.call_frames.first()?;
    if frame.url.is_empty() {
        return None;
    }
    Some(format!("{}:{}", frame.url, frame.line_number + 1))
}

fn flatten_stack(stack: &StackTrace) -> String {
    stack
        .call_frames
        .iter()
        .map(|f| {
            let name = if f.function_name.is_empty() {
                "<anonymous>"
            } else {
                &f.function_name
            };
            format!(
                "    at {name} ({}:{}:{})",
                f.url,
                f.line_number + 1,
                f.column_number + 1
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
