//! In-process mock inspector endpoint for transport and session tests.
//!
//! Serves one WebSocket connection, answers requests with canned results,
//! and lets tests inject events (or raw frames) at any point.
#![allow(dead_code)] // each test binary uses a different slice of this

use std::net::TcpListener;
use std::sync::mpsc::{channel, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tungstenite::Message;

pub const SCRIPT_ID: &str = "1";
pub const SCRIPT_URL: &str = "file:///srv/app/main.js";

/// A canned `Debugger.paused` params payload at a 0-based line.
pub fn paused_params(line: u32) -> Value {
    json!({
        "callFrames": [{
            "callFrameId": "{\"ordinal\":0,\"injectedScriptId\":1}",
            "functionName": "main",
            "location": {"scriptId": SCRIPT_ID, "lineNumber": line, "columnNumber": 2},
            "url": SCRIPT_URL,
            "scopeChain": [
                {"type": "local", "object": {"type": "object", "objectId": "scope:0"}},
                {"type": "global", "object": {"type": "object", "objectId": "global:0"}}
            ],
            "this": {"type": "undefined"}
        }],
        "reason": "other",
        "hitBreakpoints": []
    })
}

pub fn script_parsed_params() -> Value {
    json!({
        "scriptId": SCRIPT_ID,
        "url": SCRIPT_URL,
        "sourceMapURL": ""
    })
}

enum Control {
    Frame(String),
}

pub struct MockInspector {
    url: String,
    requests: Arc<Mutex<Vec<(String, Value)>>>,
    control: Sender<Control>,
    /// When set, a `Debugger.resume` answer is followed by `resumed` and a
    /// `paused` event at this 0-based line.
    pause_on_resume: Arc<Mutex<Option<u32>>>,
}

impl MockInspector {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let requests: Arc<Mutex<Vec<(String, Value)>>> = Arc::new(Mutex::new(Vec::new()));
        let pause_on_resume: Arc<Mutex<Option<u32>>> = Arc::new(Mutex::new(None));
        let (control_tx, control_rx) = channel::<Control>();

        let thread_requests = requests.clone();
        let thread_pause = pause_on_resume.clone();
        std::thread::spawn(move || {
            let Ok((stream, _)) = listener.accept() else {
                return;
            };
            let mut ws = match tungstenite::accept(stream) {
                Ok(ws) => ws,
                Err(_) => return,
            };
            ws.get_ref()
                .set_read_timeout(Some(Duration::from_millis(10)))
                .unwrap();

            loop {
                while let Ok(Control::Frame(text)) = control_rx.try_recv() {
                    if ws.send(Message::Text(text.into())).is_err() {
                        return;
                    }
                }
                match ws.read() {
                    Ok(Message::Text(text)) => {
                        let Ok(frame) = serde_json::from_str::<Value>(&text) else {
                            continue;
                        };
                        let id = frame["id"].as_u64().unwrap_or(0);
                        let method = frame["method"].as_str().unwrap_or("").to_string();
                        let params = frame.get("params").cloned().unwrap_or(Value::Null);
                        thread_requests
                            .lock()
                            .unwrap()
                            .push((method.clone(), params.clone()));

                        if let Some(result) = canned_result(&method, &params) {
                            let reply = json!({"id": id, "result": result});
                            if ws.send(Message::Text(reply.to_string().into())).is_err() {
                                return;
                            }
                        }
                        if method == "Debugger.resume" {
                            let resumed = json!({"method": "Debugger.resumed", "params": {}});
                            let _ = ws.send(Message::Text(resumed.to_string().into()));
                            if let Some(line) = *thread_pause.lock().unwrap() {
                                let paused = json!({
                                    "method": "Debugger.paused",
                                    "params": paused_params(line)
                                });
                                let _ = ws.send(Message::Text(paused.to_string().into()));
                            }
                        }
                        if method == "Test.close" {
                            let _ = ws.close(None);
                            let _ = ws.flush();
                            return;
                        }
                    }
                    Ok(_) => {}
                    Err(tungstenite::Error::Io(e))
                        if e.kind() == std::io::ErrorKind::WouldBlock
                            || e.kind() == std::io::ErrorKind::TimedOut =>
                    {
                        continue;
                    }
                    Err(_) => return,
                }
            }
        });

        Self {
            url: format!("ws://{addr}"),
            requests,
            control: control_tx,
            pause_on_resume,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn set_pause_on_resume(&self, line: Option<u32>) {
        *self.pause_on_resume.lock().unwrap() = line;
    }

    pub fn inject_event(&self, method: &str, params: Value) {
        let frame = json!({"method": method, "params": params});
        let _ = self.control.send(Control::Frame(frame.to_string()));
    }

    pub fn inject_raw(&self, text: &str) {
        let _ = self.control.send(Control::Frame(text.to_string()));
    }

    pub fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_named(&self, method: &str) -> Vec<Value> {
        self.requests()
            .into_iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p)
            .collect()
    }
}

fn canned_result(method: &str, params: &Value) -> Option<Value> {
    let result = match method {
        "Test.noReply" => return None,
        "Test.echo" => params.clone(),
        "Debugger.setBreakpointByUrl" => json!({
            "breakpointId": format!("bp:{}", params["lineNumber"]),
            "locations": [{
                "scriptId": SCRIPT_ID,
                "lineNumber": params["lineNumber"],
                "columnNumber": 0
            }]
        }),
        "Runtime.getProperties" => json!({
            "result": [
                {
                    "name": "obj",
                    "value": {
                        "type": "object", "className": "Object",
                        "description": "Object", "objectId": "obj:1"
                    }
                },
                {
                    "name": "count",
                    "value": {"type": "number", "value": 42, "description": "42"}
                },
                {
                    "name": "__internal",
                    "value": {"type": "number", "value": 1, "description": "1"}
                }
            ],
            "internalProperties": []
        }),
        "Debugger.evaluateOnCallFrame" | "Runtime.callFunctionOn" => json!({
            "result": {"type": "number", "value": 42, "description": "42"}
        }),
        "Debugger.getScriptSource" => {
            json!({"scriptSource": "line one\nline two\nline three\nline four\nline five\n"})
        }
        "Debugger.searchInContent" => json!({
            "result": [{"lineNumber": 2, "lineContent": "const answer = 42;"}]
        }),
        "Debugger.getPossibleBreakpoints" => json!({
            "locations": [
                {"scriptId": SCRIPT_ID, "lineNumber": 2, "columnNumber": 0},
                {"scriptId": SCRIPT_ID, "lineNumber": 3, "columnNumber": 4}
            ]
        }),
        "Debugger.setScriptSource" => json!({"status": "Ok"}),
        _ => json!({}),
    };
    Some(result)
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_for(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
