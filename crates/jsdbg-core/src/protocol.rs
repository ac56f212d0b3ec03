//! Typed views of the inspector wire protocol.
//!
//! Requests are `{id, method, params?}`, responses `{id, result?, error?}`,
//! events `{method, params?}`. Only the payloads the engine consumes get a
//! struct here; request params are assembled as JSON at the call sites.
//!
//! The wire works in 0-based line/column numbers. Everything above the
//! protocol boundary is 1-based; conversion happens where these types are
//! read or built, never later.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Envelope ─────────────────────────────────────────────────────────────────

/// Protocol-level error attached to a response.
#[derive(Debug, Clone, Deserialize)]
pub struct WireError {
    pub code: i64,
    pub message: String,
}

/// One inbound frame: either a correlated response or an unsolicited event.
///
/// Frames matching neither shape are discarded by the transport.
#[derive(Debug)]
pub enum Inbound {
    Response {
        id: u32,
        result: Option<Value>,
        error: Option<WireError>,
    },
    Event {
        method: String,
        params: Value,
    },
}

impl Inbound {
    /// Classify a parsed JSON frame. Returns `None` for frames that are
    /// neither a response-with-id nor an event-with-method.
    pub fn classify(frame: Value) -> Option<Inbound> {
        let obj = frame.as_object()?;
        if let Some(id) = obj.get("id").and_then(Value::as_u64) {
            return Some(Inbound::Response {
                id: id as u32,
                result: obj.get("result").cloned(),
                error: obj
                    .get("error")
                    .cloned()
                    .and_then(|e| serde_json::from_value(e).ok()),
            });
        }
        if let Some(method) = obj.get("method").and_then(Value::as_str) {
            return Some(Inbound::Event {
                method: method.to_string(),
                params: obj.get("params").cloned().unwrap_or(Value::Null),
            });
        }
        None
    }
}

// ── Shared protocol objects ──────────────────────────────────────────────────

/// A position in a generated script (0-based on the wire).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub script_id: String,
    pub line_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_number: Option<u32>,
}

/// A value handle living in the remote runtime.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    /// `object`, `function`, `undefined`, `string`, `number`, `boolean`,
    /// `symbol`, `bigint`.
    #[serde(rename = "type", default)]
    pub object_type: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    /// Present for by-value primitives.
    #[serde(default)]
    pub value: Option<Value>,
    /// `Infinity`, `-Infinity`, `NaN`, `-0`, or a bigint literal.
    #[serde(default)]
    pub unserializable_value: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Present when the value lives remotely rather than by value.
    #[serde(default)]
    pub object_id: Option<String>,
}

/// One scope in a call frame's chain.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    /// `local`, `closure`, `module`, `block`, `script`, `catch`, `eval`,
    /// `with`, `wasm-expression-stack`, `global`.
    #[serde(rename = "type")]
    pub scope_type: String,
    pub object: RemoteObject,
    #[serde(default)]
    pub name: Option<String>,
}

/// A debugger-level call frame, valid only for the current pause.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFrame {
    pub call_frame_id: String,
    #[serde(default)]
    pub function_name: String,
    pub location: Location,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub scope_chain: Vec<Scope>,
    #[serde(default)]
    pub this: Option<RemoteObject>,
    #[serde(default)]
    pub return_value: Option<RemoteObject>,
}

/// A runtime-level stack frame (console/exception stack traces).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeCallFrame {
    #[serde(default)]
    pub function_name: String,
    #[serde(default)]
    pub script_id: String,
    #[serde(default)]
    pub url: String,
    pub line_number: u32,
    #[serde(default)]
    pub column_number: u32,
}

/// An async-aware stack trace attached to console and exception events.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTrace {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub call_frames: Vec<RuntimeCallFrame>,
}

/// Exception payload from evaluation responses and `exceptionThrown`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
    #[serde(default)]
    pub text: String,
    pub line_number: u32,
    #[serde(default)]
    pub column_number: u32,
    #[serde(default)]
    pub script_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub exception: Option<RemoteObject>,
    #[serde(default)]
    pub stack_trace: Option<StackTrace>,
}

impl ExceptionDetails {
    /// Best human-readable message: the thrown value's description when
    /// present, else the protocol's `text` field.
    pub fn message(&self) -> String {
        self.exception
            .as_ref()
            .and_then(|e| e.description.clone())
            .unwrap_or_else(|| self.text.clone())
    }
}

// ── Event payloads ───────────────────────────────────────────────────────────

/// `Debugger.paused`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PausedEvent {
    #[serde(default)]
    pub call_frames: Vec<CallFrame>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub hit_breakpoints: Vec<String>,
}

/// `Debugger.scriptParsed`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptParsedEvent {
    pub script_id: String,
    #[serde(default)]
    pub url: String,
    #[serde(rename = "sourceMapURL", default)]
    pub source_map_url: Option<String>,
}

/// `Runtime.consoleAPICalled`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleApiCalledEvent {
    #[serde(rename = "type", default)]
    pub level: String,
    #[serde(default)]
    pub args: Vec<RemoteObject>,
    /// Milliseconds since epoch.
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default)]
    pub stack_trace: Option<StackTrace>,
}

/// `Runtime.exceptionThrown`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionThrownEvent {
    #[serde(default)]
    pub timestamp: f64,
    pub exception_details: ExceptionDetails,
}

// ── Response payloads ────────────────────────────────────────────────────────

/// `Debugger.setBreakpointByUrl`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointByUrlResult {
    pub breakpoint_id: String,
    #[serde(default)]
    pub locations: Vec<Location>,
}

/// `Debugger.evaluateOnCallFrame`, `Runtime.evaluate`,
/// `Runtime.callFunctionOn`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResult {
    pub result: RemoteObject,
    #[serde(default)]
    pub exception_details: Option<ExceptionDetails>,
}

/// One property from `Runtime.getProperties`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDescriptor {
    pub name: String,
    #[serde(default)]
    pub value: Option<RemoteObject>,
    #[serde(default)]
    pub get: Option<RemoteObject>,
    #[serde(default)]
    pub set: Option<RemoteObject>,
    #[serde(default)]
    pub writable: Option<bool>,
    #[serde(default)]
    pub is_own: Option<bool>,
}

/// An internal (`[[...]]`) property from `Runtime.getProperties`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalPropertyDescriptor {
    pub name: String,
    #[serde(default)]
    pub value: Option<RemoteObject>,
}

/// `Runtime.getProperties`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPropertiesResult {
    #[serde(default)]
    pub result: Vec<PropertyDescriptor>,
    #[serde(default)]
    pub internal_properties: Vec<InternalPropertyDescriptor>,
    #[serde(default)]
    pub exception_details: Option<ExceptionDetails>,
}

/// One match from `Debugger.searchInContent`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMatch {
    pub line_number: u32,
    #[serde(default)]
    pub line_content: String,
}

/// A candidate pause position from `Debugger.getPossibleBreakpoints`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakLocation {
    pub script_id: String,
    pub line_number: u32,
    #[serde(default)]
    pub column_number: Option<u32>,
    #[serde(rename = "type", default)]
    pub break_type: Option<String>,
}

/// `Debugger.setScriptSource`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetScriptSourceResult {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub call_frames: Option<Vec<CallFrame>>,
    #[serde(default)]
    pub exception_details: Option<ExceptionDetails>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_response() {
        let frame: Value =
            serde_json::from_str(r#"{"id":3,"result":{"breakpointId":"1:0:0:a.js"}}"#).unwrap();
        match Inbound::classify(frame) {
            Some(Inbound::Response { id, result, error }) => {
                assert_eq!(id, 3);
                assert!(result.is_some());
                assert!(error.is_none());
            }
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn test_classify_event() {
        let frame: Value = serde_json::from_str(
            r#"{"method":"Debugger.resumed","params":{}}"#,
        )
        .unwrap();
        match Inbound::classify(frame) {
            Some(Inbound::Event { method, .. }) => assert_eq!(method, "Debugger.resumed"),
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn test_classify_rejects_unshaped_frames() {
        let frame: Value = serde_json::from_str(r#"{"hello":"world"}"#).unwrap();
        assert!(Inbound::classify(frame).is_none());
    }

    #[test]
    fn test_parse_script_parsed() {
        let params: Value = serde_json::from_str(
            r#"{"scriptId":"42","url":"file:///app/dist/app.js",
                "sourceMapURL":"app.js.map","startLine":0,"startColumn":0,
                "endLine":16,"endColumn":1542,"executionContextId":1,
                "hash":"0f8e","isLiveEdit":false,"hasSourceURL":false,
                "isModule":false,"length":1957}"#,
        )
        .unwrap();
        let ev: ScriptParsedEvent = serde_json::from_value(params).unwrap();
        assert_eq!(ev.script_id, "42");
        assert_eq!(ev.source_map_url.as_deref(), Some("app.js.map"));
    }

    #[test]
    fn test_parse_paused_event() {
        let params: Value = serde_json::from_str(
            r#"{"callFrames":[{"callFrameId":"{\"ordinal\":0}","functionName":"main",
                "location":{"scriptId":"42","lineNumber":4,"columnNumber":2},
                "url":"file:///app/dist/app.js",
                "scopeChain":[{"type":"local","object":{"type":"object","objectId":"7"}}],
                "this":{"type":"undefined"}}],
                "reason":"other","hitBreakpoints":["1:4:0:file:///app/dist/app.js"]}"#,
        )
        .unwrap();
        let ev: PausedEvent = serde_json::from_value(params).unwrap();
        assert_eq!(ev.call_frames.len(), 1);
        let frame = &ev.call_frames[0];
        assert_eq!(frame.function_name, "main");
        assert_eq!(frame.location.line_number, 4);
        assert_eq!(frame.scope_chain[0].scope_type, "local");
        assert_eq!(ev.hit_breakpoints.len(), 1);
    }
}
