//! Control-socket wire types: newline-framed JSON, one request and one
//! response per line.
//!
//! The command schema is closed; the daemon rejects anything outside it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One CLI → daemon request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub cmd: String,
    #[serde(default)]
    pub args: Value,
}

impl Request {
    pub fn new(cmd: impl Into<String>, args: Value) -> Self {
        Self {
            cmd: cmd.into(),
            args,
        }
    }

    pub fn bare(cmd: impl Into<String>) -> Self {
        Self::new(cmd, Value::Null)
    }
}

/// One daemon → CLI response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Response {
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
            suggestion: None,
        }
    }

    pub fn failure(error: impl Into<String>, suggestion: Option<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error.into()),
            suggestion,
        }
    }
}

// ── Per-command argument shapes ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LaunchArgs {
    pub command: Vec<String>,
    #[serde(default)]
    pub brk: bool,
    #[serde(default)]
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct AttachArgs {
    pub target: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakArgs {
    pub file: String,
    pub line: u32,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub hit_count: Option<u32>,
    #[serde(default)]
    pub url_regex: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefArgs {
    #[serde(rename = "ref")]
    pub handle: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakableArgs {
    pub file: String,
    pub start_line: u32,
    pub end_line: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogpointArgs {
    pub file: String,
    pub line: u32,
    pub template: String,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub max_emissions: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CatchArgs {
    pub mode: String,
}

#[derive(Debug, Deserialize)]
pub struct RunToArgs {
    pub file: String,
    pub line: u32,
}

#[derive(Debug, Deserialize)]
pub struct StepArgs {
    #[serde(default = "default_step_mode")]
    pub mode: String,
}

fn default_step_mode() -> String {
    "over".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchArgs {
    pub query: String,
    #[serde(default)]
    pub script_id: Option<String>,
    #[serde(default)]
    pub is_regex: bool,
    #[serde(default)]
    pub case_sensitive: bool,
}

#[derive(Debug, Deserialize)]
pub struct ConsoleArgs {
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub since: Option<u64>,
    #[serde(default)]
    pub clear: bool,
}

#[derive(Debug, Deserialize)]
pub struct ExceptionsArgs {
    #[serde(default)]
    pub since: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PropsArgs {
    #[serde(rename = "ref")]
    pub handle: String,
    #[serde(flatten)]
    pub options: jsdbg_core::session::PropsOptions,
}

#[derive(Debug, Deserialize)]
pub struct BlackboxArgs {
    pub patterns: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetArgs {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub frame: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetReturnArgs {
    pub value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotpatchArgs {
    pub file: String,
    pub source: String,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartFrameArgs {
    #[serde(default)]
    pub frame_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScriptsArgs {
    #[serde(default)]
    pub filter: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SourcemapArgs {
    #[serde(default)]
    pub file: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_request_round_trip() {
        let req = Request::new("break", json!({"file": "a.ts", "line": 8}));
        let line = serde_json::to_string(&req).unwrap();
        let back: Request = serde_json::from_str(&line).unwrap();
        assert_eq!(back.cmd, "break");
        assert_eq!(back.args["line"], 8);
    }

    #[test]
    fn test_response_shapes() {
        let ok = Response::success(json!({"ref": "BP#1"}));
        let text = serde_json::to_string(&ok).unwrap();
        assert!(text.contains(r#""ok":true"#));
        assert!(!text.contains("error"));

        let err = Response::failure("not paused", Some("run `jsdbg pause` first".into()));
        let text = serde_json::to_string(&err).unwrap();
        assert!(text.contains(r#""ok":false"#));
        assert!(text.contains("suggestion"));
    }

    #[test]
    fn test_break_args_accept_camel_case() {
        let args: BreakArgs = serde_json::from_value(json!({
            "file": "app.ts", "line": 8, "hitCount": 3, "urlRegex": ".*"
        }))
        .unwrap();
        assert_eq!(args.hit_count, Some(3));
        assert_eq!(args.url_regex.as_deref(), Some(".*"));
    }

    #[test]
    fn test_ref_args_use_ref_key() {
        let args: RefArgs = serde_json::from_value(json!({"ref": "BP#2"})).unwrap();
        assert_eq!(args.handle, "BP#2");
    }
}
