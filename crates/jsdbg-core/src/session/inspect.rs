//! Inspection commands: state snapshots, variables, evaluation, object
//! properties, source windows, script listings, stacks, and content search.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Error, Result};
use crate::format::{format_remote_object, type_label};
use crate::protocol::{
    BreakLocation as WireBreakLocation, EvaluateResult, GetPropertiesResult, SearchMatch,
};
use crate::refs::RefKind;
use crate::session::{ExecState, Session};

pub type ScriptListing = crate::scripts::ScriptInfo;

// ── Options ──────────────────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}

fn default_window() -> u32 {
    3
}

/// Sections and knobs for `build_state`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateOptions {
    #[serde(default = "default_true")]
    pub vars: bool,
    #[serde(default = "default_true")]
    pub stack: bool,
    #[serde(default = "default_true")]
    pub breakpoints: bool,
    #[serde(default = "default_true")]
    pub code: bool,
    /// Accepted pass-through preference.
    #[serde(default)]
    pub compact: bool,
    /// Accepted pass-through preference.
    #[serde(default)]
    pub depth: Option<u32>,
    /// Context lines around the current line in the code section.
    #[serde(default = "default_window")]
    pub lines: u32,
    #[serde(default)]
    pub frame: Option<String>,
    #[serde(default)]
    pub all_scopes: bool,
    /// Report generated-script coordinates, skipping source maps.
    #[serde(default)]
    pub generated: bool,
}

impl Default for StateOptions {
    fn default() -> Self {
        Self {
            vars: true,
            stack: true,
            breakpoints: true,
            code: true,
            compact: false,
            depth: None,
            lines: default_window(),
            frame: None,
            all_scopes: false,
            generated: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VarsOptions {
    #[serde(default)]
    pub frame: Option<String>,
    /// Restrict to these names when present.
    #[serde(default)]
    pub names: Option<Vec<String>>,
    #[serde(default)]
    pub all_scopes: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropsOptions {
    #[serde(default = "default_true")]
    pub own: bool,
    #[serde(default)]
    pub internal: bool,
    /// Accepted pass-through preference.
    #[serde(default)]
    pub depth: Option<u32>,
}

impl Default for PropsOptions {
    fn default() -> Self {
        Self {
            own: true,
            internal: false,
            depth: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceOptions {
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub lines: Option<u32>,
    #[serde(default)]
    pub all: bool,
    #[serde(default)]
    pub generated: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackOptions {
    #[serde(default)]
    pub async_depth: Option<u32>,
    #[serde(default)]
    pub generated: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalOptions {
    pub expression: String,
    #[serde(default)]
    pub frame: Option<String>,
    #[serde(default)]
    pub await_promise: bool,
    #[serde(default)]
    pub throw_on_side_effect: bool,
    /// Evaluation timeout in milliseconds, forwarded to the runtime.
    #[serde(default)]
    pub timeout: Option<u64>,
}

// ── Results ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationOut {
    pub url: String,
    pub line: u32,
    pub column: u32,
    pub script_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceLine {
    pub line: u32,
    pub text: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub current: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceText {
    pub path: String,
    pub lines: Vec<SourceLine>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VarEntry {
    #[serde(rename = "ref")]
    pub handle: String,
    pub name: String,
    pub value: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub scope: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameEntry {
    #[serde(rename = "ref")]
    pub handle: String,
    pub index: usize,
    pub function_name: String,
    pub url: String,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub status: ExecState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationOut>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceText>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locals: Option<Vec<VarEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<Vec<FrameEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakpoint_count: Option<usize>,
    /// Echoed pass-through preferences.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub compact: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
}

impl StateSnapshot {
    fn idle_projection(status: ExecState) -> Self {
        Self {
            status,
            reason: None,
            location: None,
            source: None,
            locals: None,
            stack: None,
            breakpoint_count: None,
            compact: false,
            depth: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalOutcome {
    #[serde(rename = "ref")]
    pub handle: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropEntry {
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub script_id: String,
    pub url: String,
    pub line: u32,
    pub column: u32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakableLocation {
    pub line: u32,
    pub column: u32,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub break_type: Option<String>,
}

// ── Scope policy ─────────────────────────────────────────────────────────────

/// Which scope kinds the vars section includes. `closure` is opt-in,
/// `global` always excluded.
fn include_scope(kind: &str, all_scopes: bool) -> bool {
    match kind {
        "local" | "module" | "block" | "script" | "catch" | "eval" | "with" => true,
        "closure" => all_scopes,
        _ => false,
    }
}

fn handle_pattern() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"@[vof]\d+").expect("static regex"))
}

/// Synthetic remote ids minted for primitives; they cannot be expanded or
/// interpolated.
fn is_synthetic_id(remote_id: &str) -> bool {
    remote_id.starts_with("eval:") || remote_id.starts_with("primitive:")
}

// ── Commands ─────────────────────────────────────────────────────────────────

impl Session {
    /// Full session snapshot. Returns only the status when not paused.
    pub async fn build_state(&self, options: StateOptions) -> Result<StateSnapshot> {
        if self.state() != ExecState::Paused {
            return Ok(StateSnapshot::idle_projection(self.state()));
        }
        let (_, frame) = self.select_frame(options.frame.as_deref())?;

        // Volatile handles from the previous pause snapshot die here.
        self.shared.core.lock().unwrap().refs.clear_volatile();

        let location = self.display_location(&frame, options.generated);
        let reason = self
            .shared
            .core
            .lock()
            .unwrap()
            .pause
            .as_ref()
            .map(|p| p.reason.clone());

        let source = if options.code {
            self.source_window(&frame, &location, options.lines, options.generated)
                .await
        } else {
            None
        };

        let stack = if options.stack {
            Some(self.stack_entries(options.generated))
        } else {
            None
        };

        let locals = if options.vars {
            Some(self.collect_vars(&frame, options.all_scopes, None).await?)
        } else {
            None
        };

        let breakpoint_count = if options.breakpoints {
            Some(
                self.shared
                    .core
                    .lock()
                    .unwrap()
                    .refs
                    .list(RefKind::Breakpoint)
                    .len(),
            )
        } else {
            None
        };

        Ok(StateSnapshot {
            status: ExecState::Paused,
            reason,
            location: Some(location),
            source,
            locals,
            stack,
            breakpoint_count,
            compact: options.compact,
            depth: options.depth,
        })
    }

    /// Scope variables of the selected frame.
    pub async fn get_vars(&self, options: VarsOptions) -> Result<Vec<VarEntry>> {
        let (_, frame) = self.select_frame(options.frame.as_deref())?;
        self.shared.core.lock().unwrap().refs.clear_volatile();
        self.collect_vars(&frame, options.all_scopes, options.names.as_deref())
            .await
    }

    /// Evaluate an expression on the selected frame, with `@v`/`@o`/`@f`
    /// handle interpolation.
    pub async fn eval(&self, options: EvalOptions) -> Result<EvalOutcome> {
        let (_, frame) = self.select_frame(options.frame.as_deref())?;
        let transport = self.transport_handle()?;

        // Collect interpolated handles in order of first appearance.
        let mut handles: Vec<String> = Vec::new();
        for m in handle_pattern().find_iter(&options.expression) {
            let h = m.as_str().to_string();
            if !handles.contains(&h) {
                handles.push(h);
            }
        }

        let result = if handles.is_empty() {
            let mut params = json!({
                "callFrameId": frame.call_frame_id,
                "expression": options.expression,
                "returnByValue": false,
                "generatePreview": false,
            });
            if options.throw_on_side_effect {
                params["throwOnSideEffect"] = json!(true);
            }
            if let Some(ms) = options.timeout {
                params["timeout"] = json!(ms);
            }
            let value = transport
                .send("Debugger.evaluateOnCallFrame", Some(params))
                .await?;
            let mut result: EvaluateResult = parse_result(value)?;
            if options.await_promise
                && result.result.subtype.as_deref() == Some("promise")
            {
                if let Some(promise_id) = result.result.object_id.clone() {
                    let value = transport
                        .send(
                            "Runtime.awaitPromise",
                            Some(json!({
                                "promiseObjectId": promise_id,
                                "returnByValue": false,
                            })),
                        )
                        .await?;
                    result = parse_result(value)?;
                }
            }
            result
        } else {
            self.eval_with_handles(&transport, &frame, &options, &handles)
                .await?
        };

        if let Some(details) = result.exception_details {
            return Err(Error::EvalFailed(details.message()));
        }

        let object_id = result.result.object_id.clone();
        let remote_id = object_id
            .clone()
            .unwrap_or_else(|| format!("eval:{}", crate::buffers::now_millis()));
        let handle = self
            .shared
            .core
            .lock()
            .unwrap()
            .refs
            .add_variable(remote_id, Some(options.expression.clone()));

        Ok(EvalOutcome {
            handle,
            type_name: type_label(&result.result),
            value: format_remote_object(&result.result),
            object_id,
        })
    }

    /// Rewrite handle mentions into parameters of a wrapper function and
    /// call it with the handles' remote objects as arguments.
    async fn eval_with_handles(
        &self,
        transport: &crate::transport::CdpTransport,
        frame: &crate::protocol::CallFrame,
        options: &EvalOptions,
        handles: &[String],
    ) -> Result<EvaluateResult> {
        let mut object_ids: Vec<String> = Vec::with_capacity(handles.len());
        {
            let core = self.shared.core.lock().unwrap();
            for h in handles {
                let entry = core
                    .refs
                    .resolve(h)
                    .ok_or_else(|| Error::UnknownRef(h.clone()))?;
                let id = match entry.kind {
                    RefKind::Variable | RefKind::Object => {
                        if is_synthetic_id(&entry.remote_id) {
                            return Err(Error::EvalFailed(format!(
                                "{h} holds a primitive value; use its literal instead"
                            )));
                        }
                        entry.remote_id.clone()
                    }
                    // A frame has no wire object id; bind its innermost
                    // scope object.
                    RefKind::Frame => frame
                        .scope_chain
                        .first()
                        .and_then(|s| s.object.object_id.clone())
                        .ok_or_else(|| {
                            Error::EvalFailed(format!("{h} has no addressable scope object"))
                        })?,
                    _ => {
                        return Err(Error::BadRefKind {
                            handle: h.clone(),
                            expected: "value",
                        })
                    }
                };
                object_ids.push(id);
            }
        }

        let rewritten = handle_pattern()
            .replace_all(&options.expression, |caps: &regex::Captures<'_>| {
                let matched = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
                match handles.iter().position(|h| h == matched) {
                    Some(i) => format!("__jsdbg_ref_{i}"),
                    None => matched.to_string(),
                }
            })
            .into_owned();

        let params: Vec<String> = (0..handles.len())
            .map(|i| format!("__jsdbg_ref_{i}"))
            .collect();
        let declaration = format!(
            "function({}) {{ return ({rewritten}); }}",
            params.join(", ")
        );
        let arguments: Vec<serde_json::Value> = object_ids
            .iter()
            .map(|id| json!({"objectId": id}))
            .collect();

        let value = transport
            .send(
                "Runtime.callFunctionOn",
                Some(json!({
                    "functionDeclaration": declaration,
                    "objectId": object_ids[0],
                    "arguments": arguments,
                    "returnByValue": false,
                    "awaitPromise": options.await_promise,
                    "throwOnSideEffect": options.throw_on_side_effect,
                })),
            )
            .await?;
        parse_result(value)
    }

    /// Expand a value handle into its properties.
    pub async fn get_props(&self, handle: &str, options: PropsOptions) -> Result<Vec<PropEntry>> {
        let object_id = {
            let core = self.shared.core.lock().unwrap();
            let entry = core
                .refs
                .resolve(handle)
                .ok_or_else(|| Error::UnknownRef(handle.to_string()))?;
            if !matches!(entry.kind, RefKind::Variable | RefKind::Object) {
                return Err(Error::BadRefKind {
                    handle: handle.to_string(),
                    expected: "value",
                });
            }
            if is_synthetic_id(&entry.remote_id) {
                return Err(Error::invalid(
                    "ref",
                    format!("{handle} holds a primitive value with no properties"),
                ));
            }
            entry.remote_id.clone()
        };

        let transport = self.transport_handle()?;
        let value = transport
            .send(
                "Runtime.getProperties",
                Some(json!({
                    "objectId": object_id,
                    "ownProperties": options.own,
                    "accessorPropertiesOnly": false,
                    "generatePreview": false,
                })),
            )
            .await?;
        let result: GetPropertiesResult = parse_result(value)?;
        if let Some(details) = result.exception_details {
            return Err(Error::EvalFailed(details.message()));
        }

        let mut core = self.shared.core.lock().unwrap();
        let mut out = Vec::new();
        for prop in result.result {
            let entry = match &prop.value {
                Some(value) => PropEntry {
                    handle: value
                        .object_id
                        .clone()
                        .map(|id| core.refs.add_object(id, Some(prop.name.clone()))),
                    name: prop.name,
                    type_name: type_label(value),
                    value: format_remote_object(value),
                },
                // Accessor without a value: show the descriptor itself.
                None => PropEntry {
                    handle: None,
                    name: prop.name,
                    type_name: "function".to_string(),
                    value: "getter/setter".to_string(),
                },
            };
            out.push(entry);
        }
        if options.internal {
            for prop in result.internal_properties {
                let name = if prop.name.starts_with("[[") {
                    prop.name
                } else {
                    format!("[[{}]]", prop.name)
                };
                let (type_name, value, handle) = match &prop.value {
                    Some(v) => (
                        type_label(v),
                        format_remote_object(v),
                        v.object_id
                            .clone()
                            .map(|id| core.refs.add_object(id, Some(name.clone()))),
                    ),
                    None => ("undefined".to_string(), "undefined".to_string(), None),
                };
                out.push(PropEntry {
                    handle,
                    name,
                    type_name,
                    value,
                });
            }
        }
        Ok(out)
    }

    /// Source text around the current line, or of a named file.
    pub async fn get_source(&self, options: SourceOptions) -> Result<SourceText> {
        let window = options.lines.unwrap_or(10);

        let (script_id, center) = match &options.file {
            Some(file) => {
                let script_id = self.find_script_for_path(file)?;
                let center = {
                    let core = self.shared.core.lock().unwrap();
                    core.pause
                        .as_ref()
                        .filter(|p| p.script_id == script_id)
                        .map(|p| (p.line, p.column))
                };
                (script_id, center)
            }
            None => {
                let core = self.shared.core.lock().unwrap();
                let pause = core.pause.as_ref().ok_or(Error::BadState {
                    expected: "paused",
                    actual: core.exec.describe(),
                })?;
                (pause.script_id.clone(), Some((pause.line, pause.column)))
            }
        };

        let mapped = !options.generated
            && !self.shared.resolver.is_disabled()
            && self.shared.resolver.has_map(&script_id);

        let (path, text, center_line) = if mapped {
            let original = self
                .shared
                .resolver
                .original_source(&script_id, options.file.as_deref())
                .or_else(|| self.shared.resolver.original_source(&script_id, None));
            match original {
                Some(text) => {
                    let display = center.and_then(|(line, column)| {
                        self.shared
                            .resolver
                            .resolve_display(&script_id, line, column)
                    });
                    let path = display
                        .as_ref()
                        .map(|d| d.source.clone())
                        .or_else(|| options.file.clone())
                        .unwrap_or_else(|| script_id.clone());
                    (path, text, display.map(|d| d.line))
                }
                None => self.generated_source(&script_id, center).await?,
            }
        } else {
            self.generated_source(&script_id, center).await?
        };

        let lines = window_lines(&text, center_line, window, options.all);
        Ok(SourceText { path, lines })
    }

    async fn generated_source(
        &self,
        script_id: &str,
        center: Option<(u32, u32)>,
    ) -> Result<(String, String, Option<u32>)> {
        let transport = self.transport_handle()?;
        let value = transport
            .send(
                "Debugger.getScriptSource",
                Some(json!({"scriptId": script_id})),
            )
            .await?;
        let text = value["scriptSource"].as_str().unwrap_or_default().to_string();
        let url = self
            .shared
            .core
            .lock()
            .unwrap()
            .scripts
            .url_of(script_id)
            .unwrap_or(script_id)
            .to_string();
        Ok((url, text, center.map(|(line, _)| line)))
    }

    /// Loaded scripts, optionally filtered by URL substring.
    pub fn get_scripts(&self, filter: Option<&str>) -> Vec<ScriptListing> {
        let core = self.shared.core.lock().unwrap();
        core.scripts.list(filter).into_iter().cloned().collect()
    }

    /// The current call stack with fresh frame handles.
    pub async fn get_stack(&self, options: StackOptions) -> Result<Vec<FrameEntry>> {
        self.require_state(ExecState::Paused)?;
        if let Some(depth) = options.async_depth {
            let transport = self.transport_handle()?;
            let _ = transport
                .send(
                    "Debugger.setAsyncCallStackDepth",
                    Some(json!({"maxDepth": depth})),
                )
                .await;
        }
        Ok(self.stack_entries(options.generated))
    }

    /// Per-script content search. Scripts that error are skipped silently.
    pub async fn search(
        &self,
        query: &str,
        script_id: Option<&str>,
        is_regex: bool,
        case_sensitive: bool,
    ) -> Result<Vec<SearchHit>> {
        let transport = self.transport_handle()?;
        let scripts: Vec<(String, String)> = {
            let core = self.shared.core.lock().unwrap();
            core.scripts
                .list(None)
                .into_iter()
                .filter(|s| script_id.is_none_or(|id| s.script_id == id))
                .map(|s| (s.script_id.clone(), s.url.clone()))
                .collect()
        };

        let mut hits = Vec::new();
        for (id, url) in scripts {
            let Ok(value) = transport
                .send(
                    "Debugger.searchInContent",
                    Some(json!({
                        "scriptId": id,
                        "query": query,
                        "caseSensitive": case_sensitive,
                        "isRegex": is_regex,
                    })),
                )
                .await
            else {
                // Garbage-collected scripts error; skip them.
                continue;
            };
            let matches: Vec<SearchMatch> =
                serde_json::from_value(value["result"].clone()).unwrap_or_default();
            for m in matches {
                let column = if is_regex {
                    1
                } else if case_sensitive {
                    m.line_content.find(query).map(|i| i as u32 + 1).unwrap_or(1)
                } else {
                    m.line_content
                        .to_lowercase()
                        .find(&query.to_lowercase())
                        .map(|i| i as u32 + 1)
                        .unwrap_or(1)
                };
                hits.push(SearchHit {
                    script_id: id.clone(),
                    url: url.clone(),
                    line: m.line_number + 1,
                    column,
                    text: m.line_content.trim_end().to_string(),
                });
            }
        }
        Ok(hits)
    }

    /// Candidate pause positions in a line range of a file.
    pub async fn breakable_locations(
        &self,
        file: &str,
        start_line: u32,
        end_line: u32,
    ) -> Result<Vec<BreakableLocation>> {
        if start_line == 0 || end_line < start_line {
            return Err(Error::invalid("startLine", "need 1 <= startLine <= endLine"));
        }

        // Translate through the source map when the file is an original
        // source; otherwise match a loaded script by suffix.
        let (script_id, gen_start, gen_end, mapped) = if let Some(gen) = self
            .shared
            .resolver
            .to_generated(file, start_line, 0)
        {
            let gen_end = self
                .shared
                .resolver
                .to_generated(file, end_line, 0)
                .map(|g| g.line)
                .unwrap_or(gen.line + (end_line - start_line));
            (gen.script_id.clone(), gen.line, gen_end, true)
        } else {
            let script_id = {
                let core = self.shared.core.lock().unwrap();
                core.scripts
                    .find_by_url_suffix(file)
                    .map(|s| s.script_id.clone())
            }
            .ok_or_else(|| Error::ScriptNotFound(file.to_string()))?;
            (script_id, start_line, end_line, false)
        };

        let transport = self.transport_handle()?;
        let value = transport
            .send(
                "Debugger.getPossibleBreakpoints",
                Some(json!({
                    "start": {"scriptId": script_id, "lineNumber": gen_start - 1, "columnNumber": 0},
                    "end": {"scriptId": script_id, "lineNumber": gen_end},
                    "restrictToFunction": false,
                })),
            )
            .await?;
        let locations: Vec<WireBreakLocation> =
            serde_json::from_value(value["locations"].clone()).unwrap_or_default();

        let mut out = Vec::new();
        for loc in locations {
            let line = loc.line_number + 1;
            let column = loc.column_number.unwrap_or(0);
            let display = if mapped {
                self.shared
                    .resolver
                    .to_original(&script_id, line, column)
                    .map(|orig| (orig.line, orig.column))
                    .unwrap_or((line, column))
            } else {
                (line, column)
            };
            out.push(BreakableLocation {
                line: display.0,
                column: display.1,
                break_type: loc.break_type,
            });
        }
        out.dedup_by(|a, b| a.line == b.line && a.column == b.column);
        Ok(out)
    }

    // ── Shared builders ──────────────────────────────────────────────────────

    pub(crate) fn find_script_for_path(&self, path: &str) -> Result<String> {
        {
            let core = self.shared.core.lock().unwrap();
            if let Some(script) = core.scripts.find_by_url_suffix(path) {
                return Ok(script.script_id.clone());
            }
        }
        self.shared
            .resolver
            .find_script_for_source(path)
            .map(|g| g.script_id)
            .ok_or_else(|| Error::ScriptNotFound(path.to_string()))
    }

    fn display_location(&self, frame: &crate::protocol::CallFrame, generated: bool) -> LocationOut {
        let script_id = frame.location.script_id.clone();
        let gen_line = frame.location.line_number + 1;
        let gen_col = frame.location.column_number.unwrap_or(0);
        let url = if frame.url.is_empty() {
            self.shared
                .core
                .lock()
                .unwrap()
                .scripts
                .url_of(&script_id)
                .unwrap_or_default()
                .to_string()
        } else {
            frame.url.clone()
        };

        if !generated {
            if let Some(orig) = self
                .shared
                .resolver
                .resolve_display(&script_id, gen_line, gen_col)
            {
                return LocationOut {
                    url: orig.source,
                    line: orig.line,
                    column: orig.column,
                    script_id,
                };
            }
        }
        LocationOut {
            url,
            line: gen_line,
            column: gen_col,
            script_id,
        }
    }

    fn stack_entries(&self, generated: bool) -> Vec<FrameEntry> {
        let frames: Vec<crate::protocol::CallFrame> =
            self.shared.core.lock().unwrap().frames.clone();

        let mut entries = Vec::with_capacity(frames.len());
        for (index, frame) in frames.iter().enumerate() {
            let location = self.display_location(frame, generated);
            // Prefer the original-source symbol name when the map has one.
            let function_name = if generated {
                frame.function_name.clone()
            } else {
                self.shared
                    .resolver
                    .to_original(
                        &frame.location.script_id,
                        frame.location.line_number + 1,
                        frame.location.column_number.unwrap_or(0),
                    )
                    .and_then(|o| o.name)
                    .unwrap_or_else(|| frame.function_name.clone())
            };
            let display_name = if function_name.is_empty() {
                "<anonymous>".to_string()
            } else {
                function_name
            };

            let handle = self.shared.core.lock().unwrap().refs.add_frame(
                frame.call_frame_id.clone(),
                Some(display_name.clone()),
                index,
            );
            entries.push(FrameEntry {
                handle,
                index,
                function_name: display_name,
                url: location.url,
                line: location.line,
                column: location.column,
            });
        }
        entries
    }

    async fn source_window(
        &self,
        frame: &crate::protocol::CallFrame,
        location: &LocationOut,
        span: u32,
        generated: bool,
    ) -> Option<SourceText> {
        let script_id = &frame.location.script_id;
        let mapped = !generated
            && !self.shared.resolver.is_disabled()
            && self.shared.resolver.has_map(script_id);

        let (path, text, center) = if mapped {
            let original = self
                .shared
                .resolver
                .original_source(script_id, Some(&location.url))
                .or_else(|| self.shared.resolver.original_source(script_id, None));
            match original {
                Some(text) => (location.url.clone(), text, Some(location.line)),
                None => self
                    .generated_source(script_id, Some((frame.location.line_number + 1, 0)))
                    .await
                    .ok()?,
            }
        } else {
            self.generated_source(script_id, Some((frame.location.line_number + 1, 0)))
                .await
                .ok()?
        };

        Some(SourceText {
            path,
            lines: window_lines(&text, center, span, false),
        })
    }

    async fn collect_vars(
        &self,
        frame: &crate::protocol::CallFrame,
        all_scopes: bool,
        names: Option<&[String]>,
    ) -> Result<Vec<VarEntry>> {
        let transport = self.transport_handle()?;
        let scopes: Vec<(String, String)> = frame
            .scope_chain
            .iter()
            .filter(|s| include_scope(&s.scope_type, all_scopes))
            .filter_map(|s| {
                s.object
                    .object_id
                    .clone()
                    .map(|id| (s.scope_type.clone(), id))
            })
            .collect();

        let mut out = Vec::new();
        for (scope_type, object_id) in scopes {
            let Ok(value) = transport
                .send(
                    "Runtime.getProperties",
                    Some(json!({
                        "objectId": object_id,
                        "ownProperties": true,
                        "accessorPropertiesOnly": false,
                        "generatePreview": false,
                    })),
                )
                .await
            else {
                continue;
            };
            let Ok(result) = serde_json::from_value::<GetPropertiesResult>(value) else {
                continue;
            };

            let mut core = self.shared.core.lock().unwrap();
            for prop in result.result {
                if prop.name.starts_with("__") {
                    continue;
                }
                if let Some(names) = names {
                    if !names.iter().any(|n| n == &prop.name) {
                        continue;
                    }
                }
                let Some(value) = prop.value else {
                    continue;
                };
                let remote_id = value.object_id.clone().unwrap_or_else(|| {
                    format!("primitive:{}", crate::buffers::now_millis())
                });
                let handle = core.refs.add_variable(remote_id, Some(prop.name.clone()));
                out.push(VarEntry {
                    handle,
                    name: prop.name,
                    value: format_remote_object(&value),
                    type_name: type_label(&value),
                    scope: scope_type.clone(),
                });
            }
        }
        Ok(out)
    }
}

fn parse_result<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| Error::TransportFailed(format!("malformed protocol result: {e}")))
}

/// Cut a window of lines around `center` (1-based), marking the current
/// line. `all` or an unknown center returns every line.
fn window_lines(text: &str, center: Option<u32>, span: u32, all: bool) -> Vec<SourceLine> {
    let lines: Vec<&str> = text.lines().collect();
    let total = lines.len() as u32;

    let (start, end) = match (all, center) {
        (true, _) | (false, None) => (1, total),
        (false, Some(center)) => {
            let start = center.saturating_sub(span).max(1);
            let end = center.saturating_add(span).min(total);
            (start, end)
        }
    };

    (start..=end)
        .filter_map(|n| {
            lines.get(n as usize - 1).map(|text| SourceLine {
                line: n,
                text: (*text).to_string(),
                current: center == Some(n),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_policy() {
        for kind in ["local", "module", "block", "script", "catch", "eval", "with"] {
            assert!(include_scope(kind, false), "{kind} should be included");
        }
        assert!(!include_scope("closure", false));
        assert!(include_scope("closure", true));
        assert!(!include_scope("global", false));
        assert!(!include_scope("global", true));
        assert!(!include_scope("wasm-expression-stack", false));
    }

    #[test]
    fn test_handle_pattern_finds_all_kinds() {
        let hits: Vec<&str> = handle_pattern()
            .find_iter("@v1.count + @o12.x + @f0")
            .map(|m| m.as_str())
            .collect();
        assert_eq!(hits, vec!["@v1", "@o12", "@f0"]);
    }

    #[test]
    fn test_window_lines_marks_current() {
        let text = "one\ntwo\nthree\nfour\nfive";
        let lines = window_lines(text, Some(3), 1, false);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].line, 2);
        assert!(lines[1].current);
        assert_eq!(lines[2].text, "four");
    }

    #[test]
    fn test_window_lines_clamps_at_edges() {
        let text = "one\ntwo\nthree";
        let lines = window_lines(text, Some(1), 3, false);
        assert_eq!(lines.first().map(|l| l.line), Some(1));
        assert_eq!(lines.last().map(|l| l.line), Some(3));
    }

    #[test]
    fn test_window_lines_all() {
        let text = "a\nb\nc";
        assert_eq!(window_lines(text, Some(2), 1, true).len(), 3);
        assert_eq!(window_lines(text, None, 1, false).len(), 3);
    }

    #[test]
    fn test_state_options_defaults() {
        let opts: StateOptions = serde_json::from_str("{}").unwrap();
        assert!(opts.vars && opts.stack && opts.code && opts.breakpoints);
        assert_eq!(opts.lines, 3);
        assert!(!opts.all_scopes);
        assert!(!opts.generated);
    }
}
