//! Breakpoint and logpoint commands: set, list, remove, toggle.
//!
//! Setting resolves the user's path against, in order: an explicit
//! URL-regex, the source-map reverse index, loaded script URLs by suffix,
//! and finally a synthesised URL-regex so breakpoints can target scripts
//! that have not been parsed yet.

use serde::Serialize;
use serde_json::json;

use crate::breakpoints::{
    compose_condition, url_regex_for_path, BreakKind, BreakpointMeta, DisabledEntry,
    OriginalCoords,
};
use crate::error::{Error, Result};
use crate::protocol::SetBreakpointByUrlResult;
use crate::refs::{RefKind, RefMeta};
use crate::session::Session;

// ── Results ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct BreakLocationDisplay {
    pub url: String,
    pub line: u32,
}

#[derive(Debug, Serialize)]
pub struct BreakpointSet {
    #[serde(rename = "ref")]
    pub handle: String,
    pub location: BreakLocationDisplay,
}

#[derive(Debug, Serialize)]
pub struct BreakpointListing {
    #[serde(rename = "ref")]
    pub handle: String,
    #[serde(flatten)]
    pub meta: BreakpointMeta,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,
}

#[derive(Debug, Serialize)]
pub struct ToggleOutcome {
    pub state: &'static str,
    pub refs: Vec<String>,
}

/// Extra knobs accepted by `set_breakpoint`.
#[derive(Debug, Default, Clone)]
pub struct BreakpointOptions {
    pub condition: Option<String>,
    pub hit_count: Option<u32>,
    pub url_regex: Option<String>,
    pub column: Option<u32>,
}

// ── Wire targeting ───────────────────────────────────────────────────────────

/// Where a breakpoint lands on the wire, plus remembered original-source
/// coordinates when a source-map translation happened.
pub(crate) enum WireTarget {
    Url { url: String, line: u32 },
    Regex { pattern: String, line: u32 },
}

impl WireTarget {
    fn params(&self, column: Option<u32>, condition: Option<&str>) -> serde_json::Value {
        let (line, mut params) = match self {
            WireTarget::Url { url, line } => (line, json!({"url": url})),
            WireTarget::Regex { pattern, line } => (line, json!({"urlRegex": pattern})),
        };
        params["lineNumber"] = json!(line.saturating_sub(1));
        if let Some(col) = column {
            params["columnNumber"] = json!(col);
        }
        if let Some(cond) = condition {
            params["condition"] = json!(cond);
        }
        params
    }
}

/// Resolve a user-supplied path and 1-based line to a wire target.
pub(crate) fn resolve_target(
    session: &Session,
    path: &str,
    line: u32,
) -> (WireTarget, Option<OriginalCoords>) {
    if let Some(generated) = session.shared.resolver.to_generated(path, line, 0) {
        let core = session.shared.core.lock().unwrap();
        if let Some(url) = core.scripts.url_of(&generated.script_id) {
            let original = OriginalCoords {
                original_url: path.to_string(),
                original_line: line,
                generated_url: url.to_string(),
                generated_line: generated.line,
            };
            return (
                WireTarget::Url {
                    url: url.to_string(),
                    line: generated.line,
                },
                Some(original),
            );
        }
    }

    {
        let core = session.shared.core.lock().unwrap();
        if let Some(script) = core.scripts.find_by_url_suffix(path) {
            return (
                WireTarget::Url {
                    url: script.url.clone(),
                    line,
                },
                None,
            );
        }
    }

    (
        WireTarget::Regex {
            pattern: url_regex_for_path(path),
            line,
        },
        None,
    )
}

// ── Commands ─────────────────────────────────────────────────────────────────

impl Session {
    pub async fn set_breakpoint(
        &self,
        path: &str,
        line: u32,
        options: BreakpointOptions,
    ) -> Result<BreakpointSet> {
        if line == 0 {
            return Err(Error::invalid("line", "lines are 1-based"));
        }
        let mut meta = BreakpointMeta::at(path, line);
        meta.column = options.column;
        meta.condition = options.condition;
        meta.hit_count = options.hit_count;
        meta.url_regex = options.url_regex;
        self.install_break(meta).await
    }

    pub async fn set_logpoint(
        &self,
        path: &str,
        line: u32,
        template: &str,
        condition: Option<String>,
        max_emissions: Option<u32>,
    ) -> Result<BreakpointSet> {
        if line == 0 {
            return Err(Error::invalid("line", "lines are 1-based"));
        }
        let mut meta = BreakpointMeta::at(path, line);
        meta.kind = BreakKind::Logpoint;
        meta.template = Some(template.to_string());
        meta.condition = condition;
        meta.max_emissions = max_emissions;
        self.install_break(meta).await
    }

    /// Set a breakpoint/logpoint from assembled metadata and register its
    /// handle. Shared by the set commands and by toggle re-enable.
    async fn install_break(&self, mut meta: BreakpointMeta) -> Result<BreakpointSet> {
        let (result, meta) = {
            let (target, original) = self.wire_target_for(&meta);
            meta.original = original;
            let result = self.send_set_breakpoint(&target, &meta).await?;
            (result, meta)
        };

        let resolved_line = resolved_display_line(&meta, &result);
        let display_url = meta
            .original
            .as_ref()
            .map(|o| o.original_url.clone())
            .unwrap_or_else(|| meta.url.clone());

        let mut core = self.shared.core.lock().unwrap();
        let handle = match meta.kind {
            BreakKind::Breakpoint => core.refs.add_breakpoint(result.breakpoint_id, meta),
            BreakKind::Logpoint => core.refs.add_logpoint(result.breakpoint_id, meta),
        };
        Ok(BreakpointSet {
            handle,
            location: BreakLocationDisplay {
                url: display_url,
                line: resolved_line,
            },
        })
    }

    fn wire_target_for(&self, meta: &BreakpointMeta) -> (WireTarget, Option<OriginalCoords>) {
        if let Some(pattern) = &meta.url_regex {
            return (
                WireTarget::Regex {
                    pattern: pattern.clone(),
                    line: meta.line,
                },
                None,
            );
        }
        if let Some(original) = &meta.original {
            // Re-enable path: reuse the remembered translation.
            return (
                WireTarget::Url {
                    url: original.generated_url.clone(),
                    line: original.generated_line,
                },
                Some(original.clone()),
            );
        }
        resolve_target(self, &meta.url, meta.line)
    }

    async fn send_set_breakpoint(
        &self,
        target: &WireTarget,
        meta: &BreakpointMeta,
    ) -> Result<SetBreakpointByUrlResult> {
        let counter_id = if meta.hit_count.is_some() {
            self.shared.core.lock().unwrap().breaks.next_counter_id()
        } else {
            0
        };
        let condition = compose_condition(meta, counter_id);
        let transport = self.transport_handle()?;
        let value = transport
            .send(
                "Debugger.setBreakpointByUrl",
                Some(target.params(meta.column, condition.as_deref())),
            )
            .await?;
        serde_json::from_value(value)
            .map_err(|e| Error::TransportFailed(format!("malformed setBreakpointByUrl result: {e}")))
    }

    pub async fn remove_breakpoint(&self, handle: &str) -> Result<()> {
        let remote_id = {
            let mut core = self.shared.core.lock().unwrap();
            if core.breaks.take_disabled(handle).is_some() {
                core.refs.remove(handle);
                return Ok(());
            }
            let entry = core
                .refs
                .resolve(handle)
                .ok_or_else(|| Error::UnknownRef(handle.to_string()))?;
            if !matches!(entry.kind, RefKind::Breakpoint | RefKind::Logpoint) {
                return Err(Error::BadRefKind {
                    handle: handle.to_string(),
                    expected: "breakpoint",
                });
            }
            let remote_id = entry.remote_id.clone();
            core.refs.remove(handle);
            remote_id
        };
        let transport = self.transport_handle()?;
        transport
            .send(
                "Debugger.removeBreakpoint",
                Some(json!({"breakpointId": remote_id})),
            )
            .await?;
        Ok(())
    }

    pub async fn remove_all_breakpoints(&self) -> Result<usize> {
        let targets: Vec<(String, String)> = {
            let core = self.shared.core.lock().unwrap();
            core.refs
                .list(RefKind::Breakpoint)
                .into_iter()
                .chain(core.refs.list(RefKind::Logpoint))
                .map(|e| (e.handle.clone(), e.remote_id.clone()))
                .collect()
        };
        let disabled = {
            let mut core = self.shared.core.lock().unwrap();
            let handles = core.breaks.disabled_handles();
            for h in &handles {
                core.breaks.take_disabled(h);
                core.refs.remove(h);
            }
            handles.len()
        };

        let transport = self.transport_handle();
        let mut removed = disabled;
        for (handle, remote_id) in targets {
            if let Ok(transport) = &transport {
                // Best-effort: the target may already be gone.
                let _ = transport
                    .send(
                        "Debugger.removeBreakpoint",
                        Some(json!({"breakpointId": remote_id})),
                    )
                    .await;
            }
            self.shared.core.lock().unwrap().refs.remove(&handle);
            removed += 1;
        }
        Ok(removed)
    }

    /// Active entries first (insertion order), then disabled ones.
    pub fn list_breakpoints(&self) -> Vec<BreakpointListing> {
        let core = self.shared.core.lock().unwrap();
        let mut out: Vec<BreakpointListing> = core
            .refs
            .list(RefKind::Breakpoint)
            .into_iter()
            .chain(core.refs.list(RefKind::Logpoint))
            .filter_map(|e| match &e.meta {
                RefMeta::Breakpoint(meta) => Some(BreakpointListing {
                    handle: e.handle.clone(),
                    meta: (**meta).clone(),
                    disabled: false,
                }),
                _ => None,
            })
            .collect();
        for (handle, entry) in core.breaks.disabled_entries() {
            out.push(BreakpointListing {
                handle: handle.to_string(),
                meta: entry.meta.clone(),
                disabled: true,
            });
        }
        out
    }

    /// Toggle one entry, or `"all"`: disable every active entry, or if
    /// none are active, re-enable every disabled one.
    pub async fn toggle_breakpoint(&self, selector: &str) -> Result<ToggleOutcome> {
        if selector == "all" {
            let active: Vec<String> = {
                let core = self.shared.core.lock().unwrap();
                core.refs
                    .list(RefKind::Breakpoint)
                    .into_iter()
                    .chain(core.refs.list(RefKind::Logpoint))
                    .map(|e| e.handle.clone())
                    .collect()
            };
            if !active.is_empty() {
                for handle in &active {
                    self.disable_one(handle).await?;
                }
                return Ok(ToggleOutcome {
                    state: "disabled",
                    refs: active,
                });
            }
            let disabled = {
                let core = self.shared.core.lock().unwrap();
                core.breaks.disabled_handles()
            };
            for handle in &disabled {
                self.enable_one(handle).await?;
            }
            return Ok(ToggleOutcome {
                state: "enabled",
                refs: disabled,
            });
        }

        let currently_disabled = {
            let core = self.shared.core.lock().unwrap();
            if core.breaks.is_disabled(selector) {
                true
            } else {
                let entry = core
                    .refs
                    .resolve(selector)
                    .ok_or_else(|| Error::UnknownRef(selector.to_string()))?;
                if !matches!(entry.kind, RefKind::Breakpoint | RefKind::Logpoint) {
                    return Err(Error::BadRefKind {
                        handle: selector.to_string(),
                        expected: "breakpoint",
                    });
                }
                false
            }
        };

        if currently_disabled {
            self.enable_one(selector).await?;
            Ok(ToggleOutcome {
                state: "enabled",
                refs: vec![selector.to_string()],
            })
        } else {
            self.disable_one(selector).await?;
            Ok(ToggleOutcome {
                state: "disabled",
                refs: vec![selector.to_string()],
            })
        }
    }

    /// Remove at the runtime and stash reconstruction metadata.
    async fn disable_one(&self, handle: &str) -> Result<()> {
        let (remote_id, meta) = {
            let core = self.shared.core.lock().unwrap();
            let entry = core
                .refs
                .resolve(handle)
                .ok_or_else(|| Error::UnknownRef(handle.to_string()))?;
            match &entry.meta {
                RefMeta::Breakpoint(meta) => (entry.remote_id.clone(), (**meta).clone()),
                _ => {
                    return Err(Error::BadRefKind {
                        handle: handle.to_string(),
                        expected: "breakpoint",
                    })
                }
            }
        };
        let transport = self.transport_handle()?;
        transport
            .send(
                "Debugger.removeBreakpoint",
                Some(json!({"breakpointId": remote_id.clone()})),
            )
            .await?;
        let mut core = self.shared.core.lock().unwrap();
        core.refs.remove(handle);
        core.breaks.stash_disabled(
            handle,
            DisabledEntry {
                protocol_id: remote_id,
                meta,
            },
        );
        Ok(())
    }

    /// Recreate at the runtime with identical semantics and re-register
    /// under the same handle.
    async fn enable_one(&self, handle: &str) -> Result<()> {
        let entry = {
            let mut core = self.shared.core.lock().unwrap();
            core.breaks
                .take_disabled(handle)
                .ok_or_else(|| Error::UnknownRef(handle.to_string()))?
        };
        let mut meta = entry.meta;
        let (target, original) = self.wire_target_for(&meta);
        if meta.original.is_none() {
            meta.original = original;
        }
        let result = self.send_set_breakpoint(&target, &meta).await?;
        let mut core = self.shared.core.lock().unwrap();
        core.refs.reinsert_break(handle, result.breakpoint_id, meta);
        Ok(())
    }
}

fn resolved_display_line(meta: &BreakpointMeta, result: &SetBreakpointByUrlResult) -> u32 {
    if let Some(original) = &meta.original {
        return original.original_line;
    }
    result
        .locations
        .first()
        .map(|l| l.line_number + 1)
        .unwrap_or(meta.line)
}
