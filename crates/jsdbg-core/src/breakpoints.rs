//! Breakpoint and logpoint registry: reconstruction metadata, condition
//! synthesis, and the disabled stash used by toggling.
//!
//! Active entries live in the reference table (they own a `BP#`/`LP#`
//! handle and the runtime-side breakpoint id). This module owns everything
//! the table does not: the disabled map keyed by handle, the per-session
//! hit-counter namespace, and the pure synthesis of wire conditions.

use std::collections::HashMap;

use serde::Serialize;

// ── Metadata ─────────────────────────────────────────────────────────────────

/// Discriminates the two wire-identical entry types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakKind {
    Breakpoint,
    Logpoint,
}

/// Original-source coordinates remembered when a breakpoint was set through
/// a source-map translation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginalCoords {
    pub original_url: String,
    pub original_line: u32,
    pub generated_url: String,
    pub generated_line: u32,
}

/// Everything needed to list a breakpoint and to recreate it with identical
/// semantics after a disable/enable round trip.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointMeta {
    pub kind: BreakKind,
    /// Display URL (the path the user asked for).
    pub url: String,
    /// Display line, 1-based.
    pub line: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    /// User-supplied condition, before any synthesis.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_regex: Option<String>,
    /// Logpoint message template (`{expr}` interpolation).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Accepted and persisted; no enforcement is wired to the runtime.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_emissions: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original: Option<OriginalCoords>,
}

impl BreakpointMeta {
    /// A plain breakpoint at a display location.
    pub fn at(url: impl Into<String>, line: u32) -> Self {
        Self {
            kind: BreakKind::Breakpoint,
            url: url.into(),
            line,
            column: None,
            condition: None,
            hit_count: None,
            url_regex: None,
            template: None,
            max_emissions: None,
            original: None,
        }
    }
}

// ── Disabled stash ───────────────────────────────────────────────────────────

/// A toggled-off entry. The runtime no longer knows about it; re-enabling
/// recreates it from `meta`.
#[derive(Debug, Clone)]
pub struct DisabledEntry {
    /// The protocol id the breakpoint had when it was active (stale once
    /// disabled, kept for listing).
    pub protocol_id: String,
    pub meta: BreakpointMeta,
}

/// Session-scoped breakpoint bookkeeping.
#[derive(Debug, Default)]
pub struct BreakpointStore {
    disabled: HashMap<String, DisabledEntry>,
    disabled_order: Vec<String>,
    next_hit_counter: u32,
}

impl BreakpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a unique id for a hit-count counter variable so that
    /// multiple hit-count breakpoints never share state.
    pub fn next_counter_id(&mut self) -> u32 {
        self.next_hit_counter += 1;
        self.next_hit_counter
    }

    pub fn stash_disabled(&mut self, handle: &str, entry: DisabledEntry) {
        if !self.disabled.contains_key(handle) {
            self.disabled_order.push(handle.to_string());
        }
        self.disabled.insert(handle.to_string(), entry);
    }

    pub fn take_disabled(&mut self, handle: &str) -> Option<DisabledEntry> {
        let entry = self.disabled.remove(handle)?;
        self.disabled_order.retain(|h| h != handle);
        Some(entry)
    }

    pub fn is_disabled(&self, handle: &str) -> bool {
        self.disabled.contains_key(handle)
    }

    /// Disabled entries in the order they were toggled off.
    pub fn disabled_entries(&self) -> Vec<(&str, &DisabledEntry)> {
        self.disabled_order
            .iter()
            .filter_map(|h| self.disabled.get(h).map(|e| (h.as_str(), e)))
            .collect()
    }

    pub fn disabled_handles(&self) -> Vec<String> {
        self.disabled_order.clone()
    }

    pub fn clear(&mut self) {
        self.disabled.clear();
        self.disabled_order.clear();
        self.next_hit_counter = 0;
    }
}

// ── Condition synthesis ──────────────────────────────────────────────────────

/// Build the wire condition for a breakpoint or logpoint.
///
/// Hit counts become a uniquely named counter check; logpoints become a
/// `console.log(...), false` expression so the runtime never pauses on
/// them.
pub fn compose_condition(meta: &BreakpointMeta, counter_id: u32) -> Option<String> {
    match meta.kind {
        BreakKind::Breakpoint => {
            let hit = meta.hit_count.map(|n| {
                let var = format!("globalThis.__jsdbg_hits_{counter_id}");
                format!("(({var} = ({var} || 0) + 1) >= {n})")
            });
            match (hit, &meta.condition) {
                (Some(hit), Some(user)) => Some(format!("{hit} && ({user})")),
                (Some(hit), None) => Some(hit),
                (None, Some(user)) => Some(user.clone()),
                (None, None) => None,
            }
        }
        BreakKind::Logpoint => {
            let literal = template_to_literal(meta.template.as_deref().unwrap_or(""));
            let log = format!("console.log({literal}), false");
            Some(match &meta.condition {
                Some(user) => format!("({user}) ? ({log}) : false"),
                None => log,
            })
        }
    }
}

/// Convert a `{expr}` message template into a JS template literal.
pub fn template_to_literal(template: &str) -> String {
    let mut out = String::from("`");
    let mut chars = template.chars();
    while let Some(c) = chars.next() {
        match c {
            '{' => {
                let mut depth = 1usize;
                out.push_str("${");
                for inner in chars.by_ref() {
                    match inner {
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    out.push(inner);
                }
                out.push('}');
            }
            '`' => out.push_str("\\`"),
            '\\' => out.push_str("\\\\"),
            '$' => out.push_str("\\$"),
            _ => out.push(c),
        }
    }
    out.push('`');
    out
}

/// Anchored URL-regex for a path no loaded script matches yet.
pub fn url_regex_for_path(path: &str) -> String {
    format!("^.*{}$", regex::escape(path))
}
