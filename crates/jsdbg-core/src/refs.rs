//! Reference table: stable textual handles for ephemeral remote identifiers.
//!
//! The runtime hands out object ids, call-frame ids, and breakpoint ids that
//! are opaque, unstable strings. The table mints short handles (`@v1`, `@f0`,
//! `BP#2`, ...) that a client can echo back in later commands, and tracks how
//! long each kind stays valid.

use std::collections::HashMap;

use serde::Serialize;

use crate::breakpoints::BreakpointMeta;

// ── RefKind ──────────────────────────────────────────────────────────────────

/// The six handle kinds, each with a distinct textual prefix so counter
/// ranges can never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    /// `@vN` — a value produced by vars/eval. Volatile: cleared on resume
    /// and at the start of every state snapshot.
    Variable,
    /// `@fN` — a call frame. Volatile; N equals the frame index.
    Frame,
    /// `@oN` — an expanded object property. Survives resumes; cleared only
    /// by `clear_objects` / `clear_all`.
    Object,
    /// `BP#N` — a breakpoint. Persistent until removed or session stop.
    Breakpoint,
    /// `LP#N` — a logpoint. Persistent like breakpoints.
    Logpoint,
    /// `HS#N` — a heap snapshot. Persistent.
    HeapSnapshot,
}

impl RefKind {
    fn prefix(self) -> &'static str {
        match self {
            RefKind::Variable => "@v",
            RefKind::Frame => "@f",
            RefKind::Object => "@o",
            RefKind::Breakpoint => "BP#",
            RefKind::Logpoint => "LP#",
            RefKind::HeapSnapshot => "HS#",
        }
    }

    /// Human name used in error messages.
    pub fn describe(self) -> &'static str {
        match self {
            RefKind::Variable => "value",
            RefKind::Frame => "frame",
            RefKind::Object => "object",
            RefKind::Breakpoint => "breakpoint",
            RefKind::Logpoint => "logpoint",
            RefKind::HeapSnapshot => "heap snapshot",
        }
    }
}

/// Returns `true` when `s` is syntactically a handle
/// (`@v1`, `@f0`, `@o3`, `BP#1`, `LP#2`, `HS#1`).
pub fn is_handle(s: &str) -> bool {
    let digits_after = |rest: &str| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit());
    for prefix in ["@v", "@f", "@o", "BP#", "LP#", "HS#"] {
        if let Some(rest) = s.strip_prefix(prefix) {
            return digits_after(rest);
        }
    }
    false
}

// ── RefEntry ─────────────────────────────────────────────────────────────────

/// Metadata attached to a handle beyond its remote id.
#[derive(Debug, Clone, Default, Serialize)]
pub enum RefMeta {
    #[default]
    None,
    /// Stack position of a frame handle (0 = innermost).
    Frame { index: usize },
    /// Full reconstruction metadata for breakpoints and logpoints.
    Breakpoint(Box<BreakpointMeta>),
}

/// One entry in the table.
#[derive(Debug, Clone, Serialize)]
pub struct RefEntry {
    /// The textual handle, e.g. `@v3`.
    pub handle: String,
    #[serde(skip)]
    pub kind: RefKind,
    /// The runtime-side identifier this handle stands for.
    pub remote_id: String,
    /// Display name (variable name, function name, breakpoint label).
    pub name: Option<String>,
    pub meta: RefMeta,
}

// ── RefTable ─────────────────────────────────────────────────────────────────

/// Allocates and resolves handles for all six kinds.
#[derive(Debug, Default)]
pub struct RefTable {
    entries: HashMap<String, RefEntry>,
    /// Handles in insertion order, for `list`.
    order: Vec<String>,
    next_variable: u32,
    next_frame: u32,
    next_object: u32,
    next_breakpoint: u32,
    next_logpoint: u32,
    next_heap_snapshot: u32,
}

impl RefTable {
    pub fn new() -> Self {
        Self {
            next_variable: 1,
            next_frame: 0,
            next_object: 1,
            next_breakpoint: 1,
            next_logpoint: 1,
            next_heap_snapshot: 1,
            ..Default::default()
        }
    }

    fn mint(&mut self, kind: RefKind) -> String {
        let counter = match kind {
            RefKind::Variable => &mut self.next_variable,
            RefKind::Frame => &mut self.next_frame,
            RefKind::Object => &mut self.next_object,
            RefKind::Breakpoint => &mut self.next_breakpoint,
            RefKind::Logpoint => &mut self.next_logpoint,
            RefKind::HeapSnapshot => &mut self.next_heap_snapshot,
        };
        let n = *counter;
        *counter += 1;
        format!("{}{}", kind.prefix(), n)
    }

    fn insert(
        &mut self,
        kind: RefKind,
        remote_id: impl Into<String>,
        name: Option<String>,
        meta: RefMeta,
    ) -> String {
        let handle = self.mint(kind);
        self.entries.insert(
            handle.clone(),
            RefEntry {
                handle: handle.clone(),
                kind,
                remote_id: remote_id.into(),
                name,
                meta,
            },
        );
        self.order.push(handle.clone());
        handle
    }

    // ── Allocation, one constructor per kind ─────────────────────────────────

    pub fn add_variable(&mut self, remote_id: impl Into<String>, name: Option<String>) -> String {
        self.insert(RefKind::Variable, remote_id, name, RefMeta::None)
    }

    pub fn add_frame(
        &mut self,
        remote_id: impl Into<String>,
        name: Option<String>,
        index: usize,
    ) -> String {
        self.insert(RefKind::Frame, remote_id, name, RefMeta::Frame { index })
    }

    pub fn add_object(&mut self, remote_id: impl Into<String>, name: Option<String>) -> String {
        self.insert(RefKind::Object, remote_id, name, RefMeta::None)
    }

    pub fn add_breakpoint(&mut self, remote_id: impl Into<String>, meta: BreakpointMeta) -> String {
        self.insert(
            RefKind::Breakpoint,
            remote_id,
            None,
            RefMeta::Breakpoint(Box::new(meta)),
        )
    }

    pub fn add_logpoint(&mut self, remote_id: impl Into<String>, meta: BreakpointMeta) -> String {
        self.insert(
            RefKind::Logpoint,
            remote_id,
            None,
            RefMeta::Breakpoint(Box::new(meta)),
        )
    }

    pub fn add_heap_snapshot(
        &mut self,
        remote_id: impl Into<String>,
        name: Option<String>,
    ) -> String {
        self.insert(RefKind::HeapSnapshot, remote_id, name, RefMeta::None)
    }

    /// Re-insert a breakpoint/logpoint under an existing handle (toggle
    /// re-enable keeps the handle stable while the protocol id changes).
    pub fn reinsert_break(&mut self, handle: &str, remote_id: impl Into<String>, meta: BreakpointMeta) {
        let kind = if handle.starts_with("LP#") {
            RefKind::Logpoint
        } else {
            RefKind::Breakpoint
        };
        self.entries.insert(
            handle.to_string(),
            RefEntry {
                handle: handle.to_string(),
                kind,
                remote_id: remote_id.into(),
                name: None,
                meta: RefMeta::Breakpoint(Box::new(meta)),
            },
        );
        if !self.order.iter().any(|h| h == handle) {
            self.order.push(handle.to_string());
        }
    }

    // ── Resolution ───────────────────────────────────────────────────────────

    pub fn resolve(&self, handle: &str) -> Option<&RefEntry> {
        self.entries.get(handle)
    }

    pub fn resolve_id(&self, handle: &str) -> Option<&str> {
        self.entries.get(handle).map(|e| e.remote_id.as_str())
    }

    /// All entries of one kind, in insertion order.
    pub fn list(&self, kind: RefKind) -> Vec<&RefEntry> {
        self.order
            .iter()
            .filter_map(|h| self.entries.get(h))
            .filter(|e| e.kind == kind)
            .collect()
    }

    pub fn remove(&mut self, handle: &str) -> bool {
        let removed = self.entries.remove(handle).is_some();
        if removed {
            self.order.retain(|h| h != handle);
        }
        removed
    }

    // ── Bulk clearing ────────────────────────────────────────────────────────

    /// Drop all `@v`/`@f` handles and reset their counters. Called on every
    /// resume and at the start of state-snapshot building.
    pub fn clear_volatile(&mut self) {
        self.retain_kinds(|k| !matches!(k, RefKind::Variable | RefKind::Frame));
        self.next_variable = 1;
        self.next_frame = 0;
    }

    /// Drop all `@o` handles and reset their counter.
    pub fn clear_objects(&mut self) {
        self.retain_kinds(|k| k != RefKind::Object);
        self.next_object = 1;
    }

    /// Drop everything and reset every counter. Session stop only.
    pub fn clear_all(&mut self) {
        *self = Self::new();
    }

    fn retain_kinds(&mut self, keep: impl Fn(RefKind) -> bool) {
        self.entries.retain(|_, e| keep(e.kind));
        let entries = &self.entries;
        self.order.retain(|h| entries.contains_key(h));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
