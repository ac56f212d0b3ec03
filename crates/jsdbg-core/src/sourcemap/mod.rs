//! Source-map resolver: loads maps referenced by parsed scripts and answers
//! bidirectional coordinate queries.
//!
//! Lines at this boundary are 1-based (display convention); columns stay
//! 0-based as on the wire. Loading is silent-failure: a script whose map
//! cannot be fetched or parsed simply keeps working without translation.

pub mod map;
pub mod vlq;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use base64::Engine;
use serde::Serialize;

use crate::scripts::strip_file_scheme;
use map::SourceMap;

// ── Query results ────────────────────────────────────────────────────────────

/// An original-source position (1-based line).
#[derive(Debug, Clone, Serialize)]
pub struct OriginalLocation {
    pub source: String,
    pub line: u32,
    pub column: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// False when this came from the display fallback rather than a
    /// mapping that covers the exact point.
    pub exact: bool,
}

/// A generated-script position (1-based line).
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedLocation {
    pub script_id: String,
    pub line: u32,
    pub column: u32,
}

/// Summary of one loaded map, for the operator command.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapSummary {
    pub script_id: String,
    pub generated_url: String,
    pub map_url: String,
    pub sources: Vec<String>,
    pub has_content: bool,
}

// ── Registry ─────────────────────────────────────────────────────────────────

struct LoadedMap {
    script_id: String,
    generated_url: String,
    map_url: String,
    map: SourceMap,
    /// Sources resolved against the map's directory (parallel to
    /// `map.sources`).
    resolved_sources: Vec<String>,
}

#[derive(Default)]
struct Registry {
    by_script: HashMap<String, LoadedMap>,
    /// Raw and resolved source path → (script id, source index).
    by_source: HashMap<String, (String, usize)>,
}

/// Process-wide resolver owned by the session.
#[derive(Default)]
pub struct SourceMapResolver {
    inner: Mutex<Registry>,
    disabled: AtomicBool,
}

impl SourceMapResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable (or re-enable) all source-map handling. While disabled,
    /// every query short-circuits to `None`.
    pub fn set_disabled(&self, disabled: bool) {
        self.disabled.store(disabled, Ordering::Relaxed);
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Relaxed)
    }

    /// Forget every loaded map. Session stop.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.by_script.clear();
        inner.by_source.clear();
    }

    // ── Loading ──────────────────────────────────────────────────────────────

    /// Load the map referenced by a parsed script. Returns `false` on any
    /// failure; failures are deliberately silent.
    pub fn load_for_script(&self, script_id: &str, script_url: &str, map_url: &str) -> bool {
        if self.is_disabled() || map_url.is_empty() {
            return false;
        }

        let script_dir = script_dir(script_url);
        let (json, base_dir) = if let Some(payload) = decode_data_uri(map_url) {
            (payload, script_dir)
        } else {
            let map_path = resolve_against(&script_dir, map_url);
            let Ok(text) = std::fs::read_to_string(&map_path) else {
                return false;
            };
            let base = map_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or(script_dir);
            (text, base)
        };

        let Some(map) = SourceMap::parse(&json) else {
            return false;
        };

        let resolved_sources: Vec<String> = map
            .sources
            .iter()
            .map(|src| {
                let with_root = match &map.source_root {
                    Some(root) if !root.is_empty() => {
                        format!("{}/{}", root.trim_end_matches('/'), src)
                    }
                    _ => src.clone(),
                };
                resolve_against(&base_dir, &with_root)
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();

        let mut inner = self.inner.lock().unwrap();
        for (idx, raw) in map.sources.iter().enumerate() {
            inner
                .by_source
                .insert(raw.clone(), (script_id.to_string(), idx));
            inner
                .by_source
                .insert(resolved_sources[idx].clone(), (script_id.to_string(), idx));
        }
        inner.by_script.insert(
            script_id.to_string(),
            LoadedMap {
                script_id: script_id.to_string(),
                generated_url: script_url.to_string(),
                map_url: map_url.chars().take(128).collect(),
                map,
                resolved_sources,
            },
        );
        true
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub fn has_map(&self, script_id: &str) -> bool {
        if self.is_disabled() {
            return false;
        }
        self.inner.lock().unwrap().by_script.contains_key(script_id)
    }

    /// Forward translation: generated position → original position.
    /// `None` when no map exists or no mapping covers the point.
    pub fn to_original(&self, script_id: &str, line: u32, column: u32) -> Option<OriginalLocation> {
        if self.is_disabled() || line == 0 {
            return None;
        }
        let inner = self.inner.lock().unwrap();
        let loaded = inner.by_script.get(script_id)?;
        let hit = loaded.map.to_original(line - 1, column)?;
        Some(OriginalLocation {
            source: loaded
                .resolved_sources
                .get(hit.src_idx as usize)
                .or_else(|| loaded.map.sources.get(hit.src_idx as usize))
                .cloned()?,
            line: hit.line + 1,
            column: hit.column,
            name: hit.name,
            exact: true,
        })
    }

    /// Display fallback: exact hit when available, else the map's first
    /// source with the generated line, so stack traces and pause locations
    /// show the original path even for unmapped lines.
    pub fn resolve_display(&self, script_id: &str, line: u32, column: u32) -> Option<OriginalLocation> {
        if let Some(hit) = self.to_original(script_id, line, column) {
            return Some(hit);
        }
        if self.is_disabled() {
            return None;
        }
        let inner = self.inner.lock().unwrap();
        let loaded = inner.by_script.get(script_id)?;
        let source = loaded.map.sources.first().cloned()?;
        Some(OriginalLocation {
            source,
            line,
            column,
            name: None,
            exact: false,
        })
    }

    /// Reverse translation: (possibly partial) original path → generated
    /// position. Exact reverse-index lookup first, then suffix matching in
    /// either direction over every loaded map.
    pub fn to_generated(&self, path: &str, line: u32, column: u32) -> Option<GeneratedLocation> {
        if self.is_disabled() || line == 0 {
            return None;
        }
        let inner = self.inner.lock().unwrap();

        let (script_id, src_idx) = match inner.by_source.get(path) {
            Some((id, idx)) => (id.clone(), *idx),
            None => find_source_by_suffix(&inner, path)?,
        };

        let loaded = inner.by_script.get(&script_id)?;
        let hit = loaded.map.to_generated(src_idx as u32, line - 1, column)?;
        Some(GeneratedLocation {
            script_id,
            line: hit.line + 1,
            column: hit.column,
        })
    }

    /// Embedded original source for `path` (or the first source when `path`
    /// is `None`), tolerating partial-path matches in either direction.
    pub fn original_source(&self, script_id: &str, path: Option<&str>) -> Option<String> {
        if self.is_disabled() {
            return None;
        }
        let inner = self.inner.lock().unwrap();
        let loaded = inner.by_script.get(script_id)?;
        let idx = match path {
            None => 0,
            Some(p) => loaded
                .map
                .sources
                .iter()
                .zip(&loaded.resolved_sources)
                .position(|(raw, resolved)| suffix_match(raw, p) || suffix_match(resolved, p))?,
        };
        loaded.map.source_content(idx).map(str::to_string)
    }

    /// The generated script owning a requested original path.
    pub fn find_script_for_source(&self, path: &str) -> Option<GeneratedLocation> {
        if self.is_disabled() {
            return None;
        }
        let inner = self.inner.lock().unwrap();
        let (script_id, _) = match inner.by_source.get(path) {
            Some((id, idx)) => (id.clone(), *idx),
            None => find_source_by_suffix(&inner, path)?,
        };
        Some(GeneratedLocation {
            script_id,
            line: 1,
            column: 0,
        })
    }

    /// Summaries of loaded maps, optionally filtered by generated URL or
    /// source path substring.
    pub fn summaries(&self, filter: Option<&str>) -> Vec<MapSummary> {
        let inner = self.inner.lock().unwrap();
        let mut out: Vec<MapSummary> = inner
            .by_script
            .values()
            .filter(|m| {
                filter.is_none_or(|f| {
                    m.generated_url.contains(f)
                        || m.resolved_sources.iter().any(|s| s.contains(f))
                        || m.map.sources.iter().any(|s| s.contains(f))
                })
            })
            .map(|m| MapSummary {
                script_id: m.script_id.clone(),
                generated_url: m.generated_url.clone(),
                map_url: m.map_url.clone(),
                sources: m.resolved_sources.clone(),
                has_content: m.map.has_content(),
            })
            .collect();
        out.sort_by(|a, b| a.script_id.cmp(&b.script_id));
        out
    }
}

// ── Path helpers ─────────────────────────────────────────────────────────────

fn script_dir(script_url: &str) -> PathBuf {
    Path::new(strip_file_scheme(script_url))
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn resolve_against(base: &Path, url: &str) -> PathBuf {
    let path = strip_file_scheme(url);
    if Path::new(path).is_absolute() {
        PathBuf::from(path)
    } else {
        base.join(path)
    }
}

fn suffix_match(a: &str, b: &str) -> bool {
    let a = strip_file_scheme(a);
    let b = strip_file_scheme(b);
    !a.is_empty() && !b.is_empty() && (a.ends_with(b) || b.ends_with(a))
}

fn find_source_by_suffix(registry: &Registry, path: &str) -> Option<(String, usize)> {
    for loaded in registry.by_script.values() {
        for (idx, raw) in loaded.map.sources.iter().enumerate() {
            if suffix_match(raw, path) || suffix_match(&loaded.resolved_sources[idx], path) {
                return Some((loaded.script_id.clone(), idx));
            }
        }
    }
    None
}

/// Decode a `data:` URI payload. Base64 or percent-encoding per the header.
fn decode_data_uri(url: &str) -> Option<String> {
    let rest = url.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    if header.contains("base64") {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .ok()?;
        String::from_utf8(bytes).ok()
    } else {
        urlencoding::decode(payload).ok().map(|s| s.into_owned())
    }
}
