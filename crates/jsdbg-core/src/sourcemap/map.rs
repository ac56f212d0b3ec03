//! One parsed Source Map v3 document.
//!
//! Holds the decoded mappings plus forward (generated → original) and
//! reverse (original → generated) indexes. All coordinates in this module
//! are 0-based; the resolver converts at its boundary.

use std::collections::HashMap;

use serde::Deserialize;

use super::vlq;

// ── Raw document ─────────────────────────────────────────────────────────────

/// The JSON shape of a source map file.
#[derive(Debug, Deserialize)]
pub struct SourceMapDocument {
    #[serde(default)]
    pub version: Option<u32>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default, rename = "sourceRoot")]
    pub source_root: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default, rename = "sourcesContent")]
    pub sources_content: Vec<Option<String>>,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub mappings: String,
}

// ── Decoded mappings ─────────────────────────────────────────────────────────

/// One mapping segment that carries source information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Segment {
    gen_col: u32,
    src_idx: u32,
    src_line: u32,
    src_col: u32,
    name_idx: Option<u32>,
}

/// A generated position found by reverse lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratedPos {
    pub line: u32,
    pub column: u32,
}

/// An original position found by forward lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalPos {
    pub src_idx: u32,
    pub line: u32,
    pub column: u32,
    pub name: Option<String>,
}

/// A fully decoded source map.
#[derive(Debug)]
pub struct SourceMap {
    pub sources: Vec<String>,
    pub source_root: Option<String>,
    sources_content: Vec<Option<String>>,
    names: Vec<String>,
    /// Segments per generated line, sorted by generated column.
    by_gen_line: Vec<Vec<Segment>>,
    /// src_idx → src_line → segments sorted by src_col.
    reverse: HashMap<u32, HashMap<u32, Vec<Segment>>>,
}

impl SourceMap {
    /// Parse a source-map JSON document. `None` on any malformed input;
    /// loading is silent-failure by contract.
    pub fn parse(json: &str) -> Option<Self> {
        let doc: SourceMapDocument = serde_json::from_str(json).ok()?;
        Self::from_document(doc)
    }

    pub fn from_document(doc: SourceMapDocument) -> Option<Self> {
        let mut by_gen_line: Vec<Vec<Segment>> = Vec::new();
        let mut reverse: HashMap<u32, HashMap<u32, Vec<Segment>>> = HashMap::new();

        // Decoder state: generated column resets per line, the source
        // fields persist across lines.
        let mut src_idx: i64 = 0;
        let mut src_line: i64 = 0;
        let mut src_col: i64 = 0;
        let mut name_idx: i64 = 0;

        for line_text in doc.mappings.split(';') {
            let mut line_segments: Vec<Segment> = Vec::new();
            let mut gen_col: i64 = 0;

            for seg_text in line_text.split(',') {
                if seg_text.is_empty() {
                    continue;
                }
                let fields = vlq::decode_segment(seg_text)?;
                match fields.len() {
                    1 => {
                        // Generated-only segment: advances the column but
                        // maps to nothing.
                        gen_col += fields[0];
                    }
                    4 | 5 => {
                        gen_col += fields[0];
                        src_idx += fields[1];
                        src_line += fields[2];
                        src_col += fields[3];
                        if src_idx < 0 || src_line < 0 || src_col < 0 || gen_col < 0 {
                            return None;
                        }
                        let name = if fields.len() == 5 {
                            name_idx += fields[4];
                            u32::try_from(name_idx).ok()
                        } else {
                            None
                        };
                        let seg = Segment {
                            gen_col: gen_col as u32,
                            src_idx: src_idx as u32,
                            src_line: src_line as u32,
                            src_col: src_col as u32,
                            name_idx: name,
                        };
                        line_segments.push(seg);
                        reverse
                            .entry(seg.src_idx)
                            .or_default()
                            .entry(seg.src_line)
                            .or_default()
                            .push(seg);
                    }
                    _ => return None,
                }
            }

            line_segments.sort_by_key(|s| s.gen_col);
            by_gen_line.push(line_segments);
        }

        for lines in reverse.values_mut() {
            for segs in lines.values_mut() {
                segs.sort_by_key(|s| s.src_col);
            }
        }

        Some(Self {
            sources: doc.sources,
            source_root: doc.source_root,
            sources_content: doc.sources_content,
            names: doc.names,
            by_gen_line,
            reverse,
        })
    }

    /// Forward lookup: the segment at or immediately before
    /// `(gen_line, gen_col)` on the same generated line.
    pub fn to_original(&self, gen_line: u32, gen_col: u32) -> Option<OriginalPos> {
        let segments = self.by_gen_line.get(gen_line as usize)?;
        let seg = segments
            .iter()
            .rev()
            .find(|s| s.gen_col <= gen_col)
            .or_else(|| segments.first())?;
        Some(OriginalPos {
            src_idx: seg.src_idx,
            line: seg.src_line,
            column: seg.src_col,
            name: seg
                .name_idx
                .and_then(|i| self.names.get(i as usize).cloned()),
        })
    }

    /// Reverse lookup: exact `(src_line, src_col)` match, else the nearest
    /// mapping at or below the requested column on the same source line.
    pub fn to_generated(&self, src_idx: u32, src_line: u32, src_col: u32) -> Option<GeneratedPos> {
        let segs = self.reverse.get(&src_idx)?.get(&src_line)?;
        let seg = segs
            .iter()
            .rev()
            .find(|s| s.src_col <= src_col)
            .or_else(|| segs.first())?;
        self.gen_pos_of(seg)
    }

    fn gen_pos_of(&self, target: &Segment) -> Option<GeneratedPos> {
        for (line, segs) in self.by_gen_line.iter().enumerate() {
            if let Some(s) = segs.iter().find(|s| {
                s.src_idx == target.src_idx
                    && s.src_line == target.src_line
                    && s.src_col == target.src_col
            }) {
                return Some(GeneratedPos {
                    line: line as u32,
                    column: s.gen_col,
                });
            }
        }
        None
    }

    /// Embedded source content for one source entry.
    pub fn source_content(&self, src_idx: usize) -> Option<&str> {
        self.sources_content.get(src_idx)?.as_deref()
    }

    /// Whether any embedded source content is present.
    pub fn has_content(&self) -> bool {
        self.sources_content.iter().any(Option::is_some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Two generated lines mapping to app.ts: line 0 → source line 0,
    // line 1 → source line 2, plus a second segment at generated column 2.
    const MAP: &str = r#"{
        "version": 3,
        "file": "app.js",
        "sources": ["app.ts"],
        "sourcesContent": ["let x = 1;\n\nconsole.log(x);\n"],
        "names": ["log"],
        "mappings": "AAAA;AAEA,EAAEA"
    }"#;

    #[test]
    fn test_forward_lookup() {
        let map = SourceMap::parse(MAP).unwrap();
        let hit = map.to_original(0, 0).unwrap();
        assert_eq!(hit.src_idx, 0);
        assert_eq!(hit.line, 0);
        assert_eq!(hit.column, 0);

        let hit = map.to_original(1, 0).unwrap();
        assert_eq!(hit.line, 2);
    }

    #[test]
    fn test_forward_lookup_floors_to_preceding_segment() {
        let map = SourceMap::parse(MAP).unwrap();
        // Column 1 sits between the segments at 0 and 2.
        let hit = map.to_original(1, 1).unwrap();
        assert_eq!(hit.line, 2);
        assert_eq!(hit.column, 0);
    }

    #[test]
    fn test_forward_lookup_carries_name() {
        let map = SourceMap::parse(MAP).unwrap();
        let hit = map.to_original(1, 2).unwrap();
        assert_eq!(hit.name.as_deref(), Some("log"));
    }

    #[test]
    fn test_reverse_lookup_exact_and_floored() {
        let map = SourceMap::parse(MAP).unwrap();
        let hit = map.to_generated(0, 2, 0).unwrap();
        assert_eq!(hit, GeneratedPos { line: 1, column: 0 });

        // No mapping at source column 7; floor to the one at column 2.
        let hit = map.to_generated(0, 2, 7).unwrap();
        assert_eq!(hit, GeneratedPos { line: 1, column: 2 });
    }

    #[test]
    fn test_reverse_lookup_misses_unmapped_lines() {
        let map = SourceMap::parse(MAP).unwrap();
        assert!(map.to_generated(0, 1, 0).is_none());
        assert!(map.to_generated(1, 0, 0).is_none());
    }

    #[test]
    fn test_round_trip_line_identity() {
        let map = SourceMap::parse(MAP).unwrap();
        let gen = map.to_generated(0, 2, 0).unwrap();
        let back = map.to_original(gen.line, gen.column).unwrap();
        assert_eq!(back.line, 2);
    }

    #[test]
    fn test_source_content() {
        let map = SourceMap::parse(MAP).unwrap();
        assert!(map.has_content());
        assert!(map.source_content(0).unwrap().starts_with("let x = 1;"));
        assert!(map.source_content(1).is_none());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(SourceMap::parse("not json").is_none());
        assert!(SourceMap::parse(r#"{"mappings":"!!"}"#).is_none());
    }
}
