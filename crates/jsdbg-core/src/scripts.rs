//! Script registry: every script the runtime has parsed this session.
//!
//! Entries are created on `scriptParsed` and only removed when the session
//! stops; the script-id set grows monotonically within a session.

use std::collections::BTreeMap;

use serde::Serialize;

/// One parsed script.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptInfo {
    pub script_id: String,
    /// May be empty for anonymous scripts.
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_map_url: Option<String>,
}

/// Registry keyed by runtime script id.
#[derive(Debug, Default)]
pub struct ScriptRegistry {
    scripts: BTreeMap<String, ScriptInfo>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, info: ScriptInfo) {
        self.scripts.insert(info.script_id.clone(), info);
    }

    pub fn get(&self, script_id: &str) -> Option<&ScriptInfo> {
        self.scripts.get(script_id)
    }

    pub fn url_of(&self, script_id: &str) -> Option<&str> {
        self.scripts.get(script_id).map(|s| s.url.as_str())
    }

    /// Find a script whose URL ends with `path`, tolerating a `file://`
    /// prefix on either side. Anonymous scripts never match.
    pub fn find_by_url_suffix(&self, path: &str) -> Option<&ScriptInfo> {
        let needle = strip_file_scheme(path);
        self.scripts.values().find(|s| {
            let url = strip_file_scheme(&s.url);
            !url.is_empty() && (url.ends_with(needle) || needle.ends_with(url))
        })
    }

    /// All scripts, optionally filtered by URL substring.
    pub fn list(&self, filter: Option<&str>) -> Vec<&ScriptInfo> {
        self.scripts
            .values()
            .filter(|s| filter.is_none_or(|f| s.url.contains(f)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    pub fn clear(&mut self) {
        self.scripts.clear();
    }
}

/// Strip a leading `file://` scheme so path comparisons see plain paths.
pub fn strip_file_scheme(url: &str) -> &str {
    url.strip_prefix("file://").unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(id: &str, url: &str) -> ScriptInfo {
        ScriptInfo {
            script_id: id.to_string(),
            url: url.to_string(),
            source_map_url: None,
        }
    }

    #[test]
    fn test_suffix_lookup_tolerates_file_scheme() {
        let mut reg = ScriptRegistry::new();
        reg.insert(script("1", "file:///srv/app/dist/main.js"));
        assert_eq!(
            reg.find_by_url_suffix("dist/main.js").unwrap().script_id,
            "1"
        );
        assert_eq!(
            reg.find_by_url_suffix("file:///srv/app/dist/main.js")
                .unwrap()
                .script_id,
            "1"
        );
    }

    #[test]
    fn test_anonymous_scripts_never_match() {
        let mut reg = ScriptRegistry::new();
        reg.insert(script("7", ""));
        assert!(reg.find_by_url_suffix("anything.js").is_none());
    }

    #[test]
    fn test_list_filter_is_substring() {
        let mut reg = ScriptRegistry::new();
        reg.insert(script("1", "file:///a/one.js"));
        reg.insert(script("2", "file:///a/two.js"));
        reg.insert(script("3", "node:internal/modules/cjs/loader"));
        assert_eq!(reg.list(Some("node:")).len(), 1);
        assert_eq!(reg.list(None).len(), 3);
    }
}
