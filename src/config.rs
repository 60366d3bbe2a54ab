//! Engine settings
//!
//! Settings arrive as a JSON object (the editor's resolved configuration) and
//! can be overridden from the environment:
//! - `SNIPPETS_STRICT_POSITIONS` (`true`/`false`/`1`/`0`)
//! - `SNIPPETS_SYNTAX_ORACLE` (`true`/`false`/`1`/`0`)

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::warn;

use crate::error::{EngineError, Result};

pub const STRICT_POSITIONS_ENV: &str = "SNIPPETS_STRICT_POSITIONS";
pub const SYNTAX_ORACLE_ENV: &str = "SNIPPETS_SYNTAX_ORACLE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Named completion snippets, as authored.
    pub custom_snippets: Vec<Value>,
    /// Typed-sequence snippets, as authored.
    pub typing_snippets: Vec<Value>,
    pub custom_snippet_defaults: Value,
    pub typing_snippet_defaults: Value,
    pub extends_groups: Map<String, Value>,
    /// Family name -> language ids. Entries replace the built-in family of the same name.
    pub language_supersets: HashMap<String, Vec<String>>,
    /// Use the line text up to the cursor (instead of the whole line) for start-of-line checks.
    pub strict_position_locations: bool,
    pub enable_syntax_oracle: bool,
    pub import_resolution_timeout_ms: u64,
    /// Upper bound on manifests picked up by the initial workspace scan.
    pub npm_scan_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            custom_snippets: Vec::new(),
            typing_snippets: Vec::new(),
            custom_snippet_defaults: json!({
                "when": { "languages": ["js"], "locations": ["in-code"] }
            }),
            typing_snippet_defaults: json!({
                "when": { "languages": ["js"], "locations": ["in-code"] }
            }),
            extends_groups: Map::new(),
            language_supersets: HashMap::new(),
            strict_position_locations: true,
            enable_syntax_oracle: true,
            import_resolution_timeout_ms: 1500,
            npm_scan_limit: 1000,
        }
    }
}

impl Settings {
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;
        Self::from_json_str(&text)
    }

    /// Apply `SNIPPETS_*` environment overrides on top of the loaded values.
    pub fn apply_env_overrides(&mut self) {
        if let Some(flag) = env_flag(STRICT_POSITIONS_ENV) {
            self.strict_position_locations = flag;
        }
        if let Some(flag) = env_flag(SYNTAX_ORACLE_ENV) {
            self.enable_syntax_oracle = flag;
        }
    }

    pub fn import_timeout(&self) -> Duration {
        Duration::from_millis(self.import_resolution_timeout_ms)
    }

    pub fn language_supersets(&self) -> LanguageSupersets {
        let mut supersets = LanguageSupersets::builtin();
        for (family, languages) in &self.language_supersets {
            supersets.insert(family, languages.clone());
        }
        supersets
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        other => {
            warn!("Ignoring {}={:?}: expected a boolean", name, other);
            None
        }
    }
}

/// Maps a family name (`js`, `react`, ...) to the concrete language ids it covers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LanguageSupersets {
    families: BTreeMap<String, Vec<String>>,
}

impl LanguageSupersets {
    pub fn builtin() -> Self {
        let mut supersets = Self::default();
        supersets.insert(
            "js",
            vec![
                "javascript".into(),
                "typescript".into(),
                "javascriptreact".into(),
                "typescriptreact".into(),
            ],
        );
        supersets.insert("react", vec!["javascriptreact".into(), "typescriptreact".into()]);
        supersets.insert("ts", vec!["typescript".into(), "typescriptreact".into()]);
        supersets.insert("styles", vec!["css".into(), "scss".into(), "less".into()]);
        supersets
    }

    pub fn insert(&mut self, family: &str, languages: Vec<String>) {
        self.families.insert(family.to_string(), languages);
    }

    /// Concrete language ids for one `when.languages` entry.
    pub fn expand<'a>(&'a self, entry: &'a str) -> Vec<&'a str> {
        match self.families.get(entry) {
            Some(languages) => languages.iter().map(String::as_str).collect(),
            None => vec![entry],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let settings = Settings::from_json_str(r#"{ "strictPositionLocations": false }"#).unwrap();
        assert!(!settings.strict_position_locations);
        assert!(settings.enable_syntax_oracle);
        assert_eq!(settings.import_timeout(), Duration::from_millis(1500));
        assert_eq!(
            settings.custom_snippet_defaults["when"]["languages"],
            json!(["js"])
        );
    }

    #[test]
    fn test_superset_expansion() {
        let mut settings = Settings::default();
        settings
            .language_supersets
            .insert("react".into(), vec!["typescriptreact".into()]);
        let supersets = settings.language_supersets();
        assert_eq!(supersets.expand("react"), vec!["typescriptreact"]);
        assert_eq!(supersets.expand("ts"), vec!["typescript", "typescriptreact"]);
        assert_eq!(supersets.expand("rust"), vec!["rust"]);
    }

    #[test]
    fn test_from_file_reports_path() {
        let err = Settings::from_file(Path::new("/nonexistent/snippets.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/snippets.json"));
    }
}
