//! Log entry message formatting.
//!
//! Each game version may carry templates keyed by entry type, e.g.
//! `"shoot": "{subject} took aim at {position} and {hit}"`. Placeholders
//! are filled from the raw entry's fields.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex_lite::{Captures, Regex};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::entry::RawLogEntry;

/// Configuration for every supported game version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameConfig {
    /// Per-version settings keyed by game version.
    #[serde(default)]
    pub game_versions: BTreeMap<String, VersionConfig>,
}

impl GameConfig {
    /// Look up a game version's settings.
    pub fn version(&self, game_version: &str) -> Option<&VersionConfig> {
        self.game_versions.get(game_version)
    }

    /// Whether a game version has any settings.
    pub fn is_version_supported(&self, game_version: &str) -> bool {
        self.game_versions.contains_key(game_version)
    }
}

/// Settings for one game version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionConfig {
    /// Message templates keyed by log entry type.
    #[serde(default)]
    pub log_entry_formatters: BTreeMap<String, String>,
}

impl VersionConfig {
    /// Formatter for an entry type, if one is defined.
    pub fn formatter(&self, entry_type: &str) -> Option<LogEntryFormatter<'_>> {
        self.log_entry_formatters
            .get(entry_type)
            .map(|template| LogEntryFormatter::new(template))
    }
}

/// Message used when no template exists for an entry type.
pub fn default_message(entry_type: &str) -> String {
    format!("You might want to define a formatter for {}", entry_type)
}

/// `{field}` placeholders.
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^}]+)\}").expect("PLACEHOLDER pattern is invalid"));

/// Template-driven message formatter.
#[derive(Debug, Clone, Copy)]
pub struct LogEntryFormatter<'a> {
    template: &'a str,
}

impl<'a> LogEntryFormatter<'a> {
    /// Wrap a template string.
    pub fn new(template: &'a str) -> Self {
        Self { template }
    }

    /// Fill every `{field}` in the template from `raw`.
    ///
    /// Unknown fields are left as written.
    pub fn format(&self, raw: &RawLogEntry) -> String {
        PLACEHOLDER
            .replace_all(self.template, |caps: &Captures<'_>| match raw.get(&caps[1]) {
                Some(value) => render_field(&caps[1], value),
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}

fn render_field(name: &str, value: &Value) -> String {
    match (name, value) {
        ("hit", Value::Bool(hit)) => if *hit { "hit" } else { "miss" }.to_string(),
        (_, Value::String(s)) => s.clone(),
        (_, other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawLogEntry {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_fills_placeholders() {
        let formatter = LogEntryFormatter::new("{subject} took aim at {position} and {hit}");
        let entry = raw(json!({ "subject": "Corey", "position": "I6", "hit": true }));

        assert_eq!(formatter.format(&entry), "Corey took aim at I6 and hit");
    }

    #[test]
    fn test_miss_and_numbers() {
        let formatter = LogEntryFormatter::new("{subject} traded {quantity} gold and {hit}");
        let entry = raw(json!({ "subject": "Xavion", "quantity": 5, "hit": false }));

        assert_eq!(formatter.format(&entry), "Xavion traded 5 gold and miss");
    }

    #[test]
    fn test_unknown_field_left_in_place() {
        let formatter = LogEntryFormatter::new("{subject} moved to {target}");
        let entry = raw(json!({ "subject": "Corey" }));

        assert_eq!(formatter.format(&entry), "Corey moved to {target}");
    }

    #[test]
    fn test_unbalanced_braces() {
        let formatter = LogEntryFormatter::new("a { b {} c");
        assert_eq!(formatter.format(&RawLogEntry::new()), "a { b {} c");
    }

    #[test]
    fn test_repeated_and_adjacent_placeholders() {
        let formatter = LogEntryFormatter::new("{subject}{subject} -> {target}, {subject}");
        let entry = raw(json!({ "subject": "Ty", "target": { "x": 1 } }));

        assert_eq!(formatter.format(&entry), "TyTy -> {\"x\":1}, Ty");
    }

    #[test]
    fn test_config_from_json() {
        let config: GameConfig = serde_json::from_value(json!({
            "gameVersions": {
                "3": { "logEntryFormatters": { "shoot": "{subject} shot" } },
                "5": {}
            }
        }))
        .unwrap();

        assert!(config.is_version_supported("5"));
        assert!(!config.is_version_supported("4"));

        let v3 = config.version("3").unwrap();
        assert!(v3.formatter("shoot").is_some());
        assert!(v3.formatter("move").is_none());
        assert!(config.version("5").unwrap().formatter("shoot").is_none());
    }
}
