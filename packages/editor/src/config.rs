use std::path::Path;

use anyhow::Context;
use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::mode::AttributeMode;

pub const DEFAULT_OPTIONS_NAME: &str = "wed.options.json";

/// Editor options file format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorOptions {
    /// How start labels present attributes
    #[serde(default)]
    pub attributes: AttributeMode,

    /// Autosave interval in milliseconds; 0 disables autosaving
    #[serde(default)]
    pub autosave_interval: u64,

    /// Number of text edits coalesced into one undo step
    #[serde(default = "default_text_undo_max_length")]
    pub text_undo_max_length: usize,

    /// Show placeholders in elements without editable content
    #[serde(default = "default_placeholders")]
    pub placeholders: bool,
}

fn default_text_undo_max_length() -> usize {
    10
}

fn default_placeholders() -> bool {
    true
}

impl EditorOptions {
    /// Load options from a file, or defaults when it does not exist
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            Self::from_json_str(&content).with_context(|| format!("parsing {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn autosave(&self) -> Option<Duration> {
        (self.autosave_interval > 0).then(|| Duration::milliseconds(self.autosave_interval as i64))
    }
}

impl Default for EditorOptions {
    fn default() -> Self {
        Self {
            attributes: AttributeMode::default(),
            autosave_interval: 0,
            text_undo_max_length: default_text_undo_max_length(),
            placeholders: default_placeholders(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_options() {
        let json = r#"{
            "attributes": "edit",
            "autosaveInterval": 5000,
            "textUndoMaxLength": 3
        }"#;

        let options = EditorOptions::from_json_str(json).unwrap();
        assert_eq!(options.attributes, AttributeMode::Edit);
        assert_eq!(options.autosave(), Some(Duration::seconds(5)));
        assert_eq!(options.text_undo_max_length, 3);
        assert!(options.placeholders);
    }

    #[test]
    fn test_default_options() {
        let options = EditorOptions::default();
        assert_eq!(options.attributes, AttributeMode::Hide);
        assert_eq!(options.autosave(), None);
        assert_eq!(options.text_undo_max_length, 10);
        assert_eq!(EditorOptions::from_json_str("{}").unwrap(), options);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let options = EditorOptions::load("/nonexistent/wed.options.json").unwrap();
        assert_eq!(options, EditorOptions::default());
    }

    #[test]
    fn test_bad_attribute_mode_is_rejected() {
        assert!(EditorOptions::from_json_str(r#"{"attributes": "sometimes"}"#).is_err());
    }
}
