//! Tuning knobs for the highlighter

use serde::{Deserialize, Serialize};

use crate::error::HighlightError;

/// Highlighter configuration
///
/// All fields have defaults, so a partial JSON/TOML document deserializes into
/// a usable config. Call [`HighlightConfig::validate`] before use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightConfig {
    /// Minimum similarity ratio for a fuzzy window to be accepted.
    /// Lower values accept more paraphrase at the cost of spurious highlights.
    pub fuzzy_threshold: f64,
    /// Match excerpts longer than this many characters are truncated with "..."
    pub excerpt_chars: usize,
    /// Vertical distance (in points) that makes up one reported "line"
    pub line_bucket: f64,
    /// Prefix of highlighted artifact names: `<prefix>_<serial>_<file>`
    pub highlight_prefix: String,
    /// Opacity of the highlight annotations
    pub highlight_opacity: f64,
    pub enable_fuzzy: bool,
    pub enable_fallback: bool,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.65,
            excerpt_chars: 50,
            line_bucket: 10.0,
            highlight_prefix: "highlighted".to_string(),
            highlight_opacity: 0.4,
            enable_fuzzy: true,
            enable_fallback: true,
        }
    }
}

impl HighlightConfig {
    /// Parse a config from JSON, filling in defaults and validating the result
    pub fn from_json(s: &str) -> Result<Self, HighlightError> {
        let config: Self =
            serde_json::from_str(s).map_err(|e| HighlightError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), HighlightError> {
        if !(self.fuzzy_threshold > 0.0 && self.fuzzy_threshold <= 1.0) {
            return Err(HighlightError::InvalidConfig(format!(
                "fuzzy_threshold must be in (0, 1], got {}",
                self.fuzzy_threshold
            )));
        }
        if self.excerpt_chars == 0 {
            return Err(HighlightError::InvalidConfig(
                "excerpt_chars must be greater than zero".to_string(),
            ));
        }
        if !(self.line_bucket > 0.0) {
            return Err(HighlightError::InvalidConfig(format!(
                "line_bucket must be positive, got {}",
                self.line_bucket
            )));
        }
        if !(self.highlight_opacity > 0.0 && self.highlight_opacity <= 1.0) {
            return Err(HighlightError::InvalidConfig(format!(
                "highlight_opacity must be in (0, 1], got {}",
                self.highlight_opacity
            )));
        }
        let prefix = self.highlight_prefix.trim();
        if prefix.is_empty() || prefix.contains(['/', '\\']) {
            return Err(HighlightError::InvalidConfig(format!(
                "highlight_prefix must be a non-empty file name fragment, got '{}'",
                self.highlight_prefix
            )));
        }
        Ok(())
    }

    /// Truncate an answer excerpt for a match record
    pub fn excerpt(&self, text: &str) -> String {
        if text.chars().count() > self.excerpt_chars {
            let head: String = text.chars().take(self.excerpt_chars).collect();
            format!("{}...", head)
        } else {
            text.to_string()
        }
    }

    /// Convert a distance from the page top into a line bucket
    pub fn line_for(&self, top: f64) -> u32 {
        (top.max(0.0) / self.line_bucket).floor() as u32
    }

    /// Logical name of the highlighted artifact for a session's file
    pub fn highlighted_name(&self, session: u64, file_name: &str) -> String {
        format!("{}_{}_{}", self.highlight_prefix, session, file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_is_valid() {
        let config = HighlightConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fuzzy_threshold, 0.65);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = HighlightConfig::from_json(r#"{"fuzzy_threshold": 0.8}"#).unwrap();
        assert_eq!(config.fuzzy_threshold, 0.8);
        assert_eq!(config.excerpt_chars, 50);
        assert_eq!(config.highlight_prefix, "highlighted");
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        assert!(HighlightConfig::from_json(r#"{"fuzzy_threshold": 1.5}"#).is_err());
        assert!(HighlightConfig::from_json(r#"{"fuzzy_threshold": 0.0}"#).is_err());
    }

    #[test]
    fn test_rejects_path_like_prefix() {
        let config = HighlightConfig {
            highlight_prefix: "../out".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_excerpt_truncates_on_char_boundary() {
        let config = HighlightConfig {
            excerpt_chars: 5,
            ..Default::default()
        };
        assert_eq!(config.excerpt("naïve résumé"), "naïve...");
        assert_eq!(config.excerpt("short"), "short");
    }

    #[test]
    fn test_line_bucket() {
        let config = HighlightConfig::default();
        assert_eq!(config.line_for(72.0), 7);
        assert_eq!(config.line_for(9.99), 0);
        assert_eq!(config.line_for(-3.0), 0);
    }

    #[test]
    fn test_highlighted_name() {
        let config = HighlightConfig::default();
        assert_eq!(
            config.highlighted_name(12, "Biology.pdf"),
            "highlighted_12_Biology.pdf"
        );
    }
}
