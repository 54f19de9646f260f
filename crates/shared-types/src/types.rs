use serde::{Deserialize, Serialize};

/// A citation parsed out of an answer, e.g. `[Biology 101.pdf, page 3]`.
///
/// The page is not validated against any document here; the matcher checks
/// it against the real page count and skips references that fall outside.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    #[serde(alias = "filename")]
    pub document_name: String,
    #[serde(alias = "page")]
    pub page_number: u32,
}

impl Reference {
    pub fn new(document_name: impl Into<String>, page_number: u32) -> Self {
        Self {
            document_name: document_name.into(),
            page_number,
        }
    }
}

/// How a highlight was located.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMethod {
    Exact,
    Fuzzy,
    Fallback,
}

/// One highlight that was applied to the output document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    /// 1-based page number
    pub page: u32,
    /// Vertical bucket (distance from the page top / line bucket), not a real line number
    pub line: u32,
    /// Excerpt of the answer text that produced the highlight
    pub text: String,
    pub method: MatchMethod,
}

/// Highlights produced for a single source PDF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighlightResult {
    pub original_file: String,
    pub highlighted_file: String,
    pub matches: Vec<Match>,
}

/// Outcome of running the highlighter over one PDF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "matches", rename_all = "snake_case")]
pub enum HighlightOutcome {
    Matched(Vec<Match>),
    /// The document could not be opened or has no extractable text layer
    NoTextAvailable,
    NoMatchFound,
}

impl HighlightOutcome {
    pub fn matches(&self) -> &[Match] {
        match self {
            HighlightOutcome::Matched(matches) => matches,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_match_serializes_method_lowercase() {
        let m = Match {
            page: 2,
            line: 14,
            text: "The cell membrane".to_string(),
            method: MatchMethod::Fuzzy,
        };
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "page": 2,
                "line": 14,
                "text": "The cell membrane",
                "method": "fuzzy"
            })
        );
    }

    #[test]
    fn test_reference_accepts_original_field_names() {
        let json = r#"{"filename":"Doc A","page":3}"#;
        let reference: Reference = serde_json::from_str(json).unwrap();
        assert_eq!(reference, Reference::new("Doc A", 3));
    }

    #[test]
    fn test_outcome_matches_empty_for_non_matched() {
        assert!(HighlightOutcome::NoMatchFound.matches().is_empty());
        assert!(HighlightOutcome::NoTextAvailable.matches().is_empty());
    }
}
