//! Sentence-level chunking of the answer text

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref SENTENCE_BREAK: Regex = Regex::new(r"[.!?]\s+").unwrap();
}

/// Split a marker-free answer into sentence chunks.
///
/// The terminator and the whitespace after it are consumed by the split, so
/// only the final sentence keeps its punctuation. Empty pieces are dropped.
pub fn segment(clean_answer: &str) -> Vec<String> {
    SENTENCE_BREAK
        .split(clean_answer)
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .map(str::to_string)
        .collect()
}
