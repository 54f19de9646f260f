//! Citation marker parsing: `[<document>, page <N>]`

use lazy_static::lazy_static;
use regex::Regex;
use shared_types::Reference;

lazy_static! {
    /// Document name is non-greedy up to the comma and may not cross a
    /// bracket; page is ASCII digits.
    static ref CITATION_MARKER: Regex =
        Regex::new(r"\[([^\[\]]*?),\s*page\s*([0-9]+)\]").unwrap();
}

/// Extract all citation markers in order of appearance, duplicates included.
///
/// Malformed markers never fail the caller; they are simply not matched by the
/// pattern. Page numbers of zero or too large for `u32` are dropped, and
/// document names are trimmed.
pub fn parse_references(answer_text: &str) -> Vec<Reference> {
    CITATION_MARKER
        .captures_iter(answer_text)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().trim();
            let page: u32 = caps.get(2)?.as_str().parse().ok()?;
            if page == 0 {
                return None;
            }
            Some(Reference::new(name, page))
        })
        .collect()
}

/// Remove every citation marker and trim the result
pub fn strip_references(answer_text: &str) -> String {
    CITATION_MARKER
        .replace_all(answer_text, "")
        .trim()
        .to_string()
}
