//! Whitespace normalization, the single comparability transform

/// Collapse every run of whitespace into one space and trim the ends.
///
/// Case is preserved; matching is case-sensitive.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for word in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}
