//! Whole-response fallback when no chunk could be matched

use shared_types::{Match, MatchMethod};
use tracing::{debug, info};

use crate::config::HighlightConfig;
use crate::error::HighlightError;
use crate::matcher::highlight_regions;
use crate::normalize::normalize;
use crate::page_index::DocumentLayout;

/// Look for the entire cleaned answer on the pages in order.
///
/// Only the first page whose text contains the answer is highlighted; later
/// pages are never examined. The match excerpt is taken from `answer_text`.
pub fn match_whole_response(
    layout: &mut DocumentLayout,
    clean_answer: &str,
    answer_text: &str,
    config: &HighlightConfig,
) -> Result<Option<Match>, HighlightError> {
    let needle = normalize(clean_answer);
    if needle.is_empty() {
        return Ok(None);
    }

    let mut hit = None;
    for page in layout.pages() {
        if page.normalized_text().contains(needle.as_str()) {
            hit = Some((page.page_number(), page.search(&needle)));
            break;
        }
        debug!("Answer not found on page {}", page.page_number());
    }

    let Some((page, regions)) = hit else {
        return Ok(None);
    };
    let Some(first) = regions.first() else {
        return Ok(None);
    };
    let line = config.line_for(first.top);

    highlight_regions(layout, page, &regions, config.highlight_opacity)?;
    info!("Whole answer found on page {}", page);

    Ok(Some(Match {
        page,
        line,
        text: config.excerpt(answer_text),
        method: MatchMethod::Fallback,
    }))
}
