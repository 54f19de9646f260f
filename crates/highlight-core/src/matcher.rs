//! Span matching: locate answer chunks on the pages their references cite

use shared_types::{Match, MatchMethod, Reference};
use tracing::{debug, warn};

use crate::annotate::add_highlight_annotation;
use crate::config::HighlightConfig;
use crate::error::HighlightError;
use crate::normalize::normalize;
use crate::page_index::DocumentLayout;
use crate::similarity::ratio;
use crate::text_layer::{PageLayout, TextRegion};

/// Annotate every region on a page of the layout's document
pub(crate) fn highlight_regions(
    layout: &mut DocumentLayout,
    page: u32,
    regions: &[TextRegion],
    opacity: f64,
) -> Result<(), HighlightError> {
    let page_id = layout
        .page_id(page)
        .ok_or_else(|| HighlightError::AnnotationError {
            page,
            reason: "page does not exist".to_string(),
        })?;
    for region in regions {
        add_highlight_annotation(layout.document_mut(), page_id, page, &region.rect, opacity)?;
    }
    Ok(())
}

/// Result of scanning one page for one chunk
enum ChunkHit {
    Exact(Vec<TextRegion>),
    Fuzzy(Vec<TextRegion>),
    Miss,
}

fn find_chunk(page_layout: &PageLayout, chunk: &str, config: &HighlightConfig) -> ChunkHit {
    let exact = page_layout.search(chunk);
    if !exact.is_empty() {
        return ChunkHit::Exact(exact);
    }
    if !config.enable_fuzzy {
        return ChunkHit::Miss;
    }

    let needle = normalize(chunk);
    let width = needle.split(' ').count();
    let words: Vec<&str> = page_layout.normalized_text().split(' ').collect();
    if needle.is_empty() || words.len() < width {
        return ChunkHit::Miss;
    }

    for start in 0..=(words.len() - width) {
        let window = words[start..start + width].join(" ");
        let score = ratio(&needle, &window);
        if score < config.fuzzy_threshold {
            continue;
        }
        debug!(
            "Fuzzy window on page {} scored {:.3}: '{}'",
            page_layout.page_number(),
            score,
            window
        );
        let regions = page_layout.search(&window);
        if !regions.is_empty() {
            return ChunkHit::Fuzzy(regions);
        }
    }
    ChunkHit::Miss
}

/// Match every chunk against every referenced page, annotating what is found.
///
/// References whose page does not exist, and pages without text, are skipped.
/// Annotations accumulate in the layout's document across references.
pub fn match_references(
    layout: &mut DocumentLayout,
    chunks: &[String],
    references: &[Reference],
    config: &HighlightConfig,
) -> Result<Vec<Match>, HighlightError> {
    let mut matches = Vec::new();

    for reference in references {
        let page = reference.page_number;
        let Some(page_layout) = layout.page(page) else {
            debug!(
                "Skipping {} page {}: document has {} pages",
                reference.document_name,
                page,
                layout.page_count()
            );
            continue;
        };
        if page_layout.normalized_text().is_empty() {
            warn!(
                "No text on page {} of {}, skipping reference",
                page, reference.document_name
            );
            continue;
        }

        for chunk in chunks {
            let hit = layout
                .page(page)
                .map_or(ChunkHit::Miss, |p| find_chunk(p, chunk, config));
            let (regions, method) = match hit {
                ChunkHit::Exact(regions) => (regions, MatchMethod::Exact),
                ChunkHit::Fuzzy(regions) => (regions, MatchMethod::Fuzzy),
                ChunkHit::Miss => {
                    debug!("No match for chunk on page {}: '{}'", page, chunk);
                    continue;
                }
            };

            highlight_regions(layout, page, &regions, config.highlight_opacity)?;
            let text = config.excerpt(chunk);
            matches.extend(regions.iter().map(|region| Match {
                page,
                line: config.line_for(region.top),
                text: text.clone(),
                method,
            }));
        }
    }

    Ok(matches)
}
