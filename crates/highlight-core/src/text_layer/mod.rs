//! Positioned text layer of a PDF page
//!
//! The content stream is interpreted into glyph runs (see [`content`]), the
//! runs are grouped into reading-order lines, and the result is kept as a
//! sequence of characters with their boxes in PDF user space. The same
//! sequence backs both the plain page text and region search, so any text
//! taken from [`PageLayout::text`] can be located again with
//! [`PageLayout::search`].

pub mod content;
mod fonts;

use std::collections::BTreeMap;

use lopdf::{Document, Object, ObjectId};
use serde::{Deserialize, Serialize};

use crate::normalize::normalize;
use content::GlyphRun;

/// US Letter, used when a page has no usable MediaBox
const DEFAULT_MEDIA_BOX: Rect = Rect {
    x0: 0.0,
    y0: 0.0,
    x1: 612.0,
    y1: 792.0,
};

/// Baseline tolerance for two runs to share a line, as a fraction of font size
const SAME_LINE_TOLERANCE: f64 = 0.5;
/// Horizontal gap between runs that reads as a word break
const WORD_GAP: f64 = 0.25;

/// Follow an indirect reference, returning the object itself otherwise
pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

/// Read an Integer or Real as f64
pub(crate) fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

/// Look up a page attribute, walking up the `Parent` chain for inheritable keys
pub(crate) fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = doc.get_object(page_id).ok()?.as_dict().ok()?;
    // Guard against cyclic page trees
    for _ in 0..32 {
        if let Ok(value) = current.get(key) {
            return Some(resolve(doc, value));
        }
        let parent = current.get(b"Parent").ok()?;
        current = resolve(doc, parent).as_dict().ok()?;
    }
    None
}

/// Axis-aligned rectangle in PDF user space (origin bottom-left)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Rect {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    /// Smallest rectangle containing every point
    pub fn bounding(points: &[(f64, f64)]) -> Self {
        let mut rect = Rect {
            x0: f64::INFINITY,
            y0: f64::INFINITY,
            x1: f64::NEG_INFINITY,
            y1: f64::NEG_INFINITY,
        };
        for &(x, y) in points {
            rect.x0 = rect.x0.min(x);
            rect.y0 = rect.y0.min(y);
            rect.x1 = rect.x1.max(x);
            rect.y1 = rect.y1.max(y);
        }
        rect
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }
}

/// A located piece of text: one rectangle per matched line
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextRegion {
    pub rect: Rect,
    /// Distance from the top edge of the page to the top of the region
    pub top: f64,
}

/// One character of the page text. Synthetic separators have no box.
#[derive(Debug, Clone, PartialEq)]
struct LayoutChar {
    pub ch: char,
    pub rect: Option<Rect>,
    pub line: usize,
}

/// Text layer of a single page
#[derive(Debug, Clone)]
pub struct PageLayout {
    page_number: u32,
    media_box: Rect,
    chars: Vec<LayoutChar>,
    text: String,
    normalized: String,
    /// Byte offset in `normalized` of each normalized char
    offsets: Vec<usize>,
    /// Index into `chars` each normalized char came from
    origins: Vec<usize>,
}

impl PageLayout {
    pub fn empty(page_number: u32, media_box: Rect) -> Self {
        Self::from_runs(page_number, media_box, Vec::new())
    }

    /// Group glyph runs into lines (stream order) and build the search index
    pub fn from_runs(page_number: u32, media_box: Rect, runs: Vec<GlyphRun>) -> Self {
        let chars = assemble_lines(runs);
        let text: String = chars.iter().map(|c| c.ch).collect();

        let mut normalized = String::with_capacity(text.len());
        let mut offsets = Vec::with_capacity(chars.len());
        let mut origins = Vec::with_capacity(chars.len());
        let mut pending_space: Option<usize> = None;

        for (idx, c) in chars.iter().enumerate() {
            if c.ch.is_whitespace() {
                if !normalized.is_empty() && pending_space.is_none() {
                    pending_space = Some(idx);
                }
                continue;
            }
            if let Some(space_idx) = pending_space.take() {
                offsets.push(normalized.len());
                origins.push(space_idx);
                normalized.push(' ');
            }
            offsets.push(normalized.len());
            origins.push(idx);
            normalized.push(c.ch);
        }

        Self {
            page_number,
            media_box,
            chars,
            text,
            normalized,
            offsets,
            origins,
        }
    }

    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    /// Reading-order text, lines joined with `\n`
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whitespace-normalized page text
    pub fn normalized_text(&self) -> &str {
        &self.normalized
    }

    /// Find every occurrence of `needle` (compared after normalization) and
    /// return one region per line each occurrence touches, in page order.
    pub fn search(&self, needle: &str) -> Vec<TextRegion> {
        let needle = normalize(needle);
        if needle.is_empty() {
            return Vec::new();
        }

        let mut regions = Vec::new();
        for (start, found) in self.normalized.match_indices(needle.as_str()) {
            let end = start + found.len();
            let first = self.offsets.partition_point(|&o| o < start);
            let last = self.offsets.partition_point(|&o| o < end);

            let mut per_line: BTreeMap<usize, Rect> = BTreeMap::new();
            for &origin in &self.origins[first..last] {
                let c = &self.chars[origin];
                if let Some(rect) = c.rect {
                    per_line
                        .entry(c.line)
                        .and_modify(|r| *r = r.union(&rect))
                        .or_insert(rect);
                }
            }

            regions.extend(per_line.into_values().map(|rect| TextRegion {
                rect,
                top: self.media_box.y1 - rect.y1,
            }));
        }
        regions
    }
}

fn assemble_lines(runs: Vec<GlyphRun>) -> Vec<LayoutChar> {
    let mut chars: Vec<LayoutChar> = Vec::new();
    let mut line = 0;
    let mut previous: Option<(f64, f64, f64)> = None; // baseline, end_x, size

    for run in runs {
        if let Some((baseline, end_x, size)) = previous {
            let size_ref = size.max(run.size).max(1.0);
            let tolerance = SAME_LINE_TOLERANCE * size_ref;
            let same_line = (run.baseline - baseline).abs() <= tolerance
                && run.start_x() >= end_x - tolerance;

            if same_line {
                let gap = run.start_x() - end_x;
                let last_is_space = chars.last().map_or(true, |c| c.ch.is_whitespace());
                let next_is_space = run.glyphs.first().map_or(true, |g| g.ch.is_whitespace());
                if gap > WORD_GAP * size_ref && !last_is_space && !next_is_space {
                    chars.push(LayoutChar {
                        ch: ' ',
                        rect: None,
                        line,
                    });
                }
            } else {
                chars.push(LayoutChar {
                    ch: '\n',
                    rect: None,
                    line,
                });
                line += 1;
            }
        }

        previous = Some((run.baseline, run.end_x(), run.size));
        chars.extend(run.glyphs.into_iter().map(|g| LayoutChar {
            ch: g.ch,
            rect: Some(g.rect),
            line,
        }));
    }

    chars
}

fn media_box(doc: &Document, page_id: ObjectId) -> Rect {
    let Some(values) = inherited(doc, page_id, b"MediaBox")
        .and_then(|o| o.as_array().ok())
        .map(|arr| {
            arr.iter()
                .filter_map(|o| number(resolve(doc, o)))
                .collect::<Vec<f64>>()
        })
    else {
        return DEFAULT_MEDIA_BOX;
    };

    match values.as_slice() {
        [x0, y0, x1, y1] if x0 != x1 && y0 != y1 => Rect::new(*x0, *y0, *x1, *y1),
        _ => DEFAULT_MEDIA_BOX,
    }
}

/// Build the text layer of one page.
///
/// Content that cannot be decoded yields an empty layout; the caller sees a
/// page without text rather than an error.
pub fn extract_page_layout(doc: &Document, page_number: u32, page_id: ObjectId) -> PageLayout {
    let media_box = media_box(doc, page_id);
    match content::extract_runs(doc, page_id) {
        Ok(runs) => PageLayout::from_runs(page_number, media_box, runs),
        Err(e) => {
            tracing::warn!("Failed to extract text from page {}: {}", page_number, e);
            PageLayout::empty(page_number, media_box)
        }
    }
}
