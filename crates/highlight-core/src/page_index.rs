//! Per-page text index of a document

use std::collections::BTreeMap;

use lopdf::{Document, ObjectId};

use crate::error::HighlightError;
use crate::text_layer::{extract_page_layout, PageLayout};

/// Extracted text of every page, keyed by 1-based page number
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageText {
    pages: BTreeMap<u32, String>,
}

impl PageText {
    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    pub fn get(&self, page: u32) -> Option<&str> {
        self.pages.get(&page).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.pages.iter().map(|(page, text)| (*page, text.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// True if at least one page produced non-blank text
    pub fn has_text(&self) -> bool {
        self.pages.values().any(|t| !t.trim().is_empty())
    }
}

/// A loaded document together with the text layer of each page.
///
/// Owns the `lopdf::Document`, so annotations can be added to the same
/// in-memory copy the text was read from.
pub struct DocumentLayout {
    doc: Document,
    page_ids: Vec<ObjectId>,
    layouts: Vec<PageLayout>,
}

impl DocumentLayout {
    pub fn load(pdf_bytes: &[u8]) -> Result<Self, HighlightError> {
        let doc = Document::load_mem(pdf_bytes)
            .map_err(|e| HighlightError::ParseError(e.to_string()))?;

        let pages = doc.get_pages();
        let mut page_ids = Vec::with_capacity(pages.len());
        let mut layouts = Vec::with_capacity(pages.len());
        for (page_number, page_id) in pages {
            layouts.push(extract_page_layout(&doc, page_number, page_id));
            page_ids.push(page_id);
        }

        Ok(Self {
            doc,
            page_ids,
            layouts,
        })
    }

    pub fn page_count(&self) -> u32 {
        self.layouts.len() as u32
    }

    /// Text layer of a 1-based page, `None` when out of range
    pub fn page(&self, page: u32) -> Option<&PageLayout> {
        let idx = (page as usize).checked_sub(1)?;
        self.layouts.get(idx)
    }

    pub fn page_id(&self, page: u32) -> Option<ObjectId> {
        let idx = (page as usize).checked_sub(1)?;
        self.page_ids.get(idx).copied()
    }

    pub fn pages(&self) -> impl Iterator<Item = &PageLayout> {
        self.layouts.iter()
    }

    pub fn page_text(&self) -> PageText {
        PageText {
            pages: self
                .layouts
                .iter()
                .enumerate()
                .map(|(idx, layout)| (idx as u32 + 1, layout.text().to_string()))
                .collect(),
        }
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }
}

/// Extract the text of every page.
///
/// A document that cannot be opened gives an empty index.
pub fn build_page_index(pdf_bytes: &[u8]) -> PageText {
    match DocumentLayout::load(pdf_bytes) {
        Ok(layout) => layout.page_text(),
        Err(e) => {
            tracing::warn!("Could not open PDF for text extraction: {}", e);
            PageText::default()
        }
    }
}
