//! Per-PDF highlighting pipeline

use shared_types::{HighlightOutcome, HighlightResult, Reference};
use tracing::{error, info, instrument, warn};

use crate::annotate::save;
use crate::config::HighlightConfig;
use crate::error::HighlightError;
use crate::fallback::match_whole_response;
use crate::matcher::match_references;
use crate::page_index::DocumentLayout;
use crate::references::{parse_references, strip_references};
use crate::segment::segment;
use crate::store::DocumentStore;

/// Output of highlighting a single document in memory
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentHighlight {
    pub outcome: HighlightOutcome,
    /// Annotated PDF, present only when the outcome is `Matched`
    pub pdf: Option<Vec<u8>>,
}

/// Locates cited answer text in source PDFs and writes highlighted copies
#[derive(Debug, Clone)]
pub struct HighlightEngine {
    config: HighlightConfig,
}

impl HighlightEngine {
    pub fn new(config: HighlightConfig) -> Result<Self, HighlightError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &HighlightConfig {
        &self.config
    }

    /// Highlight one PDF given the references that cite it.
    ///
    /// When the span matcher finds nothing, the whole answer is tried as a
    /// fallback. A document that cannot be opened, or that has no text at
    /// all, is reported as `NoTextAvailable` rather than as an error.
    #[instrument(skip_all, fields(bytes = pdf_bytes.len(), references = references.len()))]
    pub fn highlight_document(
        &self,
        pdf_bytes: &[u8],
        answer_text: &str,
        references: &[Reference],
    ) -> Result<DocumentHighlight, HighlightError> {
        let not_matched = |outcome| DocumentHighlight { outcome, pdf: None };

        let mut layout = match DocumentLayout::load(pdf_bytes) {
            Ok(layout) => layout,
            Err(e) => {
                warn!("Skipping unreadable PDF: {}", e);
                return Ok(not_matched(HighlightOutcome::NoTextAvailable));
            }
        };
        if !layout.page_text().has_text() {
            warn!("PDF has no extractable text");
            return Ok(not_matched(HighlightOutcome::NoTextAvailable));
        }

        let clean_answer = strip_references(answer_text);
        let chunks = segment(&clean_answer);
        let mut matches = match_references(&mut layout, &chunks, references, &self.config)?;

        if matches.is_empty() && self.config.enable_fallback {
            info!("No chunk matched, trying the whole answer");
            matches.extend(match_whole_response(
                &mut layout,
                &clean_answer,
                answer_text,
                &self.config,
            )?);
        }

        if matches.is_empty() {
            return Ok(not_matched(HighlightOutcome::NoMatchFound));
        }

        let pdf = save(layout.document_mut())?;
        Ok(DocumentHighlight {
            outcome: HighlightOutcome::Matched(matches),
            pdf: Some(pdf),
        })
    }

    /// Highlight every PDF of a session.
    ///
    /// Empty `references` means they are parsed from `answer_text`. Each PDF
    /// receives only the references naming it. A PDF that fails is logged and
    /// skipped; PDFs without matches are left out of the result and get no
    /// artifact.
    #[instrument(skip(self, pdf_names, answer_text, references, store), fields(pdfs = pdf_names.len()))]
    pub fn highlight<S: DocumentStore + ?Sized>(
        &self,
        session: u64,
        pdf_names: &[String],
        answer_text: &str,
        references: &[Reference],
        store: &S,
    ) -> Vec<HighlightResult> {
        if answer_text.trim().is_empty() {
            warn!("No answer text to highlight");
            return Vec::new();
        }
        let references = if references.is_empty() {
            parse_references(answer_text)
        } else {
            references.to_vec()
        };
        if references.is_empty() {
            warn!("No references to highlight");
            return Vec::new();
        }

        let mut results = Vec::new();
        for pdf_name in pdf_names {
            let relevant: Vec<Reference> = references
                .iter()
                .filter(|r| &r.document_name == pdf_name)
                .cloned()
                .collect();

            match self.highlight_stored(session, pdf_name, answer_text, &relevant, store) {
                Ok(Some(result)) => {
                    info!(
                        "Highlighted {} with {} matches",
                        pdf_name,
                        result.matches.len()
                    );
                    results.push(result);
                }
                Ok(None) => {}
                Err(e) => error!("Error highlighting {}: {}", pdf_name, e),
            }
        }
        results
    }

    fn highlight_stored<S: DocumentStore + ?Sized>(
        &self,
        session: u64,
        pdf_name: &str,
        answer_text: &str,
        references: &[Reference],
        store: &S,
    ) -> Result<Option<HighlightResult>, HighlightError> {
        let bytes = store.load_original(session, pdf_name)?;
        let highlight = self.highlight_document(&bytes, answer_text, references)?;

        let (HighlightOutcome::Matched(matches), Some(pdf)) = (highlight.outcome, highlight.pdf)
        else {
            info!("No highlights for {}", pdf_name);
            return Ok(None);
        };

        let highlighted_file = self.config.highlighted_name(session, pdf_name);
        store.save_highlighted(&highlighted_file, &pdf)?;
        Ok(Some(HighlightResult {
            original_file: pdf_name.to_string(),
            highlighted_file,
            matches,
        }))
    }
}

impl Default for HighlightEngine {
    fn default() -> Self {
        Self {
            config: HighlightConfig::default(),
        }
    }
}
