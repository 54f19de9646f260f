//! End-to-end highlighting over generated PDFs
//!
//! Run with: cargo test -p highlight-core --test highlight

#[path = "common/pdf.rs"]
mod pdf;

use highlight_core::{
    build_page_index, DocumentStore, FsDocumentStore, HighlightConfig, HighlightEngine,
};
use pretty_assertions::assert_eq;
use shared_types::{HighlightOutcome, MatchMethod, Reference};
use tempfile::TempDir;

use pdf::{annotation_counts, create_malformed_font_pdf, create_text_pdf};

fn biology_pdf() -> Vec<u8> {
    create_text_pdf(&[&[
        "Cells are the basic unit of life.",
        "Mitochondria produce energy for the cell.",
    ]])
}

fn fallback_pdf() -> Vec<u8> {
    create_text_pdf(&[
        &["Photosynthesis occurs in chloroplasts of plant cells."],
        &["Enzymes speed up reactions.", "They are proteins."],
        &["Enzymes speed up reactions. They are proteins."],
    ])
}

fn store() -> (TempDir, FsDocumentStore) {
    let dir = TempDir::new().unwrap();
    let store =
        FsDocumentStore::new(dir.path().join("uploads"), dir.path().join("highlights")).unwrap();
    (dir, store)
}

fn highlight_files(store: &FsDocumentStore) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(store.highlight_dir())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// ============================================================================
// Page text
// ============================================================================

#[test]
fn test_page_index_reads_lines_in_order() {
    let index = build_page_index(&fallback_pdf());

    assert_eq!(index.page_count(), 3);
    assert_eq!(
        index.get(1),
        Some("Photosynthesis occurs in chloroplasts of plant cells.")
    );
    assert_eq!(
        index.get(2),
        Some("Enzymes speed up reactions.\nThey are proteins.")
    );
    assert_eq!(index.get(4), None);
}

// ============================================================================
// Single document
// ============================================================================

#[test]
fn test_exact_match_takes_precedence() {
    let engine = HighlightEngine::default();
    let answer = "Mitochondria produce energy for the cell. [bio.pdf, page 1]";
    let refs = vec![Reference::new("bio.pdf", 1)];

    let result = engine
        .highlight_document(&biology_pdf(), answer, &refs)
        .unwrap();

    let matches = result.outcome.matches();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].page, 1);
    assert_eq!(matches[0].method, MatchMethod::Exact);
    assert_eq!(matches[0].text, "Mitochondria produce energy for the cell.");
    // second line: baseline 700, top of glyph box 709.6, 82.4pt from the top
    assert_eq!(matches[0].line, 8);
    assert_eq!(annotation_counts(result.pdf.as_ref().unwrap()), vec![1]);
}

#[test]
fn test_fuzzy_match_when_wording_differs() {
    let pdf = create_text_pdf(&[&[
        "The mitochondria is the powerhouse of a cell and makes energy",
    ]]);
    let engine = HighlightEngine::default();
    let answer = "Powerhouse of the cell [bio.pdf, page 1]";

    let result = engine
        .highlight_document(&pdf, answer, &[Reference::new("bio.pdf", 1)])
        .unwrap();

    let matches = result.outcome.matches();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].method, MatchMethod::Fuzzy);
    assert_eq!(matches[0].text, "Powerhouse of the cell");
    assert_eq!(matches[0].line, 6);
}

#[test]
fn test_fuzzy_threshold_is_configurable() {
    let pdf = create_text_pdf(&[&[
        "The mitochondria is the powerhouse of a cell and makes energy",
    ]]);
    let engine = HighlightEngine::new(HighlightConfig {
        fuzzy_threshold: 0.9,
        enable_fallback: false,
        ..Default::default()
    })
    .unwrap();

    let result = engine
        .highlight_document(
            &pdf,
            "Powerhouse of the cell [bio.pdf, page 1]",
            &[Reference::new("bio.pdf", 1)],
        )
        .unwrap();

    // best window scores 0.857
    assert_eq!(result.outcome, HighlightOutcome::NoMatchFound);
    assert!(result.pdf.is_none());
}

#[test]
fn test_out_of_range_page_is_skipped() {
    let engine = HighlightEngine::new(HighlightConfig {
        enable_fallback: false,
        ..Default::default()
    })
    .unwrap();
    let answer = "Mitochondria produce energy for the cell. [bio.pdf, page 9]";

    let result = engine
        .highlight_document(&biology_pdf(), answer, &[Reference::new("bio.pdf", 9)])
        .unwrap();

    assert_eq!(result.outcome, HighlightOutcome::NoMatchFound);
}

#[test]
fn test_fallback_stops_at_first_page_containing_answer() {
    let engine = HighlightEngine::default();
    let answer = "Enzymes speed up reactions. They are proteins. [bio.pdf, page 1]";

    let result = engine
        .highlight_document(&fallback_pdf(), answer, &[Reference::new("bio.pdf", 1)])
        .unwrap();

    let matches = result.outcome.matches();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].page, 2);
    assert_eq!(matches[0].method, MatchMethod::Fallback);
    assert_eq!(matches[0].line, 6);
    assert!(matches[0].text.starts_with("Enzymes speed up reactions."));
    assert!(matches[0].text.ends_with("..."));

    // one region per line on page 2, nothing on pages 1 and 3
    assert_eq!(annotation_counts(result.pdf.as_ref().unwrap()), vec![0, 2, 0]);
}

#[test]
fn test_fallback_can_be_disabled() {
    let engine = HighlightEngine::new(HighlightConfig {
        enable_fallback: false,
        ..Default::default()
    })
    .unwrap();
    let answer = "Enzymes speed up reactions. They are proteins. [bio.pdf, page 1]";

    let result = engine
        .highlight_document(&fallback_pdf(), answer, &[Reference::new("bio.pdf", 1)])
        .unwrap();

    assert_eq!(result.outcome, HighlightOutcome::NoMatchFound);
}

#[test]
fn test_annotations_accumulate_across_references() {
    let pdf = create_text_pdf(&[
        &["Ribosomes build proteins."],
        &["Lysosomes digest waste."],
    ]);
    let engine = HighlightEngine::default();
    let answer = "Ribosomes build proteins. Lysosomes digest waste. [bio.pdf, page 1] [bio.pdf, page 2]";
    let refs = vec![Reference::new("bio.pdf", 1), Reference::new("bio.pdf", 2)];

    let result = engine.highlight_document(&pdf, answer, &refs).unwrap();

    let pages: Vec<u32> = result.outcome.matches().iter().map(|m| m.page).collect();
    assert_eq!(pages, vec![1, 2]);
    assert_eq!(annotation_counts(result.pdf.as_ref().unwrap()), vec![1, 1]);
}

// ============================================================================
// Session highlighting and persistence
// ============================================================================

#[test]
fn test_empty_answer_or_references_write_nothing() {
    let (_dir, store) = store();
    store.save_original(1, "bio.pdf", &biology_pdf()).unwrap();
    let engine = HighlightEngine::default();
    let pdfs = vec!["bio.pdf".to_string()];

    assert!(engine.highlight(1, &pdfs, "   ", &[], &store).is_empty());
    assert!(engine
        .highlight(1, &pdfs, "Mitochondria produce energy for the cell.", &[], &store)
        .is_empty());
    assert!(highlight_files(&store).is_empty());
}

#[test]
fn test_artifact_written_only_for_matched_pdfs() {
    let (_dir, store) = store();
    store.save_original(4, "bio.pdf", &biology_pdf()).unwrap();
    store
        .save_original(4, "other.pdf", &create_text_pdf(&[&["Nothing relevant here."]]))
        .unwrap();
    let engine = HighlightEngine::default();
    let pdfs = vec!["bio.pdf".to_string(), "other.pdf".to_string()];

    let results = engine.highlight(
        4,
        &pdfs,
        "Mitochondria produce energy for the cell. [bio.pdf, page 1]",
        &[],
        &store,
    );

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].original_file, "bio.pdf");
    assert_eq!(results[0].highlighted_file, "highlighted_4_bio.pdf");
    assert_eq!(highlight_files(&store), vec!["highlighted_4_bio.pdf"]);

    let artifact = store.load_highlighted("highlighted_4_bio.pdf").unwrap();
    assert_eq!(annotation_counts(&artifact), vec![results[0].matches.len()]);
    // the original is never modified
    assert_eq!(annotation_counts(&store.load_original(4, "bio.pdf").unwrap()), vec![0]);
}

#[test]
fn test_missing_pdf_does_not_stop_others() {
    let (_dir, store) = store();
    store.save_original(2, "bio.pdf", &biology_pdf()).unwrap();
    let engine = HighlightEngine::default();
    let pdfs = vec!["missing.pdf".to_string(), "bio.pdf".to_string()];

    let results = engine.highlight(
        2,
        &pdfs,
        "Cells are the basic unit of life. [bio.pdf, page 1] [missing.pdf, page 1]",
        &[],
        &store,
    );

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].original_file, "bio.pdf");
}

#[test]
fn test_malformed_font_does_not_stop_others() {
    let (_dir, store) = store();
    store
        .save_original(
            6,
            "broken.pdf",
            &create_malformed_font_pdf(&[&["Mitochondria produce energy for the cell."]]),
        )
        .unwrap();
    store.save_original(6, "bio.pdf", &biology_pdf()).unwrap();
    let engine = HighlightEngine::default();
    let pdfs = vec!["broken.pdf".to_string(), "bio.pdf".to_string()];

    let results = engine.highlight(
        6,
        &pdfs,
        "Mitochondria produce energy for the cell. [broken.pdf, page 1] [bio.pdf, page 1]",
        &[],
        &store,
    );

    let files: Vec<&str> = results.iter().map(|r| r.original_file.as_str()).collect();
    assert!(files.contains(&"bio.pdf"));
    let bio = results.iter().find(|r| r.original_file == "bio.pdf").unwrap();
    assert_eq!(bio.matches[0].method, MatchMethod::Exact);
}

#[test]
fn test_explicit_references_override_markers() {
    let (_dir, store) = store();
    store.save_original(3, "bio.pdf", &biology_pdf()).unwrap();
    let engine = HighlightEngine::new(HighlightConfig {
        enable_fallback: false,
        ..Default::default()
    })
    .unwrap();
    let pdfs = vec!["bio.pdf".to_string()];

    // the marker points at a page that does not exist; the explicit reference wins
    let results = engine.highlight(
        3,
        &pdfs,
        "Cells are the basic unit of life. [bio.pdf, page 7]",
        &[Reference::new("bio.pdf", 1)],
        &store,
    );

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].matches[0].method, MatchMethod::Exact);
    assert_eq!(results[0].matches[0].line, 6);
}

#[test]
fn test_repeat_highlighting_overwrites_artifact() {
    let (_dir, store) = store();
    store.save_original(5, "bio.pdf", &biology_pdf()).unwrap();
    let engine = HighlightEngine::default();
    let pdfs = vec!["bio.pdf".to_string()];
    let answer = "Cells are the basic unit of life. [bio.pdf, page 1]";

    engine.highlight(5, &pdfs, answer, &[], &store);
    engine.highlight(5, &pdfs, answer, &[], &store);

    assert_eq!(highlight_files(&store), vec!["highlighted_5_bio.pdf"]);
    let artifact = store.load_highlighted("highlighted_5_bio.pdf").unwrap();
    assert_eq!(annotation_counts(&artifact), vec![1]);
}
