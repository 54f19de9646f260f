//! Citation highlighting for chat answers grounded in PDFs
//!
//! An answer cites its sources with markers like `[Biology.pdf, page 3]`.
//! The engine splits the answer into sentence chunks, looks for each chunk on
//! the cited page (exact region search first, then a sliding-window fuzzy
//! match), falls back to searching for the whole answer, and writes a copy of
//! the PDF with `Highlight` annotations over everything it found.
//!
//! Page text and region search both come from one positioned text layer
//! built with lopdf, so any text the matcher scores can also be located.

pub mod annotate;
pub mod config;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod matcher;
pub mod normalize;
pub mod page_index;
pub mod references;
pub mod segment;
pub mod similarity;
pub mod store;
pub mod text_layer;

pub use config::HighlightConfig;
pub use engine::{DocumentHighlight, HighlightEngine};
pub use error::{HighlightError, StoreError};
pub use normalize::normalize;
pub use page_index::{build_page_index, DocumentLayout, PageText};
pub use references::{parse_references, strip_references};
pub use segment::segment;
pub use similarity::ratio;
pub use store::{DocumentStore, FsDocumentStore};
pub use text_layer::{PageLayout, Rect, TextRegion};
