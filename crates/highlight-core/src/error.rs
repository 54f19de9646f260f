use thiserror::Error;

#[derive(Error, Debug)]
pub enum HighlightError {
    #[error("Failed to parse PDF: {0}")]
    ParseError(String),

    #[error("Failed to annotate page {page}: {reason}")]
    AnnotationError { page: u32, reason: String },

    #[error("Failed to serialize highlighted PDF: {0}")]
    SaveError(String),

    #[error("Invalid highlight configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid file name: {0}")]
    InvalidName(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
