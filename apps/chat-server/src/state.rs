//! Shared application state

use std::path::Path;
use std::sync::Arc;

use highlight_core::{FsDocumentStore, HighlightEngine};

use crate::sessions::SessionStore;

pub const UPLOAD_DIR: &str = "uploads";
pub const HIGHLIGHT_DIR: &str = "highlights";
pub const CHAT_HISTORY_FILE: &str = "chathistory.json";

pub struct AppState {
    pub engine: HighlightEngine,
    pub documents: Arc<FsDocumentStore>,
    pub sessions: SessionStore,
}

impl AppState {
    /// Open the data directory, creating `uploads/` and `highlights/` and
    /// loading the chat history
    pub async fn open(data_dir: &Path, engine: HighlightEngine) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let documents =
            FsDocumentStore::new(data_dir.join(UPLOAD_DIR), data_dir.join(HIGHLIGHT_DIR))?;
        let sessions = SessionStore::load(data_dir.join(CHAT_HISTORY_FILE)).await;

        tracing::info!(
            "Data directory: {}, chat history: {}",
            data_dir.display(),
            sessions.path().display()
        );
        Ok(Self {
            engine,
            documents: Arc::new(documents),
            sessions,
        })
    }
}
