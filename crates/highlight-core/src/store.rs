//! Storage of uploaded PDFs and highlighted artifacts

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::StoreError;

/// Where source documents are read from and highlighted documents written to.
///
/// Originals are stored per session as `<session>_<name>`; highlighted
/// artifacts are stored under their full logical name.
pub trait DocumentStore: Send + Sync {
    /// Store an uploaded PDF, returning its stored file name
    fn save_original(&self, session: u64, name: &str, bytes: &[u8]) -> Result<String, StoreError>;

    fn load_original(&self, session: u64, name: &str) -> Result<Vec<u8>, StoreError>;

    /// Write a highlighted artifact, replacing any previous one of that name
    fn save_highlighted(&self, name: &str, bytes: &[u8]) -> Result<(), StoreError>;

    fn load_highlighted(&self, name: &str) -> Result<Vec<u8>, StoreError>;

    /// Read an upload by its stored file name
    fn load_upload(&self, stored_name: &str) -> Result<Vec<u8>, StoreError>;
}

/// Reject names that could escape the storage directory
pub fn validate_name(name: &str) -> Result<(), StoreError> {
    let invalid = name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\', '\0'])
        || name.contains("..");
    if invalid {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Filesystem-backed store with separate upload and highlight directories
#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    upload_dir: PathBuf,
    highlight_dir: PathBuf,
}

impl FsDocumentStore {
    /// Create the store, creating both directories if needed
    pub fn new(
        upload_dir: impl Into<PathBuf>,
        highlight_dir: impl Into<PathBuf>,
    ) -> Result<Self, StoreError> {
        let store = Self {
            upload_dir: upload_dir.into(),
            highlight_dir: highlight_dir.into(),
        };
        fs::create_dir_all(&store.upload_dir)?;
        fs::create_dir_all(&store.highlight_dir)?;
        Ok(store)
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn highlight_dir(&self) -> &Path {
        &self.highlight_dir
    }

    fn stored_name(session: u64, name: &str) -> Result<String, StoreError> {
        validate_name(name)?;
        Ok(format!("{}_{}", session, name))
    }

    fn read(dir: &Path, name: &str) -> Result<Vec<u8>, StoreError> {
        validate_name(name)?;
        match fs::read(dir.join(name)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write(dir: &Path, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        validate_name(name)?;
        // Write then rename so readers never see a partial file
        let tmp = dir.join(format!(".{}.tmp", name));
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, dir.join(name))?;
        Ok(())
    }
}

impl DocumentStore for FsDocumentStore {
    fn save_original(&self, session: u64, name: &str, bytes: &[u8]) -> Result<String, StoreError> {
        let stored = Self::stored_name(session, name)?;
        Self::write(&self.upload_dir, &stored, bytes)?;
        Ok(stored)
    }

    fn load_original(&self, session: u64, name: &str) -> Result<Vec<u8>, StoreError> {
        let stored = Self::stored_name(session, name)?;
        Self::read(&self.upload_dir, &stored)
    }

    fn save_highlighted(&self, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        Self::write(&self.highlight_dir, name, bytes)
    }

    fn load_highlighted(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        Self::read(&self.highlight_dir, name)
    }

    fn load_upload(&self, stored_name: &str) -> Result<Vec<u8>, StoreError> {
        Self::read(&self.upload_dir, stored_name)
    }
}
