//! Chat session store persisted as a JSON document
//!
//! The file holds `{"chats": [...]}`. Every mutation rewrites the file while
//! the write lock is held and only takes effect in memory once the write
//! succeeds, so the two copies never disagree.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use shared_types::{ChatMessage, ChatSession};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::ServerError;

#[derive(Debug, Default, Serialize, Deserialize)]
struct ChatHistory {
    #[serde(default)]
    chats: Vec<ChatSession>,
}

/// Field a chat search runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchField {
    Content,
    ChatName,
    Date,
    SystemInstructions,
    Tags,
}

impl SearchField {
    fn matches(self, chat: &ChatSession, query: &str) -> bool {
        let contains = |text: &str| text.to_lowercase().contains(query);
        match self {
            SearchField::Content => chat.messages.iter().any(|m| contains(&m.content)),
            SearchField::ChatName => contains(&chat.chat_name),
            SearchField::Date => contains(&chat.timestamp.to_rfc3339()),
            SearchField::SystemInstructions => contains(&chat.system_instructions),
            SearchField::Tags => chat.tags.iter().any(|t| contains(t)),
        }
    }
}

pub struct SessionStore {
    path: PathBuf,
    chats: RwLock<Vec<ChatSession>>,
}

impl SessionStore {
    /// Load sessions from `path`.
    ///
    /// A missing, empty or unparseable file starts an empty store.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let chats = match tokio::fs::read_to_string(&path).await {
            Ok(raw) if raw.trim().is_empty() => Vec::new(),
            Ok(raw) => match serde_json::from_str::<ChatHistory>(&raw) {
                Ok(history) => history.chats,
                Err(e) => {
                    warn!("Ignoring malformed chat history {}: {}", path.display(), e);
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!("Could not read chat history {}: {}", path.display(), e);
                Vec::new()
            }
        };
        info!("Loaded {} chats from {}", chats.len(), path.display());

        Self {
            path,
            chats: RwLock::new(chats),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, chats: &[ChatSession]) -> Result<(), ServerError> {
        let history = ChatHistory {
            chats: chats.to_vec(),
        };
        let json = serde_json::to_string_pretty(&history)
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| ServerError::Storage(e.to_string()))
    }

    /// Create a session with the next serial number (highest + 1)
    pub async fn create(
        &self,
        chat_name: &str,
        tags: Vec<String>,
        system_instructions: Option<String>,
    ) -> Result<ChatSession, ServerError> {
        let mut chats = self.chats.write().await;
        let serial = chats.iter().map(|c| c.serial_number).max().unwrap_or(0) + 1;

        let mut chat = ChatSession::new(serial, chat_name, tags);
        if let Some(instructions) = system_instructions {
            chat.system_instructions = instructions;
        }
        let mut updated = chats.clone();
        updated.push(chat.clone());
        self.persist(&updated).await?;
        *chats = updated;

        info!("Created chat {} '{}'", serial, chat_name);
        Ok(chat)
    }

    pub async fn get(&self, serial: u64) -> Option<ChatSession> {
        self.chats
            .read()
            .await
            .iter()
            .find(|c| c.serial_number == serial)
            .cloned()
    }

    pub async fn list(&self) -> Vec<ChatSession> {
        self.chats.read().await.clone()
    }

    pub async fn delete(&self, serial: u64) -> Result<(), ServerError> {
        let mut chats = self.chats.write().await;
        if !chats.iter().any(|c| c.serial_number == serial) {
            return Err(ServerError::ChatNotFound(serial));
        }
        let mut updated = chats.clone();
        updated.retain(|c| c.serial_number != serial);
        self.persist(&updated).await?;
        *chats = updated;
        Ok(())
    }

    /// Apply `f` to a session and persist the result
    pub async fn update<F, T>(&self, serial: u64, f: F) -> Result<T, ServerError>
    where
        F: FnOnce(&mut ChatSession) -> Result<T, ServerError>,
    {
        let mut chats = self.chats.write().await;
        let idx = chats
            .iter()
            .position(|c| c.serial_number == serial)
            .ok_or(ServerError::ChatNotFound(serial))?;

        // Apply to a copy so a failed write leaves memory matching disk
        let mut updated = chats.clone();
        let value = f(&mut updated[idx])?;
        self.persist(&updated).await?;
        *chats = updated;
        Ok(value)
    }

    pub async fn append_message(
        &self,
        serial: u64,
        message: ChatMessage,
    ) -> Result<ChatSession, ServerError> {
        self.update(serial, |chat| {
            chat.messages.push(message);
            Ok(chat.clone())
        })
        .await
    }

    /// Replace the content of the message at `index`
    pub async fn edit_message(
        &self,
        serial: u64,
        index: usize,
        content: String,
    ) -> Result<ChatSession, ServerError> {
        self.update(serial, |chat| {
            let message = chat.messages.get_mut(index).ok_or_else(|| {
                ServerError::InvalidRequest(format!("Message index {} out of range", index))
            })?;
            message.content = content;
            Ok(chat.clone())
        })
        .await
    }

    pub async fn set_tags(&self, serial: u64, tags: Vec<String>) -> Result<ChatSession, ServerError> {
        self.update(serial, |chat| {
            chat.tags = tags;
            Ok(chat.clone())
        })
        .await
    }

    /// Record uploaded PDF names on a session, skipping ones already attached
    pub async fn attach_pdfs(
        &self,
        serial: u64,
        names: &[String],
    ) -> Result<ChatSession, ServerError> {
        self.update(serial, |chat| {
            for name in names {
                if !chat.pdfs.contains(name) {
                    chat.pdfs.push(name.clone());
                }
            }
            Ok(chat.clone())
        })
        .await
    }

    /// Case-insensitive search; an empty query returns every chat
    pub async fn search(&self, field: SearchField, query: &str) -> Vec<ChatSession> {
        let query = query.trim().to_lowercase();
        let chats = self.chats.read().await;
        if query.is_empty() {
            return chats.clone();
        }
        chats
            .iter()
            .filter(|chat| field.matches(chat, &query))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use shared_types::{MessageSource, Role};
    use tempfile::TempDir;

    async fn store(dir: &TempDir) -> SessionStore {
        SessionStore::load(dir.path().join("chathistory.json")).await
    }

    #[tokio::test]
    async fn test_serials_increase_from_highest() {
        let dir = TempDir::new().unwrap();
        let sessions = store(&dir).await;

        let a = sessions.create("Cells", vec![], None).await.unwrap();
        let b = sessions.create("Energy", vec![], None).await.unwrap();
        sessions.delete(a.serial_number).await.unwrap();
        let c = sessions.create("Enzymes", vec![], None).await.unwrap();

        assert_eq!((a.serial_number, b.serial_number, c.serial_number), (1, 2, 3));
    }

    #[tokio::test]
    async fn test_persists_and_reloads() {
        let dir = TempDir::new().unwrap();
        {
            let sessions = store(&dir).await;
            let chat = sessions
                .create("Cells", vec!["bio".to_string()], Some("Be brief".to_string()))
                .await
                .unwrap();
            sessions
                .append_message(
                    chat.serial_number,
                    ChatMessage::new(Role::User, "What is ATP?", MessageSource::General),
                )
                .await
                .unwrap();
        }

        let reloaded = store(&dir).await;
        let chat = reloaded.get(1).await.unwrap();
        assert_eq!(chat.chat_name, "Cells");
        assert_eq!(chat.system_instructions, "Be brief");
        assert_eq!(chat.messages.len(), 1);

        let raw = std::fs::read_to_string(reloaded.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(value["chats"].is_array());
    }

    #[tokio::test]
    async fn test_malformed_history_starts_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("chathistory.json"), "{not json").unwrap();
        assert!(store(&dir).await.list().await.is_empty());

        std::fs::write(dir.path().join("chathistory.json"), "").unwrap();
        assert!(store(&dir).await.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_edit_message_bounds() {
        let dir = TempDir::new().unwrap();
        let sessions = store(&dir).await;
        sessions.create("Cells", vec![], None).await.unwrap();
        sessions
            .append_message(1, ChatMessage::new(Role::User, "typo", MessageSource::General))
            .await
            .unwrap();

        let chat = sessions.edit_message(1, 0, "fixed".to_string()).await.unwrap();
        assert_eq!(chat.messages[0].content, "fixed");
        assert!(matches!(
            sessions.edit_message(1, 5, "x".to_string()).await,
            Err(ServerError::InvalidRequest(_))
        ));
        assert!(matches!(
            sessions.edit_message(9, 0, "x".to_string()).await,
            Err(ServerError::ChatNotFound(9))
        ));
    }

    #[tokio::test]
    async fn test_attach_pdfs_deduplicates() {
        let dir = TempDir::new().unwrap();
        let sessions = store(&dir).await;
        sessions.create("Cells", vec![], None).await.unwrap();

        let names = vec!["a.pdf".to_string(), "b.pdf".to_string()];
        sessions.attach_pdfs(1, &names).await.unwrap();
        let chat = sessions.attach_pdfs(1, &names[..1]).await.unwrap();
        assert_eq!(chat.pdfs, names);
    }

    #[tokio::test]
    async fn test_search_fields() {
        let dir = TempDir::new().unwrap();
        let sessions = store(&dir).await;
        sessions
            .create("Cell Biology", vec!["exam".to_string()], None)
            .await
            .unwrap();
        sessions
            .create("Chemistry", vec![], Some("Answer in French".to_string()))
            .await
            .unwrap();
        sessions
            .append_message(
                2,
                ChatMessage::new(Role::Bot, "Covalent bonds share electrons", MessageSource::Pdf),
            )
            .await
            .unwrap();

        let serials = |chats: Vec<ChatSession>| -> Vec<u64> {
            chats.iter().map(|c| c.serial_number).collect()
        };
        assert_eq!(serials(sessions.search(SearchField::ChatName, "biology").await), vec![1]);
        assert_eq!(serials(sessions.search(SearchField::Tags, "EXAM").await), vec![1]);
        assert_eq!(serials(sessions.search(SearchField::Content, "electrons").await), vec![2]);
        assert_eq!(
            serials(sessions.search(SearchField::SystemInstructions, "french").await),
            vec![2]
        );
        assert_eq!(serials(sessions.search(SearchField::Content, "  ").await), vec![1, 2]);

        let year = chrono::Utc::now().format("%Y").to_string();
        assert_eq!(serials(sessions.search(SearchField::Date, &year).await), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_sessions_unchanged() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("history");
        std::fs::create_dir(&nested).unwrap();
        let sessions = SessionStore::load(nested.join("chathistory.json")).await;
        sessions.create("Cells", vec![], None).await.unwrap();

        // Removing the directory makes every later write fail
        std::fs::remove_dir_all(&nested).unwrap();

        let renamed = sessions
            .update(1, |chat| {
                chat.chat_name = "Renamed".to_string();
                Ok(())
            })
            .await;
        assert!(matches!(renamed, Err(ServerError::Storage(_))));
        assert!(matches!(
            sessions.create("Energy", vec![], None).await,
            Err(ServerError::Storage(_))
        ));
        assert!(matches!(sessions.delete(1).await, Err(ServerError::Storage(_))));

        let chats = sessions.list().await;
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].chat_name, "Cells");
    }
}
