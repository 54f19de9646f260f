//! Chat session records shared between the server and its persistence layer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Bot,
}

/// Where a message's content came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSource {
    #[default]
    General,
    Pdf,
    /// Generated by the backend itself (status replies)
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub source: MessageSource,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>, source: MessageSource) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            source,
        }
    }
}

/// Single-use "give me the highlighted PDF" retry, scoped to one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HighlightRetry {
    #[default]
    NotAttempted,
    Used,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub serial_number: u64,
    pub chat_name: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub system_instructions: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    /// Original file names of uploaded PDFs
    #[serde(default)]
    pub pdfs: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Whether a highlighted PDF has been delivered for this session
    #[serde(default)]
    pub highlighted: bool,
    #[serde(default)]
    pub highlight_retry: HighlightRetry,
}

impl ChatSession {
    pub fn new(serial_number: u64, chat_name: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            serial_number,
            chat_name: chat_name.into(),
            timestamp: Utc::now(),
            system_instructions: String::new(),
            messages: Vec::new(),
            pdfs: Vec::new(),
            tags,
            highlighted: false,
            highlight_retry: HighlightRetry::NotAttempted,
        }
    }

    /// Most recent bot answer, ignoring status replies generated by the backend
    pub fn last_bot_answer(&self) -> Option<&ChatMessage> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Bot && m.source != MessageSource::System)
    }
}
