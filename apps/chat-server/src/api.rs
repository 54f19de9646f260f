//! API handlers for the chat server
//!
//! Provides REST endpoints for:
//! - Chat session management and search
//! - PDF upload with per-page text extraction
//! - Citation highlighting and the single-use highlight retry
//! - PDF preview

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use highlight_core::store::validate_name;
use highlight_core::{build_page_index, DocumentStore};
use serde::{Deserialize, Serialize};
use shared_types::{
    ChatMessage, ChatSession, HighlightResult, HighlightRetry, MessageSource, Reference, Role,
};
use tracing::{debug, info, warn};

use crate::error::ServerError;
use crate::sessions::SearchField;
use crate::state::AppState;

type SharedState = State<Arc<AppState>>;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Handler: GET /health
pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "chat-server",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Run the highlighter over every PDF of a chat on the blocking pool
async fn run_highlight(
    state: &AppState,
    chat: &ChatSession,
    answer_text: String,
    references: Vec<Reference>,
) -> Result<Vec<HighlightResult>, ServerError> {
    if chat.pdfs.is_empty() {
        debug!("Chat {} has no PDFs to highlight", chat.serial_number);
        return Ok(Vec::new());
    }

    let engine = state.engine.clone();
    let documents = Arc::clone(&state.documents);
    let serial = chat.serial_number;
    let pdfs = chat.pdfs.clone();

    let results = tokio::task::spawn_blocking(move || {
        engine.highlight(serial, &pdfs, &answer_text, &references, documents.as_ref())
    })
    .await?;
    Ok(results)
}

// ============================================================================
// Chats
// ============================================================================

#[derive(Deserialize)]
pub struct CreateChatRequest {
    #[serde(default = "default_chat_name")]
    pub chat_name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub system_instructions: Option<String>,
}

fn default_chat_name() -> String {
    "New Chat".to_string()
}

#[derive(Serialize)]
pub struct ChatListResponse {
    pub success: bool,
    pub chats: Vec<ChatSession>,
    pub count: usize,
}

impl From<Vec<ChatSession>> for ChatListResponse {
    fn from(chats: Vec<ChatSession>) -> Self {
        Self {
            success: true,
            count: chats.len(),
            chats,
        }
    }
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub success: bool,
    pub message: String,
}

/// Handler: POST /api/chats
pub async fn handle_create_chat(
    State(state): SharedState,
    Json(req): Json<CreateChatRequest>,
) -> Result<(StatusCode, Json<ChatSession>), ServerError> {
    let name = req.chat_name.trim();
    if name.is_empty() {
        return Err(ServerError::InvalidRequest(
            "chat_name must not be empty".to_string(),
        ));
    }
    let chat = state
        .sessions
        .create(name, req.tags, req.system_instructions)
        .await?;
    Ok((StatusCode::CREATED, Json(chat)))
}

/// Handler: GET /api/chats
pub async fn handle_list_chats(State(state): SharedState) -> Json<ChatListResponse> {
    Json(state.sessions.list().await.into())
}

/// Handler: GET /api/chats/:serial
pub async fn handle_get_chat(
    State(state): SharedState,
    Path(serial): Path<u64>,
) -> Result<Json<ChatSession>, ServerError> {
    state
        .sessions
        .get(serial)
        .await
        .map(Json)
        .ok_or(ServerError::ChatNotFound(serial))
}

/// Handler: DELETE /api/chats/:serial
pub async fn handle_delete_chat(
    State(state): SharedState,
    Path(serial): Path<u64>,
) -> Result<Json<StatusResponse>, ServerError> {
    state.sessions.delete(serial).await?;
    info!("Deleted chat {}", serial);
    Ok(Json(StatusResponse {
        success: true,
        message: format!("Chat {} deleted", serial),
    }))
}

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default = "default_search_field")]
    pub by: SearchField,
    #[serde(default)]
    pub q: String,
}

fn default_search_field() -> SearchField {
    SearchField::Content
}

/// Handler: GET /api/chats/search?by=<field>&q=<query>
pub async fn handle_search_chats(
    State(state): SharedState,
    Query(query): Query<SearchQuery>,
) -> Json<ChatListResponse> {
    Json(state.sessions.search(query.by, &query.q).await.into())
}

#[derive(Deserialize)]
pub struct TagsRequest {
    pub tags: Vec<String>,
}

/// Handler: PUT /api/chats/:serial/tags
pub async fn handle_set_tags(
    State(state): SharedState,
    Path(serial): Path<u64>,
    Json(req): Json<TagsRequest>,
) -> Result<Json<ChatSession>, ServerError> {
    Ok(Json(state.sessions.set_tags(serial, req.tags).await?))
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Deserialize)]
pub struct AppendMessageRequest {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub source: MessageSource,
    /// Highlight the chat's PDFs using this (bot) message as the answer
    #[serde(default)]
    pub highlight: bool,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub chat: ChatSession,
    pub highlights: Vec<HighlightResult>,
}

/// Handler: POST /api/chats/:serial/messages
pub async fn handle_append_message(
    State(state): SharedState,
    Path(serial): Path<u64>,
    Json(req): Json<AppendMessageRequest>,
) -> Result<Json<MessageResponse>, ServerError> {
    let message = ChatMessage::new(req.role, req.content.clone(), req.source);
    let mut chat = state.sessions.append_message(serial, message).await?;

    let mut highlights = Vec::new();
    if req.highlight && req.role == Role::Bot {
        highlights = run_highlight(&state, &chat, req.content, Vec::new()).await?;
        let delivered = !highlights.is_empty();
        if !delivered {
            warn!("No highlights generated for chat {}", serial);
        }
        chat = state
            .sessions
            .update(serial, |chat| {
                chat.highlighted = delivered;
                Ok(chat.clone())
            })
            .await?;
    }

    Ok(Json(MessageResponse {
        success: true,
        chat,
        highlights,
    }))
}

#[derive(Deserialize)]
pub struct EditMessageRequest {
    pub content: String,
}

/// Handler: PUT /api/chats/:serial/messages/:index
pub async fn handle_edit_message(
    State(state): SharedState,
    Path((serial, index)): Path<(u64, usize)>,
    Json(req): Json<EditMessageRequest>,
) -> Result<Json<ChatSession>, ServerError> {
    Ok(Json(
        state.sessions.edit_message(serial, index, req.content).await?,
    ))
}

// ============================================================================
// Uploads
// ============================================================================

#[derive(Deserialize)]
pub struct UploadFile {
    pub filename: String,
    /// Base64-encoded file content
    pub content_base64: String,
}

#[derive(Deserialize)]
pub struct UploadRequest {
    pub files: Vec<UploadFile>,
}

#[derive(Serialize)]
pub struct PdfExtraction {
    pub pdf_name: String,
    pub stored_name: String,
    pub page_count: u32,
    pub page_text: BTreeMap<u32, String>,
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    pub extractions: Vec<PdfExtraction>,
}

/// Handler: POST /api/chats/:serial/pdfs
///
/// Every payload is decoded and its name checked before anything is stored,
/// so a bad file rejects the whole request. Files without a `%PDF` header are
/// skipped.
pub async fn handle_upload_pdfs(
    State(state): SharedState,
    Path(serial): Path<u64>,
    Json(req): Json<UploadRequest>,
) -> Result<Json<UploadResponse>, ServerError> {
    if state.sessions.get(serial).await.is_none() {
        return Err(ServerError::ChatNotFound(serial));
    }

    let mut pdfs = Vec::with_capacity(req.files.len());
    for file in req.files {
        let bytes = BASE64.decode(&file.content_base64).map_err(|e| {
            ServerError::InvalidRequest(format!("Invalid base64 for {}: {}", file.filename, e))
        })?;
        if !bytes.starts_with(b"%PDF") {
            warn!("Skipping non-PDF upload {}", file.filename);
            continue;
        }
        validate_name(&file.filename)?;
        pdfs.push((file.filename, bytes));
    }

    let mut extractions = Vec::new();
    for (filename, bytes) in pdfs {
        let documents = Arc::clone(&state.documents);
        let extraction = tokio::task::spawn_blocking(move || -> Result<PdfExtraction, ServerError> {
            let stored_name = documents.save_original(serial, &filename, &bytes)?;
            let index = build_page_index(&bytes);
            Ok(PdfExtraction {
                pdf_name: filename,
                stored_name,
                page_count: index.page_count(),
                page_text: index
                    .iter()
                    .map(|(page, text)| (page, text.to_string()))
                    .collect(),
            })
        })
        .await??;

        info!(
            "Stored {} for chat {} ({} pages)",
            extraction.stored_name, serial, extraction.page_count
        );
        extractions.push(extraction);
    }

    let names: Vec<String> = extractions.iter().map(|e| e.pdf_name.clone()).collect();
    state.sessions.attach_pdfs(serial, &names).await?;

    Ok(Json(UploadResponse {
        success: true,
        message: format!("{} PDF(s) uploaded", extractions.len()),
        extractions,
    }))
}

// ============================================================================
// Highlighting
// ============================================================================

#[derive(Deserialize)]
pub struct HighlightRequest {
    pub serial_number: u64,
    /// Defaults to the chat's latest bot answer
    pub answer_text: Option<String>,
    /// Empty means the references are parsed from the answer's citation markers
    #[serde(default)]
    pub references: Vec<Reference>,
}

#[derive(Serialize)]
pub struct HighlightResponse {
    pub success: bool,
    pub highlighted_files: Vec<HighlightResult>,
}

/// Handler: POST /api/highlight
pub async fn handle_highlight(
    State(state): SharedState,
    Json(req): Json<HighlightRequest>,
) -> Result<Json<HighlightResponse>, ServerError> {
    let serial = req.serial_number;
    let chat = state
        .sessions
        .get(serial)
        .await
        .ok_or(ServerError::ChatNotFound(serial))?;

    let answer_text = match req.answer_text {
        Some(text) => text,
        None => chat
            .last_bot_answer()
            .map(|m| m.content.clone())
            .ok_or_else(|| ServerError::InvalidRequest("Chat has no answer to highlight".into()))?,
    };

    let results = run_highlight(&state, &chat, answer_text, req.references).await?;
    if results.is_empty() {
        warn!("No highlights generated for chat {}", serial);
    } else {
        state
            .sessions
            .update(serial, |chat| {
                chat.highlighted = true;
                Ok(())
            })
            .await?;
    }

    Ok(Json(HighlightResponse {
        success: true,
        highlighted_files: results,
    }))
}

/// Outcome of a highlight retry request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStatus {
    Delivered,
    Failed,
    NoPreviousAnswer,
    AlreadyUsed,
    AlreadyProvided,
}

impl RetryStatus {
    fn message(self) -> &'static str {
        match self {
            RetryStatus::Delivered => "Here is the highlighted PDF from the previous response.",
            RetryStatus::Failed => {
                "Sorry, I couldn't generate a highlighted PDF for the previous response."
            }
            RetryStatus::NoPreviousAnswer => {
                "No previous response found to generate a highlighted PDF."
            }
            RetryStatus::AlreadyUsed => {
                "The highlighted PDF retry has already been used for this chat."
            }
            RetryStatus::AlreadyProvided => {
                "The highlighted PDF was already provided with the previous response."
            }
        }
    }
}

#[derive(Serialize)]
pub struct RetryResponse {
    pub status: RetryStatus,
    pub message: String,
    pub highlights: Vec<HighlightResult>,
}

/// Handler: POST /api/chats/:serial/highlight-retry
///
/// Each chat gets one successful retry, and only when no highlights were
/// delivered with the answer. A failed attempt leaves the retry available.
pub async fn handle_highlight_retry(
    State(state): SharedState,
    Path(serial): Path<u64>,
) -> Result<Json<RetryResponse>, ServerError> {
    let chat = state
        .sessions
        .get(serial)
        .await
        .ok_or(ServerError::ChatNotFound(serial))?;

    let mut highlights = Vec::new();
    let status = if chat.highlight_retry == HighlightRetry::Used {
        RetryStatus::AlreadyUsed
    } else if chat.highlighted {
        RetryStatus::AlreadyProvided
    } else if let Some(answer) = chat.last_bot_answer() {
        highlights = run_highlight(&state, &chat, answer.content.clone(), Vec::new()).await?;
        if highlights.is_empty() {
            RetryStatus::Failed
        } else {
            RetryStatus::Delivered
        }
    } else {
        RetryStatus::NoPreviousAnswer
    };
    info!("Highlight retry for chat {}: {:?}", serial, status);

    state
        .sessions
        .update(serial, |chat| {
            if status == RetryStatus::Delivered {
                chat.highlighted = true;
                chat.highlight_retry = HighlightRetry::Used;
            }
            chat.messages.push(ChatMessage::new(
                Role::Bot,
                status.message(),
                MessageSource::System,
            ));
            Ok(())
        })
        .await?;

    Ok(Json(RetryResponse {
        status,
        message: status.message().to_string(),
        highlights,
    }))
}

// ============================================================================
// Preview
// ============================================================================

/// Handler: GET /api/preview/:filename
///
/// Names carrying the highlight prefix are served from the highlight
/// directory, everything else from uploads.
pub async fn handle_preview(
    State(state): SharedState,
    Path(filename): Path<String>,
) -> Result<(StatusCode, [(String, String); 2], Vec<u8>), ServerError> {
    let highlighted_prefix = format!("{}_", state.engine.config().highlight_prefix);
    let documents = Arc::clone(&state.documents);
    let name = filename.clone();

    let bytes = tokio::task::spawn_blocking(move || {
        if name.starts_with(&highlighted_prefix) {
            documents.load_highlighted(&name)
        } else {
            documents.load_upload(&name)
        }
    })
    .await??;

    Ok((
        StatusCode::OK,
        [
            ("Content-Type".to_string(), "application/pdf".to_string()),
            (
                "Content-Disposition".to_string(),
                format!("inline; filename=\"{}\"", filename),
            ),
        ],
        bytes,
    ))
}
