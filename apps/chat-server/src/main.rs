//! Chat Server
//!
//! Backend for a PDF-grounded chat assistant. Answers cite their sources with
//! markers like `[Biology.pdf, page 3]`; this server stores the uploaded PDFs
//! and chat sessions and produces highlighted copies of the cited PDFs.
//!
//! ## Endpoints
//!
//! - `GET /health`
//! - `POST|GET /api/chats`, `GET|DELETE /api/chats/:serial`,
//!   `GET /api/chats/search`
//! - `POST /api/chats/:serial/messages`, `PUT /api/chats/:serial/messages/:index`
//! - `PUT /api/chats/:serial/tags`, `POST /api/chats/:serial/pdfs`
//! - `POST /api/highlight`, `POST /api/chats/:serial/highlight-retry`
//! - `GET /api/preview/:filename`

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    routing::{get, post, put},
    Router,
};
use clap::Parser;
use highlight_core::{HighlightConfig, HighlightEngine};
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod error;
mod sessions;
mod state;

use api::{
    handle_append_message, handle_create_chat, handle_delete_chat, handle_edit_message,
    handle_get_chat, handle_health, handle_highlight, handle_highlight_retry,
    handle_list_chats, handle_preview, handle_search_chats, handle_set_tags,
    handle_upload_pdfs,
};
use state::AppState;

/// Command-line arguments for the chat server
#[derive(Parser, Debug)]
#[command(name = "chat-server")]
#[command(about = "Chat backend with PDF citation highlighting")]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "CHAT_SERVER_PORT", default_value = "8000")]
    port: u16,

    /// Host address to bind to
    #[arg(long, env = "CHAT_SERVER_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Directory holding uploads/, highlights/ and chathistory.json
    #[arg(long, env = "CHAT_SERVER_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Rate limit: requests per second per IP
    #[arg(long, env = "CHAT_SERVER_RATE_LIMIT", default_value = "10")]
    rate_limit: u32,

    /// Minimum similarity for a fuzzy match
    #[arg(long, env = "CHAT_SERVER_FUZZY_THRESHOLD", default_value = "0.65")]
    fuzzy_threshold: f64,

    /// Prefix of highlighted PDF names
    #[arg(long, env = "CHAT_SERVER_HIGHLIGHT_PREFIX", default_value = "highlighted")]
    highlight_prefix: String,

    /// Enable verbose logging
    #[arg(short, long, env = "CHAT_SERVER_VERBOSE")]
    verbose: bool,
}

/// All routes with CORS and request tracing; rate limiting is added by `main`
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handle_health))
        // Chats
        .route("/api/chats", post(handle_create_chat).get(handle_list_chats))
        .route("/api/chats/search", get(handle_search_chats))
        .route(
            "/api/chats/:serial",
            get(handle_get_chat).delete(handle_delete_chat),
        )
        .route("/api/chats/:serial/messages", post(handle_append_message))
        .route(
            "/api/chats/:serial/messages/:index",
            put(handle_edit_message),
        )
        .route("/api/chats/:serial/tags", put(handle_set_tags))
        .route("/api/chats/:serial/pdfs", post(handle_upload_pdfs))
        // Highlighting
        .route("/api/highlight", post(handle_highlight))
        .route(
            "/api/chats/:serial/highlight-retry",
            post(handle_highlight_retry),
        )
        .route("/api/preview/:filename", get(handle_preview))
        // Apply middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting chat server on {}:{}", args.host, args.port);

    let engine = HighlightEngine::new(HighlightConfig {
        fuzzy_threshold: args.fuzzy_threshold,
        highlight_prefix: args.highlight_prefix.clone(),
        ..Default::default()
    })?;
    let state = Arc::new(AppState::open(&args.data_dir, engine).await?);

    // Create rate limiter configuration
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(args.rate_limit.into())
            .burst_size(args.rate_limit * 2)
            .finish()
            .context("Invalid rate limit configuration")?,
    );

    let app = build_router(state).layer(GovernorLayer {
        config: governor_conf,
    });

    // Start server
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    info!("Rate limit: {} requests/second per IP", args.rate_limit);

    // The rate limiter keys on the peer address
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
