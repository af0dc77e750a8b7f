//! HTTP API over a single chat session.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/documents` | Upload a batch and rebuild the index |
//! | `POST` | `/chat` | Run one chat turn |
//! | `GET`  | `/session` | Conversation history and private flag |
//! | `DELETE` | `/session` | Clear history and the uploaded documents |
//! | `PUT`  | `/session/private` | Turn private mode on or off |
//! | `GET`  | `/turns` | Stored turns from the turn log, newest first |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "message must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `configuration_error` (503),
//! `generation_error` (502), `retrieval_error` (502), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::{DefaultBodyLimit, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use base64::Engine;
use docchat_core::error::{ChatError, IndexError};
use docchat_core::models::{Document, Message, Turn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::chat::Reply;
use crate::config::Config;
use crate::session::{ChatSession, UploadReport};

/// Largest accepted request body (base64-encoded uploads).
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    session: Arc<ChatSession>,
}

/// Starts the HTTP server on `[server].bind`.
///
/// Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let session = Arc::new(ChatSession::from_config(config).await?);
    let app = router(session);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    println!("docchat listening on http://{}", config.server.bind);
    info!(bind = %config.server.bind, "server started");

    axum::serve(listener, app).await?;
    Ok(())
}

/// All routes over `session`.
pub fn router(session: Arc<ChatSession>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/documents", post(handle_upload))
        .route("/chat", post(handle_chat))
        .route("/session", get(handle_session).delete(handle_clear))
        .route("/session/private", put(handle_private))
        .route("/turns", get(handle_turns))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .with_state(AppState { session })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: format!("{:#}", err),
    }
}

fn retrieval_error(err: &IndexError) -> AppError {
    AppError {
        status: StatusCode::BAD_GATEWAY,
        code: "retrieval_error",
        message: err.to_string(),
    }
}

impl From<ChatError> for AppError {
    fn from(err: ChatError) -> Self {
        let message = err.user_message();
        match err {
            ChatError::Configuration(_) => AppError {
                status: StatusCode::SERVICE_UNAVAILABLE,
                code: "configuration_error",
                message,
            },
            ChatError::Retrieval(ref e) => AppError {
                message,
                ..retrieval_error(e)
            },
            ChatError::Generation(_) => AppError {
                status: StatusCode::BAD_GATEWAY,
                code: "generation_error",
                message,
            },
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /documents ============

#[derive(Deserialize)]
struct UploadRequest {
    documents: Vec<UploadDocument>,
}

#[derive(Deserialize)]
struct UploadDocument {
    name: String,
    content_base64: String,
}

#[derive(Serialize)]
struct UploadResponse {
    documents_indexed: usize,
    chunks: usize,
    skipped: Vec<SkippedDocument>,
}

#[derive(Serialize)]
struct SkippedDocument {
    document: String,
    reason: String,
}

impl From<UploadReport> for UploadResponse {
    fn from(report: UploadReport) -> Self {
        Self {
            documents_indexed: report.documents_indexed,
            chunks: report.chunks,
            skipped: report
                .skipped
                .iter()
                .map(|e| SkippedDocument {
                    document: e.document().to_string(),
                    reason: e.to_string(),
                })
                .collect(),
        }
    }
}

async fn handle_upload(
    State(state): State<AppState>,
    Json(req): Json<UploadRequest>,
) -> Result<Json<UploadResponse>, AppError> {
    if req.documents.is_empty() {
        return Err(bad_request("documents must not be empty"));
    }

    let engine = base64::engine::general_purpose::STANDARD;
    let mut docs = Vec::with_capacity(req.documents.len());
    for d in req.documents {
        if d.name.trim().is_empty() {
            return Err(bad_request("document name must not be empty"));
        }
        let bytes = engine
            .decode(d.content_base64.as_bytes())
            .map_err(|e| bad_request(format!("{}: invalid base64: {}", d.name, e)))?;
        docs.push(Document::new(d.name, bytes));
    }

    let report = state
        .session
        .upload(docs)
        .await
        .map_err(|e| retrieval_error(&e))?;
    Ok(Json(report.into()))
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
    mode: &'static str,
    backend: &'static str,
    model: String,
    turn_id: String,
    context: Vec<ContextPassage>,
}

#[derive(Serialize)]
struct ContextPassage {
    source: String,
    page: usize,
    score: f32,
    text: String,
}

impl From<Reply> for ChatResponse {
    fn from(reply: Reply) -> Self {
        Self {
            mode: reply.mode.as_str(),
            backend: reply.backend.as_str(),
            model: reply.model,
            turn_id: reply.turn.id,
            context: reply
                .context
                .hits
                .into_iter()
                .map(|h| ContextPassage {
                    source: h.chunk.source,
                    page: h.chunk.page,
                    score: h.score,
                    text: h.chunk.text,
                })
                .collect(),
            response: reply.turn.response,
        }
    }
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let message = req.message.trim();
    if message.is_empty() {
        return Err(bad_request("message must not be empty"));
    }
    let reply = state.session.ask(message).await?;
    Ok(Json(reply.into()))
}

// ============ /session ============

#[derive(Serialize)]
struct SessionResponse {
    private: bool,
    indexed_chunks: usize,
    history: Vec<Message>,
}

async fn handle_session(State(state): State<AppState>) -> Json<SessionResponse> {
    Json(SessionResponse {
        private: state.session.is_private(),
        indexed_chunks: state.session.indexed_chunks(),
        history: state.session.history().await,
    })
}

async fn handle_clear(State(state): State<AppState>) -> StatusCode {
    state.session.clear().await;
    StatusCode::NO_CONTENT
}

#[derive(Deserialize)]
struct PrivateRequest {
    enabled: bool,
}

#[derive(Serialize)]
struct PrivateResponse {
    private: bool,
}

async fn handle_private(
    State(state): State<AppState>,
    Json(req): Json<PrivateRequest>,
) -> Json<PrivateResponse> {
    state.session.set_private(req.enabled);
    Json(PrivateResponse {
        private: state.session.is_private(),
    })
}

// ============ GET /turns ============

#[derive(Deserialize)]
struct TurnsQuery {
    limit: Option<i64>,
}

#[derive(Serialize)]
struct TurnsResponse {
    total: i64,
    turns: Vec<Turn>,
}

async fn handle_turns(
    State(state): State<AppState>,
    Query(q): Query<TurnsQuery>,
) -> Result<Json<TurnsResponse>, AppError> {
    let log = state
        .session
        .turn_log()
        .ok_or_else(|| bad_request("turn history is disabled ([history].enabled = false)"))?;
    if matches!(q.limit, Some(l) if l < 1) {
        return Err(bad_request("limit must be >= 1"));
    }
    let turns = log.list(q.limit).await.map_err(internal)?;
    let total = log.count().await.map_err(internal)?;
    Ok(Json(TurnsResponse { total, turns }))
}
