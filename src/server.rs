//! HTTP and WebSocket server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/` | Liveness and version |
//! | `GET`    | `/health` | Status, indexed chunk count, model name |
//! | `POST`   | `/upload` | Multipart `file` upload, stored and ingested |
//! | `GET`    | `/documents/count` | Indexed chunk count |
//! | `DELETE` | `/documents` | Clear the whole index |
//! | `POST`   | `/chat` | Blocking question/answer |
//! | `GET`    | `/ws/chat` | Streaming chat session (WebSocket) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "No message provided" } }
//! ```
//!
//! Error codes: `bad_request` (400), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use rag_chat_core::error::RagError;
use rag_chat_core::ingest::Ingestor;
use rag_chat_core::models::Query;
use rag_chat_core::query::QueryEngine;
use rag_chat_core::session::{ConnectionRegistry, SessionHandler, NO_MESSAGE_PROVIDED};

use crate::config::{Config, UploadConfig};
use crate::services;
use crate::upload::{store_upload, unsupported_message};
use crate::ws::WsTransport;

const SERVICE_NAME: &str = "Real-Time RAG Assistant API";

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    upload: Arc<UploadConfig>,
    ingestor: Arc<Ingestor>,
    engine: Arc<QueryEngine>,
    sessions: SessionHandler,
}

impl AppState {
    pub fn new(upload: UploadConfig, ingestor: Ingestor, engine: Arc<QueryEngine>) -> Self {
        let sessions = SessionHandler::new(engine.clone(), Arc::new(ConnectionRegistry::new()));
        Self {
            upload: Arc::new(upload),
            ingestor: Arc::new(ingestor),
            engine,
            sessions,
        }
    }

    pub fn connections(&self) -> usize {
        self.sessions.registry().count()
    }
}

/// Build the application router over `state`.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/upload", post(handle_upload))
        .route("/documents/count", get(handle_count))
        .route("/documents", delete(handle_clear))
        .route("/chat", post(handle_chat))
        .route("/ws/chat", get(handle_ws))
        // The configured upload limit is advisory only.
        .layer(DefaultBodyLimit::disable())
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server.
///
/// Opens the index, builds the shared services, binds to `[server].bind`,
/// and serves until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&config.upload.directory).await?;

    let index = services::open_index(config).await?;
    let engine = services::query_engine(config, index.clone())?;
    let state = AppState::new(
        config.upload.clone(),
        services::ingestor(config, index),
        engine,
    );

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(
        bind = %config.server.bind,
        model = %state.engine.model_name(),
        "RAG chat server listening"
    );
    axum::serve(listener, router(state)).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (`"bad_request"` or `"internal"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

/// Constructs a 400 Bad Request error.
fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

/// Constructs a 500 error.
fn internal(message: impl Into<String>) -> AppError {
    let message = message.into();
    error!(%message, "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message,
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        if err.is_user_error() {
            bad_request(err.to_string())
        } else {
            internal(err.to_string())
        }
    }
}

// ============ GET / ============

#[derive(Serialize)]
struct RootResponse {
    message: &'static str,
    version: &'static str,
    status: &'static str,
}

async fn handle_root() -> Json<RootResponse> {
    Json(RootResponse {
        message: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        status: "running",
    })
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    documents_indexed: usize,
    model: String,
}

async fn handle_health(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    let documents_indexed = state
        .engine
        .index()
        .count()
        .await
        .map_err(RagError::retrieval)?;

    Ok(Json(HealthResponse {
        status: "healthy",
        documents_indexed,
        model: state.engine.model_name().to_string(),
    }))
}

// ============ POST /upload ============

#[derive(Serialize)]
struct UploadResponse {
    filename: String,
    status: &'static str,
    chunks_created: usize,
    message: String,
}

/// Store the multipart `file` field and run it through ingestion.
///
/// Unsupported extensions are rejected with 400 before anything is written
/// or indexed.
async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("Failed to read upload: {}", e)))?;
        upload = Some((filename, bytes));
        break;
    }
    let (filename, bytes) = upload.ok_or_else(|| bad_request("No file provided"))?;

    let path = match store_upload(&state.upload, &filename, &bytes).await {
        Ok(path) => path,
        Err(RagError::UnsupportedFormat { .. }) => {
            return Err(bad_request(unsupported_message(&state.upload)))
        }
        Err(err) => return Err(err.into()),
    };

    // Report the name the chunks are tagged with, not the raw client name.
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or(filename);

    let chunks_created = state.ingestor.ingest(&path).await.map_err(|err| match err {
        RagError::UnsupportedFormat { .. } => bad_request(unsupported_message(&state.upload)),
        other => internal(format!("Error processing document: {}", other)),
    })?;

    Ok(Json(UploadResponse {
        filename,
        status: "success",
        chunks_created,
        message: format!(
            "Document processed successfully. Created {} chunks.",
            chunks_created
        ),
    }))
}

// ============ GET /documents/count, DELETE /documents ============

#[derive(Serialize)]
struct CountResponse {
    count: usize,
}

async fn handle_count(State(state): State<AppState>) -> Result<Json<CountResponse>, AppError> {
    let count = state
        .engine
        .index()
        .count()
        .await
        .map_err(RagError::retrieval)?;
    Ok(Json(CountResponse { count }))
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    message: &'static str,
}

async fn handle_clear(State(state): State<AppState>) -> Result<Json<StatusResponse>, AppError> {
    state
        .engine
        .index()
        .clear()
        .await
        .map_err(RagError::retrieval)?;
    info!("index cleared");
    Ok(Json(StatusResponse {
        status: "success",
        message: "All documents cleared",
    }))
}

// ============ POST /chat ============

#[derive(Serialize)]
struct ChatResponse {
    response: String,
    sources: Vec<String>,
    conversation_id: String,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(query): Json<Query>,
) -> Result<Json<ChatResponse>, AppError> {
    let question = query.message.trim();
    if question.is_empty() {
        return Err(bad_request(NO_MESSAGE_PROVIDED));
    }

    let answer = state.engine.answer(question).await?;
    let conversation_id = query
        .conversation_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    Ok(Json(ChatResponse {
        response: answer.text,
        sources: answer.sources,
        conversation_id,
    }))
}

// ============ GET /ws/chat ============

async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let sessions = state.sessions.clone();
    ws.on_upgrade(move |socket| async move {
        sessions.run(WsTransport::new(socket)).await;
    })
}
