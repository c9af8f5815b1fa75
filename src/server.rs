//! JSON HTTP API.
//!
//! Transport-agnostic surface over the core: a chat-platform shim, a
//! dashboard, or curl can all drive the engine through these routes.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/ask` | Answer a question |
//! | `POST` | `/api/documents` | Add and index a document |
//! | `GET`  | `/api/documents` | List indexed documents |
//! | `GET`  | `/api/messages` | List stored chat messages |
//! | `POST` | `/api/index/thread` | Index a stored thread |
//! | `POST` | `/api/events` | Ingest a normalized inbound chat event |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! Error responses use the shape
//! `{ "error": { "code": "bad_request", "message": "..." } }` with codes
//! `bad_request` (400), `not_found` (404), `provider_error` (502), and
//! `internal` (500).

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::app::App;
use crate::config::Config;
use crate::error::DeskError;
use crate::ingest::IngestOutcome;
use crate::models::{AnswerResponse, ChatMessage, InboundEvent, JobResult};
use crate::store::DocumentSummary;

/// Start the HTTP server on the configured bind address.
pub async fn run_server(config: &Config, app: Arc<App>) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let router = Router::new()
        .route("/api/ask", post(handle_ask))
        .route("/api/documents", post(handle_add_document))
        .route("/api/documents", get(handle_list_documents))
        .route("/api/messages", get(handle_list_messages))
        .route("/api/index/thread", post(handle_index_thread))
        .route("/api/events", post(handle_event))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(app);

    tracing::info!(bind = %bind_addr, "API server listening");
    println!("API server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
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

#[derive(Debug)]
struct AppError {
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

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

impl From<DeskError> for AppError {
    fn from(e: DeskError) -> Self {
        match e {
            DeskError::Validation(msg) => bad_request(msg),
            DeskError::DuplicateEvent(msg) => AppError {
                status: StatusCode::CONFLICT,
                code: "duplicate".to_string(),
                message: msg,
            },
            DeskError::EmbeddingProvider(msg) | DeskError::LlmProvider(msg) => AppError {
                status: StatusCode::BAD_GATEWAY,
                code: "provider_error".to_string(),
                message: msg,
            },
            DeskError::Storage(msg) => AppError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                code: "internal".to_string(),
                message: msg,
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

// ============ POST /api/ask ============

#[derive(Deserialize)]
struct AskRequest {
    question: String,
    #[serde(default)]
    channel_id: Option<String>,
}

async fn handle_ask(
    State(app): State<Arc<App>>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AnswerResponse>, AppError> {
    let response = app
        .engine
        .answer(&request.question, request.channel_id.as_deref())
        .await?;
    Ok(Json(response))
}

// ============ POST /api/documents ============

#[derive(Deserialize)]
struct AddDocumentRequest {
    title: String,
    content: String,
    #[serde(default = "default_source")]
    source: String,
}

fn default_source() -> String {
    "api".to_string()
}

#[derive(Serialize)]
struct JobResponse {
    id: String,
    status: String,
    chunks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl JobResponse {
    fn from_result(result: JobResult) -> Self {
        Self {
            id: result.source_id,
            status: result.status.as_str().to_string(),
            chunks: result.chunks,
            error: result.error,
        }
    }
}

async fn handle_add_document(
    State(app): State<Arc<App>>,
    Json(request): Json<AddDocumentRequest>,
) -> Result<Json<JobResponse>, AppError> {
    if request.title.trim().is_empty() {
        return Err(bad_request("title must not be empty"));
    }
    if request.content.trim().is_empty() {
        return Err(bad_request("content must not be empty"));
    }

    let doc = crate::models::Document::new(request.title, request.content, request.source);
    let result = app.indexer.index_document(&doc).await;
    Ok(Json(JobResponse::from_result(result)))
}

// ============ GET /api/documents ============

async fn handle_list_documents(
    State(app): State<Arc<App>>,
) -> Result<Json<Vec<DocumentSummary>>, AppError> {
    Ok(Json(app.store.list_documents().await?))
}

// ============ GET /api/messages ============

#[derive(Deserialize)]
struct MessagesQuery {
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    channel_id: Option<String>,
}

fn default_limit() -> i64 {
    100
}

/// SQLite treats a negative `LIMIT` as unlimited, so bad values must
/// be rejected before they reach the query.
fn validate_limit(limit: i64) -> Result<i64, AppError> {
    if limit < 1 {
        return Err(bad_request("limit must be >= 1"));
    }
    Ok(limit)
}

async fn handle_list_messages(
    State(app): State<Arc<App>>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Vec<ChatMessage>>, AppError> {
    let limit = validate_limit(query.limit)?;
    let messages = app
        .store
        .list_messages(limit, query.channel_id.as_deref())
        .await?;
    Ok(Json(messages))
}

// ============ POST /api/index/thread ============

#[derive(Deserialize)]
struct IndexThreadRequest {
    channel_id: String,
    thread_ts: String,
}

#[derive(Serialize)]
struct IndexThreadResponse {
    status: String,
    thread_ts: String,
    chunks: usize,
}

async fn handle_index_thread(
    State(app): State<Arc<App>>,
    Json(request): Json<IndexThreadRequest>,
) -> Result<Json<IndexThreadResponse>, AppError> {
    let messages = app
        .store
        .thread_messages(&request.channel_id, &request.thread_ts)
        .await?;

    if messages.is_empty() {
        return Err(not_found(format!("thread not found: {}", request.thread_ts)));
    }

    let result = app
        .indexer
        .index_thread(&request.channel_id, &request.thread_ts, &messages)
        .await;

    Ok(Json(IndexThreadResponse {
        status: result.status.as_str().to_string(),
        thread_ts: request.thread_ts,
        chunks: result.chunks,
    }))
}

// ============ POST /api/events ============

#[derive(Serialize)]
struct ReplyPayload {
    text: String,
}

#[derive(Serialize)]
struct EventResponse {
    #[serde(flatten)]
    outcome: IngestOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply: Option<ReplyPayload>,
}

/// Ingest a normalized inbound event. Question-type events that pass
/// dedup are answered and carry back a `{text}` reply payload; duplicate
/// deliveries are acknowledged without a reply so the transport never
/// double-posts. Events arriving without a `message_ts` are stamped
/// with the current time at intake.
async fn handle_event(
    State(app): State<Arc<App>>,
    Json(mut event): Json<InboundEvent>,
) -> Result<Json<EventResponse>, AppError> {
    event.fill_default_ts();
    let outcome = app.ingestor.ingest(&event).await?;

    let reply = if outcome.accepted && event.kind.is_question() {
        let answer = app
            .engine
            .answer_in_thread(&event.text, Some(&event.channel_id), event.thread_ts.as_deref())
            .await?;
        Some(ReplyPayload {
            text: answer.answer,
        })
    } else {
        None
    };

    Ok(Json(EventResponse { outcome, reply }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_must_be_positive() {
        assert!(validate_limit(-1).is_err());
        let err = validate_limit(0).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "bad_request");
        assert_eq!(validate_limit(50).unwrap(), 50);
    }

    #[test]
    fn test_error_codes_by_kind() {
        let validation: AppError = DeskError::Validation("bad".to_string()).into();
        assert_eq!(validation.status, StatusCode::BAD_REQUEST);

        let provider: AppError = DeskError::LlmProvider("down".to_string()).into();
        assert_eq!(provider.status, StatusCode::BAD_GATEWAY);

        let storage: AppError = DeskError::Storage("io".to_string()).into();
        assert_eq!(storage.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(storage.code, "internal");
    }
}
