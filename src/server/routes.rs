//! Route handlers
//!
//! Endpoint map:
//! - `POST /api/chat`                         non-streaming chat
//! - `POST /api/chat/stream`                  SSE streaming chat
//! - `GET/DELETE /api/chat/conversations/{id}`
//! - `GET /api/models`, `GET /api/models/providers`,
//!   `POST /api/models/test/{provider}`
//! - `/api/prompts` CRUD, `POST /api/prompts/validate`,
//!   `GET /api/prompts/stats/summary`
//! - `/api/files` upload/retrieval
//! - `GET /health`
//!
//! Streaming responses frame each fragment as `data: {"content": ...}`;
//! mid-stream failures emit an in-band `data: {"error": ...}` event and
//! end the stream; completed streams are terminated by `data: [DONE]`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{FromRef, Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::errors::RelayError;
use crate::files::{self, FileStore};
use crate::orchestrator::{ChatOrchestrator, ChatOutcome};
use crate::prompts::{validate_template, PromptDraft, PromptUpdate, PromptWriteError};
use crate::types::{Message, ProviderKind, RequestOptions};

/// Shared state behind every handler
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ChatOrchestrator>,
    pub files: Arc<FileStore>,
}

impl FromRef<AppState> for Arc<ChatOrchestrator> {
    fn from_ref(state: &AppState) -> Self {
        state.orchestrator.clone()
    }
}

impl FromRef<AppState> for Arc<FileStore> {
    fn from_ref(state: &AppState) -> Self {
        state.files.clone()
    }
}

/// Build the service router
pub fn router(orchestrator: Arc<ChatOrchestrator>) -> Router {
    let state = AppState {
        orchestrator,
        files: Arc::new(FileStore::new()),
    };

    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat))
        .route("/api/chat/stream", post(chat_stream))
        .route(
            "/api/chat/conversations/{id}",
            get(get_conversation).delete(delete_conversation),
        )
        .route("/api/models", get(list_models))
        .route("/api/models/providers", get(provider_status))
        .route("/api/models/test/{provider}", post(test_provider))
        .route("/api/prompts", get(list_prompts).post(create_prompt))
        .route("/api/prompts/validate", post(validate_prompt))
        .route("/api/prompts/stats/summary", get(prompt_statistics))
        .route(
            "/api/prompts/{id}",
            get(get_prompt).put(update_prompt).delete(delete_prompt),
        )
        .route("/api/files", get(list_files))
        .route("/api/files/upload", post(upload_file))
        .route("/api/files/{id}", get(get_file).delete(delete_file))
        .with_state(state)
}

/// Chat request body: messages plus flattened request options
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    #[serde(flatten)]
    pub options: RequestOptions,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = match &self {
            RelayError::InvalidParameter { .. }
            | RelayError::InvalidTemplate(_)
            | RelayError::UnknownProvider(_)
            | RelayError::ProviderUnavailable(_) => StatusCode::BAD_REQUEST,
            RelayError::Upstream(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

fn not_found(message: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody { error: message.to_string() }),
    )
        .into_response()
}

fn prompt_write_error(err: PromptWriteError) -> Response {
    match err {
        PromptWriteError::NotFound => not_found("Prompt not found"),
        PromptWriteError::NotPermitted => (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: "Default prompts cannot be modified or deleted".to_string(),
            }),
        )
            .into_response(),
    }
}

async fn chat(
    State(orchestrator): State<Arc<ChatOrchestrator>>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, RelayError> {
    let mut options = request.options;
    options.stream = false;

    match orchestrator.handle(request.messages, options).await? {
        ChatOutcome::Complete(response) => Ok(Json(response).into_response()),
        ChatOutcome::Stream(_) => Err(RelayError::Config(
            "streaming outcome on non-streaming route".to_string(),
        )),
    }
}

async fn chat_stream(
    State(orchestrator): State<Arc<ChatOrchestrator>>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>, RelayError> {
    let mut options = request.options;
    options.stream = true;

    let handle = match orchestrator.handle(request.messages, options).await? {
        ChatOutcome::Stream(handle) => handle,
        ChatOutcome::Complete(_) => {
            return Err(RelayError::Config(
                "non-streaming outcome on streaming route".to_string(),
            ))
        }
    };

    let mut fragments = handle.fragments;
    let events = async_stream::stream! {
        while let Some(item) = fragments.next().await {
            match item {
                Ok(content) => {
                    let payload = json!({ "content": content }).to_string();
                    yield Ok::<Event, Infallible>(Event::default().data(payload));
                }
                Err(e) => {
                    // In-band error event, then end the stream; the
                    // client never sees a silent truncation
                    let payload = json!({ "error": e.to_string() }).to_string();
                    yield Ok(Event::default().data(payload));
                    return;
                }
            }
        }
        yield Ok(Event::default().data("[DONE]"));
    };

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

async fn get_conversation(
    State(orchestrator): State<Arc<ChatOrchestrator>>,
    Path(id): Path<String>,
) -> Response {
    match orchestrator.get_conversation(&id) {
        Some(conversation) => Json(conversation).into_response(),
        None => not_found("Conversation not found"),
    }
}

async fn delete_conversation(
    State(orchestrator): State<Arc<ChatOrchestrator>>,
    Path(id): Path<String>,
) -> Response {
    if orchestrator.delete_conversation(&id) {
        Json(json!({ "message": "Conversation deleted successfully" })).into_response()
    } else {
        not_found("Conversation not found")
    }
}

async fn list_models(State(orchestrator): State<Arc<ChatOrchestrator>>) -> Response {
    Json(orchestrator.list_models().await).into_response()
}

async fn provider_status(State(orchestrator): State<Arc<ChatOrchestrator>>) -> Response {
    Json(orchestrator.provider_status().await).into_response()
}

/// Fire a one-message probe request at a provider
async fn test_provider(
    State(orchestrator): State<Arc<ChatOrchestrator>>,
    Path(provider): Path<String>,
) -> Result<Response, RelayError> {
    let kind: ProviderKind = provider.parse()?;

    if !orchestrator.has_provider(kind) {
        return Ok(not_found(&format!("Provider {} not configured", kind)));
    }

    let options = RequestOptions {
        provider: Some(kind),
        max_tokens: Some(10),
        ..Default::default()
    };

    match orchestrator.handle(vec![Message::user("Hello")], options).await {
        Ok(ChatOutcome::Complete(response)) => {
            let preview: String = response.message.content.chars().take(50).collect();
            Ok(Json(json!({
                "provider": kind.to_string(),
                "status": "success",
                "response": preview,
            }))
            .into_response())
        }
        Ok(ChatOutcome::Stream(_)) => Err(RelayError::Config(
            "streaming outcome on provider test".to_string(),
        )),
        Err(e) => Ok(Json(json!({
            "provider": kind.to_string(),
            "status": "error",
            "error": e.to_string(),
        }))
        .into_response()),
    }
}

#[derive(Debug, Deserialize)]
struct PromptListQuery {
    /// Comma-separated tag filter
    #[serde(default)]
    tags: Option<String>,
}

async fn list_prompts(
    State(orchestrator): State<Arc<ChatOrchestrator>>,
    Query(query): Query<PromptListQuery>,
) -> Response {
    let tags: Option<Vec<String>> = query.tags.map(|t| {
        t.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    });

    Json(orchestrator.prompts().list(tags.as_deref())).into_response()
}

async fn get_prompt(
    State(orchestrator): State<Arc<ChatOrchestrator>>,
    Path(id): Path<String>,
) -> Response {
    match orchestrator.prompts().get(&id) {
        Some(prompt) => Json(prompt).into_response(),
        None => not_found("Prompt not found"),
    }
}

async fn create_prompt(
    State(orchestrator): State<Arc<ChatOrchestrator>>,
    Json(draft): Json<PromptDraft>,
) -> Result<Response, RelayError> {
    let validation = validate_template(&draft.content);
    if !validation.valid {
        return Err(RelayError::InvalidTemplate(validation.errors.join(", ")));
    }

    match orchestrator.prompts().create(draft) {
        Ok(prompt) => Ok(Json(prompt).into_response()),
        Err(e) => Ok(prompt_write_error(e)),
    }
}

async fn update_prompt(
    State(orchestrator): State<Arc<ChatOrchestrator>>,
    Path(id): Path<String>,
    Json(update): Json<PromptUpdate>,
) -> Result<Response, RelayError> {
    if let Some(content) = &update.content {
        let validation = validate_template(content);
        if !validation.valid {
            return Err(RelayError::InvalidTemplate(validation.errors.join(", ")));
        }
    }

    match orchestrator.prompts().update(&id, update) {
        Ok(prompt) => Ok(Json(prompt).into_response()),
        Err(e) => Ok(prompt_write_error(e)),
    }
}

async fn delete_prompt(
    State(orchestrator): State<Arc<ChatOrchestrator>>,
    Path(id): Path<String>,
) -> Response {
    match orchestrator.prompts().delete(&id) {
        Ok(()) => Json(json!({ "message": "Prompt deleted successfully" })).into_response(),
        Err(e) => prompt_write_error(e),
    }
}

#[derive(Debug, Deserialize)]
struct ValidateRequest {
    content: String,
}

async fn validate_prompt(Json(request): Json<ValidateRequest>) -> Response {
    Json(validate_template(&request.content)).into_response()
}

async fn prompt_statistics(State(orchestrator): State<Arc<ChatOrchestrator>>) -> Response {
    Json(orchestrator.prompts().statistics()).into_response()
}

async fn upload_file(
    State(store): State<Arc<FileStore>>,
    mut multipart: Multipart,
) -> Result<Response, RelayError> {
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        RelayError::InvalidParameter {
            field: "file",
            reason: e.to_string(),
        }
    })? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();

        if !files::is_allowed_type(&content_type) {
            return Err(RelayError::InvalidParameter {
                field: "file",
                reason: format!("File type {} is not allowed", content_type),
            });
        }

        let data = field.bytes().await.map_err(|e| RelayError::InvalidParameter {
            field: "file",
            reason: e.to_string(),
        })?;

        if data.len() > files::MAX_FILE_SIZE {
            return Err(RelayError::InvalidParameter {
                field: "file",
                reason: format!(
                    "File size exceeds maximum allowed size of {}MB",
                    files::MAX_FILE_SIZE / (1024 * 1024)
                ),
            });
        }

        tracing::info!(filename = %filename, size = data.len(), "file uploaded");
        let metadata = store.insert(filename, content_type, data.to_vec());
        return Ok(Json(metadata).into_response());
    }

    Err(RelayError::InvalidParameter {
        field: "file",
        reason: "no file field in upload".to_string(),
    })
}

async fn get_file(State(store): State<Arc<FileStore>>, Path(id): Path<String>) -> Response {
    match store.get(&id) {
        Some(file) => (
            [
                (header::CONTENT_TYPE, "application/octet-stream".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", file.filename),
                ),
            ],
            file.data,
        )
            .into_response(),
        None => not_found("File not found"),
    }
}

async fn delete_file(State(store): State<Arc<FileStore>>, Path(id): Path<String>) -> Response {
    if store.delete(&id) {
        Json(json!({ "message": "File deleted successfully" })).into_response()
    } else {
        not_found("File not found")
    }
}

async fn list_files(State(store): State<Arc<FileStore>>) -> Response {
    Json(json!({ "files": store.list() })).into_response()
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    timestamp: DateTime<Utc>,
    services: std::collections::HashMap<String, bool>,
}

async fn health(State(orchestrator): State<Arc<ChatOrchestrator>>) -> Response {
    let services = orchestrator
        .provider_status()
        .await
        .into_iter()
        .map(|s| (s.provider.to_string(), s.available))
        .collect();

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now(),
        services,
    })
    .into_response()
}
