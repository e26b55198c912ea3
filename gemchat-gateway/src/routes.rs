//! Route definitions for the gemchat gateway.
//!
//! Chat, session management, format listing, and health endpoints.

use crate::media::{self, SupportedFormats};
use crate::provider::{ModelClient, TurnPart};
use crate::session::{SessionStore, SessionSummary};
use axum::{
    async_trait,
    body::Bytes,
    extract::{multipart::MultipartError, FromRequest, Multipart, Path, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use gemchat_common::config::Config;
use gemchat_common::logging::generate_trace_id;
use gemchat_common::util::truncate_with_ellipsis;
use gemchat_common::{request_span, Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::Instrument;

/// Session id used when a chat request names none.
pub const DEFAULT_SESSION_ID: &str = "default";

const FILE_PROMPT: &str = "Please analyze this file.";
const IMAGE_PROMPT: &str = "Please analyze this image.";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub client: Arc<dyn ModelClient>,
    pub max_content_length: usize,
    pub session_timeout: chrono::Duration,
}

impl AppState {
    pub fn new(config: &Config, client: Arc<dyn ModelClient>) -> Self {
        Self {
            sessions: Arc::new(SessionStore::new(Arc::clone(&client))),
            client,
            max_content_length: config.uploads.max_content_length,
            session_timeout: config.sessions.timeout(),
        }
    }
}

/// JSON chat request body.
#[derive(Debug, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    /// Base64 image, optionally a data URI.
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NewChatResponse {
    pub session_id: String,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionInfoResponse {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    pub exists: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSummary>,
    pub total_sessions: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CleanupResponse {
    pub cleaned_up: usize,
    pub remaining_sessions: usize,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub active_sessions: usize,
    pub model: String,
    pub timestamp: String,
}

/// Media attached to a chat turn.
#[derive(Debug)]
pub enum MediaInput {
    Base64Image(String),
    Upload { filename: String, bytes: Vec<u8> },
}

/// A parsed chat request, from either a JSON or a multipart body.
#[derive(Debug)]
pub struct ChatInput {
    pub session_id: String,
    pub message: Option<String>,
    pub media: Option<MediaInput>,
}

impl ChatInput {
    fn from_json(body: ChatRequest) -> Self {
        Self {
            session_id: body
                .session_id
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_SESSION_ID.into()),
            message: body.message.filter(|m| !m.is_empty()),
            media: body
                .image
                .filter(|i| !i.is_empty())
                .map(MediaInput::Base64Image),
        }
    }

    async fn from_multipart(mut multipart: Multipart) -> Result<Self> {
        let mut message = None;
        let mut session_id = None;
        let mut media = None;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error("Invalid multipart body", e))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "message" => message = Some(read_text(field).await?),
                "session_id" => session_id = Some(read_text(field).await?),
                "file" => {
                    let filename = field.file_name().unwrap_or_default().to_string();
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| multipart_error("Failed reading file", e))?;
                    if !filename.is_empty() {
                        media = Some(MediaInput::Upload {
                            filename,
                            bytes: bytes.to_vec(),
                        });
                    }
                }
                _ => {}
            }
        }

        Ok(Self {
            session_id: session_id
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_SESSION_ID.into()),
            message: Some(
                message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| FILE_PROMPT.into()),
            ),
            media,
        })
    }
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String> {
    field
        .text()
        .await
        .map_err(|e| multipart_error("Invalid multipart field", e))
}

/// Keep the size-limit status a multipart read failed with.
fn multipart_error(context: &str, e: MultipartError) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge(format!("{context}: {}", e.body_text()))
    } else {
        Error::InvalidInput(format!("{context}: {e}"))
    }
}

#[async_trait]
impl<S> FromRequest<S> for ChatInput
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("multipart/form-data"));

        if is_multipart {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            return Self::from_multipart(multipart)
                .await
                .map_err(IntoResponse::into_response);
        }

        let body = Bytes::from_request(req, state)
            .await
            .map_err(IntoResponse::into_response)?;
        let request: ChatRequest = serde_json::from_slice(&body)
            .map_err(|e| Error::InvalidInput(format!("Invalid JSON body: {e}")).into_response())?;

        Ok(Self::from_json(request))
    }
}

/// Build the API routes.
pub fn build_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/new-chat", post(new_chat_handler))
        .route("/api/session-info/:session_id", get(session_info_handler))
        .route("/api/sessions", get(list_sessions_handler))
        .route("/api/cleanup-sessions", post(cleanup_sessions_handler))
        .route("/api/supported-formats", get(supported_formats_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Chat
// ─────────────────────────────────────────────────────────────────────────────

/// Run one chat turn from a JSON or multipart request.
async fn chat_handler(
    State(state): State<AppState>,
    input: ChatInput,
) -> Result<Json<ChatResponse>> {
    let trace_id = generate_trace_id();
    let span = request_span!("chat", trace_id, session_id = %input.session_id);

    let response = run_chat(&state, input).instrument(span).await?;
    Ok(Json(ChatResponse { response }))
}

async fn run_chat(state: &AppState, input: ChatInput) -> Result<String> {
    tracing::info!(
        message = %truncate_with_ellipsis(input.message.as_deref().unwrap_or_default(), 80),
        has_media = input.media.is_some(),
        "Chat request"
    );

    let session = state.sessions.get_or_create(&input.session_id);

    let media = match input.media {
        None => None,
        Some(MediaInput::Base64Image(encoded)) => Some(
            media::decode_base64_image(&encoded)
                .map_err(|e| e.with_context("Error processing image"))?,
        ),
        Some(MediaInput::Upload { filename, bytes }) => {
            if !media::is_allowed_file(&filename) {
                return Err(Error::UnsupportedFileType(filename));
            }
            Some(
                media::normalize_upload(&filename, bytes, state.client.as_ref())
                    .await
                    .map_err(|e| match e {
                        Error::InvalidMedia(_) => e.with_context("Error processing file"),
                        other => other,
                    })?,
            )
        }
    };

    let message = match (input.message, &media) {
        (Some(message), _) => message,
        (None, Some(_)) => IMAGE_PROMPT.to_string(),
        (None, None) => return Err(Error::InvalidInput("No message provided".into())),
    };

    let mut parts = vec![TurnPart::Text(message)];
    if let Some(part) = media {
        tracing::debug!(kind = part.kind(), "Media processed");
        parts.push(part);
    }

    state.sessions.send_turn(&session, parts).await
}

// ─────────────────────────────────────────────────────────────────────────────
// Sessions
// ─────────────────────────────────────────────────────────────────────────────

async fn new_chat_handler(State(state): State<AppState>) -> Json<NewChatResponse> {
    let session = state.sessions.create_new();

    Json(NewChatResponse {
        session_id: session.id().to_string(),
        status: "created".into(),
    })
}

async fn session_info_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Json<SessionInfoResponse> {
    let response = match state.sessions.get(&session_id) {
        Some(session) => SessionInfoResponse {
            session_id,
            message_count: Some(session.turn_count()),
            created_at: Some(session.created_at().to_rfc3339()),
            exists: true,
        },
        None => SessionInfoResponse {
            session_id,
            message_count: None,
            created_at: None,
            exists: false,
        },
    };

    Json(response)
}

async fn list_sessions_handler(State(state): State<AppState>) -> Json<SessionListResponse> {
    let sessions = state.sessions.list();

    Json(SessionListResponse {
        total_sessions: sessions.len(),
        sessions,
    })
}

async fn cleanup_sessions_handler(State(state): State<AppState>) -> Json<CleanupResponse> {
    let cleaned_up = state.sessions.cleanup(state.session_timeout);

    Json(CleanupResponse {
        cleaned_up,
        remaining_sessions: state.sessions.len(),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Static info
// ─────────────────────────────────────────────────────────────────────────────

async fn supported_formats_handler(State(state): State<AppState>) -> Json<SupportedFormats> {
    Json(media::supported_formats(state.max_content_length))
}

/// Health check handler.
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        active_sessions: state.sessions.len(),
        model: state.client.model_name().to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
