//! Chat and session endpoints.
//!
//! - `POST   /chat`                    Send a prompt, get the whole reply
//! - `POST   /chat/stream`             Send a prompt, get the reply as streamed text
//! - `GET    /sessions/{id}/context`   Window plus recalled memories for a query
//! - `DELETE /sessions/{id}`           Forget a session

use axum::{
    Router,
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info};

use threadmind_agent::{AssembledContext, ChatAgent};
use threadmind_core::error::{Error, MemoryError};
use threadmind_core::turn::SessionId;

/// Response header carrying the session id of a streamed reply.
pub const SESSION_HEADER: &str = "x-session-id";

// ── State ─────────────────────────────────────────────────────────────────

pub struct ApiState {
    pub agent: Arc<ChatAgent>,
}

pub type SharedApiState = Arc<ApiState>;

pub fn api_router(state: SharedApiState) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/chat/stream", post(chat_stream_handler))
        .route("/sessions/{id}/context", get(context_handler))
        .route("/sessions/{id}", delete(clear_session_handler))
        .with_state(state)
}

// ── DTOs ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub prompt: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ContextQuery {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Map an agent error onto a transport status.
fn error_status(err: &Error) -> StatusCode {
    match err {
        Error::Provider(_) => StatusCode::BAD_GATEWAY,
        Error::Memory(MemoryError::SessionNotFound(_)) => StatusCode::NOT_FOUND,
        Error::Memory(e) if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
        Error::Memory(_) | Error::Config { .. } | Error::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl ChatRequest {
    /// Validate the request and resolve the session id, generating one if absent.
    ///
    /// The id is echoed in a response header, so it must be a valid header
    /// value. This is checked here, before the turn touches any session.
    fn resolve(&self) -> Result<SessionId, ApiError> {
        if self.prompt.trim().is_empty() {
            return Err(api_error(StatusCode::BAD_REQUEST, "prompt must not be empty"));
        }
        match &self.session_id {
            Some(id) if id.trim().is_empty() => Err(api_error(
                StatusCode::BAD_REQUEST,
                "session_id must not be empty",
            )),
            Some(id) => match HeaderValue::from_str(id) {
                Ok(_) => Ok(SessionId::from(id.as_str())),
                Err(_) => Err(api_error(
                    StatusCode::BAD_REQUEST,
                    "session_id contains characters not allowed in a header",
                )),
            },
            None => Ok(SessionId::generate()),
        }
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn chat_handler(
    State(state): State<SharedApiState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let session_id = payload.resolve()?;
    info!(session_id = %session_id, prompt_len = payload.prompt.len(), "chat request");

    let reply = state
        .agent
        .reply(&session_id, &payload.prompt)
        .await
        .map_err(|e| {
            error!(session_id = %session_id, error = %e, "Chat turn failed");
            api_error(error_status(&e), format!("Chat error: {e}"))
        })?;

    Ok(Json(ChatResponse {
        session_id: session_id.to_string(),
        response: reply.reply,
        summary: reply.summary,
        warnings: reply.warnings,
    }))
}

/// Streams the reply as `text/plain` fragments. The session id travels in
/// the `x-session-id` response header.
async fn chat_stream_handler(
    State(state): State<SharedApiState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let session_id = payload.resolve()?;
    info!(session_id = %session_id, prompt_len = payload.prompt.len(), "chat stream request");

    let streamed = state
        .agent
        .reply_stream(&session_id, &payload.prompt)
        .await
        .map_err(|e| {
            error!(session_id = %session_id, error = %e, "Chat stream failed to start");
            api_error(error_status(&e), format!("Chat stream error: {e}"))
        })?;

    let body = Body::from_stream(ReceiverStream::new(streamed.fragments).map(|item| item.map(Bytes::from)));

    Response::builder()
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(SESSION_HEADER, session_id.as_str())
        .body(body)
        .map_err(|e| {
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to build response: {e}"),
            )
        })
}

async fn context_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
    Query(params): Query<ContextQuery>,
) -> Json<AssembledContext> {
    let session_id = SessionId::from(id);
    let query = params.query.unwrap_or_default();
    Json(
        state
            .agent
            .memory()
            .assemble_context(&session_id, &query, params.top_k)
            .await,
    )
}

async fn clear_session_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session_id = SessionId::from(id);
    state
        .agent
        .memory()
        .clear_session(&session_id)
        .await
        .map_err(|e| {
            let err = Error::from(e);
            api_error(error_status(&err), err.to_string())
        })?;
    Ok(StatusCode::NO_CONTENT)
}
