//! JSON API handlers for the call widget.

use crate::AppState;
use axum::{
    extract::Extension,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use callsetter_genai::{draft_follow_up, summarize_call, FollowUpRequest, GenAiError};
use callsetter_session::{diagnostics, SessionDiagnostics};
use callsetter_types::{CallMetrics, CallResult, CallState, Persona, TranscriptMessage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Longest text accepted by `POST /api/call/message`.
const MAX_MESSAGE_CHARS: usize = 2000;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("upstream error: {0}")]
    BadGateway(String),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct CallStatusResponse {
    pub state: CallState,
    pub metrics: CallMetrics,
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub muted: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct StartCallRequest {
    #[serde(default)]
    pub phone_number: Option<String>,
    /// Persona id from `/api/personas`.
    #[serde(default)]
    pub persona: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MuteRequest {
    pub muted: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MuteResponse {
    pub muted: bool,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct FollowUpResponse {
    pub message: String,
    pub provider: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct SummaryRequest {
    #[serde(default)]
    pub transcript: Vec<TranscriptMessage>,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub summary: String,
    pub provider: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct SpeechRequest {
    pub text: String,
    /// Falls back to the configured default voice.
    #[serde(default)]
    pub voice_id: Option<String>,
}

/// Maps a provider failure: bad input is the caller's fault, anything else
/// is upstream.
fn content_error(provider: &str, err: GenAiError) -> ApiError {
    match err {
        GenAiError::InvalidInput(msg) => ApiError::BadRequest(msg),
        other => {
            tracing::warn!(provider, error = %other, "content generation failed");
            ApiError::BadGateway(other.to_string())
        }
    }
}

/// Handler for `GET /api/call/state`.
pub async fn get_call_state_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Json<CallStatusResponse> {
    let manager = &state.manager;
    Json(CallStatusResponse {
        state: manager.state(),
        metrics: manager.metrics(),
        ready: manager.is_ready(),
        reason: manager.readiness().reason().map(str::to_string),
        muted: manager.is_muted(),
    })
}

/// Handler for `POST /api/call/start`.
pub async fn start_call_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<StartCallRequest>,
) -> Result<Json<CallResult>, ApiError> {
    let phone = payload.phone_number.as_deref();
    let result = match payload.persona.as_deref() {
        Some(id) => {
            let persona = state
                .persona(id)
                .ok_or_else(|| ApiError::NotFound(format!("unknown persona: {id}")))?;
            state.manager.start_call_for_persona(persona, phone).await
        }
        None => state.manager.start_call(phone).await,
    };
    Ok(Json(result))
}

/// Handler for `POST /api/call/end`.
pub async fn end_call_handler(Extension(state): Extension<Arc<AppState>>) -> Json<CallResult> {
    Json(state.manager.end_call().await)
}

/// Handler for `POST /api/call/mute`.
///
/// Always answers with the mute state in effect afterwards; a failed change
/// leaves it as it was.
pub async fn set_mute_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<MuteRequest>,
) -> Json<MuteResponse> {
    state.manager.set_muted(payload.muted).await;
    Json(MuteResponse {
        muted: state.manager.is_muted(),
    })
}

/// Handler for `POST /api/call/mute/toggle`.
pub async fn toggle_mute_handler(Extension(state): Extension<Arc<AppState>>) -> Json<MuteResponse> {
    Json(MuteResponse {
        muted: state.manager.toggle_mute().await,
    })
}

/// Handler for `POST /api/call/message`.
pub async fn send_message_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<Json<CallResult>, ApiError> {
    let text = payload.text.trim();
    if text.is_empty() {
        return Err(ApiError::BadRequest("text is empty".to_string()));
    }
    if text.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ApiError::BadRequest(format!(
            "text exceeds {MAX_MESSAGE_CHARS} characters"
        )));
    }
    if !state.manager.state().in_call {
        return Err(ApiError::Conflict("no call in progress".to_string()));
    }
    Ok(Json(state.manager.send_message(text).await))
}

/// Handler for `GET /api/personas`.
pub async fn list_personas_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Json<Vec<Persona>> {
    Json(state.personas.as_ref().clone())
}

/// Handler for `POST /api/content/follow-up`.
pub async fn follow_up_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<FollowUpRequest>,
) -> Result<Json<FollowUpResponse>, ApiError> {
    let generator = state.generator.as_ref().ok_or_else(|| {
        ApiError::ServiceUnavailable("text generation is not configured".to_string())
    })?;

    let message = draft_follow_up(&**generator, &payload)
        .await
        .map_err(|e| content_error(generator.provider(), e))?;

    Ok(Json(FollowUpResponse {
        message,
        provider: generator.provider(),
    }))
}

/// Handler for `POST /api/content/summary`.
pub async fn summary_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<SummaryRequest>,
) -> Result<Json<SummaryResponse>, ApiError> {
    let generator = state.generator.as_ref().ok_or_else(|| {
        ApiError::ServiceUnavailable("text generation is not configured".to_string())
    })?;

    let summary = summarize_call(&**generator, &payload.transcript)
        .await
        .map_err(|e| content_error(generator.provider(), e))?;

    Ok(Json(SummaryResponse {
        summary,
        provider: generator.provider(),
    }))
}

/// Handler for `POST /api/content/speech`. Answers with MP3 audio.
pub async fn speech_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<SpeechRequest>,
) -> Result<Response, ApiError> {
    let client = state.speech.as_ref().ok_or_else(|| {
        ApiError::ServiceUnavailable("speech synthesis is not configured".to_string())
    })?;
    let voice_id = payload
        .voice_id
        .as_deref()
        .or(state.default_voice_id.as_deref())
        .ok_or_else(|| ApiError::BadRequest("voice_id is required".to_string()))?;

    let audio = client
        .synthesize(&payload.text, voice_id)
        .await
        .map_err(|e| content_error("elevenlabs", e))?;

    Ok(([(header::CONTENT_TYPE, "audio/mpeg")], audio).into_response())
}

/// Handler for `GET /api/debug/session`. Only routed in debug mode.
pub async fn debug_session_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Json<SessionDiagnostics> {
    Json(diagnostics(&state.manager))
}
