use super::state::AppState;
use crate::events::RecorderEvent;
use crate::recorder::{InterruptionSignal, StartOptions};
use crate::RecorderError;
use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl IntoResponse for RecorderError {
    fn into_response(self) -> Response {
        let status = match &self {
            e if e.is_state_error() => StatusCode::CONFLICT,
            RecorderError::PermissionDenied => StatusCode::FORBIDDEN,
            RecorderError::Closed => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        (
            status,
            Json(ErrorResponse {
                code: self.code().to_string(),
                message: self.to_string(),
            }),
        )
            .into_response()
    }
}

fn message(text: impl Into<String>) -> Json<MessageResponse> {
    Json(MessageResponse {
        message: text.into(),
    })
}

// ============================================================================
// Recording control
// ============================================================================

/// POST /recording/start
pub async fn start_recording(
    State(state): State<AppState>,
    Json(options): Json<StartOptions>,
) -> Result<Json<MessageResponse>, RecorderError> {
    info!("Start requested: {:?}", options);
    state.recorder.start_recording(options).await?;
    Ok(message("Recording started"))
}

/// POST /recording/stop
pub async fn stop_recording(
    State(state): State<AppState>,
) -> Result<Json<MessageResponse>, RecorderError> {
    state.recorder.stop_recording().await?;
    Ok(message("Recording stopped"))
}

/// POST /recording/pause
pub async fn pause_recording(
    State(state): State<AppState>,
) -> Result<Json<MessageResponse>, RecorderError> {
    state.recorder.pause_recording().await?;
    Ok(message("Recording paused"))
}

/// POST /recording/resume
pub async fn resume_recording(
    State(state): State<AppState>,
) -> Result<Json<MessageResponse>, RecorderError> {
    state.recorder.resume_recording().await?;
    Ok(message("Recording resumed"))
}

// ============================================================================
// Queries
// ============================================================================

/// GET /recording/state
pub async fn get_recording_state(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.recorder.get_recording_state())
}

/// GET /recording/level
pub async fn get_audio_level(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "level": state.recorder.get_audio_level() }))
}

/// GET /recording/chunk-index
pub async fn get_current_chunk_index(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "chunkIndex": state.recorder.get_current_chunk_index() }))
}

/// GET /recording/chunk-duration
pub async fn get_chunk_duration(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "chunkDuration": state.recorder.get_chunk_duration() }))
}

/// GET /permissions
pub async fn check_permissions(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "granted": state.recorder.check_permissions() }))
}

/// GET /available
pub async fn is_available(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "available": state.recorder.is_available() }))
}

/// GET /module-info
pub async fn get_module_info(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.recorder.module_info())
}

// ============================================================================
// Chunk files
// ============================================================================

/// DELETE /chunks
pub async fn clear_all_chunk_files(
    State(state): State<AppState>,
) -> Result<Json<MessageResponse>, RecorderError> {
    let deleted = state.recorder.clear_all_chunk_files().await?;
    Ok(message(format!("Deleted {} chunk files", deleted)))
}

/// GET /chunks/count
pub async fn chunk_file_count(State(state): State<AppState>) -> Result<impl IntoResponse, RecorderError> {
    let count = state.recorder.chunk_file_count()?;
    Ok(Json(json!({ "count": count })))
}

// ============================================================================
// Level preview and platform glue
// ============================================================================

/// POST /preview/start
pub async fn start_audio_level_preview(
    State(state): State<AppState>,
) -> Result<Json<MessageResponse>, RecorderError> {
    state.recorder.start_audio_level_preview().await?;
    Ok(message("Audio level preview started"))
}

/// POST /preview/stop
pub async fn stop_audio_level_preview(
    State(state): State<AppState>,
) -> Result<Json<MessageResponse>, RecorderError> {
    state.recorder.stop_audio_level_preview().await?;
    Ok(message("Audio level preview stopped"))
}

/// POST /interruptions
pub async fn handle_interruption(
    State(state): State<AppState>,
    Json(signal): Json<InterruptionSignal>,
) -> Result<StatusCode, RecorderError> {
    state.recorder.handle_interruption(signal).await?;
    Ok(StatusCode::ACCEPTED)
}

/// GET /events
/// Stream recorder events as SSE (`event:` name, `data:` JSON payload)
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.events.subscribe();

    let events = stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(event) => return Some((Ok(to_sse(&event)), receiver)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Event subscriber lagged, {} events dropped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

fn to_sse(event: &RecorderEvent) -> Event {
    let data = event
        .payload_json()
        .map(|payload| payload.to_string())
        .unwrap_or_else(|_| "{}".to_string());
    Event::default().event(event.name()).data(data)
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
