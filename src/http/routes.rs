use super::handlers;
use super::state::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Recording control
        .route("/recording/start", post(handlers::start_recording))
        .route("/recording/stop", post(handlers::stop_recording))
        .route("/recording/pause", post(handlers::pause_recording))
        .route("/recording/resume", post(handlers::resume_recording))
        // Recording queries
        .route("/recording/state", get(handlers::get_recording_state))
        .route("/recording/level", get(handlers::get_audio_level))
        .route("/recording/chunk-index", get(handlers::get_current_chunk_index))
        .route("/recording/chunk-duration", get(handlers::get_chunk_duration))
        .route("/permissions", get(handlers::check_permissions))
        .route("/available", get(handlers::is_available))
        .route("/module-info", get(handlers::get_module_info))
        // Chunk files
        .route("/chunks", delete(handlers::clear_all_chunk_files))
        .route("/chunks/count", get(handlers::chunk_file_count))
        // Level preview
        .route("/preview/start", post(handlers::start_audio_level_preview))
        .route("/preview/stop", post(handlers::stop_audio_level_preview))
        // Platform glue
        .route("/interruptions", post(handlers::handle_interruption))
        .route("/events", get(handlers::event_stream))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
