//! HTTP bridge exposing the recorder to a host process
//!
//! One route per host operation:
//! - POST /recording/{start,stop,pause,resume} - Session control
//! - GET /recording/state - Full state snapshot
//! - DELETE /chunks - Remove chunk files
//! - POST /preview/{start,stop} - Level preview
//! - POST /interruptions - Forward audio-session notifications
//! - GET /events - Server-Sent Events stream of recorder events
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::ErrorResponse;
pub use routes::create_router;
pub use state::AppState;
