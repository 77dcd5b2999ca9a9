use tokio::sync::broadcast;

use crate::events::RecorderEvent;
use crate::recorder::AudioChunkRecorder;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub recorder: AudioChunkRecorder,
    /// Fan-out of recorder events to SSE subscribers
    pub events: broadcast::Sender<RecorderEvent>,
}

impl AppState {
    pub fn new(recorder: AudioChunkRecorder, events: broadcast::Sender<RecorderEvent>) -> Self {
        Self { recorder, events }
    }
}
