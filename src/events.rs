//! Typed notifications delivered to the host.
//!
//! Events are fire-and-forget: the recorder hands them to an [`EventSink`]
//! and never waits for delivery. The capture thread emits level and device
//! error events directly, everything else is emitted from the command queue.

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::audio::ChunkRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum RecorderEvent {
    #[serde(rename = "onStateChange")]
    StateChange(StateChange),
    #[serde(rename = "onChunkReady")]
    ChunkReady(ChunkRecord),
    #[serde(rename = "onAudioLevel")]
    AudioLevel(AudioLevel),
    #[serde(rename = "onError")]
    Error(ErrorEvent),
    #[serde(rename = "onInterruption")]
    Interruption(InterruptionEvent),
    #[serde(rename = "onMaxDurationReached")]
    MaxDurationReached(MaxDurationReached),
}

impl RecorderEvent {
    /// Host-side event name.
    pub fn name(&self) -> &'static str {
        match self {
            RecorderEvent::StateChange(_) => "onStateChange",
            RecorderEvent::ChunkReady(_) => "onChunkReady",
            RecorderEvent::AudioLevel(_) => "onAudioLevel",
            RecorderEvent::Error(_) => "onError",
            RecorderEvent::Interruption(_) => "onInterruption",
            RecorderEvent::MaxDurationReached(_) => "onMaxDurationReached",
        }
    }

    /// The event body without the name tag.
    pub fn payload_json(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            RecorderEvent::StateChange(p) => serde_json::to_value(p),
            RecorderEvent::ChunkReady(p) => serde_json::to_value(p),
            RecorderEvent::AudioLevel(p) => serde_json::to_value(p),
            RecorderEvent::Error(p) => serde_json::to_value(p),
            RecorderEvent::Interruption(p) => serde_json::to_value(p),
            RecorderEvent::MaxDurationReached(p) => serde_json::to_value(p),
        }
    }

    pub fn state_change(is_recording: bool, is_paused: bool) -> Self {
        RecorderEvent::StateChange(StateChange {
            is_recording,
            is_paused,
        })
    }

    pub fn error(message: impl Into<String>, code: Option<&str>) -> Self {
        RecorderEvent::Error(ErrorEvent {
            message: message.into(),
            code: code.map(str::to_string),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChange {
    pub is_recording: bool,
    pub is_paused: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioLevel {
    /// Normalized loudness in [0, 1]
    pub level: f32,
    pub has_audio: bool,
    /// Hardware metering power in dB, when the level came from a meter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_power: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InterruptionKind {
    Began,
    Ended,
    AudioDeviceDisconnected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterruptionEvent {
    #[serde(rename = "type")]
    pub kind: InterruptionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub was_recording: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub should_resume: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_resume: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub native_paused: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaxDurationReached {
    /// Recorded (non-paused) seconds when the limit hit
    pub duration: f64,
    pub max_duration: f64,
    /// Every chunk produced during the session
    pub chunks: Vec<ChunkRecord>,
}

/// Destination for recorder events.
///
/// Implementations must not block: `emit` is called from the capture thread.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: RecorderEvent);
}

impl EventSink for mpsc::UnboundedSender<RecorderEvent> {
    fn emit(&self, event: RecorderEvent) {
        let name = event.name();
        if self.send(event).is_err() {
            warn!("Event receiver dropped, {} lost", name);
        }
    }
}

impl EventSink for broadcast::Sender<RecorderEvent> {
    fn emit(&self, event: RecorderEvent) {
        let name = event.name();
        // No subscribers is normal when nobody listens to the event stream
        if self.send(event).is_err() {
            debug!("No event listeners, {} dropped", name);
        }
    }
}

/// Sink that discards everything.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: RecorderEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_change_serializes_camel_case() {
        let event = RecorderEvent::state_change(true, false);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["event"], "onStateChange");
        assert_eq!(json["payload"]["isRecording"], true);
        assert_eq!(json["payload"]["isPaused"], false);
    }

    #[test]
    fn test_interruption_payload_uses_type_field() {
        let event = RecorderEvent::Interruption(InterruptionEvent {
            kind: InterruptionKind::AudioDeviceDisconnected,
            reason: Some("device_unplugged".to_string()),
            was_recording: Some(true),
            should_resume: None,
            can_resume: None,
            native_paused: Some(true),
        });

        let payload = event.payload_json().unwrap();
        assert_eq!(payload["type"], "audioDeviceDisconnected");
        assert_eq!(payload["wasRecording"], true);
        assert!(payload.get("shouldResume").is_none());
    }

    #[test]
    fn test_error_without_code_omits_field() {
        let payload = RecorderEvent::error("boom", None).payload_json().unwrap();
        assert_eq!(payload["message"], "boom");
        assert!(payload.get("code").is_none());
    }

    #[test]
    fn test_unbounded_sink_delivers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.emit(RecorderEvent::state_change(false, false));

        assert_eq!(rx.try_recv().unwrap().name(), "onStateChange");
    }
}
