use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::audio::AudioLevelMeter;

/// Recorder lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecorderState {
    Idle,
    Recording,
    Paused,
    /// Transient: finalizing the last chunk
    Stopping,
}

impl RecorderState {
    fn as_u8(self) -> u8 {
        match self {
            RecorderState::Idle => 0,
            RecorderState::Recording => 1,
            RecorderState::Paused => 2,
            RecorderState::Stopping => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => RecorderState::Recording,
            2 => RecorderState::Paused,
            3 => RecorderState::Stopping,
            _ => RecorderState::Idle,
        }
    }

    /// Recording in the host's sense: an active session, paused or not
    pub fn is_recording(self) -> bool {
        matches!(self, RecorderState::Recording | RecorderState::Paused)
    }
}

impl fmt::Display for RecorderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecorderState::Idle => "idle",
            RecorderState::Recording => "recording",
            RecorderState::Paused => "paused",
            RecorderState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Answer to `getRecordingState`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingStateSnapshot {
    pub is_recording: bool,
    pub is_paused: bool,
    pub is_available: bool,
    pub has_permission: bool,
    pub is_preview_active: bool,
    pub current_chunk_index: u32,
    pub chunk_duration: f64,
    pub audio_level: f32,
}

/// Answer to `getModuleInfo`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleInfo {
    pub name: String,
    pub version: String,
    pub platform: String,
    pub has_audio_level_monitoring: bool,
    pub has_chunk_support: bool,
    pub sample_rate: u32,
    pub audio_format: String,
    pub channel_config: String,
}

/// Values the command queue publishes for synchronous queries.
///
/// Only the command queue writes here, so readers see each value as of
/// the last completed command.
#[derive(Debug)]
pub(crate) struct RecorderStatus {
    state: AtomicU8,
    sequence: AtomicU32,
    chunk_seconds: AtomicU64,
    preview_active: AtomicBool,
    meter: Arc<AudioLevelMeter>,
}

impl RecorderStatus {
    pub(crate) fn new(chunk_seconds: f64, meter: Arc<AudioLevelMeter>) -> Self {
        Self {
            state: AtomicU8::new(RecorderState::Idle.as_u8()),
            sequence: AtomicU32::new(1),
            chunk_seconds: AtomicU64::new(chunk_seconds.to_bits()),
            preview_active: AtomicBool::new(false),
            meter,
        }
    }

    pub(crate) fn state(&self) -> RecorderState {
        RecorderState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: RecorderState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    pub(crate) fn sequence(&self) -> u32 {
        self.sequence.load(Ordering::Acquire)
    }

    pub(crate) fn set_sequence(&self, sequence: u32) {
        self.sequence.store(sequence, Ordering::Release);
    }

    pub(crate) fn chunk_seconds(&self) -> f64 {
        f64::from_bits(self.chunk_seconds.load(Ordering::Acquire))
    }

    pub(crate) fn set_chunk_seconds(&self, seconds: f64) {
        self.chunk_seconds.store(seconds.to_bits(), Ordering::Release);
    }

    pub(crate) fn preview_active(&self) -> bool {
        self.preview_active.load(Ordering::Acquire)
    }

    pub(crate) fn set_preview_active(&self, active: bool) {
        self.preview_active.store(active, Ordering::Release);
    }

    pub(crate) fn meter(&self) -> &Arc<AudioLevelMeter> {
        &self.meter
    }
}
