use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::AudioConfig;
use crate::error::RecorderError;

/// Options accepted by `startRecording`; omitted fields use configured defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StartOptions {
    pub sample_rate: Option<u32>,
    pub bit_rate: Option<u32>,
    pub chunk_seconds: Option<f64>,
    /// Recorded seconds after which the session ends on its own
    pub max_recording_duration: Option<f64>,
}

impl StartOptions {
    pub fn with_chunk_seconds(mut self, seconds: f64) -> Self {
        self.chunk_seconds = Some(seconds);
        self
    }

    pub fn with_max_recording_duration(mut self, seconds: f64) -> Self {
        self.max_recording_duration = Some(seconds);
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }
}

/// Validated, fixed-for-the-session parameters
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SessionParams {
    pub sample_rate: u32,
    pub bit_rate: u32,
    pub chunk_seconds: f64,
    pub max_duration_seconds: Option<f64>,
    /// False for monitoring sessions: buffers are discarded at rotation
    pub persist: bool,
}

impl SessionParams {
    pub fn resolve(options: &StartOptions, defaults: &AudioConfig) -> Result<Self, RecorderError> {
        let sample_rate = options.sample_rate.unwrap_or(defaults.sample_rate);
        if sample_rate == 0 {
            return Err(RecorderError::StartFailed(
                "sample rate must be positive".to_string(),
            ));
        }

        let chunk_seconds = options.chunk_seconds.unwrap_or(defaults.chunk_seconds);
        if !chunk_seconds.is_finite() || chunk_seconds <= 0.0 {
            return Err(RecorderError::StartFailed(format!(
                "invalid chunk interval {}s",
                chunk_seconds
            )));
        }

        // Non-positive limits mean no limit
        let max_duration_seconds = options
            .max_recording_duration
            .or(defaults.max_recording_duration)
            .filter(|secs| secs.is_finite() && *secs > 0.0);

        Ok(Self {
            sample_rate,
            bit_rate: options.bit_rate.unwrap_or(defaults.bit_rate),
            chunk_seconds,
            max_duration_seconds,
            persist: chunk_seconds >= defaults.min_persisted_chunk_seconds,
        })
    }

    pub fn chunk_interval(&self) -> Duration {
        Duration::from_secs_f64(self.chunk_seconds)
    }

    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration_seconds.map(Duration::from_secs_f64)
    }
}
