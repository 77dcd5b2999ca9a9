use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;

/// Recorder configuration.
///
/// Platform-tuned constants (thresholds, default sample rate, timing) live
/// here so the core never branches on platform.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub audio: AudioConfig,
    pub level: LevelConfig,
    pub capture: CaptureConfig,
    pub timing: TimingConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding chunk files (exclusive to the recorder)
    pub directory: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            directory: "~/.audio-chunk-recorder/AudioChunks".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn directory_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.directory).as_ref())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub chunk_seconds: f64,
    pub bit_rate: u32,
    /// Session ceiling in recorded seconds; `None` means unlimited
    pub max_recording_duration: Option<f64>,
    /// Chunk intervals below this run as monitoring sessions (nothing persisted)
    pub min_persisted_chunk_seconds: f64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            chunk_seconds: 30.0,
            bit_rate: 64000,
            max_recording_duration: None,
            min_persisted_chunk_seconds: 1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LevelConfig {
    /// Change from the last emitted level that must be exceeded to emit again
    pub emit_delta: f32,
    /// Level above which a block counts as containing audio
    pub has_audio_threshold: f32,
    /// Metering floor mapped to level 0
    pub db_floor: f32,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            emit_delta: 0.02,
            has_audio_threshold: 0.01,
            db_floor: -60.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Samples pulled from the device per iteration
    pub block_samples: usize,
    /// Idle wait when the device has no data
    pub poll_interval_ms: u64,
    /// Consecutive read failures before the host is told
    pub max_consecutive_read_errors: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            block_samples: 1024,
            poll_interval_ms: 20,
            max_consecutive_read_errors: 50,
        }
    }
}

impl CaptureConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Wait before validating a codec-written chunk
    pub encoded_flush_delay_ms: u64,
    /// Window absorbing duplicate interruption-ended notifications
    pub interruption_debounce_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            encoded_flush_delay_ms: 500,
            interruption_debounce_ms: 1000,
        }
    }
}

impl TimingConfig {
    pub fn encoded_flush_delay(&self) -> Duration {
        Duration::from_millis(self.encoded_flush_delay_ms)
    }

    pub fn interruption_debounce(&self) -> Duration {
        Duration::from_millis(self.interruption_debounce_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 7890,
        }
    }
}

impl Config {
    /// Load from a config file (extension optional) with `CHUNK_RECORDER__*`
    /// environment overrides. A missing file falls back to defaults.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("CHUNK_RECORDER").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
