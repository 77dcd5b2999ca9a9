use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::info;

use super::interruption::InterruptionSignal;
use super::machine::{Command, Machine, Reply};
use super::options::StartOptions;
use super::state::{ModuleInfo, RecorderState, RecorderStatus, RecordingStateSnapshot};
use crate::audio::{device_factory, AudioLevelMeter, AudioSource, ChunkFileWriter, DeviceFactory};
use crate::config::Config;
use crate::error::RecorderError;
use crate::events::{EventSink, NullSink};
use crate::permission::{PermissionProvider, StaticPermission};

const COMMAND_QUEUE_DEPTH: usize = 32;

/// Configures and starts an [`AudioChunkRecorder`]
pub struct RecorderBuilder {
    config: Config,
    devices: Arc<dyn DeviceFactory>,
    permissions: Arc<dyn PermissionProvider>,
    events: Arc<dyn EventSink>,
}

impl RecorderBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            devices: Arc::from(device_factory(AudioSource::Microphone)),
            permissions: Arc::new(StaticPermission::granted()),
            events: Arc::new(NullSink),
        }
    }

    pub fn device_factory(mut self, devices: Arc<dyn DeviceFactory>) -> Self {
        self.devices = devices;
        self
    }

    pub fn permissions(mut self, permissions: Arc<dyn PermissionProvider>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Create the storage directory and spawn the command queue.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self) -> Result<AudioChunkRecorder, RecorderError> {
        let writer = ChunkFileWriter::new(
            self.config.storage.directory_path(),
            self.config.timing.encoded_flush_delay(),
        )?;

        let meter = Arc::new(AudioLevelMeter::new(&self.config.level));
        let status = Arc::new(RecorderStatus::new(self.config.audio.chunk_seconds, meter));

        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();

        let machine = Machine::new(
            self.config.clone(),
            writer.clone(),
            self.devices.clone(),
            self.permissions.clone(),
            self.events,
            status.clone(),
            tick_tx,
        );
        tokio::spawn(machine.run(command_rx, tick_rx));

        info!("Audio chunk recorder ready ({})", writer.directory().display());

        Ok(AudioChunkRecorder {
            commands: command_tx,
            status,
            writer,
            devices: self.devices,
            permissions: self.permissions,
            default_sample_rate: self.config.audio.sample_rate,
        })
    }
}

/// Host-facing handle to the recorder.
///
/// Cheap to clone. Commands are queued and executed one at a time; queries
/// read the values published by the last completed command. Dropping the
/// last handle stops any session and releases the input device.
#[derive(Clone)]
pub struct AudioChunkRecorder {
    commands: mpsc::Sender<Command>,
    status: Arc<RecorderStatus>,
    writer: ChunkFileWriter,
    devices: Arc<dyn DeviceFactory>,
    permissions: Arc<dyn PermissionProvider>,
    default_sample_rate: u32,
}

impl AudioChunkRecorder {
    pub fn builder(config: Config) -> RecorderBuilder {
        RecorderBuilder::new(config)
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, RecorderError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| RecorderError::Closed)?;
        response.await.map_err(|_| RecorderError::Closed)?
    }

    pub async fn start_recording(&self, options: StartOptions) -> Result<(), RecorderError> {
        self.request(|reply| Command::Start { options, reply }).await
    }

    pub async fn stop_recording(&self) -> Result<(), RecorderError> {
        self.request(|reply| Command::Stop { reply }).await
    }

    pub async fn pause_recording(&self) -> Result<(), RecorderError> {
        self.request(|reply| Command::Pause { reply }).await
    }

    pub async fn resume_recording(&self) -> Result<(), RecorderError> {
        self.request(|reply| Command::Resume { reply }).await
    }

    /// Start level monitoring without persisting chunks
    pub async fn start_audio_level_preview(&self) -> Result<(), RecorderError> {
        self.request(|reply| Command::StartPreview { reply }).await
    }

    pub async fn stop_audio_level_preview(&self) -> Result<(), RecorderError> {
        self.request(|reply| Command::StopPreview { reply }).await
    }

    /// Feed an audio-session notification from the platform
    pub async fn handle_interruption(&self, signal: InterruptionSignal) -> Result<(), RecorderError> {
        self.request(|reply| Command::Interruption { signal, reply })
            .await
    }

    /// Delete all chunk files; returns how many were removed
    pub async fn clear_all_chunk_files(&self) -> Result<usize, RecorderError> {
        self.request(|reply| Command::ClearChunks { reply }).await
    }

    pub fn chunk_file_count(&self) -> Result<usize, RecorderError> {
        Ok(self.writer.chunk_file_count()?)
    }

    pub fn check_permissions(&self) -> bool {
        self.permissions.has_permission()
    }

    pub fn is_available(&self) -> bool {
        self.devices.is_available()
    }

    pub fn state(&self) -> RecorderState {
        self.status.state()
    }

    /// True for an active session, paused or not
    pub fn is_recording(&self) -> bool {
        self.status.state().is_recording()
    }

    pub fn is_paused(&self) -> bool {
        self.status.state() == RecorderState::Paused
    }

    pub fn is_preview_active(&self) -> bool {
        self.status.preview_active()
    }

    pub fn get_audio_level(&self) -> f32 {
        self.status.meter().level()
    }

    /// Sequence number of the chunk being captured (or next to be)
    pub fn get_current_chunk_index(&self) -> u32 {
        self.status.sequence()
    }

    pub fn get_chunk_duration(&self) -> f64 {
        self.status.chunk_seconds()
    }

    pub fn get_recording_state(&self) -> RecordingStateSnapshot {
        RecordingStateSnapshot {
            is_recording: self.is_recording(),
            is_paused: self.is_paused(),
            is_available: self.is_available(),
            has_permission: self.check_permissions(),
            is_preview_active: self.is_preview_active(),
            current_chunk_index: self.get_current_chunk_index(),
            chunk_duration: self.get_chunk_duration(),
            audio_level: self.get_audio_level(),
        }
    }

    pub fn module_info(&self) -> ModuleInfo {
        ModuleInfo {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            platform: std::env::consts::OS.to_string(),
            has_audio_level_monitoring: true,
            has_chunk_support: true,
            sample_rate: self.default_sample_rate,
            audio_format: "pcm16-wav".to_string(),
            channel_config: "mono".to_string(),
        }
    }

    pub fn storage_directory(&self) -> &std::path::Path {
        self.writer.directory()
    }
}
