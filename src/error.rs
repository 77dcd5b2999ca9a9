use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::recorder::RecorderState;

/// Rejections returned to the host for a recorder command.
///
/// Every variant maps to a stable code via [`RecorderError::code`] so the
/// bridge can forward it unchanged.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("Recording is already in progress")]
    AlreadyRecording,

    #[error("No recording in progress")]
    NotRecording,

    #[error("Operation not valid while {0}")]
    InvalidState(RecorderState),

    #[error("Audio recording permission not granted")]
    PermissionDenied,

    #[error("Failed to start recording: {0}")]
    StartFailed(String),

    #[error("Failed to stop recording: {0}")]
    StopFailed(String),

    #[error("Failed to pause recording: {0}")]
    PauseFailed(String),

    #[error("Failed to resume recording: {0}")]
    ResumeFailed(String),

    #[error("Failed to start audio level preview: {0}")]
    PreviewFailed(String),

    #[error(transparent)]
    File(#[from] ChunkFileError),

    #[error("Recorder has shut down")]
    Closed,
}

impl RecorderError {
    pub fn code(&self) -> &'static str {
        match self {
            RecorderError::AlreadyRecording => "already_recording",
            RecorderError::NotRecording => "not_recording",
            RecorderError::InvalidState(_) => "invalid_state",
            RecorderError::PermissionDenied => "permission_denied",
            RecorderError::StartFailed(_) => "start_failed",
            RecorderError::StopFailed(_) => "stop_failed",
            RecorderError::PauseFailed(_) => "pause_failed",
            RecorderError::ResumeFailed(_) => "resume_failed",
            RecorderError::PreviewFailed(_) => "preview_start_failed",
            RecorderError::File(_) => FILE_ERROR_CODE,
            RecorderError::Closed => "recorder_closed",
        }
    }

    /// Caller misuse that can be retried with correct sequencing.
    pub fn is_state_error(&self) -> bool {
        matches!(
            self,
            RecorderError::AlreadyRecording
                | RecorderError::NotRecording
                | RecorderError::InvalidState(_)
        )
    }
}

pub const FILE_ERROR_CODE: &str = "FILE_ERROR";

/// Failures finalizing, validating or scanning chunk files.
#[derive(Debug, Error)]
pub enum ChunkFileError {
    #[error("Failed to write chunk file {path:?}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to encode WAV chunk {path:?}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("Chunk file {path:?} is empty")]
    EmptyOutput { path: PathBuf },

    #[error("Chunk file {path:?} was never created")]
    FileNotCreated { path: PathBuf },

    #[error("Failed to scan chunk directory {path:?}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Hardware input failures.
#[derive(Debug, Clone, Error)]
pub enum DeviceError {
    #[error("Audio input device unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to open audio input: {0}")]
    Open(String),

    #[error("Audio input read failed: {0}")]
    Read(String),
}
