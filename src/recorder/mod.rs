//! Chunked recording: session state machine, capture thread, rotation timers.

mod capture;
mod clock;
mod device;
mod handle;
mod interruption;
mod machine;
mod options;
mod scheduler;
mod state;

pub use capture::{lock_buffer, CaptureContext, CaptureFlags, CaptureLoop, CaptureStats, SharedBuffer};
pub use clock::SegmentClock;
pub use device::{Acquisition, DeviceSession, DeviceUse};
pub use handle::{AudioChunkRecorder, RecorderBuilder};
pub use interruption::{
    AudioFocusChange, InterruptionSignal, InterruptionTracker, DEVICE_DISCONNECTED_REASON,
    FOCUS_LOSS_REASON,
};
pub use options::StartOptions;
pub use scheduler::{RotationScheduler, TimerKind, TimerTick};
pub use state::{ModuleInfo, RecorderState, RecordingStateSnapshot};
