pub mod audio;
pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod permission;
pub mod recorder;

pub use audio::{
    AudioLevelMeter, AudioSource, ChunkFile, ChunkFileWriter, ChunkRecord, DeviceFactory,
    InputDevice, ToneDeviceFactory,
};
pub use config::Config;
pub use error::{ChunkFileError, DeviceError, RecorderError};
pub use events::{EventSink, NullSink, RecorderEvent};
pub use http::{create_router, AppState};
pub use permission::{PermissionProvider, StaticPermission};
pub use recorder::{
    AudioChunkRecorder, InterruptionSignal, RecorderBuilder, RecorderState,
    RecordingStateSnapshot, StartOptions,
};
