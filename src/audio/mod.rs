pub mod backend;
pub mod chunk;
pub mod file;
pub mod level;
pub mod synthetic;

#[cfg(feature = "microphone")]
pub mod microphone;

pub use backend::{
    device_factory, AudioSource, DeviceFactory, InputDevice, UnavailableDeviceFactory,
};
pub use chunk::{
    is_chunk_file_name, parse_chunk_file_name, ChunkBuffer, ChunkFileWriter, ChunkFormat,
    ChunkRecord, WAV_HEADER_LEN,
};
pub use file::ChunkFile;
pub use level::AudioLevelMeter;
pub use synthetic::{ToneDeviceFactory, ToneInput};
