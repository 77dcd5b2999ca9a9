use crate::error::DeviceError;

/// Fixed capture format: mono, 16-bit signed little-endian PCM.
pub const CHANNELS: u16 = 1;
pub const BITS_PER_SAMPLE: u16 = 16;
pub const BYTES_PER_SAMPLE: usize = 2;

/// An opened hardware input handle (pull model).
///
/// The handle is moved onto the capture thread and read in fixed-size
/// blocks until the loop shuts down; dropping it releases the device.
pub trait InputDevice: Send {
    /// Sample rate the device actually delivers
    fn sample_rate(&self) -> u32;

    /// Smallest block the device supports reading in one call
    fn min_block_samples(&self) -> usize;

    /// Fill `buf` with up to `buf.len()` samples.
    ///
    /// Blocks until samples arrive or a short poll interval elapses; returns
    /// `Ok(0)` when nothing was ready. `DeviceError::Unavailable` means the
    /// device is gone for good.
    fn read(&mut self, buf: &mut [i16]) -> Result<usize, DeviceError>;

    /// Device name for logging
    fn name(&self) -> &str;
}

/// Opens input handles configured for mono 16-bit capture.
pub trait DeviceFactory: Send + Sync {
    fn open(&self, sample_rate: u32) -> Result<Box<dyn InputDevice>, DeviceError>;

    /// Whether this build can capture at all
    fn is_available(&self) -> bool {
        true
    }
}

/// Factory for builds without hardware capture support.
pub struct UnavailableDeviceFactory;

impl DeviceFactory for UnavailableDeviceFactory {
    fn open(&self, _sample_rate: u32) -> Result<Box<dyn InputDevice>, DeviceError> {
        Err(DeviceError::Unavailable(
            "built without the `microphone` feature".to_string(),
        ))
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// Where audio comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioSource {
    /// Default microphone (requires the `microphone` feature)
    Microphone,
    /// Generated test tone, paced in real time
    Synthetic,
}

/// Audio device factory selection
pub fn device_factory(source: AudioSource) -> Box<dyn DeviceFactory> {
    match source {
        AudioSource::Synthetic => Box::new(super::synthetic::ToneDeviceFactory::default()),
        AudioSource::Microphone => {
            #[cfg(feature = "microphone")]
            {
                Box::new(super::microphone::MicrophoneDeviceFactory::default())
            }

            #[cfg(not(feature = "microphone"))]
            {
                Box::new(UnavailableDeviceFactory)
            }
        }
    }
}
