// Synthetic input device producing a sine tone in real time.
//
// Used when no microphone is available (CLI `--synthetic`) and by tests
// that need a device which behaves like hardware: reads block for the
// duration of the samples they return.

use std::f32::consts::TAU;
use std::thread;
use std::time::Duration;

use tracing::info;

use super::backend::{DeviceFactory, InputDevice};
use crate::error::DeviceError;

/// Sine tone source
pub struct ToneInput {
    sample_rate: u32,
    frequency: f32,
    amplitude: f32,
    phase: f32,
}

impl ToneInput {
    pub fn new(sample_rate: u32, frequency: f32, amplitude: f32) -> Self {
        Self {
            sample_rate,
            frequency,
            amplitude: amplitude.clamp(0.0, 1.0),
            phase: 0.0,
        }
    }
}

impl InputDevice for ToneInput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn min_block_samples(&self) -> usize {
        256
    }

    fn read(&mut self, buf: &mut [i16]) -> Result<usize, DeviceError> {
        if buf.is_empty() {
            return Ok(0);
        }

        let step = TAU * self.frequency / self.sample_rate as f32;
        for sample in buf.iter_mut() {
            *sample = (self.phase.sin() * self.amplitude * i16::MAX as f32) as i16;
            self.phase = (self.phase + step) % TAU;
        }

        // Pace like hardware: a block takes as long to arrive as it lasts
        let secs = buf.len() as f64 / self.sample_rate as f64;
        thread::sleep(Duration::from_secs_f64(secs));

        Ok(buf.len())
    }

    fn name(&self) -> &str {
        "synthetic tone"
    }
}

/// Factory for [`ToneInput`] devices
#[derive(Debug, Clone)]
pub struct ToneDeviceFactory {
    pub frequency: f32,
    pub amplitude: f32,
}

impl Default for ToneDeviceFactory {
    fn default() -> Self {
        Self {
            frequency: 440.0,
            amplitude: 0.3,
        }
    }
}

impl DeviceFactory for ToneDeviceFactory {
    fn open(&self, sample_rate: u32) -> Result<Box<dyn InputDevice>, DeviceError> {
        if sample_rate == 0 {
            return Err(DeviceError::Open("sample rate must be positive".to_string()));
        }

        info!(
            "Synthetic input opened ({}Hz, {:.0}Hz tone)",
            sample_rate, self.frequency
        );

        Ok(Box::new(ToneInput::new(sample_rate, self.frequency, self.amplitude)))
    }
}
