// Microphone input through cpal.
//
// cpal streams are not `Send` on every platform, so the stream is built and
// kept alive on its own thread. Sample blocks cross to the capture loop
// through a bounded channel; the capture loop never touches the stream.

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use tracing::{error, info, warn};

use super::backend::{DeviceFactory, InputDevice};
use crate::error::DeviceError;

/// Opens the default input device
#[derive(Debug, Clone)]
pub struct MicrophoneDeviceFactory {
    /// Blocks buffered between the stream callback and the capture loop
    pub queue_blocks: usize,
    pub poll_interval: Duration,
}

impl Default for MicrophoneDeviceFactory {
    fn default() -> Self {
        Self {
            queue_blocks: 64,
            poll_interval: Duration::from_millis(20),
        }
    }
}

impl DeviceFactory for MicrophoneDeviceFactory {
    fn open(&self, sample_rate: u32) -> Result<Box<dyn InputDevice>, DeviceError> {
        let (sample_tx, sample_rx) = mpsc::sync_channel::<Vec<i16>>(self.queue_blocks);
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(String, u32), DeviceError>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let worker = thread::Builder::new()
            .name("cpal-input".to_string())
            .spawn(move || match build_stream(sample_rate, sample_tx) {
                Ok((stream, name, actual_rate)) => {
                    let _ = ready_tx.send(Ok((name, actual_rate)));
                    // Keep the stream alive until the input handle is dropped
                    let _ = stop_rx.recv();
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| DeviceError::Open(e.to_string()))?;

        let (name, actual_rate) = ready_rx
            .recv()
            .map_err(|_| DeviceError::Open("input thread exited during setup".to_string()))??;

        info!("Microphone opened: {} ({}Hz mono)", name, actual_rate);

        Ok(Box::new(MicrophoneInput {
            name,
            sample_rate: actual_rate,
            samples: sample_rx,
            pending: VecDeque::new(),
            poll_interval: self.poll_interval,
            stop: Some(stop_tx),
            worker: Some(worker),
        }))
    }
}

fn build_stream(
    sample_rate: u32,
    tx: SyncSender<Vec<i16>>,
) -> Result<(Stream, String, u32), DeviceError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| DeviceError::Unavailable("No audio input device found".to_string()))?;
    let name = device.name().unwrap_or_else(|_| "Unknown input".to_string());

    let supported = device
        .default_input_config()
        .map_err(|e| DeviceError::Open(e.to_string()))?;
    let format = supported.sample_format();

    let mono = StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    // Prefer the requested mono format; fall back to the device default and downmix
    let (stream, actual_rate) = match build_typed_stream(&device, &mono, format, tx.clone()) {
        Ok(stream) => (stream, sample_rate),
        Err(e) => {
            warn!("Mono {}Hz input rejected ({}), using device default config", sample_rate, e);
            let fallback: StreamConfig = supported.config();
            let rate = fallback.sample_rate.0;
            (build_typed_stream(&device, &fallback, format, tx)?, rate)
        }
    };

    stream.play().map_err(|e| DeviceError::Open(e.to_string()))?;

    Ok((stream, name, actual_rate))
}

fn build_typed_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    format: SampleFormat,
    tx: SyncSender<Vec<i16>>,
) -> Result<Stream, DeviceError> {
    match format {
        SampleFormat::I16 => build_stream_for::<i16>(device, config, tx),
        SampleFormat::U16 => build_stream_for::<u16>(device, config, tx),
        SampleFormat::F32 => build_stream_for::<f32>(device, config, tx),
        other => Err(DeviceError::Open(format!("Unsupported sample format {:?}", other))),
    }
}

fn build_stream_for<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    tx: SyncSender<Vec<i16>>,
) -> Result<Stream, DeviceError>
where
    T: SizedSample + Send + 'static,
    i16: FromSample<T>,
{
    let channels = config.channels.max(1) as usize;

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let mono: Vec<i16> = data
                    .chunks(channels)
                    .map(|frame| {
                        let sum: i32 = frame
                            .iter()
                            .map(|&s| <i16 as FromSample<T>>::from_sample_(s) as i32)
                            .sum();
                        (sum / frame.len() as i32) as i16
                    })
                    .collect();
                // A full queue means the capture loop stalled; drop rather than block the callback
                let _ = tx.try_send(mono);
            },
            |err| error!("Audio input stream error: {}", err),
            None,
        )
        .map_err(|e| DeviceError::Open(e.to_string()))
}

/// Handle to an open microphone stream
pub struct MicrophoneInput {
    name: String,
    sample_rate: u32,
    samples: Receiver<Vec<i16>>,
    pending: VecDeque<i16>,
    poll_interval: Duration,
    stop: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl InputDevice for MicrophoneInput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn min_block_samples(&self) -> usize {
        // 10ms at the device rate
        (self.sample_rate / 100).max(1) as usize
    }

    fn read(&mut self, buf: &mut [i16]) -> Result<usize, DeviceError> {
        if self.pending.is_empty() {
            match self.samples.recv_timeout(self.poll_interval) {
                Ok(block) => self.pending.extend(block),
                Err(RecvTimeoutError::Timeout) => return Ok(0),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(DeviceError::Unavailable("input stream closed".to_string()))
                }
            }
        }

        while self.pending.len() < buf.len() {
            match self.samples.try_recv() {
                Ok(block) => self.pending.extend(block),
                Err(_) => break,
            }
        }

        let n = buf.len().min(self.pending.len());
        for (dst, src) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *dst = src;
        }

        Ok(n)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for MicrophoneInput {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Microphone input thread panicked");
            }
        }
        info!("Microphone released: {}", self.name);
    }
}
