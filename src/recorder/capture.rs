use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, warn};

use crate::audio::{AudioLevelMeter, ChunkBuffer, InputDevice};
use crate::config::CaptureConfig;
use crate::error::DeviceError;
use crate::events::{EventSink, RecorderEvent};

/// Buffer for the chunk being captured, shared with the capture thread
pub type SharedBuffer = Arc<Mutex<Option<ChunkBuffer>>>;

/// Lock the shared buffer, recovering it if a holder panicked.
pub fn lock_buffer(buffer: &SharedBuffer) -> MutexGuard<'_, Option<ChunkBuffer>> {
    buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// What the capture thread is feeding; it runs while either is set.
#[derive(Debug, Default)]
pub struct CaptureFlags {
    recording: AtomicBool,
    preview: AtomicBool,
    paused: AtomicBool,
}

impl CaptureFlags {
    pub fn recording() -> Self {
        let flags = Self::default();
        flags.set_recording(true);
        flags
    }

    pub fn preview() -> Self {
        let flags = Self::default();
        flags.set_preview(true);
        flags
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    pub fn set_recording(&self, on: bool) {
        self.recording.store(on, Ordering::Release);
    }

    pub fn is_preview(&self) -> bool {
        self.preview.load(Ordering::Acquire)
    }

    pub fn set_preview(&self, on: bool) {
        self.preview.store(on, Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn set_paused(&self, on: bool) {
        self.paused.store(on, Ordering::Release);
    }

    pub fn is_active(&self) -> bool {
        self.is_recording() || self.is_preview()
    }
}

/// Counters reported when the capture thread exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Samples the device delivered
    pub samples_read: u64,
    /// Samples appended to chunk buffers
    pub samples_buffered: u64,
    pub read_errors: u64,
}

/// Everything the capture thread needs besides the device
#[derive(Clone)]
pub struct CaptureContext {
    pub buffer: SharedBuffer,
    pub meter: Arc<AudioLevelMeter>,
    pub events: Arc<dyn EventSink>,
    pub config: CaptureConfig,
}

/// Dedicated thread pulling blocks from an [`InputDevice`].
///
/// Each block is appended to the shared chunk buffer (when recording and
/// not paused) and then handed to the level meter. The thread owns the
/// device and drops it, releasing the hardware, when it exits. A read
/// reporting the device as unavailable ends the thread.
pub struct CaptureLoop {
    flags: Arc<CaptureFlags>,
    sample_rate: u32,
    device_name: String,
    handle: Option<JoinHandle<CaptureStats>>,
}

impl CaptureLoop {
    pub fn spawn(
        device: Box<dyn InputDevice>,
        flags: Arc<CaptureFlags>,
        context: CaptureContext,
    ) -> Result<Self, DeviceError> {
        let sample_rate = device.sample_rate();
        let device_name = device.name().to_string();
        let thread_flags = flags.clone();

        let handle = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || run(device, thread_flags, context))
            .map_err(|e| DeviceError::Open(e.to_string()))?;

        Ok(Self {
            flags,
            sample_rate,
            device_name,
            handle: Some(handle),
        })
    }

    pub fn flags(&self) -> &Arc<CaptureFlags> {
        &self.flags
    }

    /// Rate the device actually delivers
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// True when the thread has exited (normally or not)
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map(|h| h.is_finished()).unwrap_or(true)
    }

    /// Stop the thread and wait for it; no block is appended afterwards.
    pub fn shutdown(mut self) -> Result<CaptureStats, DeviceError> {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> Result<CaptureStats, DeviceError> {
        self.flags.set_recording(false);
        self.flags.set_preview(false);

        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| DeviceError::Read("capture thread panicked".to_string())),
            None => Ok(CaptureStats::default()),
        }
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        if self.handle.is_some() {
            if let Err(e) = self.stop_and_join() {
                error!("Capture loop ended abnormally: {}", e);
            }
        }
    }
}

fn run(mut device: Box<dyn InputDevice>, flags: Arc<CaptureFlags>, context: CaptureContext) -> CaptureStats {
    let block_len = context
        .config
        .block_samples
        .max(device.min_block_samples())
        .max(1);
    let poll_interval = context.config.poll_interval();
    let max_errors = context.config.max_consecutive_read_errors.max(1);

    let mut block = vec![0i16; block_len];
    let mut stats = CaptureStats::default();
    let mut consecutive_errors = 0u32;

    info!(
        "Capture started on {} ({}Hz, {} samples per block)",
        device.name(),
        device.sample_rate(),
        block_len
    );

    while flags.is_active() {
        let read = panic::catch_unwind(AssertUnwindSafe(|| device.read(&mut block)))
            .unwrap_or_else(|_| Err(DeviceError::Read("device read panicked".to_string())));

        match read {
            Ok(0) => thread::sleep(poll_interval),
            Ok(n) => {
                consecutive_errors = 0;
                let samples = &block[..n];
                stats.samples_read += n as u64;

                let paused = flags.is_paused();
                if flags.is_recording() && !paused {
                    if let Some(chunk) = lock_buffer(&context.buffer).as_mut() {
                        chunk.append(samples);
                        stats.samples_buffered += n as u64;
                    }
                }

                if !paused || flags.is_preview() {
                    if let Some(reading) = context.meter.observe(samples) {
                        context.events.emit(RecorderEvent::AudioLevel(reading));
                    }
                }
            }
            Err(DeviceError::Unavailable(reason)) => {
                error!("Audio input lost: {}", reason);
                context.events.emit(RecorderEvent::error(
                    format!("Audio input lost: {}", reason),
                    Some("device_error"),
                ));
                break;
            }
            Err(e) => {
                consecutive_errors += 1;
                stats.read_errors += 1;
                warn!("Audio read failed ({} in a row): {}", consecutive_errors, e);

                if consecutive_errors >= max_errors {
                    error!("Audio input keeps failing after {} reads", consecutive_errors);
                    context.events.emit(RecorderEvent::error(
                        format!("Audio input keeps failing: {}", e),
                        Some("device_error"),
                    ));
                    consecutive_errors = 0;
                }

                thread::sleep(poll_interval);
            }
        }
    }

    debug!(
        "Capture stopped: {} samples read, {} buffered, {} read errors",
        stats.samples_read, stats.samples_buffered, stats.read_errors
    );
    info!("Released audio input {}", device.name());

    stats
}
