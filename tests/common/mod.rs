// Shared test doubles for recorder integration tests
//
// ScriptedInput behaves like hardware (each read takes real time) but
// delivers a known number of samples, counts what it hands out, and can be
// told to fail reads.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use audio_chunk_recorder::events::RecorderEvent;
use audio_chunk_recorder::{
    AudioChunkRecorder, Config, DeviceError, DeviceFactory, InputDevice, StaticPermission,
};
use tempfile::TempDir;
use tokio::sync::mpsc;

/// Knobs and counters shared between a factory and the inputs it opens
#[derive(Debug)]
pub struct Script {
    /// Total samples to deliver; `None` for an endless stream
    pub total_samples: Option<u64>,
    pub value: i16,
    pub block_delay: Duration,
    /// Reads that fail before data flows again
    pub failing_reads: AtomicUsize,
    pub fail_open: AtomicBool,
    /// Reads report the device as gone
    pub disconnected: AtomicBool,
    pub delivered: AtomicU64,
    pub opened: AtomicUsize,
}

impl Script {
    pub fn endless(value: i16) -> Arc<Self> {
        Arc::new(Self {
            total_samples: None,
            value,
            block_delay: Duration::from_millis(5),
            failing_reads: AtomicUsize::new(0),
            fail_open: AtomicBool::new(false),
            disconnected: AtomicBool::new(false),
            delivered: AtomicU64::new(0),
            opened: AtomicUsize::new(0),
        })
    }

    pub fn finite(total_samples: u64, value: i16, block_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            total_samples: Some(total_samples),
            value,
            block_delay,
            failing_reads: AtomicUsize::new(0),
            fail_open: AtomicBool::new(false),
            disconnected: AtomicBool::new(false),
            delivered: AtomicU64::new(0),
            opened: AtomicUsize::new(0),
        })
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn is_exhausted(&self) -> bool {
        self.total_samples
            .map(|total| self.delivered() >= total)
            .unwrap_or(false)
    }
}

pub struct ScriptedInput {
    sample_rate: u32,
    block_samples: usize,
    script: Arc<Script>,
}

impl InputDevice for ScriptedInput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn min_block_samples(&self) -> usize {
        self.block_samples
    }

    fn read(&mut self, buf: &mut [i16]) -> Result<usize, DeviceError> {
        thread::sleep(self.script.block_delay);

        if self.script.disconnected.load(Ordering::SeqCst) {
            return Err(DeviceError::Unavailable("scripted disconnect".to_string()));
        }

        if self
            .script
            .failing_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(DeviceError::Read("scripted failure".to_string()));
        }

        let delivered = self.script.delivered();
        let n = match self.script.total_samples {
            Some(total) => (total.saturating_sub(delivered) as usize).min(buf.len()),
            None => buf.len(),
        };

        buf[..n].fill(self.script.value);
        self.script.delivered.fetch_add(n as u64, Ordering::SeqCst);
        Ok(n)
    }

    fn name(&self) -> &str {
        "scripted input"
    }
}

pub struct ScriptedFactory {
    pub script: Arc<Script>,
    pub block_samples: usize,
}

impl ScriptedFactory {
    pub fn new(script: Arc<Script>) -> Arc<Self> {
        Arc::new(Self {
            script,
            block_samples: 160,
        })
    }
}

impl DeviceFactory for ScriptedFactory {
    fn open(&self, sample_rate: u32) -> Result<Box<dyn InputDevice>, DeviceError> {
        if self.script.fail_open.load(Ordering::SeqCst) {
            return Err(DeviceError::Open("scripted open failure".to_string()));
        }
        self.script.opened.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(ScriptedInput {
            sample_rate,
            block_samples: self.block_samples,
            script: self.script.clone(),
        }))
    }
}

/// A running recorder wired to test doubles
pub struct Harness {
    pub recorder: AudioChunkRecorder,
    pub events: mpsc::UnboundedReceiver<RecorderEvent>,
    pub script: Arc<Script>,
    pub permission: Arc<StaticPermission>,
    pub dir: TempDir,
}

pub fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.storage.directory = dir.path().to_string_lossy().to_string();
    config.capture.block_samples = 160;
    config.capture.poll_interval_ms = 5;
    config
}

/// Spawn a recorder over `script`; must run inside a tokio runtime.
pub fn harness_with(script: Arc<Script>, configure: impl FnOnce(&mut Config)) -> Harness {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    configure(&mut config);

    let (events_tx, events) = mpsc::unbounded_channel();
    let permission = Arc::new(StaticPermission::granted());

    let recorder = AudioChunkRecorder::builder(config)
        .device_factory(ScriptedFactory::new(script.clone()))
        .permissions(permission.clone())
        .event_sink(Arc::new(events_tx))
        .spawn()
        .unwrap();

    Harness {
        recorder,
        events,
        script,
        permission,
        dir,
    }
}

/// Silent endless input with default config
pub fn harness() -> Harness {
    harness_with(Script::endless(0), |_| {})
}

/// Next event other than level updates
pub async fn next_event(events: &mut mpsc::UnboundedReceiver<RecorderEvent>) -> RecorderEvent {
    loop {
        match events.recv().await {
            Some(RecorderEvent::AudioLevel(_)) => continue,
            Some(event) => return event,
            None => panic!("event channel closed"),
        }
    }
}

/// Non-level events already delivered
pub fn drain_events(events: &mut mpsc::UnboundedReceiver<RecorderEvent>) -> Vec<RecorderEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        if !matches!(event, RecorderEvent::AudioLevel(_)) {
            drained.push(event);
        }
    }
    drained
}
