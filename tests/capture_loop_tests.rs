// Integration tests for the capture thread
//
// These run in real time: the scripted input paces itself like hardware,
// so rotation happens while samples are still flowing.

mod common;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use audio_chunk_recorder::audio::{ChunkBuffer, ChunkFile, WAV_HEADER_LEN};
use audio_chunk_recorder::config::{CaptureConfig, LevelConfig};
use audio_chunk_recorder::events::RecorderEvent;
use audio_chunk_recorder::recorder::{lock_buffer, CaptureContext, CaptureFlags, CaptureLoop};
use audio_chunk_recorder::{AudioLevelMeter, DeviceFactory, StartOptions};
use common::{drain_events, harness_with, next_event, Script, ScriptedFactory};
use tokio::sync::mpsc;
use tokio::time::sleep;

async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..500 {
        if done() {
            return;
        }
        sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached within 10s");
}

#[tokio::test]
async fn test_no_samples_lost_across_rotation() -> Result<()> {
    // 2.005s of audio at 16kHz, 10ms per 160-sample block
    let total = 16000 * 2 + 80;
    let script = Script::finite(total, 1200, Duration::from_millis(10));
    let mut h = harness_with(script.clone(), |_| {});

    h.recorder
        .start_recording(StartOptions::default().with_chunk_seconds(1.0))
        .await?;

    wait_until(|| script.is_exhausted()).await;
    // Let the last block land in the buffer
    sleep(Duration::from_millis(100)).await;
    h.recorder.stop_recording().await?;

    let chunks: Vec<_> = drain_events(&mut h.events)
        .into_iter()
        .filter_map(|event| match event {
            RecorderEvent::ChunkReady(chunk) => Some(chunk),
            _ => None,
        })
        .collect();

    assert!(chunks.len() >= 2, "expected a rotation, got {} chunks", chunks.len());

    let sequences: Vec<u32> = chunks.iter().map(|c| c.sequence_number).collect();
    let expected: Vec<u32> = (1..=chunks.len() as u32).collect();
    assert_eq!(sequences, expected);
    assert!(chunks.last().unwrap().is_final_chunk);
    assert!(chunks[..chunks.len() - 1].iter().all(|c| !c.is_final_chunk));

    let mut samples_on_disk = 0u64;
    for chunk in &chunks {
        let file = ChunkFile::open(&chunk.file_path)?;
        assert_eq!(file.sample_rate, 16000);
        assert_eq!(file.channels, 1);
        assert_eq!(chunk.size_bytes, (WAV_HEADER_LEN + file.data_len()) as u64);
        assert!(file.samples.iter().all(|&s| s == 1200));
        samples_on_disk += file.samples.len() as u64;
    }

    assert_eq!(samples_on_disk, script.delivered());
    assert_eq!(samples_on_disk, total);

    Ok(())
}

#[tokio::test]
async fn test_read_errors_are_retried_and_reported_once() -> Result<()> {
    let script = Script::endless(800);
    script.failing_reads.store(5, Ordering::SeqCst);

    let mut h = harness_with(script.clone(), |config| {
        config.capture.max_consecutive_read_errors = 3;
    });

    h.recorder
        .start_recording(StartOptions::default().with_chunk_seconds(30.0))
        .await?;

    // The capture thread reports independently of the command queue
    loop {
        match next_event(&mut h.events).await {
            RecorderEvent::Error(e) => {
                assert_eq!(e.code.as_deref(), Some("device_error"));
                break;
            }
            RecorderEvent::StateChange(_) => continue,
            other => panic!("expected onError, got {:?}", other),
        }
    }

    // Capture keeps going once reads succeed
    wait_until(|| script.delivered() > 1600).await;
    assert!(h.recorder.is_recording());

    h.recorder.stop_recording().await?;
    let events = drain_events(&mut h.events);
    assert!(!events.iter().any(|e| matches!(e, RecorderEvent::Error(_))));

    let last = events
        .iter()
        .find_map(|event| match event {
            RecorderEvent::ChunkReady(chunk) => Some(chunk.clone()),
            _ => None,
        })
        .expect("final chunk");
    assert!(last.size_bytes > WAV_HEADER_LEN as u64);

    Ok(())
}

#[tokio::test]
async fn test_pause_fails_after_device_is_lost() -> Result<()> {
    let script = Script::endless(800);
    let mut h = harness_with(script.clone(), |_| {});

    h.recorder
        .start_recording(StartOptions::default().with_chunk_seconds(30.0))
        .await?;
    wait_until(|| script.delivered() >= 1600).await;

    script.disconnected.store(true, Ordering::SeqCst);
    loop {
        match next_event(&mut h.events).await {
            RecorderEvent::Error(e) => {
                assert_eq!(e.code.as_deref(), Some("device_error"));
                break;
            }
            RecorderEvent::StateChange(_) => continue,
            other => panic!("expected onError, got {:?}", other),
        }
    }
    // Give the capture thread time to exit after reporting
    sleep(Duration::from_millis(100)).await;

    let err = h.recorder.pause_recording().await.unwrap_err();
    assert_eq!(err.code(), "pause_failed");
    assert!(!h.recorder.is_recording());

    // The session was torn down with what had been captured
    let events = drain_events(&mut h.events);
    let last = events
        .iter()
        .find_map(|event| match event {
            RecorderEvent::ChunkReady(chunk) => Some(chunk.clone()),
            _ => None,
        })
        .expect("final chunk");
    assert!(last.is_final_chunk);
    assert!(last.size_bytes > WAV_HEADER_LEN as u64);
    assert_eq!(events.last(), Some(&RecorderEvent::state_change(false, false)));

    Ok(())
}

#[tokio::test]
async fn test_paused_capture_discards_blocks() -> Result<()> {
    let script = Script::endless(5000);
    let factory = ScriptedFactory::new(script.clone());
    let device = factory.open(16000)?;

    let buffer = Arc::new(Mutex::new(Some(ChunkBuffer::new(1, tokio::time::Instant::now()))));
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let context = CaptureContext {
        buffer: buffer.clone(),
        meter: Arc::new(AudioLevelMeter::new(&LevelConfig::default())),
        events: Arc::new(events_tx),
        config: CaptureConfig {
            block_samples: 160,
            poll_interval_ms: 5,
            max_consecutive_read_errors: 50,
        },
    };

    let flags = Arc::new(CaptureFlags::recording());
    flags.set_paused(true);
    let capture = CaptureLoop::spawn(device, flags.clone(), context)?;

    wait_until(|| script.delivered() >= 1600).await;
    assert!(lock_buffer(&buffer).as_ref().unwrap().samples().is_empty());

    flags.set_paused(false);
    wait_until(|| !lock_buffer(&buffer).as_ref().unwrap().samples().is_empty()).await;

    let stats = capture.shutdown()?;
    let buffered = lock_buffer(&buffer).as_ref().unwrap().samples().len() as u64;
    assert_eq!(stats.samples_buffered, buffered);
    assert!(stats.samples_read > stats.samples_buffered);

    // A non-silent block moved the meter off zero
    let mut saw_level = false;
    while let Ok(event) = events.try_recv() {
        if let RecorderEvent::AudioLevel(level) = event {
            assert!(level.has_audio);
            saw_level = true;
        }
    }
    assert!(saw_level);

    Ok(())
}
