//! The recorder's serialized command queue.
//!
//! A single tokio task owns every piece of session state. Host calls arrive
//! as [`Command`]s with a oneshot reply, timer firings arrive as
//! [`TimerTick`]s, and both are handled one at a time, so rotation,
//! max-duration, pause and stop can never interleave. The capture thread
//! only reads the [`CaptureFlags`] and appends to the shared buffer.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::capture::{lock_buffer, CaptureContext, CaptureFlags, CaptureLoop, SharedBuffer};
use super::clock::SegmentClock;
use super::device::{Acquisition, DeviceSession, DeviceUse};
use super::interruption::{
    InterruptionSignal, InterruptionTracker, DEVICE_DISCONNECTED_REASON, FOCUS_LOSS_REASON,
};
use super::options::{SessionParams, StartOptions};
use super::scheduler::{RotationScheduler, TimerKind, TimerTick};
use super::state::{RecorderState, RecorderStatus};
use crate::audio::{ChunkBuffer, ChunkFileWriter, ChunkRecord, DeviceFactory};
use crate::config::Config;
use crate::error::{DeviceError, RecorderError, FILE_ERROR_CODE};
use crate::events::{EventSink, InterruptionEvent, InterruptionKind, MaxDurationReached, RecorderEvent};
use crate::permission::PermissionProvider;

pub(crate) type Reply<T> = oneshot::Sender<Result<T, RecorderError>>;

pub(crate) enum Command {
    Start { options: StartOptions, reply: Reply<()> },
    Stop { reply: Reply<()> },
    Pause { reply: Reply<()> },
    Resume { reply: Reply<()> },
    StartPreview { reply: Reply<()> },
    StopPreview { reply: Reply<()> },
    Interruption { signal: InterruptionSignal, reply: Reply<()> },
    ClearChunks { reply: Reply<usize> },
}

/// Why a session is ending
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Stopped,
    MaxDuration,
    /// Capture died underneath the session
    Failed,
}

struct ActiveSession {
    id: Uuid,
    state: RecorderState,
    params: SessionParams,
    /// Rate the device actually delivers
    sample_rate: u32,
    /// Sequence of the chunk currently being captured
    sequence: u32,
    chunk_clock: SegmentClock,
    session_clock: SegmentClock,
    chunks: Vec<ChunkRecord>,
}

pub(crate) struct Machine {
    config: Config,
    writer: ChunkFileWriter,
    devices: Arc<dyn DeviceFactory>,
    permissions: Arc<dyn PermissionProvider>,
    events: Arc<dyn EventSink>,
    status: Arc<RecorderStatus>,
    buffer: SharedBuffer,
    device_session: DeviceSession,
    capture: Option<CaptureLoop>,
    session: Option<ActiveSession>,
    rotation: RotationScheduler,
    max_duration: RotationScheduler,
    interruptions: InterruptionTracker,
}

impl Machine {
    pub(crate) fn new(
        config: Config,
        writer: ChunkFileWriter,
        devices: Arc<dyn DeviceFactory>,
        permissions: Arc<dyn PermissionProvider>,
        events: Arc<dyn EventSink>,
        status: Arc<RecorderStatus>,
        ticks: mpsc::UnboundedSender<TimerTick>,
    ) -> Self {
        let debounce = config.timing.interruption_debounce();

        Self {
            config,
            writer,
            devices,
            permissions,
            events,
            status,
            buffer: SharedBuffer::default(),
            device_session: DeviceSession::new(),
            capture: None,
            session: None,
            rotation: RotationScheduler::new(TimerKind::Rotation, ticks.clone()),
            max_duration: RotationScheduler::new(TimerKind::MaxDuration, ticks),
            interruptions: InterruptionTracker::new(debounce),
        }
    }

    /// Process commands and timer ticks until every handle is dropped.
    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut ticks: mpsc::UnboundedReceiver<TimerTick>,
    ) {
        debug!("Recorder command queue started");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                Some(tick) = ticks.recv() => self.on_tick(tick),
            }
        }

        self.shutdown();
        debug!("Recorder command queue stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Start { options, reply } => {
                let _ = reply.send(self.start(&options));
            }
            Command::Stop { reply } => {
                let _ = reply.send(self.stop());
            }
            Command::Pause { reply } => {
                let _ = reply.send(self.pause());
            }
            Command::Resume { reply } => {
                let _ = reply.send(self.resume());
            }
            Command::StartPreview { reply } => {
                let _ = reply.send(self.start_preview());
            }
            Command::StopPreview { reply } => {
                let _ = reply.send(self.stop_preview());
            }
            Command::Interruption { signal, reply } => {
                self.on_interruption(signal);
                let _ = reply.send(Ok(()));
            }
            Command::ClearChunks { reply } => {
                let _ = reply.send(self.clear_chunks());
            }
        }
    }

    fn session_state(&self) -> RecorderState {
        self.session
            .as_ref()
            .map(|s| s.state)
            .unwrap_or(RecorderState::Idle)
    }

    // ------------------------------------------------------------------
    // Host commands
    // ------------------------------------------------------------------

    fn start(&mut self, options: &StartOptions) -> Result<(), RecorderError> {
        if let Some(session) = &self.session {
            warn!("Start rejected: session {} is {}", session.id, session.state);
            return Err(RecorderError::AlreadyRecording);
        }
        if !self.permissions.has_permission() {
            warn!("Start rejected: audio recording permission not granted");
            return Err(RecorderError::PermissionDenied);
        }

        let params = SessionParams::resolve(options, &self.config.audio)?;

        match self.device_session.acquire(DeviceUse::Recording) {
            Ok(Acquisition::Preempted(_)) => {
                info!("Stopping level preview to start recording");
                self.status.set_preview_active(false);
            }
            Ok(_) => {}
            Err(holder) => {
                return Err(RecorderError::StartFailed(format!(
                    "input device is held for {:?}",
                    holder
                )));
            }
        }

        let now = Instant::now();
        *lock_buffer(&self.buffer) = Some(ChunkBuffer::new(1, now));

        let sample_rate = match self.attach_capture(params.sample_rate) {
            Ok(rate) => rate,
            Err(e) => {
                error!("Failed to start recording: {}", e);
                *lock_buffer(&self.buffer) = None;
                self.device_session.release(DeviceUse::Recording);
                return Err(RecorderError::StartFailed(e.to_string()));
            }
        };

        self.rotation.arm(params.chunk_interval());
        if let Some(max) = params.max_duration() {
            self.max_duration.arm(max);
        }
        self.interruptions.reset();

        let session = ActiveSession {
            id: Uuid::new_v4(),
            state: RecorderState::Recording,
            params,
            sample_rate,
            sequence: 1,
            chunk_clock: SegmentClock::started(now),
            session_clock: SegmentClock::started(now),
            chunks: Vec::new(),
        };

        info!(
            "Recording session {} started: {}Hz, {}bps, {:.1}s chunks, {}",
            session.id,
            session.sample_rate,
            session.params.bit_rate,
            session.params.chunk_seconds,
            session
                .params
                .max_duration_seconds
                .map(|max| format!("limit {:.1}s", max))
                .unwrap_or_else(|| "no limit".to_string())
        );
        if !session.params.persist {
            info!("Chunk interval below persistence threshold, running as monitoring session");
        }

        self.status.set_chunk_seconds(session.params.chunk_seconds);
        self.status.set_sequence(1);
        self.status.set_state(RecorderState::Recording);
        self.session = Some(session);

        self.events.emit(RecorderEvent::state_change(true, false));
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RecorderError> {
        if self.session.is_none() {
            warn!("Stop rejected: no recording in progress");
            return Err(RecorderError::NotRecording);
        }

        self.end_session(Instant::now(), SessionEnd::Stopped)
            .map_err(|e| RecorderError::StopFailed(e.to_string()))
    }

    fn pause(&mut self) -> Result<(), RecorderError> {
        let state = self.session_state();
        if state != RecorderState::Recording {
            warn!("Pause rejected while {}", state);
            return Err(RecorderError::InvalidState(state));
        }

        let now = Instant::now();
        if !self.capture_alive() {
            error!("Cannot pause: audio capture is no longer running");
            if let Err(e) = self.end_session(now, SessionEnd::Failed) {
                warn!("Cleanup after failed pause: {}", e);
            }
            return Err(RecorderError::PauseFailed(
                "audio input is no longer running".to_string(),
            ));
        }

        self.pause_session(now);
        self.events.emit(RecorderEvent::state_change(true, true));
        Ok(())
    }

    fn resume(&mut self) -> Result<(), RecorderError> {
        let state = self.session_state();
        if state != RecorderState::Paused {
            warn!("Resume rejected while {}", state);
            return Err(RecorderError::InvalidState(state));
        }

        let now = Instant::now();
        // An explicit resume closes any interruption episode
        self.interruptions.reset();

        if !self.capture_alive() {
            error!("Cannot resume: audio capture is no longer running");
            if let Err(e) = self.end_session(now, SessionEnd::Failed) {
                warn!("Cleanup after failed resume: {}", e);
            }
            return Err(RecorderError::ResumeFailed(
                "audio input is no longer running".to_string(),
            ));
        }

        let Some(session) = self.session.as_mut() else {
            return Err(RecorderError::InvalidState(RecorderState::Idle));
        };

        session.chunk_clock.resume(now);
        session.session_clock.resume(now);
        session.state = RecorderState::Recording;

        let chunk_remaining = session
            .chunk_clock
            .remaining(session.params.chunk_interval(), now);
        let max_remaining = session
            .params
            .max_duration()
            .map(|max| session.session_clock.remaining(max, now));

        info!(
            "Recording resumed, {:.2}s left in chunk {}",
            chunk_remaining.as_secs_f64(),
            session.sequence
        );

        if let Some(capture) = &self.capture {
            capture.flags().set_paused(false);
        }
        self.status.set_state(RecorderState::Recording);
        self.events.emit(RecorderEvent::state_change(true, false));

        if max_remaining == Some(Duration::ZERO) {
            info!("Maximum recording duration already used up");
            if let Err(e) = self.end_session(now, SessionEnd::MaxDuration) {
                warn!("Capture shutdown failed: {}", e);
            }
            return Ok(());
        }

        if chunk_remaining.is_zero() {
            // Interval ran out while paused
            self.rotate(now);
        } else {
            self.rotation.arm(chunk_remaining);
        }
        if let Some(remaining) = max_remaining {
            self.max_duration.arm(remaining);
        }

        Ok(())
    }

    fn start_preview(&mut self) -> Result<(), RecorderError> {
        if !self.permissions.has_permission() {
            warn!("Level preview rejected: audio recording permission not granted");
            return Err(RecorderError::PermissionDenied);
        }

        match self.device_session.acquire(DeviceUse::Monitoring) {
            Ok(Acquisition::AlreadyHeld) => {
                debug!("Level preview already running");
                return Ok(());
            }
            Ok(_) => {}
            Err(holder) => {
                warn!("Level preview rejected: input device held for {:?}", holder);
                return Err(RecorderError::PreviewFailed(
                    "recording is in progress".to_string(),
                ));
            }
        }

        let opened = self.devices.open(self.config.audio.sample_rate).and_then(|device| {
            CaptureLoop::spawn(device, Arc::new(CaptureFlags::preview()), self.capture_context())
        });

        match opened {
            Ok(capture) => {
                info!("Level preview started on {}", capture.device_name());
                self.capture = Some(capture);
                self.status.meter().reset();
                self.status.set_preview_active(true);
                Ok(())
            }
            Err(e) => {
                error!("Failed to start level preview: {}", e);
                self.device_session.release(DeviceUse::Monitoring);
                Err(RecorderError::PreviewFailed(e.to_string()))
            }
        }
    }

    fn stop_preview(&mut self) -> Result<(), RecorderError> {
        if self.device_session.holder() != Some(DeviceUse::Monitoring) {
            debug!("No level preview to stop");
            return Ok(());
        }

        if let Err(e) = self.stop_capture() {
            warn!("Level preview capture ended abnormally: {}", e);
        }
        self.device_session.release(DeviceUse::Monitoring);
        self.status.set_preview_active(false);

        info!("Level preview stopped");
        Ok(())
    }

    fn clear_chunks(&mut self) -> Result<usize, RecorderError> {
        let deleted = self.writer.clear_all_chunk_files()?;
        if self.session.is_none() {
            self.status.set_sequence(1);
        }
        Ok(deleted)
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    fn on_tick(&mut self, tick: TimerTick) {
        let accepted = match tick.kind {
            TimerKind::Rotation => self.rotation.accept(tick),
            TimerKind::MaxDuration => self.max_duration.accept(tick),
        };
        if !accepted {
            debug!("Ignoring stale {:?} tick", tick.kind);
            return;
        }
        if self.session_state() != RecorderState::Recording {
            debug!("Ignoring {:?} tick while {}", tick.kind, self.session_state());
            return;
        }

        let now = Instant::now();
        match tick.kind {
            TimerKind::Rotation => self.rotate(now),
            TimerKind::MaxDuration => {
                info!("Maximum recording duration reached");
                if let Err(e) = self.end_session(now, SessionEnd::MaxDuration) {
                    self.events
                        .emit(RecorderEvent::error(e.to_string(), Some("stop_failed")));
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Session internals
    // ------------------------------------------------------------------

    fn pause_session(&mut self, now: Instant) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        if let Some(capture) = &self.capture {
            capture.flags().set_paused(true);
        }
        self.rotation.cancel();
        self.max_duration.cancel();

        session.chunk_clock.pause(now);
        session.session_clock.pause(now);
        session.state = RecorderState::Paused;
        self.status.set_state(RecorderState::Paused);

        info!(
            "Recording paused, {:.2}s recorded in chunk {}",
            session.chunk_clock.accumulated().as_secs_f64(),
            session.sequence
        );
    }

    /// Close the current chunk and open the next one in the same buffer.
    fn rotate(&mut self, now: Instant) {
        self.finalize_current(now, false);

        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.chunk_clock.restart(now);
        if let Some(buffer) = lock_buffer(&self.buffer).as_mut() {
            buffer.reopen(session.sequence, now);
        }
        self.rotation.arm(session.params.chunk_interval());

        debug!("Chunk {} opened", session.sequence);
    }

    /// Write the buffered samples as the current chunk.
    ///
    /// The sequence advances only when the file is confirmed on disk; a
    /// failed write is reported and its number reused for the next chunk.
    fn finalize_current(&mut self, now: Instant, is_final: bool) -> Option<ChunkRecord> {
        let session = self.session.as_mut()?;

        let samples = lock_buffer(&self.buffer)
            .as_mut()
            .map(ChunkBuffer::take_samples)
            .unwrap_or_default();
        let duration = session.chunk_clock.elapsed(now).as_secs_f64();

        if !session.params.persist {
            debug!(
                "Monitoring session: discarded {} samples of chunk {}",
                samples.len(),
                session.sequence
            );
            return None;
        }

        match self.writer.write_wav(
            session.sequence,
            &samples,
            session.sample_rate,
            duration,
            is_final,
        ) {
            Ok(record) => {
                self.events.emit(RecorderEvent::ChunkReady(record.clone()));
                session.chunks.push(record.clone());
                session.sequence += 1;
                self.status.set_sequence(session.sequence);
                Some(record)
            }
            Err(e) => {
                error!("Failed to finalize chunk {}: {}", session.sequence, e);
                self.events
                    .emit(RecorderEvent::error(e.to_string(), Some(FILE_ERROR_CODE)));
                None
            }
        }
    }

    /// Tear the session down: stop capture, write the final chunk, go idle.
    ///
    /// Capture is joined before the final chunk is written so no block can
    /// land in the buffer afterwards.
    fn end_session(&mut self, now: Instant, end: SessionEnd) -> Result<(), DeviceError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        session.state = RecorderState::Stopping;
        let recorded = session.session_clock.elapsed(now);
        self.status.set_state(RecorderState::Stopping);

        self.rotation.cancel();
        self.max_duration.cancel();

        let stopped = self.stop_capture();
        if let Err(e) = &stopped {
            error!("Audio capture ended abnormally: {}", e);
        }

        self.finalize_current(now, true);
        *lock_buffer(&self.buffer) = None;
        self.device_session.release(DeviceUse::Recording);
        self.interruptions.reset();

        let Some(session) = self.session.take() else {
            return stopped;
        };
        self.status.set_sequence(1);
        self.status.set_state(RecorderState::Idle);

        info!(
            "Recording session {} ended ({:?}): {} chunks, {:.2}s recorded",
            session.id,
            end,
            session.chunks.len(),
            recorded.as_secs_f64()
        );

        if end == SessionEnd::MaxDuration {
            self.events
                .emit(RecorderEvent::MaxDurationReached(MaxDurationReached {
                    duration: recorded.as_secs_f64(),
                    max_duration: session.params.max_duration_seconds.unwrap_or_default(),
                    chunks: session.chunks,
                }));
        }
        self.events.emit(RecorderEvent::state_change(false, false));

        stopped
    }

    /// Reuse a running capture at `sample_rate` or open the device.
    fn attach_capture(&mut self, sample_rate: u32) -> Result<u32, DeviceError> {
        if let Some(capture) = &self.capture {
            if capture.sample_rate() == sample_rate && !capture.is_finished() {
                let flags = capture.flags();
                flags.set_paused(false);
                flags.set_recording(true);
                flags.set_preview(false);
                debug!("Recording on running capture from {}", capture.device_name());
                return Ok(sample_rate);
            }
        }

        if let Err(e) = self.stop_capture() {
            warn!("Previous capture ended abnormally: {}", e);
        }

        let device = self.devices.open(sample_rate)?;
        let capture = CaptureLoop::spawn(
            device,
            Arc::new(CaptureFlags::recording()),
            self.capture_context(),
        )?;

        let actual = capture.sample_rate();
        if actual != sample_rate {
            warn!(
                "Input delivers {}Hz instead of the requested {}Hz",
                actual, sample_rate
            );
        }
        self.capture = Some(capture);

        Ok(actual)
    }

    fn capture_alive(&self) -> bool {
        self.capture
            .as_ref()
            .map(|capture| !capture.is_finished())
            .unwrap_or(false)
    }

    fn stop_capture(&mut self) -> Result<(), DeviceError> {
        let Some(capture) = self.capture.take() else {
            return Ok(());
        };

        let stats = capture.shutdown()?;
        debug!(
            "Capture joined: {} samples read, {} buffered",
            stats.samples_read, stats.samples_buffered
        );
        Ok(())
    }

    fn capture_context(&self) -> CaptureContext {
        CaptureContext {
            buffer: self.buffer.clone(),
            meter: self.status.meter().clone(),
            events: self.events.clone(),
            config: self.config.capture.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Interruptions
    // ------------------------------------------------------------------

    fn on_interruption(&mut self, signal: InterruptionSignal) {
        let now = Instant::now();

        match signal {
            InterruptionSignal::Began { reason } => self.interruption_began(
                now,
                InterruptionKind::Began,
                reason.unwrap_or_else(|| FOCUS_LOSS_REASON.to_string()),
            ),
            InterruptionSignal::AudioDeviceDisconnected { reason } => self.interruption_began(
                now,
                InterruptionKind::AudioDeviceDisconnected,
                reason.unwrap_or_else(|| DEVICE_DISCONNECTED_REASON.to_string()),
            ),
            InterruptionSignal::Ended => self.interruption_ended(now),
        }
    }

    fn interruption_began(&mut self, now: Instant, kind: InterruptionKind, reason: String) {
        let state = self.session_state();
        let previewing = self.device_session.holder() == Some(DeviceUse::Monitoring);

        if !state.is_recording() && !previewing {
            debug!("Interruption ({}) ignored: nothing is capturing", reason);
            return;
        }

        let was_recording = state == RecorderState::Recording;
        if !self.interruptions.begin(was_recording) {
            debug!("Duplicate interruption ({}) ignored", reason);
            return;
        }

        if was_recording {
            self.pause_session(now);
            self.events.emit(RecorderEvent::state_change(true, true));
        } else if previewing {
            let _ = self.stop_preview();
        }

        info!(
            "Audio interruption began ({}), paused recording: {}",
            reason, was_recording
        );

        self.events.emit(RecorderEvent::Interruption(InterruptionEvent {
            kind,
            reason: Some(reason),
            was_recording: Some(was_recording),
            should_resume: None,
            can_resume: None,
            native_paused: Some(was_recording),
        }));
    }

    fn interruption_ended(&mut self, now: Instant) {
        let Some(paused_by_interruption) = self.interruptions.end(now) else {
            debug!("Interruption end ignored");
            return;
        };

        let can_resume = self.session_state() == RecorderState::Paused;
        info!("Audio interruption ended, can resume: {}", can_resume);

        self.events.emit(RecorderEvent::Interruption(InterruptionEvent {
            kind: InterruptionKind::Ended,
            reason: None,
            was_recording: None,
            should_resume: Some(paused_by_interruption && can_resume),
            can_resume: Some(can_resume),
            native_paused: None,
        }));
    }

    fn shutdown(&mut self) {
        if self.session.is_some() {
            info!("Recorder closed mid-session, finalizing");
            if let Err(e) = self.end_session(Instant::now(), SessionEnd::Stopped) {
                warn!("Capture shutdown failed: {}", e);
            }
        }
        let _ = self.stop_preview();
        self.rotation.cancel();
        self.max_duration.cancel();
    }
}
