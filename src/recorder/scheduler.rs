use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Which timer a tick belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Rotation,
    MaxDuration,
}

/// Posted onto the command queue when a timer fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTick {
    pub kind: TimerKind,
    pub generation: u64,
}

/// One-shot timer, re-armable and cancelable.
///
/// Firing never touches recorder state: the timer task only posts a
/// [`TimerTick`] to the command queue, and the queue owner checks it with
/// [`RotationScheduler::accept`]. Ticks from a cancelled or superseded
/// arming carry a stale generation and are rejected there.
pub struct RotationScheduler {
    kind: TimerKind,
    ticks: mpsc::UnboundedSender<TimerTick>,
    generation: u64,
    pending: Option<JoinHandle<()>>,
    deadline: Option<Instant>,
}

impl RotationScheduler {
    pub fn new(kind: TimerKind, ticks: mpsc::UnboundedSender<TimerTick>) -> Self {
        Self {
            kind,
            ticks,
            generation: 0,
            pending: None,
            deadline: None,
        }
    }

    /// Cancel any armed timer and fire once after `delay`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm(&mut self, delay: Duration) {
        self.cancel();
        self.generation += 1;

        let tick = TimerTick {
            kind: self.kind,
            generation: self.generation,
        };
        let deadline = Instant::now() + delay;
        let ticks = self.ticks.clone();

        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = ticks.send(tick);
        }));
        self.deadline = Some(deadline);

        debug!("{:?} timer armed for {:.3}s", self.kind, delay.as_secs_f64());
    }

    /// Idempotent; safe when nothing is armed.
    pub fn cancel(&mut self) {
        if let Some(task) = self.pending.take() {
            task.abort();
            debug!("{:?} timer cancelled", self.kind);
        }
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether `tick` is the live firing of this timer; disarms on success.
    pub fn accept(&mut self, tick: TimerTick) -> bool {
        if tick.kind != self.kind || tick.generation != self.generation || self.pending.is_none() {
            return false;
        }
        self.pending = None;
        self.deadline = None;
        true
    }
}

impl Drop for RotationScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
