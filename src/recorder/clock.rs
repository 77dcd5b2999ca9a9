use std::time::Duration;

use tokio::time::Instant;

/// Pause-aware stopwatch.
///
/// `accumulated` holds recorded time from finished segments; the live
/// segment is measured from `running_since`. Their sum is the recorded
/// time regardless of how many pause/resume cycles happened.
#[derive(Debug, Clone, Copy)]
pub struct SegmentClock {
    accumulated: Duration,
    running_since: Option<Instant>,
}

impl SegmentClock {
    pub fn started(now: Instant) -> Self {
        Self {
            accumulated: Duration::ZERO,
            running_since: Some(now),
        }
    }

    pub fn pause(&mut self, now: Instant) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += now.saturating_duration_since(since);
        }
    }

    pub fn resume(&mut self, now: Instant) {
        if self.running_since.is_none() {
            self.running_since = Some(now);
        }
    }

    /// Zero the clock and start a new live segment
    pub fn restart(&mut self, now: Instant) {
        self.accumulated = Duration::ZERO;
        self.running_since = Some(now);
    }

    /// Recorded time from finished segments only
    pub fn accumulated(&self) -> Duration {
        self.accumulated
    }

    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        let live = self
            .running_since
            .map(|since| now.saturating_duration_since(since))
            .unwrap_or(Duration::ZERO);
        self.accumulated + live
    }

    /// Time left until `target` recorded time, zero once reached
    pub fn remaining(&self, target: Duration, now: Instant) -> Duration {
        target.saturating_sub(self.elapsed(now))
    }
}
