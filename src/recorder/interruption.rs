use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// External audio-session notification delivered to the recorder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InterruptionSignal {
    /// Another app or a call took the input
    Began {
        #[serde(default)]
        reason: Option<String>,
    },
    Ended,
    /// The input route went away (headset unplugged)
    AudioDeviceDisconnected {
        #[serde(default)]
        reason: Option<String>,
    },
}

/// Reason reported when another app takes audio focus
pub const FOCUS_LOSS_REASON: &str = "phone_call_or_other_app";

/// Reason reported when the input route disappears
pub const DEVICE_DISCONNECTED_REASON: &str = "device_disconnected";

/// Audio focus changes as reported by focus-based platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AudioFocusChange {
    Loss,
    LossTransient,
    LossTransientCanDuck,
    Gain,
}

impl From<AudioFocusChange> for InterruptionSignal {
    fn from(change: AudioFocusChange) -> Self {
        match change {
            AudioFocusChange::Gain => InterruptionSignal::Ended,
            AudioFocusChange::Loss
            | AudioFocusChange::LossTransient
            | AudioFocusChange::LossTransientCanDuck => InterruptionSignal::Began {
                reason: Some(FOCUS_LOSS_REASON.to_string()),
            },
        }
    }
}

/// Deduplicates interruption notifications.
///
/// At most one begin is reported until the matching end. Ends are
/// reported only after a begin and not within `debounce` of the previous
/// reported end; platforms tend to deliver both in bursts.
#[derive(Debug)]
pub struct InterruptionTracker {
    debounce: Duration,
    acknowledged: bool,
    paused_recording: bool,
    last_ended_at: Option<Instant>,
}

impl InterruptionTracker {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            acknowledged: false,
            paused_recording: false,
            last_ended_at: None,
        }
    }

    /// Record a begin; false when one is already outstanding.
    pub fn begin(&mut self, paused_recording: bool) -> bool {
        if self.acknowledged {
            return false;
        }
        self.acknowledged = true;
        self.paused_recording = paused_recording;
        true
    }

    /// Record an end; returns whether the outstanding begin paused a
    /// recording, or `None` when the end should not be reported.
    pub fn end(&mut self, now: Instant) -> Option<bool> {
        if let Some(last) = self.last_ended_at {
            if now.saturating_duration_since(last) < self.debounce {
                return None;
            }
        }
        if !self.acknowledged {
            return None;
        }

        self.acknowledged = false;
        self.last_ended_at = Some(now);
        Some(std::mem::take(&mut self.paused_recording))
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged
    }

    pub fn reset(&mut self) {
        self.acknowledged = false;
        self.paused_recording = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_reported_once_until_end() {
        let t0 = Instant::now();
        let mut tracker = InterruptionTracker::new(Duration::from_secs(1));

        assert!(tracker.begin(true));
        assert!(!tracker.begin(false));
        assert_eq!(tracker.end(t0), Some(true));
        assert!(tracker.begin(false));
    }

    #[test]
    fn test_end_without_begin_is_ignored() {
        let mut tracker = InterruptionTracker::new(Duration::from_secs(1));
        assert_eq!(tracker.end(Instant::now()), None);
    }

    #[test]
    fn test_end_debounced() {
        let t0 = Instant::now();
        let mut tracker = InterruptionTracker::new(Duration::from_secs(1));

        tracker.begin(true);
        assert_eq!(tracker.end(t0), Some(true));

        tracker.begin(false);
        assert_eq!(tracker.end(t0 + Duration::from_millis(400)), None);
        // Begin stays outstanding through the suppressed end
        assert!(tracker.is_acknowledged());
        assert_eq!(tracker.end(t0 + Duration::from_millis(1500)), Some(false));
    }

    #[test]
    fn test_focus_changes_map_to_signals() {
        assert_eq!(InterruptionSignal::from(AudioFocusChange::Gain), InterruptionSignal::Ended);
        assert_eq!(
            InterruptionSignal::from(AudioFocusChange::LossTransientCanDuck),
            InterruptionSignal::Began {
                reason: Some(FOCUS_LOSS_REASON.to_string())
            }
        );
    }

    #[test]
    fn test_signal_wire_format() {
        let signal: InterruptionSignal =
            serde_json::from_str(r#"{"type":"began","reason":"phone_call"}"#).unwrap();
        assert_eq!(
            signal,
            InterruptionSignal::Began {
                reason: Some("phone_call".to_string())
            }
        );

        let signal: InterruptionSignal = serde_json::from_str(r#"{"type":"ended"}"#).unwrap();
        assert_eq!(signal, InterruptionSignal::Ended);

        let signal: InterruptionSignal =
            serde_json::from_str(r#"{"type":"audioDeviceDisconnected"}"#).unwrap();
        assert_eq!(signal, InterruptionSignal::AudioDeviceDisconnected { reason: None });
    }
}
