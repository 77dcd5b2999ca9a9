use std::sync::atomic::{AtomicU32, Ordering};

use crate::config::LevelConfig;
use crate::events::AudioLevel;

/// Normalized loudness meter with delta gating.
///
/// Only the last emitted level is kept; it is stored as `f32` bits in an
/// atomic so watchers on other threads can read it while the capture
/// thread updates it.
#[derive(Debug)]
pub struct AudioLevelMeter {
    last_emitted: AtomicU32,
    emit_delta: f32,
    has_audio_threshold: f32,
    db_floor: f32,
}

impl AudioLevelMeter {
    pub fn new(config: &LevelConfig) -> Self {
        Self {
            last_emitted: AtomicU32::new(0.0f32.to_bits()),
            emit_delta: config.emit_delta,
            has_audio_threshold: config.has_audio_threshold,
            db_floor: config.db_floor,
        }
    }

    /// RMS of a block of 16-bit samples scaled to [0, 1].
    pub fn rms_level(samples: &[i16]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        let rms = (sum / samples.len() as f64).sqrt() / 32768.0;
        rms.min(1.0) as f32
    }

    /// Map a metering power in dB linearly from [floor, 0] onto [0, 1].
    pub fn level_from_decibels(&self, db: f32) -> f32 {
        if !db.is_finite() || db <= self.db_floor {
            return 0.0;
        }
        if db >= 0.0 {
            return 1.0;
        }
        (db - self.db_floor) / -self.db_floor
    }

    /// Measure a sample block; returns a reading when it should be emitted.
    pub fn observe(&self, samples: &[i16]) -> Option<AudioLevel> {
        if samples.is_empty() {
            return None;
        }
        self.gate(Self::rms_level(samples), None)
    }

    /// Gate a hardware metering value in dB.
    pub fn observe_decibels(&self, db: f32) -> Option<AudioLevel> {
        self.gate(self.level_from_decibels(db), Some(db))
    }

    fn gate(&self, level: f32, average_power: Option<f32>) -> Option<AudioLevel> {
        let last = self.level();
        if (level - last).abs() <= self.emit_delta {
            return None;
        }
        self.last_emitted.store(level.to_bits(), Ordering::Relaxed);

        Some(AudioLevel {
            level,
            has_audio: level > self.has_audio_threshold,
            average_power,
        })
    }

    /// Last emitted level
    pub fn level(&self) -> f32 {
        f32::from_bits(self.last_emitted.load(Ordering::Relaxed))
    }

    pub fn reset(&self) {
        self.last_emitted.store(0.0f32.to_bits(), Ordering::Relaxed);
    }
}
