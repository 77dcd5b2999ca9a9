use std::path::Path;

use anyhow::{Context, Result};
use hound::WavReader;
use tracing::{debug, warn};

use super::backend::{BITS_PER_SAMPLE, CHANNELS};
use super::chunk::parse_chunk_file_name;

/// A written chunk read back for inspection.
///
/// The header's declared length must match the samples actually decoded.
pub struct ChunkFile {
    pub path: String,
    /// From the `chunk_<n>` file name, when it follows the convention
    pub sequence: Option<u32>,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub samples: Vec<i16>,
}

impl ChunkFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let reader = WavReader::open(path)
            .with_context(|| format!("Not a PCM WAV chunk: {}", path.display()))?;
        let spec = reader.spec();
        let declared = reader.len() as usize;

        let samples = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Chunk payload is truncated")?;

        let frames = samples.len() as f64 / spec.channels.max(1) as f64;
        let chunk = Self {
            path: path.display().to_string(),
            sequence: path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(parse_chunk_file_name)
                .map(|(sequence, _)| sequence),
            duration_seconds: if spec.sample_rate == 0 {
                0.0
            } else {
                frames / spec.sample_rate as f64
            },
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            bits_per_sample: spec.bits_per_sample,
            samples,
        };

        if chunk.samples.len() != declared {
            warn!(
                "{}: header declares {} samples, found {}",
                chunk.path,
                declared,
                chunk.samples.len()
            );
        }
        if !chunk.is_recorder_format() {
            warn!(
                "{}: {}ch {}-bit is not the recorder's output format",
                chunk.path, chunk.channels, chunk.bits_per_sample
            );
        }

        debug!(
            "Inspected {}: {:.3}s at {}Hz",
            chunk.path, chunk.duration_seconds, chunk.sample_rate
        );
        Ok(chunk)
    }

    /// Size of the PCM payload in bytes
    pub fn data_len(&self) -> usize {
        self.samples.len() * (self.bits_per_sample as usize / 8)
    }

    /// Mono 16-bit, as the recorder writes
    pub fn is_recorder_format(&self) -> bool {
        self.channels == CHANNELS && self.bits_per_sample == BITS_PER_SAMPLE
    }
}
