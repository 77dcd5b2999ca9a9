use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::backend::{BITS_PER_SAMPLE, BYTES_PER_SAMPLE, CHANNELS};
use crate::error::ChunkFileError;

const CHUNK_PREFIX: &str = "chunk_";

/// Header size hound writes for mono 16-bit PCM
pub const WAV_HEADER_LEN: usize = 44;

/// Container used for chunk files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkFormat {
    /// Raw PCM wrapped in a synthesized WAV header
    Wav,
    /// Written directly by a platform codec while capture runs
    M4a,
}

impl ChunkFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ChunkFormat::Wav => "wav",
            ChunkFormat::M4a => "m4a",
        }
    }

    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "wav" => Some(ChunkFormat::Wav),
            "m4a" => Some(ChunkFormat::M4a),
            _ => None,
        }
    }
}

/// Samples accumulated for the chunk currently being captured.
///
/// Exactly one exists while a session is active. Rotation drains the
/// samples out and re-stamps the same buffer for the next sequence, so the
/// capture thread never sees a moment without a buffer to append to.
#[derive(Debug)]
pub struct ChunkBuffer {
    sequence: u32,
    started_at: Instant,
    samples: Vec<i16>,
}

impl ChunkBuffer {
    pub fn new(sequence: u32, started_at: Instant) -> Self {
        Self {
            sequence,
            started_at,
            samples: Vec::new(),
        }
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn append(&mut self, samples: &[i16]) {
        self.samples.extend_from_slice(samples);
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn len_bytes(&self) -> usize {
        self.samples.len() * BYTES_PER_SAMPLE
    }

    /// Move the accumulated samples out, leaving the buffer empty.
    pub fn take_samples(&mut self) -> Vec<i16> {
        std::mem::take(&mut self.samples)
    }

    /// Start accounting for the next chunk.
    pub fn reopen(&mut self, sequence: u32, started_at: Instant) {
        self.sequence = sequence;
        self.started_at = started_at;
    }
}

/// Finished chunk reported to the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    #[serde(rename = "path")]
    pub file_path: PathBuf,
    #[serde(rename = "sequence")]
    pub sequence_number: u32,
    /// Recorded (pause-adjusted) seconds
    #[serde(rename = "duration")]
    pub duration_seconds: f64,
    #[serde(rename = "timestamp")]
    pub created_at_epoch_ms: i64,
    #[serde(rename = "size")]
    pub size_bytes: u64,
    #[serde(rename = "isLastChunk")]
    pub is_final_chunk: bool,
}

/// Turns completed buffers into durable chunk files in the storage directory.
///
/// File names are keyed by sequence number (`chunk_<n>.<ext>`), and a chunk
/// is only reported after its size on disk is confirmed non-zero.
#[derive(Debug, Clone)]
pub struct ChunkFileWriter {
    directory: PathBuf,
    flush_delay: Duration,
}

impl ChunkFileWriter {
    pub fn new(directory: impl Into<PathBuf>, flush_delay: Duration) -> Result<Self, ChunkFileError> {
        let directory = directory.into();
        fs::create_dir_all(&directory).map_err(|source| ChunkFileError::WriteFailed {
            path: directory.clone(),
            source,
        })?;

        info!("Chunk storage directory: {}", directory.display());

        Ok(Self {
            directory,
            flush_delay,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn chunk_path(&self, sequence: u32, format: ChunkFormat) -> PathBuf {
        self.directory
            .join(format!("{}{}.{}", CHUNK_PREFIX, sequence, format.extension()))
    }

    /// Write raw samples as `chunk_<sequence>.wav` and validate the result.
    pub fn write_wav(
        &self,
        sequence: u32,
        samples: &[i16],
        sample_rate: u32,
        duration_seconds: f64,
        is_final: bool,
    ) -> Result<ChunkRecord, ChunkFileError> {
        let path = self.chunk_path(sequence, ChunkFormat::Wav);
        let spec = hound::WavSpec {
            channels: CHANNELS,
            sample_rate,
            bits_per_sample: BITS_PER_SAMPLE,
            sample_format: hound::SampleFormat::Int,
        };

        let write = || -> Result<(), hound::Error> {
            let mut writer = hound::WavWriter::create(&path, spec)?;
            for &sample in samples {
                writer.write_sample(sample)?;
            }
            writer.finalize()
        };

        write().map_err(|source| ChunkFileError::Encode {
            path: path.clone(),
            source,
        })?;

        let size_bytes = Self::verify(&path)?;

        info!(
            "WAV chunk written: {} ({} samples, {}Hz, {:.2}s)",
            path.display(),
            samples.len(),
            sample_rate,
            duration_seconds
        );

        Ok(Self::record(path, sequence, duration_seconds, size_bytes, is_final))
    }

    /// Validate a file the platform codec wrote for `sequence`.
    ///
    /// Waits the configured flush delay before checking the file so the
    /// encoder's last write reaches the filesystem.
    pub async fn finalize_encoded(
        &self,
        sequence: u32,
        format: ChunkFormat,
        duration_seconds: f64,
        is_final: bool,
    ) -> Result<ChunkRecord, ChunkFileError> {
        let path = self.chunk_path(sequence, format);

        tokio::time::sleep(self.flush_delay).await;

        let size_bytes = Self::verify(&path)?;
        debug!("Encoded chunk validated: {} ({} bytes)", path.display(), size_bytes);

        Ok(Self::record(path, sequence, duration_seconds, size_bytes, is_final))
    }

    fn verify(path: &Path) -> Result<u64, ChunkFileError> {
        match fs::metadata(path) {
            Ok(meta) if meta.len() == 0 => Err(ChunkFileError::EmptyOutput {
                path: path.to_path_buf(),
            }),
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(ChunkFileError::FileNotCreated {
                path: path.to_path_buf(),
            }),
            Err(source) => Err(ChunkFileError::WriteFailed {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn record(
        file_path: PathBuf,
        sequence_number: u32,
        duration_seconds: f64,
        size_bytes: u64,
        is_final_chunk: bool,
    ) -> ChunkRecord {
        ChunkRecord {
            file_path,
            sequence_number,
            duration_seconds,
            created_at_epoch_ms: chrono::Utc::now().timestamp_millis(),
            size_bytes,
            is_final_chunk,
        }
    }

    /// Delete every chunk file in the directory; other files are left alone.
    pub fn clear_all_chunk_files(&self) -> Result<usize, ChunkFileError> {
        let mut deleted = 0;

        for path in self.chunk_files()? {
            match fs::remove_file(&path) {
                Ok(()) => deleted += 1,
                Err(e) => warn!("Failed to delete chunk file {}: {}", path.display(), e),
            }
        }

        info!("Deleted {} chunk files from {}", deleted, self.directory.display());

        Ok(deleted)
    }

    /// Number of chunk files currently on disk
    pub fn chunk_file_count(&self) -> Result<usize, ChunkFileError> {
        Ok(self.chunk_files()?.len())
    }

    fn chunk_files(&self) -> Result<Vec<PathBuf>, ChunkFileError> {
        let scan_err = |source| ChunkFileError::Scan {
            path: self.directory.clone(),
            source,
        };

        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(scan_err(e)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(scan_err)?;
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            let matches = entry
                .file_name()
                .to_str()
                .map(is_chunk_file_name)
                .unwrap_or(false);

            if is_file && matches {
                files.push(entry.path());
            }
        }

        Ok(files)
    }
}

/// Whether `name` follows the `chunk_<n>.<wav|m4a>` convention.
pub fn is_chunk_file_name(name: &str) -> bool {
    parse_chunk_file_name(name).is_some()
}

/// Sequence number and container of a `chunk_<n>.<ext>` file name.
pub fn parse_chunk_file_name(name: &str) -> Option<(u32, ChunkFormat)> {
    let rest = name.strip_prefix(CHUNK_PREFIX)?;
    let (sequence, ext) = rest.rsplit_once('.')?;

    if sequence.is_empty() || !sequence.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    Some((sequence.parse().ok()?, ChunkFormat::from_extension(ext)?))
}
