//! Fixed-duration overlapping windowing of the capture stream.
//!
//! The assembler accumulates mono samples and yields chunks of
//! `chunk_samples` length, each starting `chunk_samples - overlap_samples`
//! after the previous one, so consecutive chunks share exactly
//! `overlap_samples` of audio. The shared region is what lets the merger
//! recover words spoken across a chunk boundary.

use anyhow::{bail, Result};
use tracing::debug;

/// Largest accepted window length, in samples. At 16 kHz this is over four
/// hours of audio per chunk.
pub(crate) const MAX_CHUNK_SAMPLES: usize = 1 << 28;

/// One fixed-duration window of captured audio, submitted as a single
/// transcription request.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Mono f32 samples in [-1.0, 1.0] at the configured capture rate.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Chunk index (0-based, incremental).
    pub index: usize,
    /// Offset of the chunk's first sample from the start of capture, in
    /// seconds.
    pub start_sec: f64,
}

impl AudioChunk {
    /// Returns the duration of this chunk in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Accumulates capture samples and yields overlapping fixed-size windows.
///
/// Produces a lazy, unbounded chunk sequence: [`push`](Self::push) appends
/// samples, [`next_chunk`](Self::next_chunk) pops the next full window when
/// enough audio has arrived. The trailing `overlap_samples` of each emitted
/// window are retained so they reappear at the head of the next one.
///
/// # Examples
///
/// ```
/// use streamscribe::ChunkAssembler;
///
/// # fn main() -> anyhow::Result<()> {
/// // 1-second chunks sharing 0.25 s, at a toy 8 Hz rate.
/// let mut assembler = ChunkAssembler::new(8, 2, 8)?;
/// assembler.push(&[0.0; 10]);
///
/// let first = assembler.next_chunk().expect("one full window");
/// assert_eq!(first.samples.len(), 8);
/// assert_eq!(first.start_sec, 0.0);
///
/// // Four samples remain (two of them carried overlap), not yet a window.
/// assert!(assembler.next_chunk().is_none());
/// # Ok(())
/// # }
/// ```
pub struct ChunkAssembler {
    buffer: Vec<f32>,
    chunk_samples: usize,
    overlap_samples: usize,
    sample_rate: u32,
    next_index: usize,
}

impl ChunkAssembler {
    /// Creates an assembler for `chunk_samples`-sized windows sharing
    /// `overlap_samples` with their predecessor.
    ///
    /// # Errors
    ///
    /// Fails when `chunk_samples` is zero or larger than
    /// `MAX_CHUNK_SAMPLES`, or when `overlap_samples` is not smaller
    /// than `chunk_samples`. Such a configuration would emit empty or
    /// non-advancing windows, so it is rejected up front rather than
    /// silently looping.
    pub fn new(chunk_samples: usize, overlap_samples: usize, sample_rate: u32) -> Result<Self> {
        if chunk_samples == 0 {
            bail!("chunk length of zero samples cannot produce audio windows");
        }
        if chunk_samples > MAX_CHUNK_SAMPLES {
            bail!(
                "chunk length of {chunk_samples} samples exceeds the supported \
                 maximum of {MAX_CHUNK_SAMPLES}"
            );
        }
        if overlap_samples >= chunk_samples {
            bail!(
                "overlap of {overlap_samples} samples must be smaller than the \
                 chunk length of {chunk_samples} samples"
            );
        }
        if sample_rate == 0 {
            bail!("sample rate must be non-zero");
        }
        Ok(Self {
            buffer: Vec::with_capacity(chunk_samples * 2),
            chunk_samples,
            overlap_samples,
            sample_rate,
            next_index: 0,
        })
    }

    /// Samples each new window advances past the previous one.
    pub fn step_samples(&self) -> usize {
        self.chunk_samples - self.overlap_samples
    }

    /// Appends captured samples to the pending buffer.
    pub fn push(&mut self, samples: &[f32]) {
        self.buffer.extend_from_slice(samples);
    }

    /// Pops the next full window if enough audio has accumulated.
    ///
    /// Call in a loop after [`push`](Self::push); a single large push can
    /// complete several windows.
    pub fn next_chunk(&mut self) -> Option<AudioChunk> {
        if self.buffer.len() < self.chunk_samples {
            return None;
        }

        let samples = self.buffer[..self.chunk_samples].to_vec();
        let chunk = self.emit(samples);
        // Keep the overlap tail in place for the next window.
        self.buffer.drain(..self.step_samples());
        Some(chunk)
    }

    /// Emits whatever remains as a final, possibly partial window.
    ///
    /// For a finite sample feed this completes the chunk sequence; a stream
    /// of `L` seconds (`L > chunk_len`) yields exactly
    /// `ceil((L - overlap) / (chunk_len - overlap))` windows in total.
    /// Returns [`None`] when the buffer holds nothing beyond the overlap
    /// already covered by the previous window.
    pub fn flush(&mut self) -> Option<AudioChunk> {
        let has_new_audio = if self.next_index == 0 {
            !self.buffer.is_empty()
        } else {
            self.buffer.len() > self.overlap_samples
        };
        if !has_new_audio {
            return None;
        }

        let samples = std::mem::take(&mut self.buffer);
        Some(self.emit(samples))
    }

    fn emit(&mut self, samples: Vec<f32>) -> AudioChunk {
        let index = self.next_index;
        let start_sec = (index * self.step_samples()) as f64 / self.sample_rate as f64;
        self.next_index += 1;
        debug!(
            chunk = index,
            start_sec,
            samples = samples.len(),
            "assembled audio chunk"
        );
        AudioChunk {
            samples,
            sample_rate: self.sample_rate,
            index,
            start_sec,
        }
    }
}
