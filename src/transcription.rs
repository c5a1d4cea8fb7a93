//! Transcription service and event types.
//!
//! This module contains the main [`TranscriptionService`] that coordinates
//! audio capture, chunking, transcription, and overlap merging, as well as
//! the [`TranscriptionEvent`] enum for receiving incremental results.

use crate::audio::{downmix_mono, encode_wav, start_audio_capture, BlockResampler};
use crate::chunker::{AudioChunk, ChunkAssembler};
use crate::client::TranscriptionClient;
use crate::config::Config;
use crate::merger::TranscriptStitcher;
use anyhow::Result;
use cpal::Stream;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};

/// Events emitted by the transcription service.
///
/// These events are sent through the channel returned by
/// [`TranscriptionService::start`] and carry either the newly merged text of
/// a chunk or the error that caused it to be dropped.
///
/// # Examples
///
/// ```no_run
/// use std::io::Write;
/// use streamscribe::{Config, TranscriptionEvent, TranscriptionService};
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// # let api_key = "test".to_string();
/// let mut service = TranscriptionService::new(Config::default(), api_key)?;
/// let (mut receiver, _stream) = service.start().await?;
///
/// while let Some(event) = receiver.recv().await {
///     match event {
///         TranscriptionEvent::Transcription { text, .. } if !text.is_empty() => {
///             print!(" {text}");
///             std::io::stdout().flush()?;
///         }
///         TranscriptionEvent::Transcription { .. } => {}
///         TranscriptionEvent::Error { chunk_id, error } => {
///             eprintln!("chunk {chunk_id} failed: {error}");
///         }
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub enum TranscriptionEvent {
    /// A chunk was transcribed and merged into the running transcript.
    ///
    /// `text` is only the portion that was new relative to the previous
    /// chunk's overlap; printing every `text` in order reproduces the
    /// running transcript. An empty string means the chunk was silent or
    /// repeated already-emitted words in full.
    Transcription {
        /// The chunk ID (incremental counter starting from 0)
        chunk_id: usize,
        /// The newly appended transcript text (empty for silence)
        text: String,
    },
    /// A chunk failed to transcribe and was dropped.
    ///
    /// This can happen due to network failures, API errors, or audio
    /// processing issues. The session continues with the next chunk; the
    /// transcript keeps a gap where the failed chunk would have been.
    Error {
        /// The chunk ID that failed
        chunk_id: usize,
        /// The error message describing what went wrong
        error: String,
    },
}

/// The main transcription service.
///
/// This service manages the entire pipeline: capturing audio from the
/// system's default input device, assembling it into fixed-length chunks
/// that share an overlap region, sending each chunk to an OpenAI-compatible
/// transcription API, and merging the responses into a deduplicated running
/// transcript.
///
/// Chunks are processed strictly in capture order. The merge step for chunk
/// *n* completes before chunk *n + 1* is submitted, because deduplication
/// aligns each chunk against the tail of the one immediately before it.
///
/// # Examples
///
/// ## Basic usage
///
/// ```no_run
/// use streamscribe::{Config, TranscriptionService};
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let config = Config::default();
/// let api_key = std::env::var("OPENAI_API_KEY")?;
///
/// let mut service = TranscriptionService::new(config, api_key)?;
/// let (mut receiver, _stream) = service.start().await?;
///
/// // Process events...
/// # Ok(())
/// # }
/// ```
///
/// ## With custom configuration
///
/// ```no_run
/// use streamscribe::{Config, TranscriptionService};
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let config = Config {
///     chunk_len_sec: 3.0,
///     overlap_sec: 0.5,
///     ..Config::default()
/// };
///
/// let api_key = std::env::var("OPENAI_API_KEY")?;
/// let mut service = TranscriptionService::new(config, api_key)?;
/// # Ok(())
/// # }
/// ```
pub struct TranscriptionService {
    config: Config,
    client: Arc<TranscriptionClient>,
    stitcher: Arc<Mutex<TranscriptStitcher>>,
}

impl TranscriptionService {
    /// Creates a new transcription service with the specified configuration
    /// and API key.
    ///
    /// This doesn't start audio capture yet; call [`start`](Self::start) to
    /// begin transcription.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use streamscribe::{Config, TranscriptionService};
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let config = Config::default();
    /// let api_key = std::env::var("OPENAI_API_KEY")?;
    /// let service = TranscriptionService::new(config, api_key)?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid (for example an
    /// overlap that is not shorter than the chunk length) or the HTTP
    /// client cannot be initialized.
    pub fn new(config: Config, api_key: String) -> Result<Self> {
        config.validate()?;
        let client = TranscriptionClient::new(&config.endpoint, &config.model_name, api_key)?;
        let stitcher = TranscriptStitcher::new(config.overlap_sec);
        Ok(Self {
            config,
            client: Arc::new(client),
            stitcher: Arc::new(Mutex::new(stitcher)),
        })
    }

    /// Starts the transcription service and returns a receiver for events.
    ///
    /// This method begins capturing audio from the default input device and
    /// spawns the processing task that assembles, transcribes, and merges
    /// chunks. Events are delivered through the returned
    /// [`UnboundedReceiver<TranscriptionEvent>`].
    ///
    /// The returned [`Stream`] must be kept alive for audio capture to
    /// continue. Dropping it ends the session: the processing task
    /// transcribes any remaining partial chunk, emits its event, and exits.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No default audio input device is available
    /// - The audio device cannot be configured
    /// - The device sample rate cannot be resampled to the configured rate
    pub async fn start(&mut self) -> Result<(UnboundedReceiver<TranscriptionEvent>, Stream)> {
        let (event_tx, event_rx) = unbounded_channel::<TranscriptionEvent>();
        let (sample_tx, mut sample_rx) = unbounded_channel::<Vec<f32>>();

        let (stream, device_config) = start_audio_capture(sample_tx, self.config.chunk_frame_size)?;

        let mut resampler = BlockResampler::new(
            device_config.sample_rate,
            self.config.sample_rate_hz,
            self.config.chunk_frame_size,
        )?;
        let mut assembler = ChunkAssembler::new(
            self.config.chunk_samples(),
            self.config.overlap_samples(),
            self.config.sample_rate_hz,
        )?;

        info!(
            device_rate = device_config.sample_rate,
            channels = device_config.channels,
            target_rate = self.config.sample_rate_hz,
            chunk_len_sec = self.config.chunk_len_sec,
            overlap_sec = self.config.overlap_sec,
            model = %self.config.model_name,
            "audio capture started"
        );

        let client = Arc::clone(&self.client);
        let stitcher = Arc::clone(&self.stitcher);
        let channels = device_config.channels;

        // A single task keeps chunk processing strictly ordered: the
        // stitcher's overlap reference is only valid for the immediately
        // following chunk, so chunk n must be merged before chunk n+1 is
        // submitted. Capture keeps filling the sample channel while a
        // request is in flight.
        tokio::spawn(async move {
            while let Some(data) = sample_rx.recv().await {
                let mono = downmix_mono(&data, channels);
                let resampled = match resampler.push(&mono) {
                    Ok(samples) => samples,
                    Err(err) => {
                        error!(error = %err, "resampling failed, stopping transcription");
                        break;
                    }
                };
                assembler.push(&resampled);

                while let Some(chunk) = assembler.next_chunk() {
                    process_chunk(&client, &stitcher, &event_tx, chunk).await;
                }
            }

            // Capture ended; transcribe whatever partial window remains.
            if let Some(chunk) = assembler.flush() {
                process_chunk(&client, &stitcher, &event_tx, chunk).await;
            }
        });

        Ok((event_rx, stream))
    }

    /// Snapshot of the full transcript merged so far.
    ///
    /// Used for the final flush at shutdown; safe to call at any time.
    pub fn transcript(&self) -> String {
        lock_stitcher(&self.stitcher).transcript().text()
    }
}

/// Transcribes one chunk and merges its text, emitting a single event.
///
/// A failed chunk is dropped, not retried: the stitcher forgets its overlap
/// reference so the next chunk is appended in full, and the session
/// continues.
async fn process_chunk(
    client: &TranscriptionClient,
    stitcher: &Mutex<TranscriptStitcher>,
    events: &UnboundedSender<TranscriptionEvent>,
    chunk: AudioChunk,
) {
    let chunk_id = chunk.index;
    debug!(
        chunk = chunk_id,
        start_sec = chunk.start_sec,
        duration_sec = chunk.duration_secs(),
        "submitting chunk for transcription"
    );

    let result = match encode_wav(&chunk.samples, chunk.sample_rate, 1) {
        Ok(wav) => client.transcribe(wav, chunk_id).await,
        Err(err) => Err(err),
    };

    match result {
        Ok(text) => {
            let appended = lock_stitcher(stitcher).push_chunk(&text);
            let _ = events.send(TranscriptionEvent::Transcription {
                chunk_id,
                text: appended,
            });
        }
        Err(err) => {
            warn!(chunk = chunk_id, error = %err, "chunk dropped, continuing with next");
            lock_stitcher(stitcher).mark_gap();
            let _ = events.send(TranscriptionEvent::Error {
                chunk_id,
                error: err.to_string(),
            });
        }
    }
}

fn lock_stitcher(stitcher: &Mutex<TranscriptStitcher>) -> MutexGuard<'_, TranscriptStitcher> {
    // A poisoned lock still holds a usable transcript.
    stitcher.lock().unwrap_or_else(PoisonError::into_inner)
}
