//! Near-Real-Time Microphone Transcription
//!
//! This library captures audio from the default input device, slices it into
//! fixed-length chunks that share a configurable overlap region, sends each
//! chunk to an OpenAI-compatible transcription API, and merges the responses
//! into a single deduplicated running transcript.
//!
//! # Architecture
//!
//! The library is organized into several key components:
//!
//! - [`TranscriptionService`]: Main service that orchestrates capture,
//!   chunking, transcription, and overlap merging
//! - [`Config`]: Configuration for chunk length, overlap, sample rate, API
//!   endpoint, and model selection
//! - [`ChunkAssembler`]: Turns the continuous capture stream into
//!   overlapping fixed-duration windows
//! - [`TranscriptStitcher`]: Deduplicates the words repeated across chunk
//!   boundaries and maintains the append-only [`RunningTranscript`]
//! - [`TranscriptionClient`]: Sends one HTTP request per chunk
//! - [`TranscriptionEvent`]: Events carrying newly merged text or per-chunk
//!   errors
//!
//! Because consecutive chunks share audio, words spoken near a boundary are
//! transcribed twice. The stitcher aligns each new transcription against the
//! tail of the previous one with a tolerant word-run match and appends only
//! what is new, so results arrive as append-only increments suitable for
//! live display.
//!
//! # Examples
//!
//! ## Basic Usage
//!
//! ```no_run
//! use streamscribe::{Config, TranscriptionEvent, TranscriptionService};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let api_key = std::env::var("OPENAI_API_KEY")?;
//!
//!     let mut service = TranscriptionService::new(config, api_key)?;
//!
//!     // Start listening and transcribing
//!     let (mut receiver, _stream) = service.start().await?;
//!
//!     // Print each newly merged piece of the transcript
//!     while let Some(event) = receiver.recv().await {
//!         match event {
//!             TranscriptionEvent::Transcription { text, .. } => {
//!                 if !text.is_empty() {
//!                     println!("heard: {text}");
//!                 }
//!             }
//!             TranscriptionEvent::Error { chunk_id, error } => {
//!                 eprintln!("chunk {chunk_id} failed: {error}");
//!             }
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Custom Configuration
//!
//! ```no_run
//! use streamscribe::{Config, TranscriptionService};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = Config {
//!     chunk_len_sec: 3.0,
//!     overlap_sec: 0.5,
//!     model_name: "whisper-1".to_string(),
//!     ..Config::default()
//! };
//!
//! let api_key = std::env::var("OPENAI_API_KEY")?;
//! let mut service = TranscriptionService::new(config, api_key)?;
//! # Ok(())
//! # }
//! ```

mod audio;
mod chunker;
mod client;
mod config;
mod merger;
mod transcription;

pub use chunker::{AudioChunk, ChunkAssembler};
pub use client::TranscriptionClient;
pub use config::Config;
pub use merger::{RunningTranscript, TranscriptStitcher};
pub use transcription::{TranscriptionEvent, TranscriptionService};

// Re-export commonly used types
pub use anyhow::{Context, Result};
