use crate::chunker::MAX_CHUNK_SAMPLES;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

const DEFAULT_CONFIG_PATH: &str = "streamscribe.config.json";
const DEFAULT_CHUNK_LEN_SEC: f64 = 4.0;
const DEFAULT_OVERLAP_SEC: f64 = 1.0;
const DEFAULT_SAMPLE_RATE_HZ: u32 = 16_000;
const DEFAULT_CHUNK_FRAME_SIZE: usize = 1024;
const DEFAULT_MODEL: &str = "whisper-1";
const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/audio/transcriptions";

/// Configuration for the transcription pipeline.
///
/// Controls how audio is captured, windowed into overlapping chunks, and sent
/// to the transcription API. All fields have sensible defaults and can be
/// loaded from a JSON configuration file.
///
/// # Examples
///
/// ## Using defaults
///
/// ```
/// use streamscribe::Config;
///
/// let config = Config::default();
/// assert_eq!(config.chunk_len_sec, 4.0);
/// assert_eq!(config.overlap_sec, 1.0);
/// assert_eq!(config.model_name, "whisper-1");
/// ```
///
/// ## Custom configuration
///
/// ```
/// use streamscribe::Config;
///
/// let config = Config {
///     chunk_len_sec: 6.0,
///     overlap_sec: 1.5,
///     ..Config::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
///
/// ## Loading from a JSON file
///
/// ```no_run
/// use streamscribe::Config;
///
/// # fn main() -> anyhow::Result<()> {
/// let config = Config::from_file("config.json")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// Duration of each audio chunk in seconds.
    ///
    /// Shorter chunks (3-4 seconds) give more responsive output; longer chunks
    /// give the model more context per request.
    pub chunk_len_sec: f64,

    /// Overlap between consecutive chunks in seconds.
    ///
    /// Each chunk after the first starts this many seconds before the end of
    /// the previous chunk, so words spoken across a chunk boundary appear in
    /// both chunks and can be deduplicated by the merger. Must satisfy
    /// `0 <= overlap_sec < chunk_len_sec`.
    pub overlap_sec: f64,

    /// Capture sample rate in Hz.
    ///
    /// Audio from the input device is resampled to this rate before chunking.
    /// 16 kHz is the standard rate for speech models.
    pub sample_rate_hz: u32,

    /// Capture buffer granularity in frames.
    ///
    /// Requested as the input stream's buffer size and used as the resampler
    /// block size. Has no effect on chunk boundaries.
    pub chunk_frame_size: usize,

    /// Transcription model identifier sent with each request.
    ///
    /// Common values: `"whisper-1"` for OpenAI's Whisper model.
    pub model_name: String,

    /// API endpoint for transcription requests.
    ///
    /// Defaults to OpenAI's endpoint but can point at any OpenAI-compatible
    /// transcription server.
    pub endpoint: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_len_sec: DEFAULT_CHUNK_LEN_SEC,
            overlap_sec: DEFAULT_OVERLAP_SEC,
            sample_rate_hz: DEFAULT_SAMPLE_RATE_HZ,
            chunk_frame_size: DEFAULT_CHUNK_FRAME_SIZE,
            model_name: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }
}

impl Config {
    /// Loads configuration from a JSON file at the specified path.
    ///
    /// Missing fields take their default values via serde's
    /// `#[serde(default)]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not contain valid
    /// JSON matching the [`Config`] structure.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("parsing config from {}", path.display()))
    }

    /// Attempts to load configuration from `streamscribe.config.json` in the
    /// current directory, falling back to defaults when the file is absent.
    ///
    /// Returns the path the configuration was loaded from, or [`None`] when
    /// defaults were used.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or
    /// parsed.
    pub fn load_or_default() -> Result<(Self, Option<PathBuf>)> {
        let default_path = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default_path.exists() {
            let config = Self::from_file(&default_path)?;
            Ok((config, Some(default_path)))
        } else {
            Ok((Self::default(), None))
        }
    }

    /// Checks the chunking parameters, failing fast on combinations that
    /// cannot produce an advancing chunk sequence.
    ///
    /// # Examples
    ///
    /// ```
    /// use streamscribe::Config;
    ///
    /// let mut config = Config::default();
    /// config.overlap_sec = config.chunk_len_sec;
    /// assert!(config.validate().is_err());
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if `chunk_len_sec` is not positive, `overlap_sec` is
    /// negative or not smaller than `chunk_len_sec`, the sample rate or
    /// frame size is zero, or the derived per-chunk sample count exceeds
    /// the supported maximum.
    pub fn validate(&self) -> Result<()> {
        if !self.chunk_len_sec.is_finite() || self.chunk_len_sec <= 0.0 {
            bail!(
                "chunk_len_sec must be a positive number of seconds, got {}",
                self.chunk_len_sec
            );
        }
        if !self.overlap_sec.is_finite() || self.overlap_sec < 0.0 {
            bail!(
                "overlap_sec must be zero or a positive number of seconds, got {}",
                self.overlap_sec
            );
        }
        if self.overlap_sec >= self.chunk_len_sec {
            bail!(
                "overlap_sec ({}) must be smaller than chunk_len_sec ({}); an \
                 equal or larger overlap would never advance past old audio",
                self.overlap_sec,
                self.chunk_len_sec
            );
        }
        if self.sample_rate_hz == 0 {
            bail!("sample_rate_hz must be non-zero");
        }
        if self.chunk_frame_size == 0 {
            bail!("chunk_frame_size must be non-zero");
        }
        if self.chunk_samples() > MAX_CHUNK_SAMPLES {
            bail!(
                "chunk_len_sec ({}) at {} Hz works out to {} samples per chunk, \
                 more than the supported maximum of {}",
                self.chunk_len_sec,
                self.sample_rate_hz,
                self.chunk_samples(),
                MAX_CHUNK_SAMPLES
            );
        }
        Ok(())
    }

    /// Number of samples in one chunk at the configured rate.
    pub fn chunk_samples(&self) -> usize {
        (self.chunk_len_sec * self.sample_rate_hz as f64).round() as usize
    }

    /// Number of samples shared between consecutive chunks.
    pub fn overlap_samples(&self) -> usize {
        (self.overlap_sec * self.sample_rate_hz as f64).round() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunk_samples(), 64_000);
        assert_eq!(config.overlap_samples(), 16_000);
    }

    #[test]
    fn rejects_overlap_not_smaller_than_chunk() {
        let mut config = Config::default();
        config.overlap_sec = config.chunk_len_sec;
        assert!(config.validate().is_err());

        config.overlap_sec = config.chunk_len_sec + 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_negative_overlap_and_zero_chunk() {
        let mut config = Config::default();
        config.overlap_sec = -0.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.chunk_len_sec = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_overlap_is_valid() {
        let mut config = Config::default();
        config.overlap_sec = 0.0;
        assert!(config.validate().is_ok());
        assert_eq!(config.overlap_samples(), 0);
    }

    #[test]
    fn rejects_zero_rate_and_frame_size() {
        let mut config = Config::default();
        config.sample_rate_hz = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.chunk_frame_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_chunk_durations_too_large_to_buffer() {
        // A finite but absurd duration saturates the sample conversion;
        // validation has to catch it before the assembler sizes a buffer.
        let mut config = Config::default();
        config.chunk_len_sec = 1e16;
        assert_eq!(config.chunk_samples(), usize::MAX);
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"chunk_len_sec": 6.0, "model_name": "whisper-large"}"#)
                .unwrap();
        assert_eq!(config.chunk_len_sec, 6.0);
        assert_eq!(config.model_name, "whisper-large");
        assert_eq!(config.overlap_sec, 1.0);
        assert_eq!(config.sample_rate_hz, 16_000);
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn fractional_durations_round_to_samples() {
        let config = Config {
            chunk_len_sec: 0.75,
            overlap_sec: 0.25,
            sample_rate_hz: 8_000,
            ..Config::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.chunk_samples(), 6_000);
        assert_eq!(config.overlap_samples(), 2_000);
    }
}
