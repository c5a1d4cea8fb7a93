//! HTTP client for the remote transcription service.
//!
//! One request per chunk: the WAV-encoded audio and the model name go out
//! as a multipart form, the transcribed text comes back as JSON.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Client for an OpenAI-compatible `audio/transcriptions` endpoint.
///
/// Requests carry a hard timeout so a stalled response surfaces to the
/// processing loop as a per-chunk error instead of hanging the session.
///
/// # Examples
///
/// ```no_run
/// use streamscribe::TranscriptionClient;
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let client = TranscriptionClient::new(
///     "https://api.openai.com/v1/audio/transcriptions",
///     "whisper-1",
///     std::env::var("OPENAI_API_KEY")?,
/// )?;
///
/// let wav = std::fs::read("clip.wav")?;
/// let text = client.transcribe(wav, 0).await?;
/// println!("{text}");
/// # Ok(())
/// # }
/// ```
pub struct TranscriptionClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl TranscriptionClient {
    /// Creates a client for the given endpoint, model, and API credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be
    /// initialized (for example when the TLS backend fails to load).
    pub fn new(endpoint: &str, model: &str, api_key: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("building HTTP transcription client")?;
        Ok(Self {
            http,
            endpoint: endpoint.to_owned(),
            model: model.to_owned(),
            api_key,
        })
    }

    /// Sends one encoded chunk and returns its transcribed text, trimmed.
    ///
    /// An empty string means the service heard silence.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure, request timeout, a non-success
    /// HTTP status, or an unparseable response body. All of these are
    /// recoverable per chunk; the caller decides whether to drop or retry.
    pub async fn transcribe(&self, wav: Vec<u8>, chunk_index: usize) -> Result<String> {
        let part = Part::bytes(wav)
            .file_name(format!("chunk-{chunk_index}.wav"))
            .mime_str("audio/wav")?;
        let form = Form::new()
            .text("model", self.model.clone())
            .part("file", part);

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;

        let payload: Value = response.json().await?;
        let text = transcript_text(&payload);
        debug!(chunk = chunk_index, chars = text.len(), "received transcription");
        Ok(text)
    }
}

/// Extracts the transcription from a response payload. A missing or
/// non-string `text` field counts as silence rather than an error.
fn transcript_text(payload: &Value) -> String {
    payload
        .get("text")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}
