//! Command-line interface for the streamscribe transcription service.
//!
//! This binary captures the default microphone and prints the running
//! transcript to stdout as it grows. All diagnostics go to stderr, so the
//! transcript stream can be piped or redirected cleanly. See the library
//! documentation for programmatic usage.

use anyhow::{Context, Result};
use std::io::{self, Write};
use std::path::PathBuf;
use streamscribe::{Config, TranscriptionEvent, TranscriptionService};
use tokio::signal;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let config_arg = std::env::args().nth(1);
    let (config, config_path) = load_config(config_arg)?;

    if let Some(path) = config_path.as_deref() {
        info!("loaded configuration from {}", path.display());
    } else {
        info!("using default configuration");
    }

    let api_key = std::env::var("OPENAI_API_KEY").context(
        "OPENAI_API_KEY is not set; an API credential for the transcription \
         service is required",
    )?;

    let mut service = TranscriptionService::new(config, api_key)?;
    let (mut receiver, stream) = service.start().await?;
    info!("transcribing, press Ctrl+C to stop");

    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupt received, stopping capture");
                break;
            }
            event = receiver.recv() => {
                match event {
                    Some(TranscriptionEvent::Transcription { text, .. }) => {
                        if !text.is_empty() {
                            print!(" {text}");
                            io::stdout().flush()?;
                        }
                    }
                    Some(TranscriptionEvent::Error { chunk_id, error }) => {
                        warn!(chunk = chunk_id, %error, "chunk failed");
                    }
                    // Processing ended on its own; nothing more will arrive.
                    None => break,
                }
            }
        }
    }

    // Stop capture, then print any transcriptions merged before the
    // interrupt but still queued on the channel, and only then terminate
    // the line.
    drop(stream);
    for text in drain_pending_text(&mut receiver) {
        print!(" {text}");
    }
    println!();
    io::stdout().flush()?;

    let transcript = service.transcript();
    info!(
        words = transcript.split_whitespace().count(),
        "session ended"
    );

    Ok(())
}

fn load_config(arg_path: Option<String>) -> Result<(Config, Option<PathBuf>)> {
    if let Some(path) = arg_path {
        let path = PathBuf::from(path);
        let config = Config::from_file(&path)?;
        return Ok((config, Some(path)));
    }

    Config::load_or_default()
}

/// Collects the non-empty transcription texts still queued on the event
/// channel after the receive loop stops. Their words are already part of
/// the merged transcript and belong on stdout like any other event.
fn drain_pending_text(receiver: &mut UnboundedReceiver<TranscriptionEvent>) -> Vec<String> {
    let mut pending = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        match event {
            TranscriptionEvent::Transcription { text, .. } => {
                if !text.is_empty() {
                    pending.push(text);
                }
            }
            TranscriptionEvent::Error { chunk_id, error } => {
                warn!(chunk = chunk_id, %error, "chunk failed");
            }
        }
    }
    pending
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    #[test]
    fn merged_text_still_queued_at_shutdown_is_not_lost() {
        let (tx, mut rx) = unbounded_channel();
        tx.send(TranscriptionEvent::Transcription {
            chunk_id: 0,
            text: "the quick brown fox".to_string(),
        })
        .unwrap();
        tx.send(TranscriptionEvent::Transcription {
            chunk_id: 1,
            text: String::new(),
        })
        .unwrap();
        tx.send(TranscriptionEvent::Error {
            chunk_id: 2,
            error: "request timed out".to_string(),
        })
        .unwrap();
        tx.send(TranscriptionEvent::Transcription {
            chunk_id: 3,
            text: "jumps over the lazy dog".to_string(),
        })
        .unwrap();

        let pending = drain_pending_text(&mut rx);
        assert_eq!(pending, vec!["the quick brown fox", "jumps over the lazy dog"]);
    }

    #[test]
    fn drain_stops_cleanly_on_an_empty_channel() {
        let (tx, mut rx) = unbounded_channel::<TranscriptionEvent>();
        drop(tx);
        assert!(drain_pending_text(&mut rx).is_empty());
    }
}
