//! Audio capture and encoding utilities.
//!
//! This module provides low-level audio capture from system input devices,
//! conversion to mono at the configured sample rate, and encoding to WAV
//! format for API transmission.

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, SampleFormat, Stream, StreamConfig, SupportedBufferSize};
use hound::{SampleFormat as HoundSampleFormat, WavSpec, WavWriter};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use std::io::Cursor;
use tracing::warn;

/// Audio stream configuration parameters.
///
/// Contains the sample rate and channel count detected from the input device.
pub struct AudioConfig {
    /// Sample rate in Hz (e.g., 44100, 48000)
    pub sample_rate: u32,
    /// Number of audio channels (1 for mono, 2 for stereo)
    pub channels: u16,
}

/// Starts capturing audio from the default system input device.
///
/// This function initializes the audio input stream and begins sending
/// captured audio samples to the provided channel. All samples are normalized
/// to f32 values in the range [-1.0, 1.0] regardless of the input device's
/// native format; they arrive interleaved at the device's own rate and
/// channel count (see [`downmix_mono`] and [`BlockResampler`] for conversion).
///
/// `frame_size` is the requested capture buffer granularity in frames. It is
/// clamped to the device's supported range, or ignored when the device does
/// not report one. If the backend refuses the fixed size outright, the
/// stream is built again with the device's default buffer size.
///
/// The returned [`Stream`] must be kept alive for audio capture to continue.
/// Dropping the stream will stop audio capture.
///
/// # Errors
///
/// Returns an error if:
/// - No default input device is available
/// - The input device configuration cannot be retrieved
/// - The audio stream cannot be created or started
/// - The input device uses an unsupported sample format
pub(crate) fn start_audio_capture(
    sender: tokio::sync::mpsc::UnboundedSender<Vec<f32>>,
    frame_size: usize,
) -> Result<(Stream, AudioConfig)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .context("Unable to find a default input device")?;

    let input_config = device
        .default_input_config()
        .context("Failed to fetch the default input configuration")?;

    let mut stream_config: StreamConfig = input_config.clone().into();
    stream_config.buffer_size = requested_buffer_size(input_config.buffer_size(), frame_size);
    let sample_format = input_config.sample_format();

    let audio_config = AudioConfig {
        sample_rate: stream_config.sample_rate.0,
        channels: stream_config.channels,
    };

    let stream = match build_capture_stream(&device, &stream_config, sample_format, sender.clone())
    {
        Ok(stream) => stream,
        // Some backends report a buffer-size range but still refuse a fixed
        // size at stream creation.
        Err(err) if should_retry_with_default(&stream_config, &err) => {
            warn!("capture buffer of {frame_size} frames rejected ({err}), using the device default");
            stream_config.buffer_size = BufferSize::Default;
            build_capture_stream(&device, &stream_config, sample_format, sender)?
        }
        Err(err) => return Err(err),
    };

    stream
        .play()
        .context("Failed to start the audio input stream")?;

    Ok((stream, audio_config))
}

fn requested_buffer_size(supported: &SupportedBufferSize, frame_size: usize) -> BufferSize {
    match supported {
        SupportedBufferSize::Range { min, max } => {
            BufferSize::Fixed((frame_size as u32).clamp(*min, *max))
        }
        SupportedBufferSize::Unknown => BufferSize::Default,
    }
}

fn build_capture_stream(
    device: &Device,
    config: &StreamConfig,
    sample_format: SampleFormat,
    sender: tokio::sync::mpsc::UnboundedSender<Vec<f32>>,
) -> Result<Stream> {
    let stream = match sample_format {
        SampleFormat::F32 => {
            let err_fn = move |err| warn!("input stream error: {err}");
            device.build_input_stream(
                config,
                move |data: &[f32], _| send_samples_f32(data, &sender),
                err_fn,
                None,
            )?
        }
        SampleFormat::I16 => {
            let err_fn = move |err| warn!("input stream error: {err}");
            device.build_input_stream(
                config,
                move |data: &[i16], _| send_samples_i16(data, &sender),
                err_fn,
                None,
            )?
        }
        SampleFormat::U16 => {
            let err_fn = move |err| warn!("input stream error: {err}");
            device.build_input_stream(
                config,
                move |data: &[u16], _| send_samples_u16(data, &sender),
                err_fn,
                None,
            )?
        }
        _ => {
            return Err(anyhow!(
                "input sample format {:?} is not supported",
                sample_format
            ));
        }
    };
    Ok(stream)
}

/// True only for stream-construction failures of a fixed-size request;
/// unsupported formats and other errors stay fatal.
fn should_retry_with_default(config: &StreamConfig, err: &anyhow::Error) -> bool {
    matches!(config.buffer_size, BufferSize::Fixed(_))
        && err.downcast_ref::<cpal::BuildStreamError>().is_some()
}

fn send_samples_f32(input: &[f32], sender: &tokio::sync::mpsc::UnboundedSender<Vec<f32>>) {
    let _ = sender.send(input.to_vec());
}

fn send_samples_i16(input: &[i16], sender: &tokio::sync::mpsc::UnboundedSender<Vec<f32>>) {
    let mut buffer = Vec::with_capacity(input.len());
    let scale = 1.0 / i16::MAX as f32;
    for sample in input {
        buffer.push((*sample as f32) * scale);
    }
    let _ = sender.send(buffer);
}

fn send_samples_u16(input: &[u16], sender: &tokio::sync::mpsc::UnboundedSender<Vec<f32>>) {
    let mut buffer = Vec::with_capacity(input.len());
    const MIDPOINT: f32 = 32768.0;
    for sample in input {
        buffer.push(((*sample as f32) - MIDPOINT) / MIDPOINT);
    }
    let _ = sender.send(buffer);
}

/// Averages interleaved multi-channel samples down to mono.
pub(crate) fn downmix_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    let channels = channels.max(1) as usize;
    if channels == 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Streaming resampler from the device rate to the configured capture rate.
///
/// Wraps [`FastFixedIn`], which consumes fixed-size input blocks: incoming
/// samples are buffered until a whole block is available, and the remainder
/// is carried over to the next call. When the device already runs at the
/// target rate the input passes through untouched.
pub(crate) struct BlockResampler {
    inner: Option<FastFixedIn<f32>>,
    pending: Vec<f32>,
    block_size: usize,
}

impl BlockResampler {
    /// # Errors
    ///
    /// Returns an error if the resampler cannot be constructed for the given
    /// rate pair (e.g. a zero rate).
    pub(crate) fn new(device_rate: u32, target_rate: u32, block_size: usize) -> Result<Self> {
        let inner = if device_rate == target_rate {
            None
        } else {
            Some(FastFixedIn::new(
                target_rate as f64 / device_rate as f64,
                10.,
                PolynomialDegree::Septic,
                block_size,
                1,
            )?)
        };
        Ok(Self {
            inner,
            pending: Vec::new(),
            block_size,
        })
    }

    /// Feeds mono samples at the device rate and returns whatever whole
    /// blocks could be converted to the target rate. May return an empty
    /// vector while a block is still filling.
    pub(crate) fn push(&mut self, samples: &[f32]) -> Result<Vec<f32>> {
        let Some(resampler) = self.inner.as_mut() else {
            return Ok(samples.to_vec());
        };

        self.pending.extend_from_slice(samples);

        let mut resampled = Vec::new();
        let full_blocks = self.pending.len() / self.block_size;
        for block in 0..full_blocks {
            let slice = &self.pending[block * self.block_size..(block + 1) * self.block_size];
            let output = resampler
                .process(&[slice], None)
                .context("resampling captured audio")?;
            resampled.extend_from_slice(&output[0]);
        }

        let remainder = self.pending.len() % self.block_size;
        if remainder == 0 {
            self.pending.clear();
        } else {
            self.pending.copy_within(full_blocks * self.block_size.., 0);
            self.pending.truncate(remainder);
        }

        Ok(resampled)
    }
}

/// Encodes audio samples into WAV format suitable for API transmission.
///
/// Converts normalized f32 samples (range [-1.0, 1.0]) into a complete WAV
/// file with 16-bit integer samples. The output is returned as a byte vector
/// ready to be sent via HTTP multipart requests.
///
/// # Errors
///
/// Returns an error if the WAV encoding fails (very rare, typically only
/// on out-of-memory conditions).
pub(crate) fn encode_wav(samples: &[f32], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: HoundSampleFormat::Int,
    };
    let mut buffer = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut buffer, spec)?;
        for &sample in samples {
            let clipped = sample.clamp(-1.0, 1.0);
            let amplitude = (clipped * i16::MAX as f32) as i16;
            writer.write_sample(amplitude)?;
        }
        writer.finalize()?;
    }
    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpal::SampleRate;

    #[test]
    fn requested_buffer_size_clamps_to_the_supported_range() {
        let range = SupportedBufferSize::Range { min: 256, max: 4096 };
        assert!(matches!(
            requested_buffer_size(&range, 1024),
            BufferSize::Fixed(1024)
        ));
        assert!(matches!(
            requested_buffer_size(&range, 64),
            BufferSize::Fixed(256)
        ));
        assert!(matches!(
            requested_buffer_size(&range, 1 << 20),
            BufferSize::Fixed(4096)
        ));
        assert!(matches!(
            requested_buffer_size(&SupportedBufferSize::Unknown, 1024),
            BufferSize::Default
        ));
    }

    #[test]
    fn fixed_buffer_build_failures_fall_back_to_the_device_default() {
        let fixed = StreamConfig {
            channels: 1,
            sample_rate: SampleRate(16_000),
            buffer_size: BufferSize::Fixed(1024),
        };
        let default = StreamConfig {
            buffer_size: BufferSize::Default,
            ..fixed.clone()
        };
        let refused = anyhow::Error::from(cpal::BuildStreamError::StreamConfigNotSupported);
        let unrelated = anyhow!("input sample format F64 is not supported");

        assert!(should_retry_with_default(&fixed, &refused));
        // Already on the default size, or a non-construction error: fatal.
        assert!(!should_retry_with_default(&default, &refused));
        assert!(!should_retry_with_default(&fixed, &unrelated));
    }

    #[test]
    fn downmix_averages_interleaved_frames() {
        let stereo = vec![0.2, 0.4, -1.0, 1.0, 0.5, 0.5];
        let mono = downmix_mono(&stereo, 2);
        assert_eq!(mono.len(), 3);
        assert!((mono[0] - 0.3).abs() < 1e-6);
        assert!((mono[1] - 0.0).abs() < 1e-6);
        assert!((mono[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn downmix_passes_mono_through() {
        let samples = vec![0.1, -0.2, 0.3];
        assert_eq!(downmix_mono(&samples, 1), samples);
    }

    #[test]
    fn resampler_is_identity_when_rates_match() {
        let mut resampler = BlockResampler::new(16_000, 16_000, 1024).unwrap();
        let samples = vec![0.25f32; 300];
        let out = resampler.push(&samples).unwrap();
        assert_eq!(out, samples);
    }

    #[test]
    fn resampler_buffers_until_a_block_is_full() {
        let mut resampler = BlockResampler::new(32_000, 16_000, 1024).unwrap();

        // 1000 samples is less than one block so nothing comes out yet.
        let out = resampler.push(&vec![0.1f32; 1000]).unwrap();
        assert!(out.is_empty());

        // 600 more completes one block (1024) with 576 left pending; output
        // is one block's worth at half the rate.
        let out = resampler.push(&vec![0.1f32; 600]).unwrap();
        assert!((500..=524).contains(&out.len()), "got {}", out.len());
    }

    #[test]
    fn encode_wav_produces_header_and_samples() {
        let samples = vec![0.0f32, 0.5, -0.5, 1.0];
        let wav = encode_wav(&samples, 16_000, 1).unwrap();
        // 44-byte canonical PCM header plus two bytes per 16-bit sample.
        assert_eq!(wav.len(), 44 + samples.len() * 2);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
    }
}
