//! Blocking MP3 decode and speaker playback for synthesized speech

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use crate::{Error, Result};

/// Sample rate of decoded TTS audio
const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Decode MP3 bytes to mono f32 samples
pub(crate) fn decode_mp3(mp3_data: &[u8]) -> Result<Vec<f32>> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if frame.channels == 2 {
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Speech(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(samples)
}

/// Play mono samples to the default output device, applying a volume gain
///
/// Blocks until playback finishes or `cancel` is set. Must not be called on
/// the async runtime; the caller runs it on a blocking thread.
pub(crate) fn play_samples(samples: &[f32], volume: f32, cancel: &Arc<AtomicBool>) -> Result<()> {
    if samples.is_empty() {
        return Ok(());
    }

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

    let supported = device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| {
            c.channels() <= 2
                && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
        })
        .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

    let config: StreamConfig = supported.with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE)).config();
    let channels = config.channels as usize;

    let gained: Arc<Vec<f32>> = Arc::new(samples.iter().map(|s| s * volume).collect());
    let position = Arc::new(AtomicUsize::new(0));
    let position_cb = Arc::clone(&position);
    let source = Arc::clone(&gained);

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut pos = position_cb.load(Ordering::Relaxed);
                for frame in data.chunks_mut(channels) {
                    let sample = source.get(pos).copied().unwrap_or(0.0);
                    for out in frame.iter_mut() {
                        *out = sample;
                    }
                    if pos < source.len() {
                        pos += 1;
                    }
                }
                position_cb.store(pos, Ordering::Relaxed);
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    let total = gained.len();
    #[allow(clippy::cast_possible_truncation)]
    let budget =
        std::time::Duration::from_millis((total as u64 * 1000) / u64::from(PLAYBACK_SAMPLE_RATE) + 500);
    let start = std::time::Instant::now();

    while position.load(Ordering::Relaxed) < total {
        if cancel.load(Ordering::Relaxed) {
            tracing::debug!("playback cancelled");
            break;
        }
        if start.elapsed() > budget {
            tracing::warn!("playback timed out");
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(25));
    }

    drop(stream);
    Ok(())
}
