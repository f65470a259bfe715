//! Voice input adapters
//!
//! A [`VoiceInput`] captures one spoken question per invocation and reports
//! exactly one of transcript, failure, or end through the session event
//! queue. The shipped implementation records from the default microphone,
//! endpoints a single utterance, and transcribes it via the backend.

pub mod endpoint;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use tokio::sync::mpsc;

use crate::backend::HttpBackend;
use crate::session::SessionEvent;
use crate::{Error, Result};

pub use endpoint::{EndpointState, Endpointer};

/// Sample rate for voice capture (16 kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Captures one spoken question per invocation
///
/// Contract: after a successful `start`, the adapter eventually sends
/// exactly one of `Transcript`, `RecognitionFailed`, or `ListeningEnded`.
/// `cancel` aborts the open session, which then reports `ListeningEnded`.
pub trait VoiceInput: Send + 'static {
    /// Whether voice capture is available on this platform
    fn available(&self) -> bool;

    /// Open a single-utterance (non-continuous) capture session
    ///
    /// # Errors
    ///
    /// Returns error if the capture session cannot be opened
    fn start(&mut self, locale: &str, events: mpsc::Sender<SessionEvent>) -> Result<()>;

    /// Cancel the open session, if any
    fn cancel(&mut self);
}

impl VoiceInput for Box<dyn VoiceInput> {
    fn available(&self) -> bool {
        (**self).available()
    }

    fn start(&mut self, locale: &str, events: mpsc::Sender<SessionEvent>) -> Result<()> {
        (**self).start(locale, events)
    }

    fn cancel(&mut self) {
        (**self).cancel();
    }
}

/// Convert f32 samples to 16-bit WAV bytes for the transcription endpoint
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// Microphone voice input with remote transcription
pub struct MicVoiceInput {
    backend: Arc<HttpBackend>,
    available: bool,
    cancel: Option<Arc<AtomicBool>>,
}

impl MicVoiceInput {
    /// Create a microphone adapter, probing for an input device
    #[must_use]
    pub fn new(backend: Arc<HttpBackend>) -> Self {
        let available = cpal::default_host().default_input_device().is_some();
        if !available {
            tracing::warn!("no microphone found, voice input unavailable");
        }

        Self {
            backend,
            available,
            cancel: None,
        }
    }
}

impl VoiceInput for MicVoiceInput {
    fn available(&self) -> bool {
        self.available
    }

    fn start(&mut self, locale: &str, events: mpsc::Sender<SessionEvent>) -> Result<()> {
        if !self.available {
            return Err(Error::Voice("no input device".to_string()));
        }

        let cancel = Arc::new(AtomicBool::new(false));
        self.cancel = Some(Arc::clone(&cancel));

        let backend = Arc::clone(&self.backend);
        let runtime = tokio::runtime::Handle::current();
        tracing::debug!(locale, "voice session opened");

        // cpal streams aren't Send, so capture runs on its own thread
        std::thread::spawn(move || {
            let outcome = record_utterance(&cancel);

            let event = match outcome {
                Ok(Some(samples)) => match samples_to_wav(&samples, SAMPLE_RATE) {
                    Ok(wav) => match runtime.block_on(backend.transcribe(wav)) {
                        Ok(result) if !result.transcription.trim().is_empty() => {
                            SessionEvent::Transcript(result.transcription.trim().to_string())
                        }
                        Ok(_) => {
                            SessionEvent::RecognitionFailed("no speech recognized".to_string())
                        }
                        Err(e) => SessionEvent::RecognitionFailed(e.to_string()),
                    },
                    Err(e) => SessionEvent::RecognitionFailed(e.to_string()),
                },
                Ok(None) => SessionEvent::ListeningEnded,
                Err(e) => SessionEvent::RecognitionFailed(e.to_string()),
            };

            let _ = events.blocking_send(event);
        });

        Ok(())
    }

    fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.store(true, Ordering::Relaxed);
        }
    }
}

/// Record one endpointed utterance from the default input device
///
/// Blocks until the utterance completes, the wait budget runs out, or
/// `cancel` is set. Returns `None` when nothing usable was captured.
fn record_utterance(cancel: &Arc<AtomicBool>) -> Result<Option<Vec<f32>>> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| Error::Audio("no input device".to_string()))?;

    let supported = device
        .supported_input_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
        })
        .ok_or_else(|| Error::Audio("no suitable input config found".to_string()))?;

    let config: StreamConfig = supported.with_sample_rate(SampleRate(SAMPLE_RATE)).config();

    let buffer: Arc<Mutex<Vec<f32>>> = Arc::new(Mutex::new(Vec::new()));
    let buffer_cb = Arc::clone(&buffer);

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buf) = buffer_cb.lock() {
                    buf.extend_from_slice(data);
                }
            },
            |err| {
                tracing::error!(error = %err, "voice capture error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    let mut endpointer = Endpointer::new();
    loop {
        if cancel.load(Ordering::Relaxed) {
            tracing::debug!("voice session cancelled");
            return Ok(None);
        }

        std::thread::sleep(std::time::Duration::from_millis(50));

        let chunk = buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default();

        match endpointer.push(&chunk) {
            EndpointState::Complete => {
                drop(stream);
                return Ok(Some(endpointer.take_utterance()));
            }
            EndpointState::TimedOut => {
                drop(stream);
                return Ok(None);
            }
            EndpointState::Waiting | EndpointState::Capturing => {}
        }
    }
}

/// Voice input stub for platforms or runs without microphone support
#[derive(Default)]
pub struct NoVoice;

impl VoiceInput for NoVoice {
    fn available(&self) -> bool {
        false
    }

    fn start(&mut self, _locale: &str, _events: mpsc::Sender<SessionEvent>) -> Result<()> {
        Err(Error::Voice("voice input disabled".to_string()))
    }

    fn cancel(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wav_header_is_valid() {
        let samples: Vec<f32> = (0..1600).map(|i| (i as f32 / 100.0).sin() * 0.5).collect();
        let wav = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert!(wav.len() > 44);
    }

    #[test]
    fn wav_roundtrip_preserves_sample_count() {
        let samples: Vec<f32> = vec![0.0, 0.5, -0.5, 1.0, -1.0, 0.25];
        let wav = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

        let mut reader = hound::WavReader::new(std::io::Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, SAMPLE_RATE);
        assert_eq!(reader.spec().channels, 1);
        let read: Vec<i16> = reader.samples::<i16>().map(std::result::Result::unwrap).collect();
        assert_eq!(read.len(), samples.len());
    }

    #[test]
    fn no_voice_rejects_start() {
        let mut voice = NoVoice;
        assert!(!voice.available());
        let (tx, _rx) = mpsc::channel(1);
        assert!(voice.start("en-US", tx).is_err());
    }
}
