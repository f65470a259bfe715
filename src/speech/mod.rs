//! Speech output adapters
//!
//! The controller serializes narration through the [`SpeechOutput`] trait:
//! an adapter accepts one utterance at a time and reports its lifecycle
//! (started, finished, failed) back through the session event queue.

mod playback;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

use crate::config::{SPEECH_PITCH, SPEECH_RATE, SPEECH_VOLUME};
use crate::session::SessionEvent;
use crate::{Error, Result};

/// Fixed narration parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeechParams {
    /// Speaking rate multiplier
    pub rate: f32,
    /// Pitch (fixed; the synthesis backend has no pitch control)
    pub pitch: f32,
    /// Output volume gain
    pub volume: f32,
}

impl Default for SpeechParams {
    fn default() -> Self {
        Self {
            rate: SPEECH_RATE,
            pitch: SPEECH_PITCH,
            volume: SPEECH_VOLUME,
        }
    }
}

/// One narration request
#[derive(Debug, Clone)]
pub struct Utterance {
    /// Controller-assigned id, echoed in every lifecycle event so a
    /// cancelled utterance's late events cannot be mistaken for the
    /// current one's
    pub id: u64,
    /// Text to speak
    pub text: String,
    /// Synthesis parameters
    pub params: SpeechParams,
}

/// Plays one utterance at a time
///
/// Contract: after `speak`, the adapter eventually sends exactly one of
/// `SpeechFinished` or `SpeechFailed`, preceded by `SpeechStarted` when
/// audio actually begins, all tagged with the utterance id. `cancel` stops
/// the current utterance; it is also called defensively before each
/// dispatch to clear stale output.
pub trait SpeechOutput: Send + 'static {
    /// Start playing an utterance, reporting lifecycle events to `events`
    fn speak(&mut self, utterance: Utterance, events: mpsc::Sender<SessionEvent>);

    /// Cancel the current utterance, if any
    fn cancel(&mut self);
}

impl SpeechOutput for Box<dyn SpeechOutput> {
    fn speak(&mut self, utterance: Utterance, events: mpsc::Sender<SessionEvent>) {
        (**self).speak(utterance, events);
    }

    fn cancel(&mut self) {
        (**self).cancel();
    }
}

#[derive(serde::Serialize)]
struct TtsRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f32,
}

/// Speech output backed by remote TTS synthesis and local playback
pub struct SynthesizedSpeech {
    client: reqwest::Client,
    api_key: String,
    voice: String,
    cancel: Option<Arc<AtomicBool>>,
}

impl SynthesizedSpeech {
    /// Create a synthesized speech adapter
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(api_key: String, voice: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for speech output".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice,
            cancel: None,
        })
    }
}

/// Synthesize text to MP3 bytes
async fn synthesize(
    client: &reqwest::Client,
    api_key: &str,
    voice: &str,
    text: &str,
    rate: f32,
) -> Result<Vec<u8>> {
    let request = TtsRequest {
        model: "tts-1",
        input: text,
        voice,
        speed: rate,
    };

    let response = client
        .post("https://api.openai.com/v1/audio/speech")
        .header("Authorization", format!("Bearer {api_key}"))
        .json(&request)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Speech(format!("TTS error {status}: {body}")));
    }

    Ok(response.bytes().await?.to_vec())
}

impl SpeechOutput for SynthesizedSpeech {
    fn speak(&mut self, utterance: Utterance, events: mpsc::Sender<SessionEvent>) {
        let cancel = Arc::new(AtomicBool::new(false));
        self.cancel = Some(Arc::clone(&cancel));

        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let voice = self.voice.clone();

        tokio::spawn(async move {
            let id = utterance.id;
            let mp3 = match synthesize(
                &client,
                &api_key,
                &voice,
                &utterance.text,
                utterance.params.rate,
            )
            .await
            {
                Ok(mp3) => mp3,
                Err(e) => {
                    tracing::warn!(error = %e, "speech synthesis failed");
                    let _ = events.send(SessionEvent::SpeechFailed(id, e.to_string())).await;
                    return;
                }
            };

            if cancel.load(Ordering::Relaxed) {
                let _ = events.send(SessionEvent::SpeechFinished(id)).await;
                return;
            }

            let _ = events.send(SessionEvent::SpeechStarted(id)).await;

            let volume = utterance.params.volume;
            let played = tokio::task::spawn_blocking(move || {
                let samples = playback::decode_mp3(&mp3)?;
                playback::play_samples(&samples, volume, &cancel)
            })
            .await;

            let event = match played {
                Ok(Ok(())) => SessionEvent::SpeechFinished(id),
                Ok(Err(e)) => SessionEvent::SpeechFailed(id, e.to_string()),
                Err(e) => SessionEvent::SpeechFailed(id, format!("playback task failed: {e}")),
            };
            let _ = events.send(event).await;
        });
    }

    fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.store(true, Ordering::Relaxed);
        }
    }
}

/// No-op speech output for headless runs without a synthesis key
///
/// Reports each utterance as immediately started and finished so the
/// controller's arbitration still exercises the same transitions.
#[derive(Default)]
pub struct MutedSpeech;

impl SpeechOutput for MutedSpeech {
    fn speak(&mut self, utterance: Utterance, events: mpsc::Sender<SessionEvent>) {
        tracing::debug!(text = %utterance.text, "speech muted");
        tokio::spawn(async move {
            let _ = events.send(SessionEvent::SpeechStarted(utterance.id)).await;
            let _ = events.send(SessionEvent::SpeechFinished(utterance.id)).await;
        });
    }

    fn cancel(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_match_fixed_contract() {
        let params = SpeechParams::default();
        assert!((params.rate - 0.9).abs() < f32::EPSILON);
        assert!((params.pitch - 1.0).abs() < f32::EPSILON);
        assert!((params.volume - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn synthesized_speech_requires_key() {
        assert!(SynthesizedSpeech::new(String::new(), "alloy".to_string()).is_err());
        assert!(SynthesizedSpeech::new("sk-test".to_string(), "alloy".to_string()).is_ok());
    }

    #[test]
    fn tts_request_shape() {
        let request = TtsRequest {
            model: "tts-1",
            input: "hello",
            voice: "alloy",
            speed: 0.9,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "tts-1");
        assert_eq!(json["voice"], "alloy");
    }
}
