//! Energy-based utterance endpointing
//!
//! Segments one spoken question out of a microphone stream: wait for speech
//! to start, accumulate it, and finish on trailing silence. Pure state
//! machine so it can be tested without audio hardware.

/// Minimum RMS energy to consider a chunk speech
const ENERGY_THRESHOLD: f32 = 0.02;

/// Minimum speech length for a valid utterance (0.3 s at 16 kHz)
const MIN_SPEECH_SAMPLES: usize = 4800;

/// Trailing silence that ends an utterance (0.7 s at 16 kHz)
const TRAILING_SILENCE_SAMPLES: usize = 11200;

/// Give up if no speech starts within this budget (6 s at 16 kHz)
const MAX_LEADING_SAMPLES: usize = 96_000;

/// Hard cap on utterance length (15 s at 16 kHz)
const MAX_UTTERANCE_SAMPLES: usize = 240_000;

/// Endpointing progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    /// Waiting for speech to begin
    Waiting,
    /// Speech detected, accumulating the utterance
    Capturing,
    /// Utterance complete (speech followed by trailing silence)
    Complete,
    /// No usable speech within the time budget
    TimedOut,
}

/// Segments a single utterance from streamed audio chunks
pub struct Endpointer {
    state: EndpointState,
    buffer: Vec<f32>,
    silence_run: usize,
    leading_samples: usize,
}

impl Default for Endpointer {
    fn default() -> Self {
        Self::new()
    }
}

impl Endpointer {
    /// Create an endpointer waiting for speech
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: EndpointState::Waiting,
            buffer: Vec::new(),
            silence_run: 0,
            leading_samples: 0,
        }
    }

    /// Feed a chunk of mono samples; returns the updated state
    pub fn push(&mut self, samples: &[f32]) -> EndpointState {
        if matches!(self.state, EndpointState::Complete | EndpointState::TimedOut) {
            return self.state;
        }

        let is_speech = rms_energy(samples) > ENERGY_THRESHOLD;

        match self.state {
            EndpointState::Waiting => {
                if is_speech {
                    self.state = EndpointState::Capturing;
                    self.buffer.extend_from_slice(samples);
                    self.silence_run = 0;
                    tracing::trace!(samples = samples.len(), "speech started");
                } else {
                    self.leading_samples += samples.len();
                    if self.leading_samples > MAX_LEADING_SAMPLES {
                        tracing::debug!("no speech detected within budget");
                        self.state = EndpointState::TimedOut;
                    }
                }
            }
            EndpointState::Capturing => {
                self.buffer.extend_from_slice(samples);

                if is_speech {
                    self.silence_run = 0;
                } else {
                    self.silence_run += samples.len();
                }

                if self.silence_run > TRAILING_SILENCE_SAMPLES
                    && self.buffer.len() - self.silence_run > MIN_SPEECH_SAMPLES
                {
                    tracing::debug!(samples = self.buffer.len(), "utterance complete");
                    self.state = EndpointState::Complete;
                } else if self.buffer.len() > MAX_UTTERANCE_SAMPLES {
                    tracing::debug!("utterance hit length cap");
                    self.state = EndpointState::Complete;
                } else if self.silence_run > TRAILING_SILENCE_SAMPLES {
                    // Too little speech before the silence; keep waiting
                    self.buffer.clear();
                    self.silence_run = 0;
                    self.state = EndpointState::Waiting;
                }
            }
            EndpointState::Complete | EndpointState::TimedOut => {}
        }

        self.state
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> EndpointState {
        self.state
    }

    /// Take the captured utterance, leaving the endpointer empty
    pub fn take_utterance(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.buffer)
    }
}

/// RMS energy of a chunk
#[allow(clippy::cast_precision_loss)]
fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::SAMPLE_RATE;

    fn sine(duration_secs: f32, amplitude: f32) -> Vec<f32> {
        let n = (SAMPLE_RATE as f32 * duration_secs) as usize;
        (0..n)
            .map(|i| {
                let t = i as f32 / SAMPLE_RATE as f32;
                amplitude * (2.0 * std::f32::consts::PI * 440.0 * t).sin()
            })
            .collect()
    }

    fn silence(duration_secs: f32) -> Vec<f32> {
        vec![0.0; (SAMPLE_RATE as f32 * duration_secs) as usize]
    }

    #[test]
    fn energy_distinguishes_speech_from_silence() {
        assert!(rms_energy(&silence(0.1)) < 0.001);
        assert!(rms_energy(&sine(0.1, 0.3)) > ENERGY_THRESHOLD);
        assert!(rms_energy(&[]) < f32::EPSILON);
    }

    #[test]
    fn waits_through_leading_silence() {
        let mut endpointer = Endpointer::new();
        assert_eq!(endpointer.push(&silence(0.5)), EndpointState::Waiting);
        assert_eq!(endpointer.push(&sine(0.2, 0.3)), EndpointState::Capturing);
    }

    #[test]
    fn speech_then_silence_completes() {
        let mut endpointer = Endpointer::new();
        endpointer.push(&sine(0.8, 0.3));
        assert_eq!(endpointer.push(&silence(0.8)), EndpointState::Complete);

        let utterance = endpointer.take_utterance();
        assert!(utterance.len() > MIN_SPEECH_SAMPLES);
    }

    #[test]
    fn short_blip_resets_to_waiting() {
        let mut endpointer = Endpointer::new();
        endpointer.push(&sine(0.1, 0.3));
        assert_eq!(endpointer.push(&silence(1.0)), EndpointState::Waiting);
    }

    #[test]
    fn times_out_without_speech() {
        let mut endpointer = Endpointer::new();
        let mut state = EndpointState::Waiting;
        for _ in 0..8 {
            state = endpointer.push(&silence(1.0));
        }
        assert_eq!(state, EndpointState::TimedOut);
    }

    #[test]
    fn complete_state_is_terminal() {
        let mut endpointer = Endpointer::new();
        endpointer.push(&sine(0.8, 0.3));
        endpointer.push(&silence(0.8));
        let captured = endpointer.state();
        assert_eq!(captured, EndpointState::Complete);
        assert_eq!(endpointer.push(&sine(0.5, 0.3)), EndpointState::Complete);
    }

    #[test]
    fn caps_runaway_utterances() {
        let mut endpointer = Endpointer::new();
        let mut state = EndpointState::Waiting;
        for _ in 0..20 {
            state = endpointer.push(&sine(1.0, 0.3));
        }
        assert_eq!(state, EndpointState::Complete);
    }
}
