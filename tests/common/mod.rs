//! Shared test doubles for session tests
//!
//! All fakes are clone-handles around shared inner state so tests keep a
//! reference after handing ownership to the controller. The backend gate
//! (a zero-permit semaphore) lets tests hold a call in flight and release
//! it deterministically.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{Semaphore, mpsc};

use lookout::backend::RemoteAssistant;
use lookout::camera::{Frame, FrameSource};
use lookout::session::SessionEvent;
use lookout::speech::{SpeechOutput, Utterance};
use lookout::voice::VoiceInput;
use lookout::{Error, Result};

/// Large permit count that never blocks
const UNGATED: usize = 1 << 20;

/// Scripted remote assistant
pub struct FakeBackend {
    /// Calls that reached `analyze_scene`
    pub analyze_calls: AtomicUsize,
    /// Calls that reached `ask_question`
    pub ask_calls: AtomicUsize,
    /// Make analysis calls fail
    pub fail_analysis: AtomicBool,
    /// Make question calls fail
    pub fail_answers: AtomicBool,
    gate: Semaphore,
}

impl FakeBackend {
    fn with_permits(permits: usize) -> Arc<Self> {
        Arc::new(Self {
            analyze_calls: AtomicUsize::new(0),
            ask_calls: AtomicUsize::new(0),
            fail_analysis: AtomicBool::new(false),
            fail_answers: AtomicBool::new(false),
            gate: Semaphore::new(permits),
        })
    }

    /// Backend that answers immediately
    pub fn new() -> Arc<Self> {
        Self::with_permits(UNGATED)
    }

    /// Backend whose calls block until [`release`](Self::release)
    pub fn gated() -> Arc<Self> {
        Self::with_permits(0)
    }

    /// Let one blocked call through
    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    pub fn analyze_calls(&self) -> usize {
        self.analyze_calls.load(Ordering::SeqCst)
    }

    pub fn ask_calls(&self) -> usize {
        self.ask_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteAssistant for FakeBackend {
    async fn analyze_scene(&self, _image_data: &str, _client_id: &str) -> Result<String> {
        let n = self.analyze_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.gate.acquire().await.expect("gate closed").forget();

        if self.fail_analysis.load(Ordering::SeqCst) {
            Err(Error::Analysis("vision service unavailable".to_string()))
        } else {
            Ok(format!("a quiet room, scan {n}"))
        }
    }

    async fn ask_question(&self, question: &str, _client_id: &str) -> Result<String> {
        self.ask_calls.fetch_add(1, Ordering::SeqCst);
        self.gate.acquire().await.expect("gate closed").forget();

        if self.fail_answers.load(Ordering::SeqCst) {
            Err(Error::Answer("answer service unavailable".to_string()))
        } else {
            Ok(format!("about \"{question}\": nothing out of the ordinary"))
        }
    }
}

#[derive(Default)]
struct CameraInner {
    captures: AtomicUsize,
    releases: AtomicUsize,
    fail: AtomicBool,
}

/// Frame source that serves a canned JPEG header
#[derive(Clone, Default)]
pub struct FakeCamera {
    inner: Arc<CameraInner>,
}

impl FakeCamera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn captures(&self) -> usize {
        self.inner.captures.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.inner.releases.load(Ordering::SeqCst)
    }

    /// Make subsequent captures fail
    pub fn break_camera(&self) {
        self.inner.fail.store(true, Ordering::SeqCst);
    }

    /// Make subsequent captures succeed again
    pub fn fix_camera(&self) {
        self.inner.fail.store(false, Ordering::SeqCst);
    }
}

impl FrameSource for FakeCamera {
    fn capture(&mut self) -> Result<Frame> {
        if self.inner.fail.load(Ordering::SeqCst) {
            return Err(Error::Camera("device busy".to_string()));
        }
        self.inner.captures.fetch_add(1, Ordering::SeqCst);
        Frame::from_jpeg(vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10])
    }

    fn release(&mut self) {
        self.inner.releases.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum SpeechMode {
    /// Each utterance starts and finishes immediately
    Auto,
    /// Each utterance starts immediately and stays live until finished
    Manual,
    /// Nothing is emitted until the test drives the lifecycle
    Held,
}

struct SpeechInner {
    utterances: Mutex<Vec<(u64, String)>>,
    cancels: AtomicUsize,
    mode: SpeechMode,
    events: Mutex<Option<mpsc::Sender<SessionEvent>>>,
}

/// Speech output that records utterances instead of playing them
///
/// Manual mode keeps an utterance live until [`finish`] so tests can
/// observe arbitration mid-utterance; held mode additionally withholds the
/// started event, exposing the window between dispatch and playback.
///
/// [`finish`]: Self::finish
#[derive(Clone)]
pub struct FakeSpeech {
    inner: Arc<SpeechInner>,
}

impl FakeSpeech {
    fn with_mode(mode: SpeechMode) -> Self {
        Self {
            inner: Arc::new(SpeechInner {
                utterances: Mutex::new(Vec::new()),
                cancels: AtomicUsize::new(0),
                mode,
                events: Mutex::new(None),
            }),
        }
    }

    /// Utterances complete immediately
    pub fn auto() -> Self {
        Self::with_mode(SpeechMode::Auto)
    }

    /// Utterances start immediately and stay live until [`finish`](Self::finish)
    pub fn manual() -> Self {
        Self::with_mode(SpeechMode::Manual)
    }

    /// Utterances emit nothing until the test drives them
    pub fn held() -> Self {
        Self::with_mode(SpeechMode::Held)
    }

    /// Texts passed to `speak`, in order
    pub fn spoken(&self) -> Vec<String> {
        self.inner
            .utterances
            .lock()
            .expect("lock poisoned")
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn cancels(&self) -> usize {
        self.inner.cancels.load(Ordering::SeqCst)
    }

    fn emit(&self, event: SessionEvent) {
        let events = self.inner.events.lock().expect("lock poisoned").clone();
        if let Some(events) = events {
            let _ = events.try_send(event);
        }
    }

    fn id_at(&self, index: usize) -> u64 {
        self.inner.utterances.lock().expect("lock poisoned")[index].0
    }

    fn last_id(&self) -> u64 {
        let utterances = self.inner.utterances.lock().expect("lock poisoned");
        utterances.last().expect("no utterance dispatched").0
    }

    /// Begin playing the dispatched utterance at `index` (held mode)
    pub fn start_at(&self, index: usize) {
        self.emit(SessionEvent::SpeechStarted(self.id_at(index)));
    }

    /// Complete the most recently dispatched utterance
    pub fn finish(&self) {
        self.emit(SessionEvent::SpeechFinished(self.last_id()));
    }

    /// Complete the dispatched utterance at `index`, live or not
    pub fn finish_at(&self, index: usize) {
        self.emit(SessionEvent::SpeechFinished(self.id_at(index)));
    }
}

impl SpeechOutput for FakeSpeech {
    fn speak(&mut self, utterance: Utterance, events: mpsc::Sender<SessionEvent>) {
        self.inner
            .utterances
            .lock()
            .expect("lock poisoned")
            .push((utterance.id, utterance.text));
        *self.inner.events.lock().expect("lock poisoned") = Some(events.clone());

        match self.inner.mode {
            SpeechMode::Auto => {
                let _ = events.try_send(SessionEvent::SpeechStarted(utterance.id));
                let _ = events.try_send(SessionEvent::SpeechFinished(utterance.id));
            }
            SpeechMode::Manual => {
                let _ = events.try_send(SessionEvent::SpeechStarted(utterance.id));
            }
            SpeechMode::Held => {}
        }
    }

    fn cancel(&mut self) {
        self.inner.cancels.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct VoiceInner {
    starts: AtomicUsize,
    cancels: AtomicUsize,
    events: Mutex<Option<mpsc::Sender<SessionEvent>>>,
}

/// Voice input driven by the test instead of a microphone
#[derive(Clone)]
pub struct FakeVoice {
    available: bool,
    inner: Arc<VoiceInner>,
}

impl Default for FakeVoice {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeVoice {
    pub fn new() -> Self {
        Self {
            available: true,
            inner: Arc::new(VoiceInner::default()),
        }
    }

    /// A device without voice capture
    pub fn unavailable() -> Self {
        Self {
            available: false,
            inner: Arc::new(VoiceInner::default()),
        }
    }

    pub fn starts(&self) -> usize {
        self.inner.starts.load(Ordering::SeqCst)
    }

    pub fn cancels(&self) -> usize {
        self.inner.cancels.load(Ordering::SeqCst)
    }

    fn emit(&self, event: SessionEvent) {
        let events = self.inner.events.lock().expect("lock poisoned").clone();
        if let Some(events) = events {
            let _ = events.try_send(event);
        }
    }

    /// The open session heard a question
    pub fn emit_transcript(&self, text: &str) {
        self.emit(SessionEvent::Transcript(text.to_string()));
    }

    /// The open session failed to recognize speech
    pub fn emit_failure(&self, message: &str) {
        self.emit(SessionEvent::RecognitionFailed(message.to_string()));
    }

    /// The open session ended without a transcript
    pub fn emit_end(&self) {
        self.emit(SessionEvent::ListeningEnded);
    }
}

impl VoiceInput for FakeVoice {
    fn available(&self) -> bool {
        self.available
    }

    fn start(&mut self, _locale: &str, events: mpsc::Sender<SessionEvent>) -> Result<()> {
        self.inner.starts.fetch_add(1, Ordering::SeqCst);
        *self.inner.events.lock().expect("lock poisoned") = Some(events);
        Ok(())
    }

    fn cancel(&mut self) {
        self.inner.cancels.fetch_add(1, Ordering::SeqCst);
    }
}
