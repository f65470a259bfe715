//! The multimodal session controller
//!
//! One controller task owns all session state and coordinates four
//! mutually-interfering operations: periodic scene analysis, voice input,
//! question answering, and speech output. Commands from the [`SessionHandle`]
//! and completions from spawned work arrive on a single event queue, so no
//! state is ever shared across tasks. Observable state is published as a
//! [`StatusSnapshot`] through a `watch` channel after every event.

pub mod state;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::backend::RemoteAssistant;
use crate::camera::FrameSource;
use crate::speech::{SpeechOutput, SpeechParams, Utterance};
use crate::voice::VoiceInput;
use crate::{Error, Result};

pub use state::{
    AnalysisResult, ListeningState, Notice, NoticeKind, QuestionState, ScanState, SpeechState,
    StatusSnapshot,
};

/// Fixed fallback answer when question answering fails
pub const ANSWER_FALLBACK: &str =
    "Sorry, I'm having trouble answering questions right now. Please try again.";

/// Event queue depth
const EVENT_QUEUE_DEPTH: usize = 32;

/// Everything the controller reacts to: user commands, scan timer ticks,
/// and completions reported by spawned work and adapters
#[derive(Debug)]
pub enum SessionEvent {
    /// Begin continuous scanning
    StartScanning,
    /// Stop continuous scanning
    StopScanning,
    /// Run one manual scene analysis
    AnalyzeNow,
    /// Re-probe the camera after a failure
    RetryCamera,
    /// Open a voice input session
    StartListening,
    /// Cancel the open voice input session
    StopListening,
    /// Ask a typed question through the same pipeline as spoken ones
    Ask(String),
    /// Cancel the current utterance unconditionally
    StopSpeaking,
    /// Tear the session down
    Shutdown,

    /// Recurring scan timer fired
    ScanTick,
    /// Scene analysis completed
    AnalysisDone(Result<String>),
    /// Voice session produced a transcript
    Transcript(String),
    /// Voice session failed (no speech, permission, transport)
    RecognitionFailed(String),
    /// Voice session ended without a transcript
    ListeningEnded,
    /// Question answering completed
    AnswerDone(Result<String>),
    /// An utterance began playing; carries the utterance id so events
    /// from a cancelled, superseded utterance can be told apart
    SpeechStarted(u64),
    /// An utterance finished
    SpeechFinished(u64),
    /// An utterance failed
    SpeechFailed(u64, String),
}

/// Tunable session options
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Period between continuous scans
    pub scan_interval: Duration,
    /// Speech recognition locale
    pub locale: String,
    /// Narration parameters
    pub speech: SpeechParams,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(crate::config::DEFAULT_SCAN_INTERVAL_SECS),
            locale: "en-US".to_string(),
            speech: SpeechParams::default(),
        }
    }
}

/// Cloneable handle for driving a running controller
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionEvent>,
    status: watch::Receiver<StatusSnapshot>,
}

impl SessionHandle {
    async fn send(&self, event: SessionEvent) -> Result<()> {
        self.tx.send(event).await.map_err(|_| Error::Closed)
    }

    /// Begin continuous scanning
    ///
    /// # Errors
    ///
    /// Returns error if the session has been torn down
    pub async fn start_scanning(&self) -> Result<()> {
        self.send(SessionEvent::StartScanning).await
    }

    /// Stop continuous scanning
    ///
    /// # Errors
    ///
    /// Returns error if the session has been torn down
    pub async fn stop_scanning(&self) -> Result<()> {
        self.send(SessionEvent::StopScanning).await
    }

    /// Run one manual scene analysis
    ///
    /// # Errors
    ///
    /// Returns error if the session has been torn down
    pub async fn analyze_now(&self) -> Result<()> {
        self.send(SessionEvent::AnalyzeNow).await
    }

    /// Re-probe the camera after a failure
    ///
    /// # Errors
    ///
    /// Returns error if the session has been torn down
    pub async fn retry_camera(&self) -> Result<()> {
        self.send(SessionEvent::RetryCamera).await
    }

    /// Open a voice input session for one spoken question
    ///
    /// # Errors
    ///
    /// Returns error if the session has been torn down
    pub async fn start_listening(&self) -> Result<()> {
        self.send(SessionEvent::StartListening).await
    }

    /// Cancel the open voice input session
    ///
    /// # Errors
    ///
    /// Returns error if the session has been torn down
    pub async fn stop_listening(&self) -> Result<()> {
        self.send(SessionEvent::StopListening).await
    }

    /// Ask a typed question about the last analyzed scene
    ///
    /// # Errors
    ///
    /// Returns error if the session has been torn down
    pub async fn ask(&self, question: impl Into<String>) -> Result<()> {
        self.send(SessionEvent::Ask(question.into())).await
    }

    /// Stop the current utterance unconditionally
    ///
    /// # Errors
    ///
    /// Returns error if the session has been torn down
    pub async fn stop_speaking(&self) -> Result<()> {
        self.send(SessionEvent::StopSpeaking).await
    }

    /// Tear the session down
    ///
    /// # Errors
    ///
    /// Returns error if the session has already been torn down
    pub async fn shutdown(&self) -> Result<()> {
        self.send(SessionEvent::Shutdown).await
    }

    /// Subscribe to state snapshots
    #[must_use]
    pub fn status(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.clone()
    }
}

/// The session controller
///
/// Create with [`SessionController::new`], then drive [`run`](Self::run) to
/// completion on the runtime. The paired [`SessionHandle`] is the only way
/// to interact with a running session.
pub struct SessionController {
    client_id: String,
    options: SessionOptions,

    backend: Arc<dyn RemoteAssistant>,
    frames: Option<Box<dyn FrameSource>>,
    voice: Box<dyn VoiceInput>,
    speech_out: Box<dyn SpeechOutput>,

    rx: mpsc::Receiver<SessionEvent>,
    // Weak so that dropping every handle closes the queue and ends the session
    tx: mpsc::WeakSender<SessionEvent>,
    status_tx: watch::Sender<StatusSnapshot>,

    scan: ScanState,
    scan_timer: Option<JoinHandle<()>>,
    analysis_in_flight: bool,
    analysis: Option<AnalysisResult>,
    listening: ListeningState,
    question: QuestionState,
    speech: SpeechState,
    utterance_dispatched: bool,
    // Monotonic utterance id; lifecycle events for any other id are stale
    utterance_seq: u64,
    camera_error: Option<String>,
    notice: Option<Notice>,
    alive: bool,
}

impl SessionController {
    /// Create a controller and its handle
    ///
    /// The client identifier is generated once here and correlates
    /// server-side per-client context (the last analyzed scene) for the
    /// whole session.
    #[must_use]
    pub fn new(
        backend: Arc<dyn RemoteAssistant>,
        frames: Box<dyn FrameSource>,
        voice: Box<dyn VoiceInput>,
        speech_out: Box<dyn SpeechOutput>,
        options: SessionOptions,
    ) -> (Self, SessionHandle) {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let (status_tx, status_rx) = watch::channel(StatusSnapshot::default());
        let client_id = Uuid::new_v4().to_string();

        tracing::info!(client_id, "session created");

        let controller = Self {
            client_id,
            options,
            backend,
            frames: Some(frames),
            voice,
            speech_out,
            rx,
            tx: tx.downgrade(),
            status_tx,
            scan: ScanState::Idle,
            scan_timer: None,
            analysis_in_flight: false,
            analysis: None,
            listening: ListeningState::Idle,
            question: QuestionState::default(),
            speech: SpeechState::Silent,
            utterance_dispatched: false,
            utterance_seq: 0,
            camera_error: None,
            notice: None,
            alive: true,
        };

        let handle = SessionHandle {
            tx,
            status: status_rx,
        };

        (controller, handle)
    }

    /// The session's client identifier
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Process events until shutdown
    ///
    /// Runs the session to completion; returns after teardown. Completions
    /// arriving for a torn-down session are dropped at the closed queue.
    pub async fn run(mut self) {
        while self.alive {
            match self.rx.recv().await {
                Some(event) => {
                    self.handle(event);
                    self.publish();
                }
                None => {
                    // Every handle dropped without an explicit shutdown
                    self.teardown();
                    self.publish();
                }
            }
        }
        tracing::info!(client_id = %self.client_id, "session ended");
    }

    fn handle(&mut self, event: SessionEvent) {
        if !self.alive {
            return;
        }

        match event {
            SessionEvent::StartScanning => self.start_scanning(),
            SessionEvent::StopScanning => self.stop_scanning(),
            SessionEvent::AnalyzeNow => self.analyze_once(),
            SessionEvent::ScanTick => {
                // A tick queued before stop_scanning must not scan
                if self.scan == ScanState::Scanning {
                    self.analyze_once();
                }
            }
            SessionEvent::RetryCamera => self.retry_camera(),
            SessionEvent::StartListening => self.start_listening(),
            SessionEvent::StopListening => self.stop_listening(),
            SessionEvent::Ask(question) => self.begin_question(question),
            SessionEvent::StopSpeaking => self.stop_speaking(),
            SessionEvent::Shutdown => self.teardown(),
            SessionEvent::AnalysisDone(result) => self.on_analysis_done(result),
            SessionEvent::Transcript(text) => self.on_transcript(text),
            SessionEvent::RecognitionFailed(message) => self.on_recognition_failed(&message),
            SessionEvent::ListeningEnded => self.on_listening_ended(),
            SessionEvent::AnswerDone(result) => self.on_answer_done(result),
            SessionEvent::SpeechStarted(id) => {
                if id == self.utterance_seq {
                    self.speech = SpeechState::Speaking;
                }
            }
            SessionEvent::SpeechFinished(id) => {
                if id == self.utterance_seq {
                    self.speech = SpeechState::Silent;
                    self.utterance_dispatched = false;
                } else {
                    tracing::debug!(id, "stale utterance event ignored");
                }
            }
            SessionEvent::SpeechFailed(id, message) => {
                if id == self.utterance_seq {
                    tracing::warn!(error = %message, "utterance failed");
                    self.speech = SpeechState::Silent;
                    self.utterance_dispatched = false;
                }
            }
        }
    }

    // -- Scan scheduler --

    fn start_scanning(&mut self) {
        if let Some(message) = self.camera_error.clone() {
            self.raise(NoticeKind::CameraUnavailable, message);
            return;
        }
        if self.scan == ScanState::Scanning {
            return;
        }

        self.scan = ScanState::Scanning;
        tracing::info!(interval = ?self.options.scan_interval, "continuous scanning started");

        // First result should not wait a full period
        self.analyze_once();
        if self.scan != ScanState::Scanning {
            // The immediate scan hit a camera failure; don't arm the timer
            return;
        }

        let tx = self.tx.clone();
        let period = self.options.scan_interval;
        self.scan_timer = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // Skip the immediate first tick; the controller already ran one
            interval.tick().await;

            loop {
                interval.tick().await;
                let Some(tx) = tx.upgrade() else { break };
                if tx.send(SessionEvent::ScanTick).await.is_err() {
                    break;
                }
            }
        }));
    }

    fn stop_scanning(&mut self) {
        if self.scan == ScanState::Idle {
            return;
        }

        if let Some(timer) = self.scan_timer.take() {
            timer.abort();
        }
        self.scan = ScanState::Idle;
        tracing::info!("continuous scanning stopped");
    }

    /// One capture+analyze+narrate cycle, shared by manual and timer triggers
    fn analyze_once(&mut self) {
        if let Some(message) = self.camera_error.clone() {
            self.raise(NoticeKind::CameraUnavailable, message);
            return;
        }
        if self.analysis_in_flight {
            tracing::debug!("analysis already in flight, dropping trigger");
            return;
        }
        let Some(frames) = self.frames.as_mut() else {
            return;
        };

        self.analysis_in_flight = true;

        let frame = match frames.capture() {
            Ok(frame) => frame,
            Err(e) => {
                // Guaranteed release of the guard on the failure path
                self.analysis_in_flight = false;
                self.set_camera_error(&e);
                return;
            }
        };

        let Some(tx) = self.tx.upgrade() else {
            return;
        };
        let backend = Arc::clone(&self.backend);
        let client_id = self.client_id.clone();
        tokio::spawn(async move {
            let image = frame.to_base64();
            let result = backend.analyze_scene(&image, &client_id).await;
            let _ = tx.send(SessionEvent::AnalysisDone(result)).await;
        });
    }

    fn on_analysis_done(&mut self, result: Result<String>) {
        self.analysis_in_flight = false;

        match result {
            Ok(description) => {
                self.analysis = Some(AnalysisResult {
                    description: description.clone(),
                    produced_at: chrono::Utc::now(),
                });
                self.speak(description);
            }
            Err(e) => {
                // Previous result stays; the next scheduled attempt is the retry
                self.raise(NoticeKind::AnalysisFailure, e.to_string());
            }
        }
    }

    fn set_camera_error(&mut self, error: &Error) {
        let message = error.to_string();
        tracing::error!(error = %message, "camera failed");
        self.camera_error = Some(message.clone());
        self.raise(NoticeKind::CameraUnavailable, message);
        // Camera-dependent actions are blocked until an explicit retry
        self.stop_scanning();
    }

    fn retry_camera(&mut self) {
        let Some(frames) = self.frames.as_mut() else {
            return;
        };

        match frames.capture() {
            Ok(_) => {
                if self.camera_error.take().is_some() {
                    tracing::info!("camera recovered");
                }
            }
            Err(e) => {
                let message = e.to_string();
                self.camera_error = Some(message.clone());
                self.raise(NoticeKind::CameraUnavailable, message);
            }
        }
    }

    // -- Voice question pipeline --

    fn start_listening(&mut self) {
        if !self.voice.available() {
            self.raise(
                NoticeKind::VoiceUnavailable,
                "voice input is not available on this device",
            );
            return;
        }
        if self.listening == ListeningState::Listening {
            return;
        }
        let Some(tx) = self.tx.upgrade() else {
            return;
        };

        match self.voice.start(&self.options.locale, tx) {
            Ok(()) => {
                self.listening = ListeningState::Listening;
                tracing::info!("listening for a question");
            }
            Err(e) => {
                self.raise(NoticeKind::VoiceUnavailable, e.to_string());
            }
        }
    }

    fn stop_listening(&mut self) {
        if self.listening == ListeningState::Idle {
            return;
        }
        self.voice.cancel();
        self.listening = ListeningState::Idle;
        tracing::info!("listening cancelled");
    }

    fn on_transcript(&mut self, text: String) {
        self.listening = ListeningState::Idle;
        tracing::info!(question = %text, "question heard");
        self.begin_question(text);
    }

    fn on_recognition_failed(&mut self, message: &str) {
        self.listening = ListeningState::Idle;
        self.raise(NoticeKind::RecognitionFailure, message);
    }

    fn on_listening_ended(&mut self) {
        self.listening = ListeningState::Idle;
    }

    fn begin_question(&mut self, question: String) {
        self.question.last_question = Some(question.clone());

        if self.question.in_flight {
            self.raise(
                NoticeKind::Busy,
                "still answering the previous question",
            );
            return;
        }
        let Some(tx) = self.tx.upgrade() else {
            return;
        };
        self.question.in_flight = true;

        let backend = Arc::clone(&self.backend);
        let client_id = self.client_id.clone();
        tokio::spawn(async move {
            let result = backend.ask_question(&question, &client_id).await;
            let _ = tx.send(SessionEvent::AnswerDone(result)).await;
        });
    }

    fn on_answer_done(&mut self, result: Result<String>) {
        self.question.in_flight = false;

        match result {
            Ok(answer) => {
                self.question.last_answer = Some(answer.clone());
                self.speak(answer);
            }
            Err(e) => {
                // Degrade to a spoken apology rather than silence
                self.question.last_answer = Some(ANSWER_FALLBACK.to_string());
                self.raise(NoticeKind::AnswerFailure, e.to_string());
                self.speak(ANSWER_FALLBACK.to_string());
            }
        }
    }

    // -- Speech output arbiter --

    /// Last-writer-wins narration: drops the request if an utterance is
    /// playing or dispatched, never queues or interrupts
    fn speak(&mut self, text: String) {
        if self.speech == SpeechState::Speaking || self.utterance_dispatched {
            tracing::debug!("already speaking, dropping utterance");
            return;
        }

        let Some(tx) = self.tx.upgrade() else {
            return;
        };

        // Clear any stale output before dispatching
        self.speech_out.cancel();

        self.utterance_seq += 1;
        self.utterance_dispatched = true;
        self.speech_out.speak(
            Utterance {
                id: self.utterance_seq,
                text,
                params: self.options.speech,
            },
            tx,
        );
    }

    fn stop_speaking(&mut self) {
        self.speech_out.cancel();
        self.speech = SpeechState::Silent;
        self.utterance_dispatched = false;
    }

    // -- Lifecycle --

    /// Single-pass teardown: camera released exactly once, timer and
    /// utterance cancelled; safe to call with nothing armed
    fn teardown(&mut self) {
        if !self.alive {
            return;
        }
        self.alive = false;

        if let Some(mut frames) = self.frames.take() {
            frames.release();
        }
        if let Some(timer) = self.scan_timer.take() {
            timer.abort();
        }
        self.speech_out.cancel();
        self.voice.cancel();

        self.scan = ScanState::Idle;
        self.listening = ListeningState::Idle;
        self.speech = SpeechState::Silent;
        self.utterance_dispatched = false;

        tracing::info!(client_id = %self.client_id, "session torn down");
    }

    fn raise(&mut self, kind: NoticeKind, message: impl Into<String>) {
        let notice = Notice::new(kind, message);
        tracing::warn!(kind = ?notice.kind, message = %notice.message, "notice");
        self.notice = Some(notice);
    }

    fn publish(&self) {
        self.status_tx.send_replace(StatusSnapshot {
            scan: self.scan,
            analysis_in_flight: self.analysis_in_flight,
            analysis: self.analysis.clone(),
            listening: self.listening,
            question: self.question.clone(),
            speech: self.speech,
            camera_error: self.camera_error.clone(),
            notice: self.notice.clone(),
            closed: !self.alive,
        });
    }
}
