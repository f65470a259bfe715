//! Observable session state
//!
//! All fields are owned by the controller task and published as a plain
//! snapshot through a `watch` channel after every change, so the
//! presentation layer observes state without sharing it.

use chrono::{DateTime, Utc};

/// Continuous scanning state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanState {
    /// No recurring scan timer armed
    #[default]
    Idle,
    /// Recurring scan timer armed
    Scanning,
}

/// Voice input state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListeningState {
    /// No voice session open
    #[default]
    Idle,
    /// One single-utterance voice session open
    Listening,
}

/// Speech output state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpeechState {
    /// No utterance playing
    #[default]
    Silent,
    /// One utterance playing
    Speaking,
}

/// Latest scene description; overwritten on each success, never queued
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisResult {
    /// Natural-language description of the scene
    pub description: String,
    /// When the description was produced
    pub produced_at: DateTime<Utc>,
}

/// Question pipeline state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuestionState {
    /// Most recent question (spoken or typed)
    pub last_question: Option<String>,
    /// Most recent answer, or the fallback string after a failed attempt
    pub last_answer: Option<String>,
    /// Whether a question is currently being answered
    pub in_flight: bool,
}

/// Kind of transient user-visible notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// Camera permission or device failure; blocks camera actions until retried
    CameraUnavailable,
    /// Transient analysis failure; previous result retained
    AnalysisFailure,
    /// Voice input capability missing on this platform
    VoiceUnavailable,
    /// Per-attempt speech recognition failure
    RecognitionFailure,
    /// Question answering failed; fallback answer substituted
    AnswerFailure,
    /// A request was rejected because one of the same kind is outstanding
    Busy,
}

/// Transient user-visible notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// What went wrong
    pub kind: NoticeKind,
    /// Human-readable message
    pub message: String,
    /// When the notice was raised
    pub raised_at: DateTime<Utc>,
}

impl Notice {
    pub(crate) fn new(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            raised_at: Utc::now(),
        }
    }
}

/// Plain snapshot of all observable session state
#[derive(Debug, Clone, Default)]
pub struct StatusSnapshot {
    /// Continuous scanning state
    pub scan: ScanState,
    /// Whether an analysis call is outstanding
    pub analysis_in_flight: bool,
    /// Latest successful scene analysis
    pub analysis: Option<AnalysisResult>,
    /// Voice input state
    pub listening: ListeningState,
    /// Question pipeline state
    pub question: QuestionState,
    /// Speech output state
    pub speech: SpeechState,
    /// Camera failure message; presence disables camera-dependent actions
    pub camera_error: Option<String>,
    /// Most recent transient notification
    pub notice: Option<Notice>,
    /// Whether the session has been torn down
    pub closed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_snapshot_is_idle() {
        let snapshot = StatusSnapshot::default();
        assert_eq!(snapshot.scan, ScanState::Idle);
        assert_eq!(snapshot.listening, ListeningState::Idle);
        assert_eq!(snapshot.speech, SpeechState::Silent);
        assert!(!snapshot.analysis_in_flight);
        assert!(!snapshot.question.in_flight);
        assert!(snapshot.camera_error.is_none());
        assert!(!snapshot.closed);
    }

    #[test]
    fn notice_records_kind_and_message() {
        let notice = Notice::new(NoticeKind::AnalysisFailure, "backend down");
        assert_eq!(notice.kind, NoticeKind::AnalysisFailure);
        assert_eq!(notice.message, "backend down");
    }
}
