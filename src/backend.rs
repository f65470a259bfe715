//! HTTP client for the remote assistant backend
//!
//! The backend exposes stateless request/response endpoints keyed by a
//! client identifier: scene analysis, question answering over the last
//! analyzed scene, audio transcription, and a health probe.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Remote scene-description and question-answering services
///
/// The session controller only depends on this trait, so tests can run
/// against an in-memory fake with controllable completion.
#[async_trait]
pub trait RemoteAssistant: Send + Sync + 'static {
    /// Describe a scene from a base64-encoded JPEG frame
    async fn analyze_scene(&self, image_data: &str, client_id: &str) -> Result<String>;

    /// Answer a question against the client's last analyzed scene
    async fn ask_question(&self, question: &str, client_id: &str) -> Result<String>;
}

#[derive(Serialize)]
struct SceneAnalysisRequest<'a> {
    image_data: &'a str,
    client_id: &'a str,
}

/// Response from `POST /api/analyze-scene`
#[derive(Debug, Deserialize)]
pub struct SceneAnalysisResponse {
    /// Natural-language scene description
    pub description: String,
    /// Server-side timestamp of the analysis
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,
    /// Confidence score reported by the vision model
    pub confidence: Option<f64>,
}

#[derive(Serialize)]
struct QuestionRequest<'a> {
    question: &'a str,
    client_id: &'a str,
}

/// Response from `POST /api/ask-question`
#[derive(Debug, Deserialize)]
pub struct QuestionResponse {
    /// Answer grounded in the last scene description
    pub answer: String,
    /// Scene description the answer was grounded in
    pub scene_context: Option<String>,
}

/// Response from `POST /api/transcribe-audio`
#[derive(Debug, Deserialize)]
pub struct TranscriptionResponse {
    /// Transcribed text
    pub transcription: String,
    /// Detected language code
    pub language: Option<String>,
}

/// Response from `GET /api/health`
#[derive(Debug, Deserialize)]
pub struct HealthResponse {
    /// Overall backend status (e.g. "healthy")
    pub status: String,
    /// Whether the transcription model is loaded
    #[serde(default)]
    pub whisper_loaded: bool,
    /// Whether the vision model is available
    #[serde(default)]
    pub vision_loaded: bool,
}

/// HTTP implementation of the remote assistant services
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    /// Create a client for the backend at `base_url`
    ///
    /// # Errors
    ///
    /// Returns error if the URL is empty
    pub fn new(base_url: &str) -> Result<Self> {
        if base_url.is_empty() {
            return Err(Error::Config("backend URL required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{path}", self.base_url)
    }

    /// Transcribe a WAV recording to text
    ///
    /// # Errors
    ///
    /// Returns error if the upload or transcription fails
    pub async fn transcribe(&self, wav: Vec<u8>) -> Result<TranscriptionResponse> {
        tracing::debug!(audio_bytes = wav.len(), "uploading audio for transcription");

        let form = reqwest::multipart::Form::new().part(
            "file",
            reqwest::multipart::Part::bytes(wav)
                .file_name("question.wav")
                .mime_str("audio/wav")
                .map_err(|e| Error::Recognition(e.to_string()))?,
        );

        let response = self
            .client
            .post(self.endpoint("transcribe-audio"))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Recognition(format!(
                "transcription error {status}: {body}"
            )));
        }

        let result: TranscriptionResponse = response.json().await?;
        tracing::info!(transcript = %result.transcription, "transcription complete");
        Ok(result)
    }

    /// Probe backend health
    ///
    /// # Errors
    ///
    /// Returns error if the backend is unreachable or unhealthy
    pub async fn health(&self) -> Result<HealthResponse> {
        let response = self.client.get(self.endpoint("health")).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Config(format!("backend unhealthy: {status}")));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl RemoteAssistant for HttpBackend {
    async fn analyze_scene(&self, image_data: &str, client_id: &str) -> Result<String> {
        tracing::debug!(client_id, image_bytes = image_data.len(), "requesting scene analysis");

        let response = self
            .client
            .post(self.endpoint("analyze-scene"))
            .json(&SceneAnalysisRequest {
                image_data,
                client_id,
            })
            .send()
            .await
            .map_err(|e| Error::Analysis(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "scene analysis failed");
            return Err(Error::Analysis(format!("analysis error {status}: {body}")));
        }

        let result: SceneAnalysisResponse = response
            .json()
            .await
            .map_err(|e| Error::Analysis(format!("parse error: {e}")))?;

        tracing::info!(description = %result.description, "scene analyzed");
        Ok(result.description)
    }

    async fn ask_question(&self, question: &str, client_id: &str) -> Result<String> {
        tracing::debug!(client_id, question, "sending question");

        let response = self
            .client
            .post(self.endpoint("ask-question"))
            .json(&QuestionRequest {
                question,
                client_id,
            })
            .send()
            .await
            .map_err(|e| Error::Answer(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "question answering failed");
            return Err(Error::Answer(format!("answer error {status}: {body}")));
        }

        let result: QuestionResponse = response
            .json()
            .await
            .map_err(|e| Error::Answer(format!("parse error: {e}")))?;

        tracing::info!(answer = %result.answer, "question answered");
        Ok(result.answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_base_and_path() {
        let backend = HttpBackend::new("http://localhost:8001/").unwrap();
        assert_eq!(
            backend.endpoint("analyze-scene"),
            "http://localhost:8001/api/analyze-scene"
        );
    }

    #[test]
    fn empty_base_url_rejected() {
        assert!(HttpBackend::new("").is_err());
    }

    #[test]
    fn scene_request_shape() {
        let request = SceneAnalysisRequest {
            image_data: "aGVsbG8=",
            client_id: "client-1",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["image_data"], "aGVsbG8=");
        assert_eq!(json["client_id"], "client-1");
    }

    #[test]
    fn scene_response_parses_server_payload() {
        let response: SceneAnalysisResponse = serde_json::from_str(
            r#"{
                "description": "a person at a desk",
                "timestamp": "2025-01-01T00:00:00Z",
                "confidence": 0.85
            }"#,
        )
        .unwrap();
        assert_eq!(response.description, "a person at a desk");
        assert_eq!(response.confidence, Some(0.85));
    }

    #[test]
    fn question_response_tolerates_missing_context() {
        let response: QuestionResponse =
            serde_json::from_str(r#"{"answer": "two people"}"#).unwrap();
        assert_eq!(response.answer, "two people");
        assert!(response.scene_context.is_none());
    }

    #[test]
    fn health_response_defaults_model_flags() {
        let response: HealthResponse = serde_json::from_str(r#"{"status": "healthy"}"#).unwrap();
        assert_eq!(response.status, "healthy");
        assert!(!response.whisper_loaded);
        assert!(!response.vision_loaded);
    }
}
