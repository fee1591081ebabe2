use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

use super::SpeechService;
use crate::config::SpeechSettings;
use crate::error::SpeechError;

/// System instruction for the refinement pass: turn recognized speech into
/// an instruction prompt, nothing else.
const REFINE_SYSTEM_PROMPT: &str = "\
You are an expert prompt engineer. You receive a user's transcribed speech \
and convert it into the best possible prompt for a large language model.

Instructions:
- Capture the user's intent and rewrite it as a clear, specific instruction.
- Where it helps, supply background or constraints implied by the speech.
- Output only the rewritten prompt. No commentary, no explanations.";

/// Client for the upstream transcription and refinement endpoints.
pub struct SpeechClient {
    http: Client,
    settings: SpeechSettings,
    api_key: String,
}

impl SpeechClient {
    /// Build a client with a shared connection pool and request timeout.
    ///
    /// Fails when the API key is empty so a misconfigured process dies at
    /// startup rather than on the first recording.
    pub fn new(settings: SpeechSettings, api_key: String) -> Result<Self> {
        if api_key.is_empty() {
            anyhow::bail!(
                "API key not configured. Set the {} environment variable.",
                settings.api_key_env
            );
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            settings,
            api_key,
        })
    }
}

#[async_trait]
impl SpeechService for SpeechClient {
    async fn transcribe(&self, audio: Vec<u8>, filename: &str) -> Result<String, SpeechError> {
        debug!("transcribing {} ({} bytes)", filename, audio.len());

        let file_part = Part::bytes(audio)
            .file_name(filename.to_string())
            .mime_str("audio/wav")
            .map_err(|e| SpeechError::TranscriptionFailed(e.to_string()))?;

        let form = Form::new()
            .part("file", file_part)
            .text("model", self.settings.transcription_model.clone())
            .text("language", self.settings.language.clone());

        let response = self
            .http
            .post(format!("{}/audio/transcriptions", self.settings.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| SpeechError::TranscriptionFailed(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            error!("transcription API error ({status}): {message}");
            return Err(SpeechError::TranscriptionFailed(format!(
                "{status}: {message}"
            )));
        }

        let body: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| SpeechError::TranscriptionFailed(format!("malformed response: {e}")))?;

        Ok(body.text)
    }

    async fn refine(&self, transcript: &str) -> Result<String, SpeechError> {
        debug!("refining transcript ({} chars)", transcript.len());

        let request = ChatRequest {
            model: self.settings.refinement_model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: REFINE_SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: transcript.to_string(),
                },
            ],
            temperature: 0.3,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.settings.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| SpeechError::RefinementFailed(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            error!("refinement API error ({status}): {message}");
            return Err(SpeechError::RefinementFailed(format!("{status}: {message}")));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| SpeechError::RefinementFailed(format!("malformed response: {e}")))?;

        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .ok_or_else(|| SpeechError::RefinementFailed("empty response from API".to_string()))
    }
}

/// Pull the upstream error message out of a non-success response body.
async fn error_message(response: reqwest::Response) -> String {
    let text = response.text().await.unwrap_or_default();

    if let Ok(body) = serde_json::from_str::<ApiErrorResponse>(&text) {
        body.error.message
    } else {
        text
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}
