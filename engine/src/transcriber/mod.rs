//! Voice-note transcription
//!
//! Sends audio to the reasoning service's `/audio/transcriptions` endpoint
//! (OpenAI-compatible) and returns the recognized text.

use reqwest::multipart::{Form, Part};
use sdk::errors::EngineError;
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

use crate::config::LLMConfig;

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

pub struct Transcriber {
    base_url: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl Transcriber {
    pub fn new(config: &LLMConfig, api_key: impl Into<String>) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| EngineError::Network(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.transcription_model.clone(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Transcribe one audio clip.
    ///
    /// `mime_type` decides the upload's file extension (`ogg` for Opus voice
    /// notes, `mp3` otherwise).
    pub async fn transcribe(&self, audio: Vec<u8>, mime_type: &str) -> Result<String, EngineError> {
        let extension = if mime_type.contains("ogg") { "ogg" } else { "mp3" };
        let size = audio.len();

        let part = Part::bytes(audio)
            .file_name(format!("voice.{}", extension))
            .mime_str(mime_type)
            .map_err(|e| EngineError::Transcription(format!("Invalid audio type: {}", e)))?;

        let form = Form::new()
            .text("model", self.model.clone())
            .part("file", part);

        info!(bytes = size, extension, "Transcribing audio");

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| EngineError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Transcription(format!("{}: {}", status, body)));
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Transcription(e.to_string()))?;

        let text = parsed.text.trim().to_string();
        info!(preview = %text.chars().take(80).collect::<String>(), "Transcription complete");
        Ok(text)
    }
}
