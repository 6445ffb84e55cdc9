//! Client for the hosted speech-recognition service.
//!
//! The server treats transcription and translation as single remote calls:
//! upload (or fetch) audio, get transcript text back.  Failures surface to
//! the caller as-is; retry policy is not owned here.

use anyhow::{Context, Result};
use reqwest::{multipart, Client};
use serde::{Deserialize, Serialize};
use std::env;

pub const DEFAULT_MODEL: &str = "whisper-large-v3";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Transcript rendering requested from the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptFormat {
    #[default]
    Json,
    Text,
    Srt,
    VerboseJson,
    Vtt,
}

impl TranscriptFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            TranscriptFormat::Json => "json",
            TranscriptFormat::Text => "text",
            TranscriptFormat::Srt => "srt",
            TranscriptFormat::VerboseJson => "verbose_json",
            TranscriptFormat::Vtt => "vtt",
        }
    }

    pub fn is_json(self) -> bool {
        matches!(self, TranscriptFormat::Json | TranscriptFormat::VerboseJson)
    }
}

/// Audio handed to the service.
#[derive(Debug, Clone)]
pub struct AudioUpload {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct TranscriptionOptions {
    pub model: String,
    pub language: Option<String>,
    pub prompt: Option<String>,
    pub response_format: TranscriptFormat,
    pub temperature: f32,
}

impl Default for TranscriptionOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            language: None,
            prompt: None,
            response_format: TranscriptFormat::default(),
            temperature: 1.0,
        }
    }
}

/// Service response, JSON for structured formats and verbatim text for the
/// rest (srt, vtt, plain text).
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Transcript {
    Json(serde_json::Value),
    Text(String),
}

pub struct TranscriptionClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl TranscriptionClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }

    /// Read the API key from `OPENAI_API_KEY` and an optional base URL
    /// override from `OPENAI_BASE_URL`.  A missing key is not an error
    /// here; the service rejects unauthenticated calls at request time.
    pub fn from_env() -> Self {
        let api_key = env::var("OPENAI_API_KEY").unwrap_or_default();
        let base_url =
            env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(api_key, base_url)
    }

    /// Transcribe an uploaded audio file.
    pub async fn transcribe(
        &self,
        upload: AudioUpload,
        options: &TranscriptionOptions,
    ) -> Result<Transcript> {
        let part = multipart::Part::bytes(upload.data)
            .file_name(upload.file_name)
            .mime_str(&upload.content_type)
            .context("invalid audio content type")?;

        let mut form = multipart::Form::new()
            .part("file", part)
            .text("model", options.model.clone())
            .text("response_format", options.response_format.as_str())
            .text("temperature", options.temperature.to_string());
        if let Some(language) = &options.language {
            form = form.text("language", language.clone());
        }
        if let Some(prompt) = &options.prompt {
            form = form.text("prompt", prompt.clone());
        }

        let response = self
            .http
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .context("transcription request failed")?
            .error_for_status()
            .context("transcription service returned an error")?;

        if options.response_format.is_json() {
            Ok(Transcript::Json(
                response
                    .json()
                    .await
                    .context("invalid transcription response")?,
            ))
        } else {
            Ok(Transcript::Text(
                response
                    .text()
                    .await
                    .context("invalid transcription response")?,
            ))
        }
    }

    /// Fetch audio from `file_url` and transcribe it with a fixed
    /// translate-to-English prompt.
    pub async fn translate(
        &self,
        file_url: &str,
        options: &TranscriptionOptions,
    ) -> Result<Transcript> {
        let data = self
            .http
            .get(file_url)
            .send()
            .await
            .with_context(|| format!("failed to fetch audio from {file_url}"))?
            .error_for_status()
            .context("audio fetch returned an error")?
            .bytes()
            .await
            .context("failed to read fetched audio")?
            .to_vec();

        let upload = AudioUpload {
            file_name: "audio.mp3".to_string(),
            content_type: "audio/mpeg".to_string(),
            data,
        };
        let mut options = options.clone();
        options.prompt = Some("Translate the speech inferred text to English".to_string());
        self.transcribe(upload, &options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_wire_names() {
        assert_eq!(TranscriptFormat::VerboseJson.as_str(), "verbose_json");
        assert!(TranscriptFormat::Json.is_json());
        assert!(!TranscriptFormat::Srt.is_json());
        let fmt: TranscriptFormat = serde_json::from_str("\"verbose_json\"").unwrap();
        assert_eq!(fmt, TranscriptFormat::VerboseJson);
    }

    #[test]
    fn default_options_match_service_defaults() {
        let opts = TranscriptionOptions::default();
        assert_eq!(opts.model, DEFAULT_MODEL);
        assert_eq!(opts.response_format, TranscriptFormat::Json);
        assert_eq!(opts.temperature, 1.0);
    }
}
