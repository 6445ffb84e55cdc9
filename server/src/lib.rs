//! HTTP boundary for the speech synthesis and transcription services.
//!
//! Handlers live in the library so integration tests can build the router
//! against a test [`AppState`]; the binary in `main.rs` only adds process
//! wiring (config, middleware, listener).

pub mod config;
pub mod error;
pub mod validation;

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tracing::info;
use uuid::Uuid;

use speech_core::{
    speakers, AudioFormat, Language, SpeechEngine, SynthesisError, SynthesisRequest, VoiceStore,
};
use transcribe_core::{
    AudioUpload, Transcript, TranscriptFormat, TranscriptionClient, TranscriptionOptions,
};

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::validation::validate_speech_request;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SpeechEngine>,
    pub voices: Arc<VoiceStore>,
    pub transcriber: Arc<TranscriptionClient>,
    pub config: ServerConfig,
}

/// Upload cap on the multipart routes, matching the recognition
/// service's 25 MB file limit.
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Build the application router.  Process-level middleware (tracing, CORS,
/// rate limiting) is layered on top by the binary.
pub fn router(state: AppState) -> Router {
    let speech = Router::new()
        .route("/speech", post(create_speech))
        .route("/speech/voices", get(list_voices))
        .route(
            "/voices",
            post(enroll_voice)
                .layer::<_, Infallible>(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(MAX_UPLOAD_BYTES)),
        );

    // Remote transcription calls get a deadline; the synthesis stream does
    // not, its duration is bounded by the client reading it.
    let transcribe = Router::new()
        .route(
            "/transcriptions",
            post(create_transcription)
                .layer::<_, Infallible>(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(MAX_UPLOAD_BYTES)),
        )
        .route("/translations", post(create_translation))
        .layer(TimeoutLayer::new(state.config.request_timeout()));

    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .nest("/v1/audio", speech.merge(transcribe))
        .with_state(state)
}

#[derive(Serialize)]
pub struct HealthCheck {
    status: &'static str,
    code: u16,
}

pub async fn health_check() -> Json<HealthCheck> {
    Json(HealthCheck {
        status: "ok",
        code: 200,
    })
}

fn default_voice() -> String {
    speakers::random().to_string()
}

fn default_speed() -> f32 {
    1.0
}

#[derive(Deserialize)]
pub struct CreateSpeechRequest {
    pub text: String,
    /// Built-in voice; a random one is picked when the caller names none.
    #[serde(default = "default_voice")]
    pub voice: String,
    /// Enrolled voice id; takes precedence over `voice`.
    #[serde(default)]
    pub voice_id: Option<String>,
    #[serde(default)]
    pub response_format: AudioFormat,
    #[serde(default = "default_speed")]
    pub speed: f32,
    #[serde(default)]
    pub language: Language,
}

/// Resolve the requested voice before the first segment is synthesized.
/// An unknown name or id is the pipeline's unknown-speaker failure, which
/// the error layer maps to 404.
fn resolve_speaker(
    req: &CreateSpeechRequest,
    voices: &VoiceStore,
) -> Result<String, SynthesisError> {
    if let Some(id) = &req.voice_id {
        if voices.contains(id) {
            Ok(id.clone())
        } else {
            Err(SynthesisError::UnknownSpeaker(id.clone()))
        }
    } else if speakers::is_known(&req.voice) {
        Ok(req.voice.clone())
    } else {
        Err(SynthesisError::UnknownSpeaker(req.voice.clone()))
    }
}

/// Synthesize speech and stream it back in the requested container format.
///
/// The response body is produced lazily, chunk by chunk, under chunked
/// transfer; total length is never known in advance.  Failures after the
/// first chunk terminate the stream without retracting emitted bytes.
pub async fn create_speech(
    State(state): State<AppState>,
    Json(req): Json<CreateSpeechRequest>,
) -> Result<Response, ApiError> {
    validate_speech_request(&req.text, req.speed)?;
    let speaker = resolve_speaker(&req, &state.voices)?;
    let format = req.response_format;
    info!(
        language = %req.language,
        format = %format,
        chars = req.text.len(),
        "speech request"
    );

    let request = SynthesisRequest {
        text: req.text,
        speaker,
        language: req.language,
        speed: req.speed,
        output_format: format,
    };
    let stream = speech_core::stream_speech(state.engine.clone(), request);

    Response::builder()
        .header(header::CONTENT_TYPE, format!("audio/{format}"))
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=speech.{format}"),
        )
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

#[derive(Serialize)]
pub struct VoiceCatalog {
    pub speakers: &'static [&'static str],
    pub languages: Vec<&'static str>,
}

pub async fn list_voices() -> Json<VoiceCatalog> {
    Json(VoiceCatalog {
        speakers: speakers::SPEAKERS,
        languages: Language::ALL.iter().map(|l| l.code()).collect(),
    })
}

#[derive(Deserialize)]
pub struct EnrollQuery {
    pub user: Option<String>,
}

#[derive(Serialize)]
pub struct EnrollResponse {
    pub id: String,
    pub fingerprint: String,
    pub user: String,
    pub bytes: usize,
}

/// Enroll a voice sample: multipart upload with a `file` field, owner
/// identity in the `user` query parameter (a fresh uuid when absent).
pub async fn enroll_voice(
    State(state): State<AppState>,
    Query(query): Query<EnrollQuery>,
    mut multipart: Multipart,
) -> Result<Json<EnrollResponse>, ApiError> {
    let user = query.user.unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut audio: Option<Vec<u8>> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidInput(e.to_string()))?
    {
        if field.name() == Some("file") {
            audio = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::InvalidInput(e.to_string()))?
                    .to_vec(),
            );
            break;
        }
    }

    let audio = audio.ok_or_else(|| ApiError::InvalidInput("missing file field".into()))?;
    if audio.is_empty() {
        return Err(ApiError::InvalidInput("empty audio upload".into()));
    }

    let sample = state.voices.enroll(&user, audio);
    info!(user = %sample.user, fingerprint = %sample.fingerprint, "voice enrolled");
    Ok(Json(EnrollResponse {
        id: sample.id.clone(),
        fingerprint: sample.fingerprint.clone(),
        user: sample.user.clone(),
        bytes: sample.audio.len(),
    }))
}

fn transcript_response(transcript: Transcript) -> Response {
    match transcript {
        Transcript::Json(value) => Json(value).into_response(),
        Transcript::Text(text) => (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            text,
        )
            .into_response(),
    }
}

/// Proxy a multipart audio upload to the hosted recognition service.
pub async fn create_transcription(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut upload: Option<AudioUpload> = None;
    let mut options = TranscriptionOptions {
        language: Some("es".to_string()),
        ..TranscriptionOptions::default()
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidInput(e.to_string()))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("audio").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::InvalidInput(e.to_string()))?
                    .to_vec();
                upload = Some(AudioUpload {
                    file_name,
                    content_type,
                    data,
                });
            }
            Some("model") => options.model = field_text(field).await?,
            Some("language") => options.language = Some(field_text(field).await?),
            Some("prompt") => options.prompt = Some(field_text(field).await?),
            Some("response_format") => {
                let value = field_text(field).await?;
                options.response_format = parse_transcript_format(&value)?;
            }
            Some("temperature") => {
                let value = field_text(field).await?;
                options.temperature = value
                    .parse()
                    .map_err(|_| ApiError::InvalidInput(format!("invalid temperature: {value}")))?;
            }
            _ => {}
        }
    }

    let upload = upload.ok_or_else(|| ApiError::InvalidInput("missing file field".into()))?;
    let transcript = state
        .transcriber
        .transcribe(upload, &options)
        .await
        .map_err(|e| ApiError::Upstream(format!("{e:#}")))?;
    Ok(transcript_response(transcript))
}

async fn field_text(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::InvalidInput(e.to_string()))
}

fn parse_transcript_format(value: &str) -> Result<TranscriptFormat, ApiError> {
    serde_json::from_value(serde_json::Value::String(value.to_string()))
        .map_err(|_| ApiError::InvalidInput(format!("unsupported response_format: {value}")))
}

fn default_model() -> String {
    transcribe_core::DEFAULT_MODEL.to_string()
}

fn default_temperature() -> f32 {
    1.0
}

#[derive(Deserialize)]
pub struct CreateTranslationRequest {
    /// URL of the audio file to fetch and translate.
    pub file: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub response_format: TranscriptFormat,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

/// Fetch remote audio and return its English translation.
pub async fn create_translation(
    State(state): State<AppState>,
    Json(req): Json<CreateTranslationRequest>,
) -> Result<Response, ApiError> {
    if req.file.trim().is_empty() {
        return Err(ApiError::InvalidInput("file url must not be empty".into()));
    }

    let options = TranscriptionOptions {
        model: req.model,
        language: req.language.or_else(|| Some("en".to_string())),
        prompt: None,
        response_format: req.response_format,
        temperature: req.temperature,
    };
    let transcript = state
        .transcriber
        .translate(&req.file, &options)
        .await
        .map_err(|e| ApiError::Upstream(format!("{e:#}")))?;
    Ok(transcript_response(transcript))
}
