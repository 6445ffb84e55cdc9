//! Common utilities for integration tests

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use server::{config::ServerConfig, router, AppState};
use speech_core::{SpeechEngine, VoiceStore};
use transcribe_core::TranscriptionClient;

/// Create a test app instance.  The engine has no voice models configured,
/// so anything that reaches synthesis fails, which is what the truncation
/// tests rely on; validation, enrollment and listings work fully.
pub fn create_test_app() -> Router {
    let state = AppState {
        engine: Arc::new(SpeechEngine::new(HashMap::new())),
        voices: Arc::new(VoiceStore::new("test_secret")),
        // Unroutable endpoint; transcription tests only exercise validation.
        transcriber: Arc::new(TranscriptionClient::new("test-key", "http://127.0.0.1:9")),
        config: ServerConfig::default(),
    };
    router(state)
}

pub const TEST_BOUNDARY: &str = "x-test-boundary";

/// Build a multipart/form-data body with a single file field.
pub fn multipart_file(field: &str, filename: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{TEST_BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; \
             filename=\"{filename}\"\r\nContent-Type: audio/wav\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{TEST_BOUNDARY}--\r\n").as_bytes());
    body
}

/// Build a multipart/form-data body with a single text field.
pub fn multipart_text(field: &str, value: &str) -> Vec<u8> {
    format!(
        "--{TEST_BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"\r\n\r\n\
         {value}\r\n--{TEST_BOUNDARY}--\r\n"
    )
    .into_bytes()
}
