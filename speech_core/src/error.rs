use thiserror::Error;

/// Failures raised by the synthesis pipeline.
///
/// `UnknownSpeaker` is checked at the request boundary before the first
/// segment starts; the other two can surface mid-stream and abort the
/// remaining segments of a request.  Chunks already flushed to the
/// transport are never retracted.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("unknown speaker: {0}")]
    UnknownSpeaker(String),

    #[error("synthesis failed: {0}")]
    Synthesis(String),

    #[error("encoding failed: {0}")]
    Encoding(String),
}
