//! Speech synthesis pipeline: sentence segmentation, neural synthesis via
//! piper models, container transcoding and chunked byte streaming.
//!
//! The pipeline is pull-based end to end.  [`stream::stream_speech`] drives
//! segmenter -> synthesizer -> transcoder for one request and yields encoded
//! audio in bounded chunks; at most one segment's audio is materialized at
//! a time.

pub mod encode;
pub mod engine;
pub mod error;
pub mod segment;
pub mod speakers;
pub mod stream;
pub mod voice;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use engine::{SpeechEngine, Synthesizer, VoiceSpec};
pub use error::SynthesisError;
pub use stream::{stream_speech, CHUNK_SIZE};
pub use voice::{compute_fingerprint, VoiceSample, VoiceStore};

/// Sample rate of all raw audio flowing through the pipeline.
pub const SAMPLE_RATE: u32 = 22_050;

/// Languages the synthesis pipeline accepts.  Closed set; serde enforces
/// membership at the request boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Es,
    Fr,
    De,
    It,
    Nl,
    Ru,
    Tr,
}

impl Language {
    pub const ALL: [Language; 8] = [
        Language::En,
        Language::Es,
        Language::Fr,
        Language::De,
        Language::It,
        Language::Nl,
        Language::Ru,
        Language::Tr,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Es => "es",
            Language::Fr => "fr",
            Language::De => "de",
            Language::It => "it",
            Language::Nl => "nl",
            Language::Ru => "ru",
            Language::Tr => "tr",
        }
    }

    pub fn from_code(code: &str) -> Option<Language> {
        Language::ALL.iter().copied().find(|l| l.code() == code)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Output container formats the transcoder supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Mp3,
    Wav,
    Ogg,
    Flac,
}

impl AudioFormat {
    pub fn extension(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Flac => "flac",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A validated synthesis request as it enters the pipeline.  The boundary
/// layer has already checked speed range and enum membership; the speaker
/// has been resolved against the built-in set or the voice store.
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub text: String,
    pub speaker: String,
    pub language: Language,
    pub speed: f32,
    pub output_format: AudioFormat,
}

/// Raw synthesized audio for exactly one text segment: mono,
/// [`SAMPLE_RATE`] Hz, 16-bit PCM.  Owned by one pipeline stage at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAudioBuffer {
    samples: Vec<i16>,
}

impl RawAudioBuffer {
    pub fn new(samples: Vec<i16>) -> Self {
        Self { samples }
    }

    /// Quantize f32 samples in [-1.0, 1.0] to 16-bit PCM.
    pub fn from_f32(samples: &[f32]) -> Self {
        let samples = samples
            .iter()
            .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
            .collect();
        Self { samples }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_ms(&self) -> u64 {
        (self.samples.len() as u64 * 1000) / u64::from(SAMPLE_RATE)
    }
}
