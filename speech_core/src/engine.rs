//! Shared synthesis engine over piper voice models.
//!
//! One [`SpeechEngine`] lives for the whole process.  Models are described
//! by `models/map.json` (language code -> piper config path), loaded on
//! first use into a concurrent cache and kept until shutdown.  A piper
//! synthesizer is not reentrant, so each loaded model sits behind a mutex
//! and inference calls for the same language serialize across requests.

use std::{
    collections::HashMap,
    fs,
    path::Path,
    sync::{Arc, Mutex},
};

use anyhow::Context;
use dashmap::DashMap;
use piper_rs::synth::{PiperSpeechStreamParallel, PiperSpeechSynthesizer};
use tracing::{info, warn};

use crate::{error::SynthesisError, Language, RawAudioBuffer, SAMPLE_RATE};

/// Parameters for synthesizing one segment, fixed for the whole request.
#[derive(Debug, Clone)]
pub struct VoiceSpec {
    /// Built-in voice name or enrolled voice id.  Validated at the boundary;
    /// piper-rs currently exposes no public speaker selection, so the value
    /// is carried for logging and future use.
    pub speaker: String,
    pub language: Language,
    pub speed: f32,
}

/// Capability interface of the segment synthesizer: one text segment in,
/// one raw PCM buffer out.  Implementations must be safe to share across
/// requests; the stream emitter only ever holds an `Arc` to one.
pub trait Synthesizer: Send + Sync {
    fn synthesize(&self, text: &str, voice: &VoiceSpec) -> Result<RawAudioBuffer, SynthesisError>;
}

struct VoiceModel {
    synth: Mutex<PiperSpeechSynthesizer>,
    sample_rate: u32,
}

pub struct SpeechEngine {
    // language -> piper config path
    map: HashMap<Language, String>,
    cache: DashMap<Language, Arc<VoiceModel>>,
}

impl SpeechEngine {
    /// Create from a prebuilt language map.  No model is loaded yet.
    pub fn new(map: HashMap<Language, String>) -> Self {
        Self {
            map,
            cache: DashMap::new(),
        }
    }

    /// Load the language map from `models/map.json`.  Keys that are not a
    /// supported language code are skipped with a warning.
    pub fn new_from_mapfile<P: AsRef<Path>>(p: P) -> anyhow::Result<Self> {
        let text = fs::read_to_string(p.as_ref())
            .with_context(|| format!("Failed to load {}", p.as_ref().display()))?;
        let json: HashMap<String, String> =
            serde_json::from_str(&text).with_context(|| "map.json is not valid JSON")?;

        let mut map = HashMap::new();
        for (key, config) in json {
            match Language::from_code(&key) {
                Some(lang) => {
                    map.insert(lang, config);
                }
                None => warn!("map.json: skipping unsupported language key {key}"),
            }
        }
        Ok(Self::new(map))
    }

    /// Languages with a configured voice model.
    pub fn configured_languages(&self) -> Vec<Language> {
        let mut langs: Vec<Language> = self.map.keys().copied().collect();
        langs.sort_by_key(|l| l.code());
        langs
    }

    /// Load every configured model up front.  Called once at process start;
    /// a language that fails to load is reported and retried on first use.
    pub fn preload(&self) {
        for lang in self.map.keys() {
            if let Err(e) = self.model_for(*lang) {
                warn!("preload failed for {lang}: {e}");
            }
        }
    }

    fn model_for(&self, language: Language) -> Result<Arc<VoiceModel>, SynthesisError> {
        if let Some(model) = self.cache.get(&language) {
            return Ok(model.clone());
        }
        let cfg_path = self.map.get(&language).ok_or_else(|| {
            SynthesisError::Synthesis(format!("no voice model configured for language {language}"))
        })?;

        let sample_rate = read_sample_rate(cfg_path)
            .map_err(|e| SynthesisError::Synthesis(format!("model config error: {e}")))?;
        let model = piper_rs::from_config_path(Path::new(cfg_path))
            .map_err(|e| SynthesisError::Synthesis(format!("piper load error: {e}")))?;
        let synth = PiperSpeechSynthesizer::new(model)
            .map_err(|e| SynthesisError::Synthesis(format!("piper init error: {e}")))?;
        info!("loaded voice model for {language} ({cfg_path}, {sample_rate} Hz)");

        let model = Arc::new(VoiceModel {
            synth: Mutex::new(synth),
            sample_rate,
        });
        self.cache.insert(language, model.clone());
        Ok(model)
    }
}

impl Synthesizer for SpeechEngine {
    fn synthesize(&self, text: &str, voice: &VoiceSpec) -> Result<RawAudioBuffer, SynthesisError> {
        let model = self.model_for(voice.language)?;

        let samples = {
            let synth = model.synth.lock().map_err(|_| {
                SynthesisError::Synthesis("synthesizer lock poisoned by an earlier panic".into())
            })?;
            let stream: PiperSpeechStreamParallel = synth
                .synthesize_parallel(text.to_owned(), None)
                .map_err(|e| SynthesisError::Synthesis(format!("piper synth error: {e}")))?;

            let mut samples: Vec<f32> = Vec::new();
            for part in stream {
                samples.extend(
                    part.map_err(|e| SynthesisError::Synthesis(format!("chunk error: {e}")))?
                        .into_vec(),
                );
            }
            samples
        };

        let scaled = scale_to_pipeline_rate(&samples, model.sample_rate, voice.speed);
        Ok(RawAudioBuffer::from_f32(&scaled))
    }
}

/// Read the native sample rate from a piper model config.
fn read_sample_rate<P: AsRef<Path>>(cfg_path: P) -> anyhow::Result<u32> {
    let text = fs::read_to_string(cfg_path.as_ref())
        .with_context(|| format!("Failed to read config file: {}", cfg_path.as_ref().display()))?;
    let json: serde_json::Value =
        serde_json::from_str(&text).with_context(|| "Config file is not valid JSON")?;

    let sample_rate = json
        .get("audio")
        .and_then(|a| a.get("sample_rate"))
        .and_then(|sr| sr.as_u64())
        .ok_or_else(|| anyhow::anyhow!("Missing or invalid 'audio.sample_rate' in config"))?;

    Ok(sample_rate as u32)
}

/// Resample model output to the pipeline rate and apply the speed factor.
///
/// Linear interpolation; output duration is `input / speed`.  Speed is
/// already range-checked at the boundary.
fn scale_to_pipeline_rate(samples: &[f32], model_rate: u32, speed: f32) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }
    let ratio = f64::from(SAMPLE_RATE) / (f64::from(model_rate) * f64::from(speed));
    let out_len = ((samples.len() as f64) * ratio).round().max(1.0) as usize;

    let mut out = Vec::with_capacity(out_len);
    let last = samples.len() - 1;
    for i in 0..out_len {
        let pos = i as f64 / ratio;
        let idx = (pos.floor() as usize).min(last);
        let next = (idx + 1).min(last);
        let frac = (pos - idx as f64) as f32;
        out.push(samples[idx] + (samples[next] - samples[idx]) * frac);
    }
    out
}
