//! Chunked streaming of synthesized speech.
//!
//! [`stream_speech`] drives the full pipeline for one request: for each
//! sentence in order it synthesizes on a blocking worker thread, transcodes
//! into the requested container, and yields the encoded bytes in bounded
//! chunks.  The generator only advances when the transport polls for the
//! next chunk, so backpressure and client-disconnect cancellation fall out
//! of the pull model: dropping the stream between chunks stops the
//! pipeline and releases the buffers of the segment in flight.

use std::sync::Arc;

use async_stream::try_stream;
use bytes::Bytes;
use futures_core::Stream;
use tracing::debug;

use crate::{
    encode,
    engine::{Synthesizer, VoiceSpec},
    error::SynthesisError,
    segment, SynthesisRequest,
};

/// Upper bound on the size of an emitted chunk.  The final chunk of a
/// segment may be shorter.
pub const CHUNK_SIZE: usize = 4096;

/// Produce the encoded audio for `request` as an ordered, finite sequence
/// of byte chunks.
///
/// Segments are processed strictly in source order and encoded as
/// independent container units; all chunks of segment *k* are emitted
/// before segment *k+1* starts.  An input with no sentences yields an
/// empty stream that terminates normally.  A synthesis or encoding failure
/// ends the stream with that error; chunks already yielded stand.
pub fn stream_speech<S>(
    synth: Arc<S>,
    request: SynthesisRequest,
) -> impl Stream<Item = Result<Bytes, SynthesisError>>
where
    S: Synthesizer + 'static,
{
    try_stream! {
        let voice = VoiceSpec {
            speaker: request.speaker.clone(),
            language: request.language,
            speed: request.speed,
        };

        for (index, sentence) in segment::sentences(&request.text, request.language).enumerate() {
            let sentence = sentence.to_owned();
            let synth = Arc::clone(&synth);
            let voice = voice.clone();
            // Inference is CPU/accelerator bound; keep it off the async
            // runtime.  Per request there is at most one job in flight.
            let pcm = tokio::task::spawn_blocking(move || synth.synthesize(&sentence, &voice))
                .await
                .map_err(|e| SynthesisError::Synthesis(format!("synthesis task failed: {e}")))??;

            let encoded = encode::encode(&pcm, request.output_format)?;
            debug!(
                segment = index + 1,
                pcm_samples = pcm.len(),
                encoded_bytes = encoded.len(),
                "segment encoded"
            );
            drop(pcm);

            let mut remaining = Bytes::from(encoded);
            while !remaining.is_empty() {
                let take = remaining.len().min(CHUNK_SIZE);
                yield remaining.split_to(take);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Mutex;

    use futures_util::StreamExt;

    use super::*;
    use crate::{AudioFormat, Language, RawAudioBuffer};

    /// Records calls and plays back canned PCM, so the emitter can be
    /// exercised without model files.
    struct StubSynth {
        calls: Mutex<Vec<String>>,
        samples_per_segment: usize,
        fail_on_call: Option<usize>,
    }

    impl StubSynth {
        fn new(samples_per_segment: usize) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                samples_per_segment,
                fail_on_call: None,
            }
        }

        fn failing_on(call: usize, samples_per_segment: usize) -> Self {
            Self {
                fail_on_call: Some(call),
                ..Self::new(samples_per_segment)
            }
        }
    }

    impl Synthesizer for StubSynth {
        fn synthesize(
            &self,
            text: &str,
            _voice: &VoiceSpec,
        ) -> Result<RawAudioBuffer, SynthesisError> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(text.to_owned());
            let call = calls.len();
            if self.fail_on_call == Some(call) {
                return Err(SynthesisError::Synthesis("stub failure".into()));
            }
            // Encode the 1-indexed call number into every sample so each
            // segment's audio is distinguishable after decoding.
            Ok(RawAudioBuffer::new(vec![call as i16; self.samples_per_segment]))
        }
    }

    fn request(text: &str, format: AudioFormat) -> SynthesisRequest {
        SynthesisRequest {
            text: text.into(),
            speaker: "EN".into(),
            language: Language::En,
            speed: 1.0,
            output_format: format,
        }
    }

    async fn collect(
        stream: impl Stream<Item = Result<Bytes, SynthesisError>>,
    ) -> Vec<Result<Bytes, SynthesisError>> {
        Box::pin(stream).collect().await
    }

    #[tokio::test]
    async fn empty_input_yields_empty_stream() {
        for text in ["", "   ", " \n\t "] {
            let synth = Arc::new(StubSynth::new(100));
            let chunks = collect(stream_speech(synth.clone(), request(text, AudioFormat::Wav))).await;
            assert!(chunks.is_empty(), "expected no chunks for {text:?}");
            assert!(synth.calls.lock().unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn segments_are_synthesized_in_source_order() {
        let synth = Arc::new(StubSynth::new(100));
        let req = request("One. Two! Three?", AudioFormat::Wav);
        let chunks = collect(stream_speech(synth.clone(), req)).await;

        assert!(chunks.iter().all(|c| c.is_ok()));
        assert_eq!(
            *synth.calls.lock().unwrap(),
            vec!["One.".to_string(), "Two!".to_string(), "Three?".to_string()]
        );
    }

    #[tokio::test]
    async fn chunks_respect_the_size_bound() {
        // 10_000 samples -> 20_044 WAV bytes -> 4 full chunks + remainder.
        let synth = Arc::new(StubSynth::new(10_000));
        let req = request("One long sentence", AudioFormat::Wav);
        let chunks: Vec<Bytes> = collect(stream_speech(synth, req))
            .await
            .into_iter()
            .map(|c| c.unwrap())
            .collect();

        assert_eq!(chunks.len(), 5);
        assert!(chunks.iter().all(|c| c.len() <= CHUNK_SIZE));
        assert_eq!(chunks.iter().map(Bytes::len).sum::<usize>(), 44 + 20_000);
        assert_eq!(&chunks[0][..4], b"RIFF");
    }

    #[tokio::test]
    async fn each_segment_is_an_independent_wav_unit() {
        let samples = 500usize;
        let synth = Arc::new(StubSynth::new(samples));
        let req = request("Hello. How are you?", AudioFormat::Wav);
        let bytes: Vec<u8> = collect(stream_speech(synth, req))
            .await
            .into_iter()
            .flat_map(|c| c.unwrap().to_vec())
            .collect();

        // Two units, each a standalone playable WAV carrying its segment's
        // marker samples in source order.
        let unit_len = 44 + 2 * samples;
        assert_eq!(bytes.len(), 2 * unit_len);
        for (i, unit) in bytes.chunks(unit_len).enumerate() {
            let mut reader = hound::WavReader::new(Cursor::new(unit)).unwrap();
            let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
            assert_eq!(decoded, vec![(i + 1) as i16; samples]);
        }
    }

    #[tokio::test]
    async fn failure_truncates_after_prior_segments() {
        let samples = 100usize;
        let synth = Arc::new(StubSynth::failing_on(2, samples));
        let req = request("One. Two. Three.", AudioFormat::Wav);
        let results = collect(stream_speech(synth.clone(), req)).await;

        // Segment 1's bytes stand, then the error; segment 3 never runs.
        let ok_bytes: usize = results
            .iter()
            .take_while(|r| r.is_ok())
            .map(|r| r.as_ref().unwrap().len())
            .sum();
        assert_eq!(ok_bytes, 44 + 2 * samples);
        assert!(matches!(
            results.last(),
            Some(Err(SynthesisError::Synthesis(_)))
        ));
        assert_eq!(synth.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn dropping_the_stream_stops_the_pipeline() {
        let synth = Arc::new(StubSynth::new(100));
        let req = request("One. Two. Three.", AudioFormat::Wav);
        {
            let mut stream = Box::pin(stream_speech(synth.clone(), req));
            let first = stream.next().await;
            assert!(matches!(first, Some(Ok(_))));
            // Dropped mid-stream here, as if the client disconnected.
        }
        // Only the first segment was ever synthesized.
        assert_eq!(synth.calls.lock().unwrap().len(), 1);
    }
}
