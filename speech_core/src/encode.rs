//! PCM to container transcoding.
//!
//! Each synthesized segment is encoded as its own standalone unit in the
//! requested container; the stream is the raw concatenation of those units.
//! MP3 and OGG players accept concatenated units natively, WAV/FLAC clients
//! should treat each unit independently.  No codec state crosses segments.

use std::io::Cursor;

use crate::{error::SynthesisError, AudioFormat, RawAudioBuffer, SAMPLE_RATE};

/// Encode one segment's PCM into the target container format.
pub fn encode(pcm: &RawAudioBuffer, format: AudioFormat) -> Result<Vec<u8>, SynthesisError> {
    if pcm.is_empty() {
        return Err(SynthesisError::Encoding(
            "cannot encode an empty audio buffer".into(),
        ));
    }
    match format {
        AudioFormat::Wav => encode_wav(pcm),
        AudioFormat::Mp3 => encode_mp3(pcm),
        AudioFormat::Ogg => encode_ogg(pcm),
        AudioFormat::Flac => encode_flac(pcm),
    }
}

fn enc_err<E: std::fmt::Display>(e: E) -> SynthesisError {
    SynthesisError::Encoding(e.to_string())
}

fn encode_wav(pcm: &RawAudioBuffer) -> Result<Vec<u8>, SynthesisError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    // RIFF header (44 bytes) + 2 bytes per sample.
    let mut cursor = Cursor::new(Vec::<u8>::with_capacity(44 + pcm.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(enc_err)?;
        for &s in pcm.samples() {
            writer.write_sample(s).map_err(enc_err)?;
        }
        writer.finalize().map_err(enc_err)?;
    }
    Ok(cursor.into_inner())
}

fn encode_mp3(pcm: &RawAudioBuffer) -> Result<Vec<u8>, SynthesisError> {
    use mp3lame_encoder::{Builder, FlushNoGap, MonoPcm};

    let mut builder = Builder::new()
        .ok_or_else(|| SynthesisError::Encoding("failed to allocate LAME encoder".into()))?;
    builder.set_num_channels(1).map_err(enc_err)?;
    builder.set_sample_rate(SAMPLE_RATE).map_err(enc_err)?;
    builder
        .set_brate(mp3lame_encoder::Bitrate::Kbps160)
        .map_err(enc_err)?;
    builder
        .set_quality(mp3lame_encoder::Quality::Good)
        .map_err(enc_err)?;
    let mut encoder = builder.build().map_err(enc_err)?;

    let mut out = Vec::with_capacity(mp3lame_encoder::max_required_buffer_size(pcm.len()));
    encoder
        .encode_to_vec(MonoPcm(pcm.samples()), &mut out)
        .map_err(enc_err)?;
    encoder.flush_to_vec::<FlushNoGap>(&mut out).map_err(enc_err)?;
    Ok(out)
}

fn encode_ogg(pcm: &RawAudioBuffer) -> Result<Vec<u8>, SynthesisError> {
    use std::num::{NonZeroU32, NonZeroU8};
    use vorbis_rs::VorbisEncoderBuilder;

    let samples: Vec<f32> = pcm
        .samples()
        .iter()
        .map(|&s| f32::from(s) / f32::from(i16::MAX))
        .collect();

    let mut out = Vec::new();
    let mut encoder = VorbisEncoderBuilder::new(
        NonZeroU32::new(SAMPLE_RATE).unwrap(),
        NonZeroU8::new(1).unwrap(),
        &mut out,
    )
    .map_err(enc_err)?
    .build()
    .map_err(enc_err)?;
    encoder.encode_audio_block([&samples]).map_err(enc_err)?;
    encoder.finish().map_err(enc_err)?;
    Ok(out)
}

fn encode_flac(pcm: &RawAudioBuffer) -> Result<Vec<u8>, SynthesisError> {
    use flacenc::bitsink::ByteSink;
    use flacenc::component::BitRepr;
    use flacenc::error::Verify;

    let samples: Vec<i32> = pcm.samples().iter().map(|&s| i32::from(s)).collect();
    let config = flacenc::config::Encoder::default()
        .into_verified()
        .map_err(|_| SynthesisError::Encoding("invalid flac encoder config".into()))?;
    let source = flacenc::source::MemSource::from_samples(&samples, 1, 16, SAMPLE_RATE as usize);
    let stream = flacenc::encode_with_fixed_block_size(&config, source, config.block_size)
        .map_err(|e| SynthesisError::Encoding(format!("flac encode error: {e:?}")))?;

    let mut sink = ByteSink::new();
    stream
        .write(&mut sink)
        .map_err(|e| SynthesisError::Encoding(format!("flac write error: {e}")))?;
    Ok(sink.as_slice().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(len: usize) -> RawAudioBuffer {
        // Low-amplitude ramp, enough signal for every encoder.
        let samples: Vec<i16> = (0..len).map(|i| ((i % 64) as i16 - 32) * 100).collect();
        RawAudioBuffer::new(samples)
    }

    #[test]
    fn empty_buffer_is_an_encoding_error() {
        let err = encode(&RawAudioBuffer::new(Vec::new()), AudioFormat::Wav).unwrap_err();
        assert!(matches!(err, SynthesisError::Encoding(_)));
    }

    #[test]
    fn wav_unit_is_well_formed() {
        let pcm = tone(1000);
        let bytes = encode(&pcm, AudioFormat::Wav).unwrap();
        assert_eq!(&bytes[..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(bytes.len(), 44 + 2 * pcm.len());

        // Round-trips through a WAV reader as a standalone unit.
        let reader = hound::WavReader::new(Cursor::new(&bytes)).unwrap();
        assert_eq!(reader.spec().sample_rate, SAMPLE_RATE);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.len() as usize, pcm.len());
    }

    #[test]
    fn flac_unit_has_magic() {
        let bytes = encode(&tone(4096), AudioFormat::Flac).unwrap();
        assert_eq!(&bytes[..4], b"fLaC");
    }

    #[test]
    fn ogg_unit_has_magic() {
        let bytes = encode(&tone(4096), AudioFormat::Ogg).unwrap();
        assert_eq!(&bytes[..4], b"OggS");
    }

    #[test]
    fn mp3_unit_is_non_empty() {
        let bytes = encode(&tone(4096), AudioFormat::Mp3).unwrap();
        assert!(!bytes.is_empty());
    }
}
