// Audio codec for the Gemini TTS payload
// Decodes base64 PCM responses and builds WAV containers for export

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use byteorder::{LittleEndian, WriteBytesExt};
use std::sync::Arc;
use thiserror::Error;

/// Sample rate of the PCM audio returned by the synthesis API
pub const SYNTHESIS_SAMPLE_RATE: u32 = 24_000;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Invalid base64 audio payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Malformed PCM payload: odd byte length {0}")]
    OddLength(usize),
}

/// Decoded audio ready for playback: mono f32 samples in [-1.0, 1.0]
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Decode a base64 string into raw PCM bytes
pub fn decode_base64(data: &str) -> Result<Vec<u8>, CodecError> {
    Ok(BASE64.decode(data)?)
}

/// Convert raw signed 16-bit little-endian PCM bytes into normalized
/// f32 samples. The byte length must be even (2 bytes per sample);
/// odd-length input is rejected rather than silently truncated.
pub fn pcm_to_samples(raw: &[u8]) -> Result<Vec<f32>, CodecError> {
    if raw.len() % 2 != 0 {
        return Err(CodecError::OddLength(raw.len()));
    }

    let samples = raw
        .chunks_exact(2)
        .map(|pair| {
            let value = i16::from_le_bytes([pair[0], pair[1]]);
            value as f32 / 32768.0
        })
        .collect();

    Ok(samples)
}

/// Decode raw PCM bytes straight into a playable buffer
pub fn pcm_to_audio_buffer(raw: &[u8]) -> Result<Arc<AudioBuffer>, CodecError> {
    let samples = pcm_to_samples(raw)?;
    Ok(Arc::new(AudioBuffer::new(samples, SYNTHESIS_SAMPLE_RATE)))
}

/// Build a WAV container (44-byte RIFF header + payload) from raw
/// 16-bit PCM bytes. The payload is copied untouched after the header.
pub fn encode_wav(raw: &[u8], sample_rate: u32, channels: u16, bits_per_sample: u16) -> Vec<u8> {
    let block_align = channels * bits_per_sample / 8;
    let byte_rate = sample_rate * u32::from(block_align);
    let data_size = raw.len() as u32;

    let mut wav = Vec::with_capacity(44 + raw.len());

    // RIFF chunk
    wav.extend_from_slice(b"RIFF");
    wav.write_u32::<LittleEndian>(36 + data_size).unwrap();
    wav.extend_from_slice(b"WAVE");

    // fmt sub-chunk
    wav.extend_from_slice(b"fmt ");
    wav.write_u32::<LittleEndian>(16).unwrap();
    wav.write_u16::<LittleEndian>(1).unwrap(); // PCM
    wav.write_u16::<LittleEndian>(channels).unwrap();
    wav.write_u32::<LittleEndian>(sample_rate).unwrap();
    wav.write_u32::<LittleEndian>(byte_rate).unwrap();
    wav.write_u16::<LittleEndian>(block_align).unwrap();
    wav.write_u16::<LittleEndian>(bits_per_sample).unwrap();

    // data sub-chunk
    wav.extend_from_slice(b"data");
    wav.write_u32::<LittleEndian>(data_size).unwrap();
    wav.extend_from_slice(raw);

    wav
}

/// WAV container for the synthesis output format (24 kHz mono 16-bit)
pub fn encode_wav_default(raw: &[u8]) -> Vec<u8> {
    encode_wav(raw, SYNTHESIS_SAMPLE_RATE, 1, 16)
}
