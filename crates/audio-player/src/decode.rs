//! Fragment decode stage.
//!
//! Turns one base64 PCM16 wire fragment into normalized `f32` samples:
//! - non-playable formats are filtered (`Ok(None)`), not treated as errors
//! - the payload is base64-decoded and read as signed 16-bit little-endian integers
//! - each integer `s` becomes `s / 32768.0`, so output lies in `[-1.0, 1.0)`
//!
//! No clipping, dithering or resampling happens here.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose;
use voice_chat_types::{AudioChunk, AudioFormat};

/// Scale factor from `i16` to normalized `f32`.
const PCM16_SCALE: f32 = 32768.0;

/// Raw fragment as received from the transport layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedFragment {
    /// Base64 payload.
    pub payload: String,
    /// Encoding of the decoded payload.
    pub format: AudioFormat,
    /// Sample rate reported by the sender, if any.
    pub sample_rate: Option<u32>,
}

impl From<AudioChunk> for EncodedFragment {
    fn from(chunk: AudioChunk) -> Self {
        Self {
            payload: chunk.audio,
            format: chunk.format,
            sample_rate: chunk.sample_rate,
        }
    }
}

/// Mono samples in playback order, at the pipeline sample rate.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecodedFragment {
    samples: Vec<f32>,
}

impl DecodedFragment {
    pub fn new(samples: Vec<f32>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Nominal playback duration at `sample_rate`.
    pub fn duration(&self, sample_rate: u32) -> Duration {
        frames_to_duration(self.samples.len(), sample_rate)
    }
}

/// Why a fragment payload could not be decoded.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("pcm16 payload has odd length ({0} bytes)")]
    OddLength(usize),
}

/// Decode one fragment.
///
/// Returns `Ok(None)` when the fragment's format is not playable; such fragments are dropped by
/// the caller without being counted as errors.
pub fn decode(fragment: &EncodedFragment) -> Result<Option<DecodedFragment>, DecodeError> {
    if !fragment.format.is_playable() {
        return Ok(None);
    }
    let bytes = general_purpose::STANDARD.decode(fragment.payload.as_bytes())?;
    let samples = decode_pcm16_le(&bytes)?;
    Ok(Some(DecodedFragment::new(samples)))
}

/// Convert raw little-endian `i16` bytes into normalized samples.
pub fn decode_pcm16_le(bytes: &[u8]) -> Result<Vec<f32>, DecodeError> {
    if bytes.len() % 2 != 0 {
        return Err(DecodeError::OddLength(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / PCM16_SCALE)
        .collect())
}

/// Exact duration of `frames` at `sample_rate`, rounded down to the nanosecond.
pub fn frames_to_duration(frames: usize, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    let nanos = (frames as u128 * 1_000_000_000) / sample_rate as u128;
    Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
}
