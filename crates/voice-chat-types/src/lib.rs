use serde::{Deserialize, Serialize};

/// Audio encoding tag carried by inbound audio events.
///
/// Only [`AudioFormat::Pcm16`] is playable. Any other tag deserializes to
/// [`AudioFormat::Unknown`] so it can be dropped by the ingress filter instead of failing the
/// whole event.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    /// Signed 16-bit little-endian PCM, mono.
    Pcm16,
    /// Any tag this client does not understand.
    #[serde(other)]
    Unknown,
}

impl AudioFormat {
    /// `true` for formats the playback pipeline can decode.
    pub fn is_playable(self) -> bool {
        matches!(self, AudioFormat::Pcm16)
    }
}

/// One audio fragment as it arrives on the wire.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AudioChunk {
    /// Base64-encoded sample payload.
    pub audio: String,
    /// Encoding of the decoded payload.
    pub format: AudioFormat,
    /// Nominal sample rate reported by the service (Hz). Informational only.
    #[serde(default)]
    pub sample_rate: Option<u32>,
}

/// Speaker of a transcript line.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptRole {
    User,
    Assistant,
    #[serde(other)]
    Other,
}

/// Events pushed by the conversational service over the socket.
///
/// Internally tagged by `type`; unrecognized tags parse as [`ServerEvent::Unknown`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A playable audio fragment.
    Audio(AudioChunk),
    /// A line of conversation text.
    Transcript {
        role: TranscriptRole,
        text: String,
        #[serde(default, rename = "final")]
        is_final: bool,
    },
    /// Connection or service status message.
    Status { message: String },
    /// Service-reported error.
    Error { message: String },
    #[serde(other)]
    Unknown,
}

/// Point-in-time playback counters for one session.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaybackStats {
    /// Pipeline sample rate (Hz).
    pub sample_rate: u32,
    /// Fragments handed to the ingress adapter.
    pub fragments_received: u64,
    /// Fragments accepted into the playback queue.
    pub fragments_queued: u64,
    /// Fragments accepted by the output sink.
    pub fragments_played: u64,
    /// Fragments filtered out for a non-playable format.
    pub dropped_format: u64,
    /// Fragments dropped because their payload failed to decode.
    pub dropped_decode: u64,
    /// Fragments rejected by the output sink.
    pub dropped_submit: u64,
    /// Fragments whose reported sample rate differed from the pipeline rate.
    pub sample_rate_mismatches: u64,
    /// Fragments currently waiting in the queue.
    pub queued_fragments: u64,
    /// `true` while a drain loop is active.
    pub draining: bool,
    /// Frames written to the device by the output callback.
    pub played_frames: u64,
    /// Frames of silence emitted because no audio was buffered.
    pub underrun_frames: u64,
    /// Number of callbacks that hit an underrun.
    pub underrun_events: u64,
}

impl PlaybackStats {
    /// Audio written to the device so far, in milliseconds.
    pub fn played_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.played_frames.saturating_mul(1000) / self.sample_rate as u64
    }
}
