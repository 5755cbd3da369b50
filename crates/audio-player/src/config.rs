use std::time::Duration;

/// Pipeline sample rate used when nothing else is configured.
pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;

/// Playback tuning parameters shared by the scheduler and the output stage.
#[derive(Clone, Debug)]
pub struct PlaybackConfig {
    /// Fixed pipeline sample rate in Hz. Used to turn sample counts into durations and to open
    /// the output device.
    pub sample_rate: u32,
    /// How long before a fragment's nominal end the scheduler wakes to submit the next one.
    ///
    /// Zero means the next fragment is submitted exactly at the previous fragment's end.
    pub lookahead: Duration,
    /// Max frames pulled per output callback refill.
    pub refill_max_frames: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            lookahead: Duration::ZERO,
            refill_max_frames: 4096,
        }
    }
}

impl PlaybackConfig {
    /// Config for `sample_rate` with all other knobs at their defaults.
    pub fn with_sample_rate(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            ..Self::default()
        }
    }
}
