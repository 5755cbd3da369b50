use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use voice_chat_types::PlaybackStats;

/// Shared playback counters updated by ingress, scheduler and output callback.
#[derive(Debug, Default)]
pub struct PlaybackCounters {
    pub fragments_received: AtomicU64,
    pub fragments_queued: AtomicU64,
    pub fragments_played: AtomicU64,
    pub dropped_format: AtomicU64,
    pub dropped_decode: AtomicU64,
    pub dropped_submit: AtomicU64,
    pub sample_rate_mismatches: AtomicU64,
    /// Frames written by the output callback.
    pub played_frames: AtomicU64,
    /// Frames of silence emitted on underrun.
    pub underrun_frames: AtomicU64,
    /// Callbacks that ran dry.
    pub underrun_events: AtomicU64,
}

impl PlaybackCounters {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot counters plus live scheduler state.
    pub fn snapshot(&self, sample_rate: u32, queued_fragments: usize, draining: bool) -> PlaybackStats {
        PlaybackStats {
            sample_rate,
            fragments_received: self.fragments_received.load(Ordering::Relaxed),
            fragments_queued: self.fragments_queued.load(Ordering::Relaxed),
            fragments_played: self.fragments_played.load(Ordering::Relaxed),
            dropped_format: self.dropped_format.load(Ordering::Relaxed),
            dropped_decode: self.dropped_decode.load(Ordering::Relaxed),
            dropped_submit: self.dropped_submit.load(Ordering::Relaxed),
            sample_rate_mismatches: self.sample_rate_mismatches.load(Ordering::Relaxed),
            queued_fragments: queued_fragments as u64,
            draining,
            played_frames: self.played_frames.load(Ordering::Relaxed),
            underrun_frames: self.underrun_frames.load(Ordering::Relaxed),
            underrun_events: self.underrun_events.load(Ordering::Relaxed),
        }
    }
}
