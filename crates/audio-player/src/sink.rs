//! Output-device seam used by the playback scheduler.

use std::time::Duration;

use tokio::time::Instant;

/// A fragment the scheduler has placed on the playback timeline.
#[derive(Clone, Debug)]
pub struct ScheduledFragment {
    /// Arrival sequence number from the playback queue.
    pub seq: u64,
    /// When the fragment should start sounding (previous fragment's nominal end, or now).
    pub start_at: Instant,
    /// Nominal playback duration at the pipeline sample rate.
    pub duration: Duration,
    /// Mono samples in `[-1.0, 1.0)`.
    pub samples: Vec<f32>,
}

impl ScheduledFragment {
    /// Nominal end of this fragment on the timeline.
    pub fn end_at(&self) -> Instant {
        self.start_at + self.duration
    }
}

/// Why the output device refused a fragment.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("output device unavailable: {0}")]
    Unavailable(String),

    #[error("output sink closed")]
    Closed,
}

/// Destination for scheduled fragments.
///
/// The scheduler calls [`AudioSink::submit`] once per fragment, in queue order, and never
/// concurrently. Implementations must not block for the fragment's playback duration.
pub trait AudioSink: Send + Sync {
    fn submit(&self, fragment: ScheduledFragment) -> Result<(), SinkError>;
}
