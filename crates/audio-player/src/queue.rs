//! FIFO of decoded fragments awaiting playback.
//!
//! The queue is a plain container; synchronization is provided by the owning
//! [`PlaybackSession`](crate::scheduler::PlaybackSession), which keeps it under the same mutex as
//! the "playing" flag.

use std::collections::VecDeque;
use std::time::Duration;

use crate::decode::{DecodedFragment, frames_to_duration};

/// A fragment tagged with its position in the arrival order.
#[derive(Clone, Debug, PartialEq)]
pub struct QueuedFragment {
    /// Monotonically increasing per queue, starting at 0.
    pub seq: u64,
    pub fragment: DecodedFragment,
}

/// Unbounded FIFO of [`DecodedFragment`]s.
///
/// ## Design
/// - Insertion order is playback order; no reordering or deduplication.
/// - No capacity bound: the producer (the network) is assumed slower than playback.
/// - Each enqueued fragment receives a sequence number so consumers can log and verify order.
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    items: VecDeque<QueuedFragment>,
    next_seq: u64,
    queued_frames: usize,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment at the back. Always succeeds; returns its sequence number.
    pub fn enqueue(&mut self, fragment: DecodedFragment) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queued_frames += fragment.len();
        self.items.push_back(QueuedFragment { seq, fragment });
        seq
    }

    /// Remove and return the oldest fragment, or `None` when empty.
    pub fn dequeue_front(&mut self) -> Option<QueuedFragment> {
        let item = self.items.pop_front()?;
        self.queued_frames -= item.fragment.len();
        Some(item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drop everything still waiting. Sequence numbering continues where it left off.
    pub fn clear(&mut self) -> usize {
        let dropped = self.items.len();
        self.items.clear();
        self.queued_frames = 0;
        dropped
    }

    /// Total playback time of all queued fragments at `sample_rate`.
    pub fn queued_duration(&self, sample_rate: u32) -> Duration {
        frames_to_duration(self.queued_frames, sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(len: usize) -> DecodedFragment {
        DecodedFragment::new(vec![0.25; len])
    }

    #[test]
    fn dequeue_empty_returns_none() {
        let mut q = PlaybackQueue::new();
        assert!(q.dequeue_front().is_none());
        assert!(q.is_empty());
    }

    #[test]
    fn fifo_order_and_sequence_numbers() {
        let mut q = PlaybackQueue::new();
        assert_eq!(q.enqueue(fragment(1)), 0);
        assert_eq!(q.enqueue(fragment(2)), 1);
        assert_eq!(q.enqueue(fragment(3)), 2);
        assert_eq!(q.len(), 3);

        let lens: Vec<(u64, usize)> = std::iter::from_fn(|| q.dequeue_front())
            .map(|item| (item.seq, item.fragment.len()))
            .collect();
        assert_eq!(lens, vec![(0, 1), (1, 2), (2, 3)]);
    }

    #[test]
    fn enqueue_during_drain_is_visible() {
        let mut q = PlaybackQueue::new();
        q.enqueue(fragment(1));
        assert_eq!(q.dequeue_front().unwrap().seq, 0);
        q.enqueue(fragment(1));
        assert_eq!(q.dequeue_front().unwrap().seq, 1);
        assert!(q.dequeue_front().is_none());
    }

    #[test]
    fn queued_duration_tracks_contents() {
        let mut q = PlaybackQueue::new();
        q.enqueue(fragment(2_400));
        q.enqueue(fragment(4_800));
        assert_eq!(q.queued_duration(24_000), Duration::from_millis(300));
        q.dequeue_front();
        assert_eq!(q.queued_duration(24_000), Duration::from_millis(200));
    }

    #[test]
    fn clear_keeps_sequence_running() {
        let mut q = PlaybackQueue::new();
        q.enqueue(fragment(10));
        q.enqueue(fragment(10));
        assert_eq!(q.clear(), 2);
        assert_eq!(q.queued_duration(24_000), Duration::ZERO);
        assert_eq!(q.enqueue(fragment(10)), 2);
    }
}
