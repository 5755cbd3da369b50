//! Sample buffer between the scheduler-facing sink and the CPAL callback.
//!
//! The sink appends whole fragments; the output callback drains it without blocking.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// Thread-safe FIFO of mono `f32` samples.
///
/// ## Design
/// - **One producer / one consumer**: the sink pushes, the CPAL callback pops.
/// - **Unbounded**: pacing is the scheduler's job, so pushes never block or drop.
/// - A `closed` flag is stored *under the same mutex* as the samples so a pop never races a close.
/// - Closing only stops new pushes. Accepted samples stay poppable until rendered or discarded.
/// - Samples popped by the callback count as in flight until it reports them rendered.
pub struct SampleBuffer {
    inner: Mutex<BufferInner>,
}

struct BufferInner {
    samples: VecDeque<f32>,
    in_flight: usize,
    closed: bool,
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BufferInner {
                samples: VecDeque::new(),
                in_flight: 0,
                closed: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BufferInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append samples. Returns `false` (and drops the samples) once closed.
    pub fn push(&self, samples: &[f32]) -> bool {
        let mut g = self.lock();
        if g.closed {
            return false;
        }
        g.samples.extend(samples.iter().copied());
        true
    }

    /// Return immediately with up to `max` samples, or `None` if currently empty.
    pub fn pop_nonblocking(&self, max: usize) -> Option<Vec<f32>> {
        let mut g = self.lock();
        let take = g.samples.len().min(max);
        if take == 0 {
            return None;
        }
        g.in_flight += take;
        Some(g.samples.drain(..take).collect())
    }

    /// Report `count` popped samples as rendered.
    pub fn mark_rendered(&self, count: usize) {
        if count == 0 {
            return;
        }
        let mut g = self.lock();
        g.in_flight = g.in_flight.saturating_sub(count);
    }

    /// Samples waiting to be popped (best-effort snapshot).
    pub fn len(&self) -> usize {
        self.lock().samples.len()
    }

    /// Accepted samples not yet rendered: queued plus popped-but-unplayed.
    pub fn pending(&self) -> usize {
        let g = self.lock();
        g.samples.len() + g.in_flight
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting samples. Already accepted samples can still be popped. Idempotent.
    pub fn close(&self) {
        self.lock().closed = true;
    }

    /// Drop every accepted sample that has not been rendered. Returns how many were dropped.
    pub fn discard(&self) -> usize {
        let mut g = self.lock();
        let dropped = g.samples.len() + g.in_flight;
        g.samples.clear();
        g.in_flight = 0;
        dropped
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn pop_nonblocking_empty() {
        let buf = SampleBuffer::new();
        assert!(buf.pop_nonblocking(4).is_none());
    }

    #[test]
    fn pop_nonblocking_returns_available_samples() {
        let buf = SampleBuffer::new();
        buf.push(&[1.0, 2.0, 3.0]);
        buf.push(&[4.0]);
        assert_eq!(buf.pop_nonblocking(3).unwrap(), vec![1.0, 2.0, 3.0]);
        assert_eq!(buf.pop_nonblocking(3).unwrap(), vec![4.0]);
        assert!(buf.is_empty());
    }

    #[test]
    fn push_after_close_is_rejected() {
        let buf = SampleBuffer::new();
        buf.push(&[1.0]);
        buf.close();
        assert!(buf.is_closed());
        assert!(!buf.push(&[2.0]));
        assert_eq!(buf.pop_nonblocking(8).unwrap(), vec![1.0]);
        assert!(buf.pop_nonblocking(8).is_none());
    }

    #[test]
    fn close_keeps_accepted_samples() {
        let buf = SampleBuffer::new();
        buf.push(&vec![0.1; 2_400]);
        buf.close();
        assert_eq!(buf.len(), 2_400);
        assert_eq!(buf.pending(), 2_400);
    }

    #[test]
    fn popped_samples_stay_pending_until_rendered() {
        let buf = SampleBuffer::new();
        buf.push(&[1.0, 2.0, 3.0, 4.0]);
        let chunk = buf.pop_nonblocking(3).unwrap();
        assert_eq!(chunk.len(), 3);
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.pending(), 4);

        buf.mark_rendered(2);
        assert_eq!(buf.pending(), 2);
        buf.mark_rendered(10);
        assert_eq!(buf.pending(), 1);
    }

    #[test]
    fn discard_drops_queued_and_in_flight() {
        let buf = SampleBuffer::new();
        buf.push(&[1.0, 2.0, 3.0]);
        let _ = buf.pop_nonblocking(1);
        assert_eq!(buf.discard(), 3);
        assert_eq!(buf.pending(), 0);
        assert!(buf.is_empty());
    }

    #[test]
    fn concurrent_push_and_pop_preserve_order() {
        let buf = Arc::new(SampleBuffer::new());
        let producer = buf.clone();
        let handle = thread::spawn(move || {
            for i in 0..100 {
                producer.push(&[i as f32]);
            }
        });

        let mut seen = Vec::new();
        while seen.len() < 100 {
            if let Some(v) = buf.pop_nonblocking(7) {
                seen.extend(v);
            }
        }
        handle.join().unwrap();
        let expected: Vec<f32> = (0..100).map(|i| i as f32).collect();
        assert_eq!(seen, expected);
    }
}
