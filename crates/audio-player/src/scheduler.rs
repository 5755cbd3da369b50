//! Single-flight playback scheduler.
//!
//! A [`PlaybackSession`] owns the fragment queue, the "playing" flag, and the playback timeline
//! for one connection. Fragments are handed to an [`AudioSink`] one at a time by a drain task:
//!
//! 1. take the front fragment (or go idle if the queue is empty)
//! 2. submit it to start at the previous fragment's nominal end (gapless concatenation)
//! 3. sleep until that fragment's nominal end, then repeat
//!
//! At most one drain task exists per session. The flag is set and cleared under the same mutex
//! as the queue, so a fragment enqueued while the drain task is deciding to go idle is never
//! stranded.

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use voice_chat_types::PlaybackStats;

use crate::config::PlaybackConfig;
use crate::decode::DecodedFragment;
use crate::queue::{PlaybackQueue, QueuedFragment};
use crate::sink::{AudioSink, ScheduledFragment};
use crate::status::PlaybackCounters;

/// Observable scheduler state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Draining,
}

struct SessionState {
    queue: PlaybackQueue,
    playing: bool,
    stopped: bool,
    /// Nominal end of the last fragment accepted by the sink.
    timeline_end: Option<Instant>,
}

struct SessionInner {
    config: PlaybackConfig,
    sink: Arc<dyn AudioSink>,
    counters: Arc<PlaybackCounters>,
    state: Mutex<SessionState>,
    cancel: CancellationToken,
    tracker: TaskTracker,
    runtime: Handle,
    idle: Notify,
}

impl SessionInner {
    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn finish_drain(&self) {
        self.lock_state().playing = false;
        self.idle.notify_waiters();
    }
}

/// Playback state for one connection: queue, single-flight flag, timeline, and sink.
///
/// Cloning is cheap and yields another handle to the same session.
#[derive(Clone)]
pub struct PlaybackSession {
    inner: Arc<SessionInner>,
}

impl PlaybackSession {
    /// Create a session bound to the current tokio runtime.
    ///
    /// Drain tasks are spawned on that runtime, so [`enqueue`](Self::enqueue) and
    /// [`notify_fragment_available`](Self::notify_fragment_available) may later be called from
    /// any thread.
    pub fn start(
        config: PlaybackConfig,
        sink: Arc<dyn AudioSink>,
        counters: Arc<PlaybackCounters>,
    ) -> Result<Self> {
        let runtime = Handle::try_current().context("playback session requires a tokio runtime")?;
        tracing::info!(
            rate_hz = config.sample_rate,
            lookahead_ms = config.lookahead.as_millis() as u64,
            "playback session started"
        );
        Ok(Self {
            inner: Arc::new(SessionInner {
                config,
                sink,
                counters,
                state: Mutex::new(SessionState {
                    queue: PlaybackQueue::new(),
                    playing: false,
                    stopped: false,
                    timeline_end: None,
                }),
                cancel: CancellationToken::new(),
                tracker: TaskTracker::new(),
                runtime,
                idle: Notify::new(),
            }),
        })
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.inner.config
    }

    pub fn counters(&self) -> &Arc<PlaybackCounters> {
        &self.inner.counters
    }

    /// Append a fragment to the queue.
    ///
    /// Returns the fragment's sequence number, or `None` if the session has been stopped.
    /// Does not start playback; call [`notify_fragment_available`](Self::notify_fragment_available).
    pub fn enqueue(&self, fragment: DecodedFragment) -> Option<u64> {
        let mut st = self.inner.lock_state();
        if st.stopped {
            return None;
        }
        let seq = st.queue.enqueue(fragment);
        PlaybackCounters::bump(&self.inner.counters.fragments_queued);
        Some(seq)
    }

    /// Wake the scheduler. Idempotent.
    ///
    /// Starts a drain task if none is running and the queue is non-empty. A wake while a drain
    /// task is running is a no-op: that task re-checks the queue after every fragment.
    pub fn notify_fragment_available(&self) {
        {
            let mut st = self.inner.lock_state();
            if st.stopped || st.playing || st.queue.is_empty() {
                return;
            }
            st.playing = true;
        }
        let inner = self.inner.clone();
        self.inner.tracker.spawn_on(drain(inner), &self.inner.runtime);
    }

    pub fn state(&self) -> SchedulerState {
        if self.inner.lock_state().playing {
            SchedulerState::Draining
        } else {
            SchedulerState::Idle
        }
    }

    /// Fragments waiting to be submitted.
    pub fn queued(&self) -> usize {
        self.inner.lock_state().queue.len()
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.lock_state().stopped
    }

    pub fn stats(&self) -> PlaybackStats {
        let (queued, draining) = {
            let st = self.inner.lock_state();
            (st.queue.len(), st.playing)
        };
        self.inner
            .counters
            .snapshot(self.inner.config.sample_rate, queued, draining)
    }

    /// Wait until no drain task is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.inner.lock_state().playing {
                return;
            }
            notified.await;
        }
    }

    /// Stop the session: drop queued fragments and signal the drain task to exit.
    ///
    /// A fragment already handed to the sink is left to finish. Later enqueues are rejected.
    pub fn stop(&self) {
        let dropped = {
            let mut st = self.inner.lock_state();
            if st.stopped {
                return;
            }
            st.stopped = true;
            st.queue.clear()
        };
        self.inner.cancel.cancel();
        self.inner.tracker.close();
        tracing::info!(dropped_fragments = dropped, "playback session stopped");
    }

    /// [`stop`](Self::stop) and wait for the drain task to exit.
    pub async fn shutdown(&self) {
        self.stop();
        self.inner.tracker.wait().await;
    }
}

/// Drain loop. Exactly one instance runs while `playing` is set.
async fn drain(inner: Arc<SessionInner>) {
    let rate = inner.config.sample_rate;
    tracing::debug!("drain loop start");

    loop {
        if inner.cancel.is_cancelled() {
            break;
        }

        let (item, start_at) = {
            let mut st = inner.lock_state();
            let Some(item) = st.queue.dequeue_front() else {
                // Cleared under the same lock that observed the empty queue.
                st.playing = false;
                drop(st);
                inner.idle.notify_waiters();
                tracing::debug!("drain loop idle");
                return;
            };
            let now = Instant::now();
            let start_at = st.timeline_end.filter(|end| *end > now).unwrap_or(now);
            (item, start_at)
        };

        let QueuedFragment { seq, fragment } = item;
        let frames = fragment.len();
        let duration = fragment.duration(rate);
        let scheduled = ScheduledFragment {
            seq,
            start_at,
            duration,
            samples: fragment.into_samples(),
        };

        if let Err(err) = inner.sink.submit(scheduled) {
            PlaybackCounters::bump(&inner.counters.dropped_submit);
            tracing::warn!(seq, frames, "dropping fragment: {err}");
            continue;
        }
        PlaybackCounters::bump(&inner.counters.fragments_played);

        let end = start_at + duration;
        inner.lock_state().timeline_end = Some(end);
        tracing::trace!(seq, frames, duration_ms = duration.as_millis() as u64, "fragment submitted");

        let wake_at = end
            .checked_sub(inner.config.lookahead)
            .unwrap_or(end)
            .max(start_at);
        tokio::select! {
            _ = inner.cancel.cancelled() => break,
            _ = tokio::time::sleep_until(wake_at) => {}
        }
    }

    inner.finish_drain();
    tracing::debug!("drain loop cancelled");
}
