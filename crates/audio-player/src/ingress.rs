//! Entry point from the transport layer into the playback pipeline.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::decode::{self, EncodedFragment};
use crate::scheduler::PlaybackSession;
use crate::status::PlaybackCounters;

/// Decodes arriving fragments and feeds them to a [`PlaybackSession`].
///
/// Every per-fragment failure is absorbed here: unsupported formats and corrupt payloads are
/// logged, counted, and dropped so one bad fragment never stops the stream.
pub struct IngressAdapter {
    session: PlaybackSession,
    warned_rates: Mutex<HashSet<u32>>,
}

impl IngressAdapter {
    pub fn new(session: PlaybackSession) -> Self {
        Self {
            session,
            warned_rates: Mutex::new(HashSet::new()),
        }
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    /// Decode, enqueue, and wake the scheduler.
    pub fn on_fragment_received(&self, raw: EncodedFragment) {
        let counters = self.session.counters();
        PlaybackCounters::bump(&counters.fragments_received);

        if self.session.is_stopped() {
            tracing::debug!("fragment after session stop ignored");
            return;
        }

        let fragment = match decode::decode(&raw) {
            Ok(Some(fragment)) => fragment,
            Ok(None) => {
                PlaybackCounters::bump(&counters.dropped_format);
                tracing::debug!(format = ?raw.format, "fragment with unsupported format dropped");
                return;
            }
            Err(err) => {
                PlaybackCounters::bump(&counters.dropped_decode);
                tracing::warn!(payload_len = raw.payload.len(), "fragment dropped: {err}");
                return;
            }
        };

        if fragment.is_empty() {
            tracing::debug!("empty fragment dropped");
            return;
        }

        if let Some(rate) = raw.sample_rate {
            self.check_rate(rate);
        }

        if let Some(seq) = self.session.enqueue(fragment) {
            tracing::trace!(seq, "fragment queued");
            self.session.notify_fragment_available();
        }
    }

    fn check_rate(&self, rate: u32) {
        let expected = self.session.config().sample_rate;
        if rate == expected {
            return;
        }
        PlaybackCounters::bump(&self.session.counters().sample_rate_mismatches);
        let first = self
            .warned_rates
            .lock()
            .map(|mut warned| warned.insert(rate))
            .unwrap_or(true);
        if first {
            tracing::warn!(
                fragment_rate_hz = rate,
                pipeline_rate_hz = expected,
                "fragment sample rate differs from pipeline rate; playing without resampling"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use base64::Engine as _;
    use base64::engine::general_purpose;
    use voice_chat_types::AudioFormat;

    use crate::config::PlaybackConfig;
    use crate::scheduler::SchedulerState;
    use crate::sink::{AudioSink, ScheduledFragment, SinkError};

    #[derive(Default)]
    struct CollectSink {
        played: Mutex<Vec<Vec<f32>>>,
    }

    impl AudioSink for CollectSink {
        fn submit(&self, fragment: ScheduledFragment) -> Result<(), SinkError> {
            self.played.lock().unwrap().push(fragment.samples);
            Ok(())
        }
    }

    fn adapter(sink: Arc<CollectSink>) -> IngressAdapter {
        let session = PlaybackSession::start(
            PlaybackConfig::with_sample_rate(1_000),
            sink,
            PlaybackCounters::shared(),
        )
        .unwrap();
        IngressAdapter::new(session)
    }

    fn pcm16(samples: &[i16], rate: Option<u32>) -> EncodedFragment {
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        EncodedFragment {
            payload: general_purpose::STANDARD.encode(bytes),
            format: AudioFormat::Pcm16,
            sample_rate: rate,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn valid_fragment_is_queued_and_played() {
        let sink = Arc::new(CollectSink::default());
        let ingress = adapter(sink.clone());
        ingress.on_fragment_received(pcm16(&[16_384, -16_384], Some(1_000)));
        assert_eq!(ingress.session().state(), SchedulerState::Draining);

        ingress.session().wait_idle().await;
        assert_eq!(*sink.played.lock().unwrap(), vec![vec![0.5, -0.5]]);
        let stats = ingress.session().stats();
        assert_eq!(stats.fragments_received, 1);
        assert_eq!(stats.fragments_queued, 1);
        assert_eq!(stats.sample_rate_mismatches, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unsupported_format_never_wakes_scheduler() {
        let sink = Arc::new(CollectSink::default());
        let ingress = adapter(sink.clone());
        let mut fragment = pcm16(&[1, 2, 3], None);
        fragment.format = AudioFormat::Unknown;
        ingress.on_fragment_received(fragment);

        assert_eq!(ingress.session().state(), SchedulerState::Idle);
        assert_eq!(ingress.session().queued(), 0);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(sink.played.lock().unwrap().is_empty());
        assert_eq!(ingress.session().stats().dropped_format, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn corrupt_fragment_between_valid_ones_is_skipped() {
        let sink = Arc::new(CollectSink::default());
        let ingress = adapter(sink.clone());
        ingress.on_fragment_received(pcm16(&[8_192], None));
        ingress.on_fragment_received(EncodedFragment {
            payload: "%%%".to_string(),
            format: AudioFormat::Pcm16,
            sample_rate: None,
        });
        ingress.on_fragment_received(pcm16(&[-8_192], None));

        ingress.session().wait_idle().await;
        assert_eq!(*sink.played.lock().unwrap(), vec![vec![0.25], vec![-0.25]]);
        let stats = ingress.session().stats();
        assert_eq!(stats.dropped_decode, 1);
        assert_eq!(stats.fragments_played, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_fragment_is_not_queued() {
        let sink = Arc::new(CollectSink::default());
        let ingress = adapter(sink.clone());
        ingress.on_fragment_received(pcm16(&[], None));
        assert_eq!(ingress.session().state(), SchedulerState::Idle);
        assert_eq!(ingress.session().stats().fragments_queued, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn mismatched_rate_is_counted_but_played() {
        let sink = Arc::new(CollectSink::default());
        let ingress = adapter(sink.clone());
        ingress.on_fragment_received(pcm16(&[1], Some(16_000)));
        ingress.on_fragment_received(pcm16(&[1], Some(16_000)));

        ingress.session().wait_idle().await;
        assert_eq!(sink.played.lock().unwrap().len(), 2);
        assert_eq!(ingress.session().stats().sample_rate_mismatches, 2);
        assert_eq!(ingress.warned_rates.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fragments_after_stop_are_ignored() {
        let sink = Arc::new(CollectSink::default());
        let ingress = adapter(sink.clone());
        ingress.session().stop();
        ingress.on_fragment_received(pcm16(&[1, 2], None));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(sink.played.lock().unwrap().is_empty());
        assert_eq!(ingress.session().stats().fragments_received, 1);
    }
}
