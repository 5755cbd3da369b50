//! Routes inbound server events to the playback pipeline or the log.

use anyhow::{Context, Result};
use audio_player::decode::EncodedFragment;
use audio_player::ingress::IngressAdapter;
use voice_chat_types::{ServerEvent, TranscriptRole};

/// What a dispatched event turned into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatched {
    Audio,
    Transcript,
    Status,
    Error,
    Ignored,
}

pub struct EventDispatcher {
    ingress: IngressAdapter,
}

impl EventDispatcher {
    pub fn new(ingress: IngressAdapter) -> Self {
        Self { ingress }
    }

    pub fn ingress(&self) -> &IngressAdapter {
        &self.ingress
    }

    /// Parse one JSON text frame and dispatch it.
    pub fn handle_text(&self, text: &str) -> Result<Dispatched> {
        let event: ServerEvent = serde_json::from_str(text).context("parse server event")?;
        Ok(self.dispatch(event))
    }

    pub fn dispatch(&self, event: ServerEvent) -> Dispatched {
        match event {
            ServerEvent::Audio(chunk) => {
                self.ingress.on_fragment_received(EncodedFragment::from(chunk));
                Dispatched::Audio
            }
            ServerEvent::Transcript {
                role,
                text,
                is_final,
            } => {
                tracing::info!(role = role_label(role), is_final, "{text}");
                Dispatched::Transcript
            }
            ServerEvent::Status { message } => {
                tracing::info!("service status: {message}");
                Dispatched::Status
            }
            ServerEvent::Error { message } => {
                tracing::warn!("service error: {message}");
                Dispatched::Error
            }
            ServerEvent::Unknown => {
                tracing::debug!("unknown event ignored");
                Dispatched::Ignored
            }
        }
    }
}

fn role_label(role: TranscriptRole) -> &'static str {
    match role {
        TranscriptRole::User => "user",
        TranscriptRole::Assistant => "assistant",
        TranscriptRole::Other => "other",
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use audio_player::config::PlaybackConfig;
    use audio_player::scheduler::PlaybackSession;
    use audio_player::sink::{AudioSink, ScheduledFragment, SinkError};
    use audio_player::status::PlaybackCounters;

    #[derive(Default)]
    pub(crate) struct CountingSink {
        pub(crate) frames: Mutex<Vec<usize>>,
    }

    impl AudioSink for CountingSink {
        fn submit(&self, fragment: ScheduledFragment) -> Result<(), SinkError> {
            self.frames.lock().unwrap().push(fragment.samples.len());
            Ok(())
        }
    }

    pub(crate) fn dispatcher(sink: Arc<CountingSink>) -> EventDispatcher {
        let session = PlaybackSession::start(
            PlaybackConfig::with_sample_rate(1_000),
            sink,
            PlaybackCounters::shared(),
        )
        .unwrap();
        EventDispatcher::new(IngressAdapter::new(session))
    }

    #[tokio::test(start_paused = true)]
    async fn audio_event_reaches_sink() {
        let sink = Arc::new(CountingSink::default());
        let d = dispatcher(sink.clone());
        // Two samples of silence.
        let out = d
            .handle_text(r#"{"type":"audio","audio":"AAAAAA==","format":"pcm16","sampleRate":1000}"#)
            .unwrap();
        assert_eq!(out, Dispatched::Audio);
        d.ingress().session().wait_idle().await;
        assert_eq!(*sink.frames.lock().unwrap(), vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn non_audio_events_do_not_touch_playback() {
        let sink = Arc::new(CountingSink::default());
        let d = dispatcher(sink.clone());
        let cases = [
            (r#"{"type":"transcript","role":"user","text":"hello","final":true}"#, Dispatched::Transcript),
            (r#"{"type":"status","message":"connected"}"#, Dispatched::Status),
            (r#"{"type":"error","message":"quota"}"#, Dispatched::Error),
            (r#"{"type":"typing"}"#, Dispatched::Ignored),
            (r#"{"type":"audio","audio":"AAAA","format":"mp3"}"#, Dispatched::Audio),
        ];
        for (raw, expected) in cases {
            assert_eq!(d.handle_text(raw).unwrap(), expected, "{raw}");
        }
        assert_eq!(d.ingress().session().stats().fragments_queued, 0);
        assert!(sink.frames.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_json_is_an_error() {
        let sink = Arc::new(CountingSink::default());
        let d = dispatcher(sink);
        assert!(d.handle_text("{not json").is_err());
        assert!(d.handle_text(r#"{"type":"audio"}"#).is_err());
    }
}
