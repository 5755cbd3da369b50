//! Replay of captured server events (JSON lines).
//!
//! Lets the playback pipeline be exercised without a live service: each non-empty line that does
//! not start with `#` is parsed as one [`ServerEvent`](voice_chat_types::ServerEvent).

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::dispatch::EventDispatcher;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Lines dispatched as events.
    pub events: usize,
    /// Lines that failed to parse.
    pub malformed: usize,
    /// `true` if replay stopped early on cancellation.
    pub cancelled: bool,
}

/// Read `path` and replay its events.
pub async fn replay_file(
    path: &Path,
    dispatcher: &EventDispatcher,
    interval: Duration,
    cancel: &CancellationToken,
) -> Result<ReplaySummary> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("read capture {:?}", path))?;
    Ok(replay_events(&raw, dispatcher, interval, cancel).await)
}

/// Dispatch each event line in `input`, sleeping `interval` between events.
pub async fn replay_events(
    input: &str,
    dispatcher: &EventDispatcher,
    interval: Duration,
    cancel: &CancellationToken,
) -> ReplaySummary {
    let mut summary = ReplaySummary::default();
    for (idx, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if cancel.is_cancelled() {
            summary.cancelled = true;
            break;
        }
        match dispatcher.handle_text(line) {
            Ok(_) => summary.events += 1,
            Err(e) => {
                summary.malformed += 1;
                tracing::warn!(line = idx + 1, "skipping malformed event: {e:#}");
            }
        }
        if !interval.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => {
                    summary.cancelled = true;
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use base64::Engine as _;
    use base64::engine::general_purpose;
    use tokio::time::Instant;

    use crate::dispatch::tests::{CountingSink, dispatcher};

    fn audio_line(samples: usize) -> String {
        let payload = general_purpose::STANDARD.encode(vec![0u8; samples * 2]);
        format!(r#"{{"type":"audio","audio":"{payload}","format":"pcm16","sampleRate":1000}}"#)
    }

    #[tokio::test(start_paused = true)]
    async fn replays_audio_in_order_and_skips_bad_lines() {
        let sink = Arc::new(CountingSink::default());
        let d = dispatcher(sink.clone());
        let input = format!(
            "# capture\n{}\n\nnot json\n{}\n{{\"type\":\"status\",\"message\":\"done\"}}\n",
            audio_line(100),
            audio_line(50)
        );

        let summary = replay_events(&input, &d, Duration::ZERO, &CancellationToken::new()).await;
        assert_eq!(
            summary,
            ReplaySummary {
                events: 3,
                malformed: 1,
                cancelled: false
            }
        );
        d.ingress().session().wait_idle().await;
        assert_eq!(*sink.frames.lock().unwrap(), vec![100, 50]);
    }

    #[tokio::test(start_paused = true)]
    async fn interval_paces_dispatch() {
        let sink = Arc::new(CountingSink::default());
        let d = dispatcher(sink);
        let input = format!("{}\n{}\n", audio_line(10), audio_line(10));
        let t0 = Instant::now();
        let summary =
            replay_events(&input, &d, Duration::from_millis(250), &CancellationToken::new()).await;
        assert_eq!(summary.events, 2);
        assert_eq!(Instant::now() - t0, Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_replay_stops_early() {
        let sink = Arc::new(CountingSink::default());
        let d = dispatcher(sink);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let summary = replay_events(&audio_line(10), &d, Duration::ZERO, &cancel).await;
        assert!(summary.cancelled);
        assert_eq!(summary.events, 0);
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let sink = Arc::new(CountingSink::default());
        let d = dispatcher(sink);
        let result = replay_file(
            Path::new("/nonexistent/capture.jsonl"),
            &d,
            Duration::ZERO,
            &CancellationToken::new(),
        )
        .await;
        assert!(result.is_err());
    }
}
