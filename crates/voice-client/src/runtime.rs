//! Client runtime helpers.
//!
//! Provides device enumeration, the live connection loop, and capture replay.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use audio_player::device;
use audio_player::ingress::IngressAdapter;
use audio_player::playback::{CpalSink, Playout};
use audio_player::scheduler::PlaybackSession;
use audio_player::status::PlaybackCounters;
use tokio_util::sync::CancellationToken;
use voice_chat_types::PlaybackStats;

use crate::config::ResolvedConfig;
use crate::dispatch::EventDispatcher;
use crate::replay;
use crate::transport::{self, DisconnectReason};

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    device::list_devices(&host)
}

/// Connect to the service and play its audio until disconnect or cancellation.
pub async fn run_connect(config: ResolvedConfig, cancel: CancellationToken) -> Result<()> {
    let url = config.require_url()?.to_string();
    let (session, sink) = start_session(&config)?;
    let dispatcher = EventDispatcher::new(IngressAdapter::new(session.clone()));

    let result = transport::run_connection(&url, &dispatcher, &cancel).await;

    // Disconnect abandons whatever is still queued; fragments the sink accepted still play.
    session.shutdown().await;
    finish_output(&sink).await;
    log_stats(&session.stats());

    match result? {
        DisconnectReason::Cancelled => tracing::info!("disconnected (shutdown requested)"),
        DisconnectReason::Closed(reason) => {
            tracing::info!(reason = reason.as_deref().unwrap_or(""), "server closed connection")
        }
        DisconnectReason::StreamEnded => tracing::info!("connection ended"),
    }
    Ok(())
}

/// Replay a JSON-lines capture and wait for its audio to finish playing.
///
/// Cancellation skips whatever is still queued, but audio the device already accepted plays out.
pub async fn run_replay(
    config: ResolvedConfig,
    path: &Path,
    interval: Duration,
    cancel: CancellationToken,
) -> Result<()> {
    let (session, sink) = start_session(&config)?;
    let dispatcher = EventDispatcher::new(IngressAdapter::new(session.clone()));

    let summary = replay::replay_file(path, &dispatcher, interval, &cancel).await;
    if let Ok(summary) = &summary {
        tracing::info!(
            events = summary.events,
            malformed = summary.malformed,
            cancelled = summary.cancelled,
            "replay dispatched"
        );
        if !summary.cancelled {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = session.wait_idle() => {}
            }
        }
    }

    session.shutdown().await;
    finish_output(&sink).await;
    log_stats(&session.stats());
    summary.map(|_| ())
}

fn start_session(config: &ResolvedConfig) -> Result<(PlaybackSession, Arc<CpalSink>)> {
    let counters = PlaybackCounters::shared();
    let sink = Arc::new(CpalSink::open(
        config.device.as_deref(),
        &config.playback,
        counters.clone(),
    )?);
    let session = PlaybackSession::start(config.playback.clone(), sink.clone(), counters)?;
    Ok((session, sink))
}

async fn finish_output(sink: &CpalSink) {
    let pending = sink.buffered_samples();
    // Failed and timed-out playouts are logged by the sink.
    if sink.drain_and_close().await == Playout::Drained {
        tracing::debug!(pending_samples = pending, "output played out");
    }
}

fn log_stats(stats: &PlaybackStats) {
    tracing::info!(
        received = stats.fragments_received,
        played = stats.fragments_played,
        dropped_format = stats.dropped_format,
        dropped_decode = stats.dropped_decode,
        dropped_submit = stats.dropped_submit,
        rate_mismatches = stats.sample_rate_mismatches,
        played_ms = stats.played_ms(),
        underrun_events = stats.underrun_events,
        "playback summary"
    );
}
