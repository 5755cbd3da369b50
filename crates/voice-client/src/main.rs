//! Voice Client — plays the audio side of a conversation with a remote voice service.
//!
//! ## Pipeline
//! 1. **Transport**: a WebSocket delivers JSON events; audio events carry base64 PCM16 fragments.
//! 2. **Ingress/decode**: fragments become normalized `f32` samples at a fixed sample rate.
//! 3. **Schedule**: a single drain task submits fragments back-to-back on one timeline.
//! 4. **Playback**: the CPAL callback pulls submitted samples without blocking.
//!
//! ## Modes
//! - `connect`: talk to a live service.
//! - `replay`: play a captured JSON-lines event stream.

use anyhow::{Result, bail};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use voice_client::cli::{Args, Command};
use voice_client::config::{ClientConfig, Overrides};
use voice_client::runtime;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,voice_client=info,audio_player=info")
        }))
        .init();

    // wss:// connections use the ring provider; an already-installed provider is fine.
    let _ = rustls::crypto::ring::default_provider().install_default();

    if args.list_devices {
        return runtime::list_devices();
    }

    let file_cfg = ClientConfig::load_or_default(args.config.as_deref())?;
    let mut overrides = Overrides {
        url: None,
        sample_rate: args.sample_rate,
        device: args.device.clone(),
        lookahead_ms: args.lookahead_ms,
    };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        let _ = ctrlc::set_handler(move || {
            if cancel.is_cancelled() {
                std::process::exit(130);
            }
            tracing::info!("shutdown requested");
            cancel.cancel();
        });
    }

    match args.cmd {
        Some(Command::Connect { url }) => {
            overrides.url = url;
            let config = file_cfg.resolve(overrides)?;
            runtime::run_connect(config, cancel).await
        }
        Some(Command::Replay { path, interval_ms }) => {
            let config = file_cfg.resolve(overrides)?;
            runtime::run_replay(
                config,
                &path,
                std::time::Duration::from_millis(interval_ms),
                cancel,
            )
            .await
        }
        None => bail!("no command given; use `connect <url>`, `replay <path>`, or `--list-devices`"),
    }
}
