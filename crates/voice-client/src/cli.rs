use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "voice-client", version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Optional client config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Pipeline sample rate in Hz; the output device must support it
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Submit the next fragment this many ms before the current one ends
    #[arg(long)]
    pub lookahead_ms: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect to the conversation service and play its audio
    Connect {
        /// WebSocket URL, e.g. ws://127.0.0.1:8000/ws (falls back to `url` in the config file)
        url: Option<String>,
    },

    /// Play a captured JSON-lines stream of server events
    Replay {
        /// Path to the capture file (one event per line)
        path: PathBuf,

        /// Delay between events in milliseconds (0 dispatches as fast as possible)
        #[arg(long, default_value_t = 0)]
        interval_ms: u64,
    },
}
