//! Configuration loading and resolution.
//!
//! Values come from an optional TOML file and are overridden by CLI flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;

pub use audio_player::config::PlaybackConfig;

/// Config file looked up next to the executable when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "voice-client.toml";

/// Lookahead used by the client unless configured otherwise. Covers the device callback period
/// so the output never runs dry between fragments.
pub const DEFAULT_LOOKAHEAD_MS: u64 = 50;

/// Client configuration loaded from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// WebSocket URL of the conversation service.
    pub url: Option<String>,
    /// Pipeline sample rate (Hz).
    pub sample_rate: Option<u32>,
    /// Output device substring.
    pub device: Option<String>,
    /// Scheduler lookahead in milliseconds.
    pub lookahead_ms: Option<u64>,
    /// Max frames pulled per output callback refill.
    pub refill_max_frames: Option<usize>,
}

/// CLI values that take precedence over the file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub url: Option<String>,
    pub sample_rate: Option<u32>,
    pub device: Option<String>,
    pub lookahead_ms: Option<u64>,
}

/// Validated settings for one client run.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub url: Option<String>,
    pub device: Option<String>,
    pub playback: PlaybackConfig,
}

impl ClientConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        Self::parse(&raw).with_context(|| format!("parse config {:?}", path))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str::<ClientConfig>(raw)?)
    }

    /// Load `explicit`, or the default file beside the executable if it exists, or defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match default_config_path() {
            Some(path) if path.exists() => {
                tracing::info!(path = ?path, "using config file");
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Merge CLI overrides and validate.
    pub fn resolve(self, overrides: Overrides) -> Result<ResolvedConfig> {
        let defaults = PlaybackConfig::default();
        let sample_rate = overrides
            .sample_rate
            .or(self.sample_rate)
            .unwrap_or(defaults.sample_rate);
        if sample_rate == 0 {
            bail!("sample_rate must be greater than zero");
        }
        let lookahead_ms = overrides
            .lookahead_ms
            .or(self.lookahead_ms)
            .unwrap_or(DEFAULT_LOOKAHEAD_MS);
        let refill_max_frames = self
            .refill_max_frames
            .unwrap_or(defaults.refill_max_frames)
            .max(1);

        let url = overrides.url.or(self.url).map(|u| u.trim().to_string());
        if let Some(url) = url.as_deref() {
            validate_url(url)?;
        }

        Ok(ResolvedConfig {
            url,
            device: normalize_device_name(overrides.device.or(self.device)),
            playback: PlaybackConfig {
                sample_rate,
                lookahead: Duration::from_millis(lookahead_ms),
                refill_max_frames,
            },
        })
    }
}

impl ResolvedConfig {
    pub fn require_url(&self) -> Result<&str> {
        self.url
            .as_deref()
            .ok_or_else(|| anyhow!("no server URL; pass one to `connect` or set `url` in the config"))
    }
}

fn default_config_path() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.parent().map(|dir| dir.join(DEFAULT_CONFIG_FILE)))
}

fn validate_url(url: &str) -> Result<()> {
    let host = url
        .strip_prefix("ws://")
        .or_else(|| url.strip_prefix("wss://"))
        .with_context(|| format!("server URL must start with ws:// or wss://: {url}"))?;
    if host.is_empty() {
        bail!("server URL has no host: {url}");
    }
    Ok(())
}

fn normalize_device_name(device: Option<String>) -> Option<String> {
    device.and_then(|name| {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_device_name_trims_and_drops_empty() {
        assert_eq!(normalize_device_name(None), None);
        assert_eq!(normalize_device_name(Some("".to_string())), None);
        assert_eq!(normalize_device_name(Some("  ".to_string())), None);
        assert_eq!(
            normalize_device_name(Some("  USB DAC ".to_string())),
            Some("USB DAC".to_string())
        );
    }

    #[test]
    fn parse_reads_all_fields() {
        let cfg = ClientConfig::parse(
            r#"
url = "ws://127.0.0.1:8000/ws"
sample_rate = 16000
device = "Speakers"
lookahead_ms = 40
refill_max_frames = 512
"#,
        )
        .unwrap();
        assert_eq!(cfg.url.as_deref(), Some("ws://127.0.0.1:8000/ws"));
        assert_eq!(cfg.sample_rate, Some(16_000));
        assert_eq!(cfg.device.as_deref(), Some("Speakers"));
        assert_eq!(cfg.lookahead_ms, Some(40));
        assert_eq!(cfg.refill_max_frames, Some(512));
    }

    #[test]
    fn parse_rejects_unknown_keys() {
        assert!(ClientConfig::parse("sample_rte = 16000").is_err());
    }

    #[test]
    fn resolve_uses_defaults() {
        let resolved = ClientConfig::default().resolve(Overrides::default()).unwrap();
        assert_eq!(resolved.url, None);
        assert_eq!(resolved.device, None);
        assert_eq!(resolved.playback.sample_rate, 24_000);
        assert_eq!(resolved.playback.lookahead, Duration::from_millis(DEFAULT_LOOKAHEAD_MS));
        assert!(resolved.require_url().is_err());
    }

    #[test]
    fn resolve_prefers_cli_over_file() {
        let file = ClientConfig {
            url: Some("ws://file:1/ws".to_string()),
            sample_rate: Some(16_000),
            device: Some("File Device".to_string()),
            lookahead_ms: Some(10),
            refill_max_frames: None,
        };
        let resolved = file
            .resolve(Overrides {
                url: Some(" ws://cli:2/ws ".to_string()),
                sample_rate: Some(48_000),
                device: None,
                lookahead_ms: Some(0),
            })
            .unwrap();
        assert_eq!(resolved.require_url().unwrap(), "ws://cli:2/ws");
        assert_eq!(resolved.playback.sample_rate, 48_000);
        assert_eq!(resolved.device.as_deref(), Some("File Device"));
        assert_eq!(resolved.playback.lookahead, Duration::ZERO);
    }

    #[test]
    fn resolve_accepts_plain_and_tls_urls() {
        for url in ["ws://127.0.0.1:8000/ws", "wss://voice.example.com/ws"] {
            let resolved = ClientConfig::default()
                .resolve(Overrides {
                    url: Some(url.to_string()),
                    ..Default::default()
                })
                .unwrap();
            assert_eq!(resolved.require_url().unwrap(), url);
        }
    }

    #[test]
    fn resolve_rejects_zero_rate_and_bad_urls() {
        let zero = ClientConfig {
            sample_rate: Some(0),
            ..Default::default()
        };
        assert!(zero.resolve(Overrides::default()).is_err());

        for url in ["http://host/ws", "ws://", "wss://", "https://host/ws"] {
            let overrides = Overrides {
                url: Some(url.to_string()),
                ..Default::default()
            };
            assert!(ClientConfig::default().resolve(overrides).is_err(), "{url}");
        }
    }
}
