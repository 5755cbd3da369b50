//! Output device discovery and selection.
//!
//! Thin wrappers around CPAL for:
//! - listing available output devices
//! - selecting either the default device or a device by substring match
//! - choosing a stream config that runs at the fixed pipeline sample rate

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

/// Target output callback period. Kept short so a fragment appended shortly before the
/// previous one ends still lands before the device runs dry.
const TARGET_PERIOD_MS: u32 = 20;

/// Pick the first output device matching `needle` (case-insensitive), or the default device.
///
/// Returns an error if no matching device exists or if the host reports no output devices.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    let mut devices: Vec<cpal::Device> = host
        .output_devices()
        .context("No output devices")?
        .collect();

    if let Some(needle) = needle {
        if let Some(d) = devices.drain(..).find(|d| {
            d.description()
                .ok()
                .map(|n| matches_device_name(&n.name(), needle))
                .unwrap_or(false)
        }) {
            return Ok(d);
        }
        return Err(anyhow!("No output device matched: {needle}"));
    }

    host.default_output_device()
        .ok_or_else(|| anyhow!("No default output device"))
}

/// Choose an output config that runs at exactly `rate_hz`.
///
/// Among ranges that contain the rate, the best sample format wins (f32 first). Fails when no
/// range supports the rate, since the pipeline does not resample.
pub fn pick_output_config(device: &cpal::Device, rate_hz: u32) -> Result<cpal::SupportedStreamConfig> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> =
        device.supported_output_configs()?.collect();
    if ranges.is_empty() {
        return Err(anyhow!("No supported output configs"));
    }

    let mut best: Option<(u8, u16, cpal::SupportedStreamConfig)> = None;
    let mut supported_rates = Vec::new();

    for range in ranges {
        let min = range.min_sample_rate();
        let max = range.max_sample_rate();
        supported_rates.push((min, max));
        if !rate_in_range(min, max, rate_hz) {
            continue;
        }
        let rank = sample_format_rank(range.sample_format());
        let channels = range.channels();
        let replace = match &best {
            None => true,
            Some((b_rank, b_channels, _)) => is_better_candidate(rank, channels, *b_rank, *b_channels),
        };
        if replace {
            best = Some((rank, channels, range.with_sample_rate(rate_hz)));
        }
    }

    best.map(|(_, _, cfg)| cfg).ok_or_else(|| {
        anyhow!("Output device does not support {rate_hz} Hz (supported ranges: {supported_rates:?})")
    })
}

/// Prefer a fixed buffer of about [`TARGET_PERIOD_MS`] if the device advertises a range.
///
/// Returns `None` when the device only supports the default buffer size.
pub fn pick_buffer_size(config: &cpal::SupportedStreamConfig) -> Option<cpal::BufferSize> {
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            let target = config.sample_rate() * TARGET_PERIOD_MS / 1000;
            Some(cpal::BufferSize::Fixed(clamp_buffer_frames(*min, *max, target)))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

/// Print available output devices to stdout.
///
/// This is intended for CLI UX (`--list-devices`) rather than structured output.
pub fn list_devices(host: &cpal::Host) -> Result<()> {
    let devices = host.output_devices().context("No output devices")?;
    for (i, d) in devices.enumerate() {
        println!("#{i}: {}", d.description()?);
    }
    Ok(())
}

fn rate_in_range(min: u32, max: u32, rate: u32) -> bool {
    rate >= min && rate <= max
}

fn clamp_buffer_frames(min: u32, max: u32, target: u32) -> u32 {
    if max < min {
        return min;
    }
    target.clamp(min, max)
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

/// Lower format rank wins; on a tie, fewer channels (less duplication work) wins.
fn is_better_candidate(rank: u8, channels: u16, best_rank: u8, best_channels: u16) -> bool {
    if rank != best_rank {
        rank < best_rank
    } else {
        channels < best_channels
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}
