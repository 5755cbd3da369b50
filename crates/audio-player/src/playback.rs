//! Playback stage (CPAL output stream).
//!
//! [`CpalSink`] implements [`AudioSink`] on top of a CPAL output stream:
//! - scheduled fragments are appended to a shared [`SampleBuffer`]
//! - the real-time callback refills a small local buffer from it without blocking
//! - mono samples are duplicated to every output channel and converted to the device format
//!
//! CPAL streams are not `Send` on every host, so the stream lives on a dedicated thread that
//! owns it until the sink is dropped.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use tokio::time::Instant;

use crate::config::PlaybackConfig;
use crate::decode::frames_to_duration;
use crate::device;
use crate::output_buffer::SampleBuffer;
use crate::sink::{AudioSink, ScheduledFragment, SinkError};
use crate::status::PlaybackCounters;

/// First stream error reported by CPAL, if any.
type FailureSlot = Arc<Mutex<Option<String>>>;

const PLAYOUT_POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Slack on top of the pending audio's duration before a playout wait gives up.
const PLAYOUT_SLACK: Duration = Duration::from_millis(250);
/// Time for the device's own buffer to empty after the callback has pulled the last sample.
const DEVICE_TAIL: Duration = Duration::from_millis(100);

/// How waiting for accepted audio to play out ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Playout {
    /// Every accepted sample was rendered.
    Drained,
    /// The stream failed and stopped pulling samples.
    Failed,
    /// The device did not keep up within the allowed time.
    TimedOut,
}

/// [`AudioSink`] backed by a CPAL output stream running at the pipeline sample rate.
pub struct CpalSink {
    buffer: Arc<SampleBuffer>,
    failure: FailureSlot,
    stop_tx: Sender<()>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
    device_name: String,
    rate_hz: u32,
}

impl CpalSink {
    /// Open the output device and start its stream.
    ///
    /// `needle` selects a device by case-insensitive substring; `None` uses the host default.
    /// Fails if the device cannot run at `config.sample_rate`.
    pub fn open(
        needle: Option<&str>,
        config: &PlaybackConfig,
        counters: Arc<PlaybackCounters>,
    ) -> Result<Self> {
        let buffer = Arc::new(SampleBuffer::new());
        let failure: FailureSlot = Arc::new(Mutex::new(None));
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<String>>(1);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);

        let needle = needle.map(str::to_string);
        let rate_hz = config.sample_rate;
        let refill_max_frames = config.refill_max_frames;
        let buffer_worker = buffer.clone();
        let failure_worker = failure.clone();

        let worker = thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                let opened = open_stream(
                    needle.as_deref(),
                    rate_hz,
                    OutputShared {
                        buffer: buffer_worker,
                        failure: failure_worker,
                        counters,
                        refill_max_frames,
                    },
                );
                let stream = match opened {
                    Ok((stream, name)) => {
                        let _ = ready_tx.send(Ok(name));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                wait_for_stop(&stop_rx);
                drop(stream);
                tracing::debug!("output stream closed");
            })
            .context("spawn audio output thread")?;

        let device_name = ready_rx
            .recv()
            .map_err(|_| anyhow!("audio output thread exited before opening the device"))??;

        Ok(Self {
            buffer,
            failure,
            stop_tx,
            worker: Mutex::new(Some(worker)),
            device_name,
            rate_hz,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Samples accepted but not yet rendered by the device callback.
    pub fn buffered_samples(&self) -> usize {
        self.buffer.pending()
    }

    /// `true` once the stream has reported an error.
    pub fn is_failed(&self) -> bool {
        self.failure().is_some()
    }

    /// Stop accepting fragments, let the device play what it already accepted, then close.
    ///
    /// The wait is bounded by the pending audio's duration plus some slack, and ends early if
    /// the stream fails. Audio still pending after that is discarded.
    pub async fn drain_and_close(&self) -> Playout {
        self.buffer.close();
        let pending = self.buffer.pending();
        let deadline = Instant::now() + frames_to_duration(pending, self.rate_hz) + PLAYOUT_SLACK;
        let outcome = wait_for_playout(&self.buffer, || self.is_failed(), deadline).await;
        match outcome {
            Playout::Drained => {
                if pending > 0 {
                    tokio::time::sleep(DEVICE_TAIL).await;
                }
            }
            Playout::Failed | Playout::TimedOut => {
                let dropped = self.buffer.discard();
                tracing::warn!(?outcome, dropped_samples = dropped, "output did not play out");
            }
        }
        self.close();
        outcome
    }

    /// Stop the stream and join its thread. Idempotent.
    ///
    /// Accepted samples that have not been rendered are not played; see
    /// [`drain_and_close`](Self::drain_and_close).
    pub fn close(&self) {
        self.buffer.close();
        let _ = self.stop_tx.try_send(());
        let handle = self.worker.lock().ok().and_then(|mut g| g.take());
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::warn!("audio output thread panicked");
            }
        }
    }

    fn failure(&self) -> Option<String> {
        self.failure.lock().ok().and_then(|g| g.clone())
    }
}

impl AudioSink for CpalSink {
    fn submit(&self, fragment: ScheduledFragment) -> Result<(), SinkError> {
        if let Some(reason) = self.failure() {
            return Err(SinkError::Unavailable(reason));
        }
        if !self.buffer.push(&fragment.samples) {
            return Err(SinkError::Closed);
        }
        Ok(())
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.close();
    }
}

/// Poll until `buffer` has nothing pending, the stream fails, or `deadline` passes.
async fn wait_for_playout(
    buffer: &SampleBuffer,
    failed: impl Fn() -> bool,
    deadline: Instant,
) -> Playout {
    loop {
        if buffer.pending() == 0 {
            return Playout::Drained;
        }
        if failed() {
            return Playout::Failed;
        }
        if Instant::now() >= deadline {
            return Playout::TimedOut;
        }
        tokio::time::sleep(PLAYOUT_POLL_INTERVAL).await;
    }
}

fn wait_for_stop(stop_rx: &Receiver<()>) {
    // Either an explicit stop or the sink being dropped ends the wait.
    let _ = stop_rx.recv();
}

/// State shared between the sink and the output callback.
struct OutputShared {
    buffer: Arc<SampleBuffer>,
    failure: FailureSlot,
    counters: Arc<PlaybackCounters>,
    refill_max_frames: usize,
}

/// Pick the device and config, build the stream, and start it.
fn open_stream(
    needle: Option<&str>,
    rate_hz: u32,
    shared: OutputShared,
) -> Result<(cpal::Stream, String)> {
    let host = cpal::default_host();
    let device = device::pick_device(&host, needle)?;
    let name = device
        .description()
        .map(|d| d.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let supported = device::pick_output_config(&device, rate_hz)
        .with_context(|| format!("configure output device {name}"))?;
    let mut stream_config: cpal::StreamConfig = supported.clone().into();
    if let Some(buf) = device::pick_buffer_size(&supported) {
        stream_config.buffer_size = buf;
    }
    tracing::info!(
        device = %name,
        rate_hz = stream_config.sample_rate,
        channels = stream_config.channels,
        sample_format = ?supported.sample_format(),
        buffer_size = ?stream_config.buffer_size,
        "output device"
    );

    let stream = build_output_stream(&device, &stream_config, supported.sample_format(), shared)?;
    stream.play().context("start output stream")?;
    Ok((stream, name))
}

/// Build a CPAL output stream that plays mono samples from `shared.buffer`.
fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    shared: OutputShared,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, shared),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, shared),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, shared),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, shared),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

/// Type-specialized stream builder for CPAL sample formats.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    shared: OutputShared,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels_out = (config.channels as usize).max(1);
    let refill_max_frames = shared.refill_max_frames.max(1);
    let buffer = shared.buffer;
    let counters = shared.counters;
    let failure = shared.failure;
    let mut st = CallbackState::default();

    let err_fn = move |err: cpal::StreamError| {
        tracing::warn!("stream error: {err}");
        if let Ok(mut slot) = failure.lock() {
            slot.get_or_insert_with(|| err.to_string());
        }
    };

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let outcome = render(&mut st, &buffer, refill_max_frames, data, channels_out);
            if outcome.filled_frames > 0 {
                counters
                    .played_frames
                    .fetch_add(outcome.filled_frames as u64, Ordering::Relaxed);
            }
            if outcome.underrun_frames > 0 {
                counters.underrun_events.fetch_add(1, Ordering::Relaxed);
                counters
                    .underrun_frames
                    .fetch_add(outcome.underrun_frames as u64, Ordering::Relaxed);
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

/// Local playback buffer for the CPAL callback.
///
/// Holds a chunk fetched from [`SampleBuffer`] so the callback locks the shared buffer at most
/// once per refill.
#[derive(Default)]
struct CallbackState {
    pos: usize,
    src: Vec<f32>,
    /// `true` while audio has been flowing; an underrun is only counted on the
    /// flowing → dry transition, not for every idle callback.
    active: bool,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct RenderOutcome {
    filled_frames: usize,
    underrun_frames: usize,
}

/// Fill `data` (interleaved, `channels_out` wide) from the buffer, padding with silence.
///
/// Rendered samples are reported back to the buffer so it can tell when playout is complete.
fn render<T>(
    st: &mut CallbackState,
    buffer: &SampleBuffer,
    refill_max_frames: usize,
    data: &mut [T],
    channels_out: usize,
) -> RenderOutcome
where
    T: cpal::Sample + cpal::FromSample<f32>,
{
    let frames = data.len() / channels_out;
    let mut outcome = RenderOutcome::default();

    for frame in 0..frames {
        if st.pos >= st.src.len() {
            st.pos = 0;
            st.src.clear();
            match buffer.pop_nonblocking(refill_max_frames) {
                Some(v) => {
                    st.src = v;
                    st.active = true;
                }
                None => {
                    if st.active {
                        outcome.underrun_frames = frames - frame;
                        st.active = false;
                    }
                    let silence = <T as cpal::Sample>::from_sample::<f32>(0.0);
                    data[frame * channels_out..].fill(silence);
                    break;
                }
            }
        }
        let sample = <T as cpal::Sample>::from_sample::<f32>(st.src[st.pos]);
        st.pos += 1;
        data[frame * channels_out..(frame + 1) * channels_out].fill(sample);
        outcome.filled_frames += 1;
    }

    buffer.mark_rendered(outcome.filled_frames);
    outcome
}
