//! Device output (CPAL).
//!
//! [`DeviceSink`] owns a dedicated thread that builds and holds the CPAL stream (streams are
//! not `Send` on every host). Rendered blocks are channel-mapped to the device layout and
//! pushed into a bounded [`SharedAudio`] queue; the real-time callback drains it without
//! blocking and converts to the device sample format.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use anyhow::{Result, anyhow};
use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};

use crate::config::OutputConfig;
use crate::device;
use crate::error::PlayerError;
use crate::queue::{SharedAudio, calc_max_buffered_samples};
use crate::sink::AudioSink;

/// Frames pulled from the queue per callback refill.
const REFILL_MAX_FRAMES: usize = 4096;

/// What the device actually agreed to.
#[derive(Clone, Debug)]
pub struct OutputInfo {
    pub device: String,
    pub sample_rate: u32,
    pub channels: usize,
    pub sample_format: String,
    pub buffer_size_frames: Option<u32>,
}

/// [`AudioSink`] backed by an output device.
pub struct DeviceSink {
    info: OutputInfo,
    queue: Arc<SharedAudio>,
    paused: Arc<AtomicBool>,
    underrun_events: Arc<AtomicU64>,
    shutdown_tx: Option<Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl DeviceSink {
    /// Open the configured device (or the default one) and start its stream.
    pub fn open(cfg: &OutputConfig) -> Result<Self, PlayerError> {
        let (init_tx, init_rx) = crossbeam_channel::bounded(1);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let paused = Arc::new(AtomicBool::new(false));
        let underrun_events = Arc::new(AtomicU64::new(0));

        let thread_cfg = cfg.clone();
        let callback = CallbackFlags {
            paused: paused.clone(),
            underrun_events: underrun_events.clone(),
        };
        let join = thread::Builder::new()
            .name("audio-output".into())
            .spawn(move || output_thread_main(thread_cfg, callback, init_tx, shutdown_rx))
            .map_err(|e| PlayerError::DeviceInitFailed(e.to_string()))?;

        match init_rx.recv() {
            Ok(Ok((queue, info))) => {
                tracing::info!(
                    device = %info.device,
                    rate = info.sample_rate,
                    channels = info.channels,
                    format = %info.sample_format,
                    buffer_frames = ?info.buffer_size_frames,
                    "output device opened"
                );
                Ok(Self {
                    info,
                    queue,
                    paused,
                    underrun_events,
                    shutdown_tx: Some(shutdown_tx),
                    join: Some(join),
                })
            }
            Ok(Err(e)) => {
                let _ = join.join();
                Err(PlayerError::DeviceInitFailed(format!("{e:#}")))
            }
            Err(_) => {
                let _ = join.join();
                Err(PlayerError::DeviceInitFailed(
                    "output thread exited during setup".into(),
                ))
            }
        }
    }

    pub fn info(&self) -> &OutputInfo {
        &self.info
    }

    /// Number of callbacks that ran out of queued audio.
    pub fn underrun_events(&self) -> u64 {
        self.underrun_events.load(Ordering::Relaxed)
    }
}

impl AudioSink for DeviceSink {
    fn sample_rate(&self) -> u32 {
        self.info.sample_rate
    }

    fn epoch(&self) -> u64 {
        self.queue.generation()
    }

    fn write(&self, samples: &[f32], channels: usize, epoch: u64) -> Result<()> {
        if self.queue.is_done() {
            return Err(anyhow!("output device closed"));
        }
        let dst_channels = self.queue.channels();
        let pushed = if channels == dst_channels {
            self.queue.push_since(epoch, samples)
        } else {
            self.queue
                .push_since(epoch, &map_channels(samples, channels, dst_channels))
        };
        if !pushed {
            tracing::trace!(epoch, "dropped a block written across a reset");
        }
        Ok(())
    }

    fn drain(&self, epoch: u64) {
        self.queue.drain_blocking(epoch);
    }

    fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.queue.clear();
    }
}

impl Drop for DeviceSink {
    fn drop(&mut self) {
        self.queue.close();
        drop(self.shutdown_tx.take());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

#[derive(Clone)]
struct CallbackFlags {
    paused: Arc<AtomicBool>,
    underrun_events: Arc<AtomicU64>,
}

type InitResult = Result<(Arc<SharedAudio>, OutputInfo)>;

fn output_thread_main(
    cfg: OutputConfig,
    flags: CallbackFlags,
    init_tx: Sender<InitResult>,
    shutdown_rx: Receiver<()>,
) {
    match open_stream(&cfg, flags) {
        Ok((stream, queue, info)) => {
            if init_tx.send(Ok((queue, info))).is_err() {
                return;
            }
            // Held until the sink is dropped.
            let _ = shutdown_rx.recv();
            drop(stream);
            tracing::debug!("output stream closed");
        }
        Err(e) => {
            let _ = init_tx.send(Err(e));
        }
    }
}

fn open_stream(
    cfg: &OutputConfig,
    flags: CallbackFlags,
) -> Result<(cpal::Stream, Arc<SharedAudio>, OutputInfo)> {
    let host = cpal::default_host();
    let device = device::open_device(&host, cfg.device.as_deref())?;
    let name = device
        .description()
        .map(|d| d.to_string())
        .unwrap_or_else(|_| "<unknown>".into());

    let config = device::pick_output_config(&device, cfg.sample_rate)?;
    let mut stream_config: cpal::StreamConfig = config.clone().into();
    let channels = stream_config.channels as usize;
    let queue = Arc::new(SharedAudio::new(
        channels,
        calc_max_buffered_samples(stream_config.sample_rate, channels, cfg.buffer_seconds),
    ));

    let buffer_size_frames = match device::pick_buffer_size(&config, queue.max_frames()) {
        Some(cpal::BufferSize::Fixed(frames)) => {
            stream_config.buffer_size = cpal::BufferSize::Fixed(frames);
            Some(frames)
        }
        _ => None,
    };

    let stream =
        build_output_stream(&device, &stream_config, config.sample_format(), &queue, flags)?;
    stream.play()?;

    let info = OutputInfo {
        device: name,
        sample_rate: stream_config.sample_rate,
        channels,
        sample_format: format!("{:?}", config.sample_format()),
        buffer_size_frames,
    };
    Ok((stream, queue, info))
}

fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    queue: &Arc<SharedAudio>,
    flags: CallbackFlags,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, queue, flags),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, queue, flags),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, queue, flags),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, queue, flags),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

/// The queue already carries the device layout, so the callback only copies and converts.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: &Arc<SharedAudio>,
    flags: CallbackFlags,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32> + Send + 'static,
{
    let queue = queue.clone();
    let mut pending: Vec<f32> = Vec::new();
    let mut pos = 0usize;
    let silence = <T as cpal::Sample>::from_sample::<f32>(0.0);

    let err_fn = |err| tracing::warn!("stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            if flags.paused.load(Ordering::Relaxed) {
                data.fill(silence);
                return;
            }

            let mut written = 0usize;
            while written < data.len() {
                if pos >= pending.len() {
                    pos = 0;
                    match queue.pop_nonblocking(REFILL_MAX_FRAMES) {
                        Some(v) => pending = v,
                        None => {
                            pending.clear();
                            if !queue.is_done() {
                                flags.underrun_events.fetch_add(1, Ordering::Relaxed);
                            }
                            data[written..].fill(silence);
                            return;
                        }
                    }
                }
                let take = (pending.len() - pos).min(data.len() - written);
                for (dst, src) in data[written..written + take]
                    .iter_mut()
                    .zip(&pending[pos..pos + take])
                {
                    *dst = <T as cpal::Sample>::from_sample::<f32>(*src);
                }
                pos += take;
                written += take;
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

/// Remap an interleaved block from `src_channels` to `dst_channels`.
///
/// - mono → stereo: duplicate channel 0
/// - stereo → mono: average L/R
/// - other layouts: clamp to the available source channels
pub fn map_channels(samples: &[f32], src_channels: usize, dst_channels: usize) -> Vec<f32> {
    let src_channels = src_channels.max(1);
    let dst_channels = dst_channels.max(1);
    if src_channels == dst_channels {
        return samples.to_vec();
    }

    let frames = samples.len() / src_channels;
    let mut out = Vec::with_capacity(frames * dst_channels);
    for frame in samples.chunks_exact(src_channels) {
        for ch in 0..dst_channels {
            let value = match (src_channels, dst_channels) {
                (2, 1) => 0.5 * (frame[0] + frame[1]),
                _ => frame[ch.min(src_channels - 1)],
            };
            out.push(value);
        }
    }
    out
}
