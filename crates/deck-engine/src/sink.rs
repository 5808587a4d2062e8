//! Output sink abstraction.
//!
//! The render loop writes gained, resampled blocks into an [`AudioSink`]. The device
//! implementation lives in [`crate::output`]; [`MemorySink`] captures audio in memory for
//! headless runs and tests.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Result;

/// Destination of rendered audio.
pub trait AudioSink: Send + Sync {
    /// Rate every written block must already be converted to.
    fn sample_rate(&self) -> u32;

    /// Number of [`AudioSink::reset`] calls so far.
    ///
    /// The render loop reads it together with a block; a reset in between marks the
    /// block as stale.
    fn epoch(&self) -> u64;

    /// Write interleaved samples with `channels` channels.
    ///
    /// May block for back-pressure. The samples are dropped (and a blocked write returns)
    /// once a reset happens after `epoch` was read.
    fn write(&self, samples: &[f32], channels: usize, epoch: u64) -> Result<()>;

    /// Block until everything written so far has been played, or until a reset that
    /// happens after `epoch` was read.
    fn drain(&self, _epoch: u64) {}

    /// Hold (or release) output without discarding queued audio.
    fn set_paused(&self, _paused: bool) {}

    /// Discard queued audio and start a new epoch.
    fn reset(&self) {}
}

/// Sink that records everything written to it.
///
/// By default writes return immediately. [`MemorySink::with_speed`] makes each write take
/// as long as a device would need to play it, scaled by the speed factor. Either way
/// nothing is left queued after a write, so `drain` has nothing to wait for. A reset keeps
/// what was already recorded.
#[derive(Debug)]
pub struct MemorySink {
    sample_rate: u32,
    capture: bool,
    speed: Option<f64>,
    clock: Mutex<()>,
    clock_cv: Condvar,
    resets: AtomicU64,
    samples: Mutex<Vec<f32>>,
    channels: AtomicUsize,
    frames: AtomicU64,
    writes: AtomicU64,
    stale_writes: AtomicU64,
    paused: AtomicBool,
    active_writers: AtomicUsize,
    max_writers: AtomicUsize,
}

impl MemorySink {
    /// A sink keeping every sample written.
    pub fn new(sample_rate: u32) -> Self {
        Self::with_capture(sample_rate, true)
    }

    /// A sink that only counts frames.
    pub fn counting(sample_rate: u32) -> Self {
        Self::with_capture(sample_rate, false)
    }

    fn with_capture(sample_rate: u32, capture: bool) -> Self {
        Self {
            sample_rate,
            capture,
            speed: None,
            clock: Mutex::new(()),
            clock_cv: Condvar::new(),
            resets: AtomicU64::new(0),
            samples: Mutex::new(Vec::new()),
            channels: AtomicUsize::new(0),
            frames: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            stale_writes: AtomicU64::new(0),
            paused: AtomicBool::new(false),
            active_writers: AtomicUsize::new(0),
            max_writers: AtomicUsize::new(0),
        }
    }

    /// Pace writes like a device running `speed` times faster than real time.
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = (speed.is_finite() && speed > 0.0).then_some(speed);
        self
    }

    /// Number of [`AudioSink::reset`] calls.
    pub fn resets(&self) -> u64 {
        self.resets.load(Ordering::SeqCst)
    }

    fn pace(&self, frames: usize, epoch: u64) {
        let Some(speed) = self.speed else {
            return;
        };
        let secs = frames as f64 / self.sample_rate.max(1) as f64 / speed;
        let g = self.clock.lock().unwrap_or_else(PoisonError::into_inner);
        // A reset cuts the wait short, like a device queue being cleared.
        let _ = self
            .clock_cv
            .wait_timeout_while(g, Duration::from_secs_f64(secs), |_| {
                self.resets.load(Ordering::SeqCst) == epoch
            });
    }

    /// Total frames written since creation or the last [`MemorySink::take_samples`].
    pub fn frames_written(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }

    /// Number of `write` calls.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Writes dropped because a reset happened after their block was read.
    pub fn stale_writes(&self) -> u64 {
        self.stale_writes.load(Ordering::SeqCst)
    }

    /// Channel count of the most recent write.
    pub fn last_channels(&self) -> usize {
        self.channels.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Highest number of writers ever observed inside `write` at the same time.
    pub fn max_concurrent_writers(&self) -> usize {
        self.max_writers.load(Ordering::SeqCst)
    }

    /// Copy of the captured samples.
    pub fn samples(&self) -> Vec<f32> {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Move the captured samples out and restart the frame counter.
    pub fn take_samples(&self) -> Vec<f32> {
        self.frames.store(0, Ordering::SeqCst);
        std::mem::take(&mut *self.samples.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl AudioSink for MemorySink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn epoch(&self) -> u64 {
        self.resets.load(Ordering::SeqCst)
    }

    fn write(&self, samples: &[f32], channels: usize, epoch: u64) -> Result<()> {
        let active = self.active_writers.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_writers.fetch_max(active, Ordering::SeqCst);

        let frames = samples.len() / channels.max(1);
        let fresh = {
            // Same lock as `reset`, so a block is either recorded before a reset or dropped.
            let _clock = self.clock.lock().unwrap_or_else(PoisonError::into_inner);
            let fresh = self.resets.load(Ordering::SeqCst) == epoch;
            if fresh {
                if self.capture {
                    self.samples
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .extend_from_slice(samples);
                }
                self.channels.store(channels, Ordering::SeqCst);
                self.frames.fetch_add(frames as u64, Ordering::SeqCst);
                self.writes.fetch_add(1, Ordering::SeqCst);
            } else {
                self.stale_writes.fetch_add(1, Ordering::SeqCst);
            }
            fresh
        };
        if fresh {
            self.pace(frames, epoch);
        }

        self.active_writers.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    fn reset(&self) {
        let _g = self.clock.lock().unwrap_or_else(PoisonError::into_inner);
        self.resets.fetch_add(1, Ordering::SeqCst);
        self.clock_cv.notify_all();
    }
}
