//! Thread-safe bounded queue for interleaved audio samples.
//!
//! [`SharedAudio`] sits between the render loop (producer) and the CPAL callback
//! (consumer) of [`crate::output::DeviceSink`]:
//! - the render loop pushes blocks and blocks while the queue is full (back-pressure)
//! - the callback drains without ever waiting
//! - clearing bumps a generation counter; pushes and drains started under an older
//!   generation give up, so a cleared queue never refills with stale audio

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Bounded queue of interleaved `f32` samples.
///
/// - Capacity is `max_buffered_samples`, which caps latency in front of the device.
/// - A single [`Condvar`] signals every state change.
/// - The `done` flag lives under the same mutex as the samples to avoid races.
pub struct SharedAudio {
    channels: usize,
    inner: Mutex<SharedInner>,
    cv: Condvar,
    max_buffered_samples: usize,
    low_watermark_ms: AtomicU64,
}

struct SharedInner {
    queue: VecDeque<f32>,
    done: bool,
    generation: u64,
}

/// Compute a queue capacity in **samples** for a `(rate, channels, seconds)` target.
///
/// - If `buffer_seconds` is non-finite or `<= 0.0`, a safe fallback is used.
/// - The returned value is `ceil(rate_hz * buffer_seconds) * channels` (saturating).
pub fn calc_max_buffered_samples(rate_hz: u32, channels: usize, buffer_seconds: f32) -> usize {
    let secs = if buffer_seconds.is_finite() && buffer_seconds > 0.0 {
        buffer_seconds
    } else {
        0.5
    };

    let frames = (rate_hz as f32 * secs).ceil() as usize;
    frames.saturating_mul(channels)
}

impl SharedAudio {
    /// Create a new bounded queue holding at most `max_buffered_samples` samples.
    pub fn new(channels: usize, max_buffered_samples: usize) -> Self {
        let channels = channels.max(1);
        Self {
            channels,
            inner: Mutex::new(SharedInner {
                queue: VecDeque::new(),
                done: false,
                generation: 0,
            }),
            cv: Condvar::new(),
            max_buffered_samples: max_buffered_samples.max(channels),
            low_watermark_ms: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SharedInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of channels of the interleaved stream carried by this queue.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Maximum buffered frames (capacity).
    pub fn max_frames(&self) -> usize {
        self.max_buffered_samples / self.channels
    }

    /// Current buffered frames (best-effort snapshot).
    pub fn len_frames(&self) -> usize {
        self.lock().queue.len() / self.channels
    }

    /// Whether the queue has been closed.
    pub fn is_done(&self) -> bool {
        self.lock().done
    }

    /// Number of [`SharedAudio::clear`] calls so far.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Mark the queue as finished and wake all waiters.
    ///
    /// Pending and future pushes return immediately. Idempotent.
    pub fn close(&self) {
        let mut g = self.lock();
        g.done = true;
        drop(g);
        self.cv.notify_all();
    }

    /// Drop everything buffered and start a new generation.
    ///
    /// Wakes producers and drainers; those tied to an older generation return.
    pub fn clear(&self) {
        let mut g = self.lock();
        g.queue.clear();
        g.generation += 1;
        drop(g);
        self.cv.notify_all();
    }

    /// Push interleaved samples, blocking while the queue is full.
    ///
    /// Returns `false` and drops the remainder if the queue is closed, or cleared after
    /// `generation` was read.
    pub fn push_since(&self, generation: u64, samples: &[f32]) -> bool {
        let mut offset = 0;

        while offset < samples.len() {
            let mut g = self.lock();

            while g.queue.len() >= self.max_buffered_samples
                && !g.done
                && g.generation == generation
            {
                g = self.cv.wait(g).unwrap_or_else(PoisonError::into_inner);
            }
            if g.done || g.generation != generation {
                return false;
            }

            let room = self.max_buffered_samples - g.queue.len();
            let take = room.min(samples.len() - offset);
            g.queue.extend(&samples[offset..offset + take]);
            offset += take;

            drop(g);
            self.cv.notify_all();
        }
        true
    }

    /// Block until the consumer has taken everything queued.
    ///
    /// Returns early when the queue is closed or cleared after `generation` was read.
    pub fn drain_blocking(&self, generation: u64) {
        let mut g = self.lock();
        while !g.queue.is_empty() && !g.done && g.generation == generation {
            g = self.cv.wait(g).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Pop up to `max_frames` whole frames without waiting.
    ///
    /// Returns `None` if no whole frame is buffered.
    pub fn pop_nonblocking(&self, max_frames: usize) -> Option<Vec<f32>> {
        let mut g = self.lock();

        let available_frames = g.queue.len() / self.channels;
        let take_samples = available_frames.min(max_frames) * self.channels;
        if take_samples == 0 {
            return None;
        }

        let out: Vec<f32> = g.queue.drain(..take_samples).collect();
        let queued = g.queue.len();
        drop(g);
        self.cv.notify_all();
        self.log_low_watermark(queued);
        Some(out)
    }

    fn log_low_watermark(&self, queued: usize) {
        let threshold = (self.max_buffered_samples / 8).max(self.channels * 16);
        if queued > 0 && queued < threshold {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_else(|_| Duration::from_millis(0))
                .as_millis() as u64;
            let last = self.low_watermark_ms.load(Ordering::Relaxed);
            if now.saturating_sub(last) > 1000 {
                self.low_watermark_ms.store(now, Ordering::Relaxed);
                tracing::debug!(
                    queued_samples = queued,
                    threshold_samples = threshold,
                    "audio queue low watermark"
                );
            }
        }
    }
}
