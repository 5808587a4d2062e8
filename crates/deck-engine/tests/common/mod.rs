#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use deck_engine::queue::{SharedAudio, calc_max_buffered_samples};
use deck_engine::{AudioSink, PlayerEvent};

pub const TIMEOUT: Duration = Duration::from_secs(20);

/// Write a 16-bit mono WAV holding a 440 Hz sine at `amplitude`.
pub fn sine_wav(dir: &Path, name: &str, rate: u32, frames: usize, amplitude: f32) -> PathBuf {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for i in 0..frames {
        let t = i as f32 / rate as f32;
        let v = amplitude * (2.0 * std::f32::consts::PI * 440.0 * t).sin();
        writer.write_sample((v * i16::MAX as f32) as i16).unwrap();
    }
    writer.finalize().unwrap();
    path
}

/// Write a 16-bit mono WAV holding `+level` for the first half and `-level` after it.
pub fn step_wav(dir: &Path, name: &str, rate: u32, frames: usize, level: i16) -> PathBuf {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for i in 0..frames {
        writer
            .write_sample(if i < frames / 2 { level } else { -level })
            .unwrap();
    }
    writer.finalize().unwrap();
    path
}

/// Mono sink with the device contract: a bounded [`SharedAudio`] queue that a consumer
/// thread empties in real time, holding still while paused. Everything the consumer takes
/// is kept as "heard" audio.
pub struct QueueSink {
    rate: u32,
    queue: Arc<SharedAudio>,
    paused: Arc<AtomicBool>,
    heard: Arc<Mutex<Vec<f32>>>,
    consumer: Option<JoinHandle<()>>,
}

impl QueueSink {
    pub fn new(rate: u32, buffer_seconds: f32) -> Self {
        let queue = Arc::new(SharedAudio::new(
            1,
            calc_max_buffered_samples(rate, 1, buffer_seconds),
        ));
        let paused = Arc::new(AtomicBool::new(false));
        let heard = Arc::new(Mutex::new(Vec::new()));

        let consumer = {
            let queue = queue.clone();
            let paused = paused.clone();
            let heard = heard.clone();
            std::thread::spawn(move || {
                let mut last = Instant::now();
                let mut owed = 0.0f64;
                while !queue.is_done() {
                    std::thread::sleep(Duration::from_millis(2));
                    let now = Instant::now();
                    let elapsed = now.duration_since(last).as_secs_f64();
                    last = now;
                    if paused.load(Ordering::SeqCst) {
                        continue;
                    }
                    owed += elapsed * rate as f64;
                    let want = owed.floor() as usize;
                    if want == 0 {
                        continue;
                    }
                    owed -= want as f64;
                    // Pop and record under one lock so readers never see a popped block missing.
                    let mut heard = heard.lock().unwrap();
                    if let Some(frames) = queue.pop_nonblocking(want) {
                        heard.extend(frames);
                    }
                }
            })
        };

        Self {
            rate,
            queue,
            paused,
            heard,
            consumer: Some(consumer),
        }
    }

    /// Frames the consumer has taken out of the queue.
    pub fn frames_played(&self) -> u64 {
        self.heard.lock().unwrap().len() as u64
    }

    pub fn heard(&self) -> Vec<f32> {
        self.heard.lock().unwrap().clone()
    }
}

impl AudioSink for QueueSink {
    fn sample_rate(&self) -> u32 {
        self.rate
    }

    fn epoch(&self) -> u64 {
        self.queue.generation()
    }

    fn write(&self, samples: &[f32], channels: usize, epoch: u64) -> anyhow::Result<()> {
        assert_eq!(channels, 1);
        self.queue.push_since(epoch, samples);
        Ok(())
    }

    fn drain(&self, epoch: u64) {
        self.queue.drain_blocking(epoch);
    }

    fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    fn reset(&self) {
        self.queue.clear();
    }
}

impl Drop for QueueSink {
    fn drop(&mut self) {
        self.queue.close();
        if let Some(consumer) = self.consumer.take() {
            let _ = consumer.join();
        }
    }
}

/// Receive events until `done` matches one, returning everything seen (including the match).
pub fn collect_until(
    events: &Receiver<PlayerEvent>,
    mut done: impl FnMut(&PlayerEvent) -> bool,
) -> Vec<PlayerEvent> {
    let deadline = Instant::now() + TIMEOUT;
    let mut seen = Vec::new();
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        let event = events
            .recv_timeout(left)
            .unwrap_or_else(|_| panic!("timed out; events so far: {seen:?}"));
        let stop = done(&event);
        seen.push(event);
        if stop {
            return seen;
        }
    }
}

/// Everything currently queued or arriving within `window`.
pub fn drain_for(events: &Receiver<PlayerEvent>, window: Duration) -> Vec<PlayerEvent> {
    let deadline = Instant::now() + window;
    let mut seen = Vec::new();
    while let Ok(event) = events.recv_deadline(deadline) {
        seen.push(event);
    }
    seen
}

pub fn count_completions(events: &[PlayerEvent]) -> usize {
    events
        .iter()
        .filter(|e| **e == PlayerEvent::TrackCompleted)
        .count()
}

/// Poll `cond` until it holds or the timeout expires.
pub fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(5));
    }
}
