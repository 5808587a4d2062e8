//! Gain stage.
//!
//! Multiplies every sample by `base ^ volume_db`, or emits silence while muted. The
//! control is shared through atomics so the command thread can adjust it while the
//! render loop is pulling; a change takes effect on the next block read.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::error::SourceError;
use crate::source::{SampleSource, SourceSpec};

/// Volume range front ends should offer (dB).
pub const MIN_VOLUME_DB: f32 = -5.0;
pub const MAX_VOLUME_DB: f32 = 5.0;

/// Clamp a user-entered volume into [`MIN_VOLUME_DB`]..=[`MAX_VOLUME_DB`].
pub fn clamp_volume_db(db: f32) -> f32 {
    if db.is_nan() {
        return 0.0;
    }
    db.clamp(MIN_VOLUME_DB, MAX_VOLUME_DB)
}

/// Shared gain settings (volume in dB + mute).
#[derive(Debug)]
pub struct GainControl {
    base: f32,
    volume_db: AtomicU32,
    silent: AtomicBool,
}

impl GainControl {
    pub fn new(base: f32, volume_db: f32) -> Self {
        Self {
            base,
            volume_db: AtomicU32::new(volume_db.to_bits()),
            silent: AtomicBool::new(false),
        }
    }

    pub fn shared(base: f32, volume_db: f32) -> Arc<Self> {
        Arc::new(Self::new(base, volume_db))
    }

    pub fn volume_db(&self) -> f32 {
        f32::from_bits(self.volume_db.load(Ordering::Relaxed))
    }

    pub fn set_volume_db(&self, db: f32) {
        self.volume_db.store(db.to_bits(), Ordering::Relaxed);
    }

    pub fn is_silent(&self) -> bool {
        self.silent.load(Ordering::Relaxed)
    }

    pub fn set_silent(&self, silent: bool) {
        self.silent.store(silent, Ordering::Relaxed);
    }

    /// Linear multiplier currently in effect.
    pub fn multiplier(&self) -> f32 {
        if self.is_silent() {
            0.0
        } else {
            self.base.powf(self.volume_db())
        }
    }
}

impl Default for GainControl {
    fn default() -> Self {
        Self::new(2.0, 0.0)
    }
}

/// A [`SampleSource`] applying a [`GainControl`] to everything it passes through.
pub struct GainStage<S> {
    inner: S,
    control: Arc<GainControl>,
}

impl<S: SampleSource> GainStage<S> {
    pub fn new(inner: S, control: Arc<GainControl>) -> Self {
        Self { inner, control }
    }

    pub fn control(&self) -> &Arc<GainControl> {
        &self.control
    }
}

impl<S: SampleSource> SampleSource for GainStage<S> {
    fn spec(&self) -> SourceSpec {
        self.inner.spec()
    }

    fn read(&mut self, out: &mut [f32]) -> Result<usize, SourceError> {
        let frames = self.inner.read(out)?;
        let samples = frames * self.inner.spec().channels;
        let gain = self.control.multiplier();
        if gain != 1.0 {
            for s in &mut out[..samples] {
                *s *= gain;
            }
        }
        Ok(frames)
    }

    fn seek(&mut self, frame: u64) -> Result<(), SourceError> {
        self.inner.seek(frame)
    }

    fn len_frames(&self) -> Option<u64> {
        self.inner.len_frames()
    }

    fn position(&self) -> u64 {
        self.inner.position()
    }

    fn release(&mut self) {
        self.inner.release()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::BufferSource;

    fn tone(frames: usize) -> BufferSource {
        let samples = (0..frames)
            .map(|i| 0.25 * (i as f32 * 0.1).sin())
            .collect();
        BufferSource::new(SourceSpec::new(44_100, 1), samples)
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn zero_db_is_unity() {
        let control = GainControl::shared(2.0, 0.0);
        assert_eq!(control.multiplier(), 1.0);

        let mut reference = tone(256);
        let mut expected = vec![0.0; 256];
        reference.read(&mut expected).unwrap();

        let mut stage = GainStage::new(tone(256), control);
        let mut out = vec![0.0; 256];
        assert_eq!(stage.read(&mut out).unwrap(), 256);
        for (a, b) in out.iter().zip(&expected) {
            assert!((a - b).abs() < 1e-7);
        }
    }

    #[test]
    fn gain_change_applies_to_next_block() {
        let control = GainControl::shared(2.0, 0.0);
        let mut stage = GainStage::new(tone(4096), control.clone());
        let mut block = vec![0.0; 1024];

        stage.read(&mut block).unwrap();
        let unity = rms(&block);

        control.set_volume_db(-1.0);
        stage.read(&mut block).unwrap();
        let quiet = rms(&block);

        control.set_volume_db(1.0);
        stage.read(&mut block).unwrap();
        let loud = rms(&block);

        assert!(quiet < unity, "quiet {quiet} unity {unity}");
        assert!(loud > unity, "loud {loud} unity {unity}");
        assert!((quiet / unity - 0.5).abs() < 0.05);
        assert!((loud / unity - 2.0).abs() < 0.1);
    }

    #[test]
    fn silent_flag_emits_zeros_and_keeps_volume() {
        let control = GainControl::shared(2.0, 3.0);
        control.set_silent(true);
        let mut stage = GainStage::new(tone(64), control.clone());
        let mut out = vec![1.0; 64];
        stage.read(&mut out).unwrap();
        assert!(out.iter().all(|s| *s == 0.0));
        assert_eq!(control.volume_db(), 3.0);
        control.set_silent(false);
        assert_eq!(control.multiplier(), 8.0);
    }

    #[test]
    fn clamp_volume_db_bounds_ui_range() {
        assert_eq!(clamp_volume_db(9.0), MAX_VOLUME_DB);
        assert_eq!(clamp_volume_db(-9.0), MIN_VOLUME_DB);
        assert_eq!(clamp_volume_db(1.5), 1.5);
        assert_eq!(clamp_volume_db(f32::NAN), 0.0);
    }
}
