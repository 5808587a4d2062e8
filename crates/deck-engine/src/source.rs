//! Pull-based sample source shared by every pipeline stage.
//!
//! Samples are interleaved `f32`:
//! `frame0[ch0], frame0[ch1], ..., frame1[ch0], frame1[ch1], ...`

use crate::error::SourceError;

/// Rate and channel layout of a sample stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourceSpec {
    pub sample_rate: u32,
    pub channels: usize,
}

impl SourceSpec {
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Frames that fit into `samples` interleaved samples.
    pub fn frames_in(&self, samples: usize) -> usize {
        samples / self.channels.max(1)
    }
}

/// A seekable producer of interleaved frames.
///
/// Stages wrap one another (decoder → resampler → gain) and the render loop pulls from the
/// outermost one.
pub trait SampleSource: Send {
    /// Rate and channel layout of the frames produced by [`SampleSource::read`].
    fn spec(&self) -> SourceSpec;

    /// Fill `out` with whole frames and return how many were written.
    ///
    /// `Ok(0)` means the source is exhausted.
    fn read(&mut self, out: &mut [f32]) -> Result<usize, SourceError>;

    /// Reposition so the next frame read is `frame`.
    fn seek(&mut self, frame: u64) -> Result<(), SourceError>;

    /// Total length in frames, when the container reports it.
    fn len_frames(&self) -> Option<u64>;

    /// Index of the next frame [`SampleSource::read`] will return.
    fn position(&self) -> u64;

    /// Drop decoder resources. Idempotent; reads afterwards return `Ok(0)`.
    fn release(&mut self);
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn spec(&self) -> SourceSpec {
        (**self).spec()
    }

    fn read(&mut self, out: &mut [f32]) -> Result<usize, SourceError> {
        (**self).read(out)
    }

    fn seek(&mut self, frame: u64) -> Result<(), SourceError> {
        (**self).seek(frame)
    }

    fn len_frames(&self) -> Option<u64> {
        (**self).len_frames()
    }

    fn position(&self) -> u64 {
        (**self).position()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

/// Read until `out` is full or the source is exhausted.
///
/// Returns the number of frames written.
pub fn read_full<S: SampleSource + ?Sized>(
    source: &mut S,
    out: &mut [f32],
) -> Result<usize, SourceError> {
    let channels = source.spec().channels.max(1);
    let want = out.len() / channels;
    let mut filled = 0usize;
    while filled < want {
        let n = source.read(&mut out[filled * channels..want * channels])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// In-memory source over interleaved samples. Useful for tests and synthetic tones.
pub struct BufferSource {
    spec: SourceSpec,
    samples: Vec<f32>,
    pos: usize,
    released: bool,
}

impl BufferSource {
    pub fn new(spec: SourceSpec, samples: Vec<f32>) -> Self {
        Self {
            spec,
            samples,
            pos: 0,
            released: false,
        }
    }

    fn total_frames(&self) -> usize {
        self.spec.frames_in(self.samples.len())
    }
}

impl SampleSource for BufferSource {
    fn spec(&self) -> SourceSpec {
        self.spec
    }

    fn read(&mut self, out: &mut [f32]) -> Result<usize, SourceError> {
        if self.released {
            return Ok(0);
        }
        let ch = self.spec.channels;
        let frames = self
            .spec
            .frames_in(out.len())
            .min(self.total_frames().saturating_sub(self.pos));
        let start = self.pos * ch;
        out[..frames * ch].copy_from_slice(&self.samples[start..start + frames * ch]);
        self.pos += frames;
        Ok(frames)
    }

    fn seek(&mut self, frame: u64) -> Result<(), SourceError> {
        let frame = usize::try_from(frame).map_err(|e| SourceError::Seek(e.to_string()))?;
        if frame > self.total_frames() {
            return Err(SourceError::Seek(format!(
                "frame {frame} past end {}",
                self.total_frames()
            )));
        }
        self.pos = frame;
        Ok(())
    }

    fn len_frames(&self) -> Option<u64> {
        Some(self.total_frames() as u64)
    }

    fn position(&self) -> u64 {
        self.pos as u64
    }

    fn release(&mut self) {
        self.released = true;
        self.samples = Vec::new();
    }
}
