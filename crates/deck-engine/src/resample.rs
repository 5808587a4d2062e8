//! Resample stage.
//!
//! Uses Rubato to convert the decoder's native rate to the output rate. The stage is
//! pull-driven: every [`SampleSource::read`] feeds whole input chunks through the
//! resampler until enough output frames are pending.
//!
//! Frame addressing is exact:
//! - output length is `round(in_len * out_rate / in_rate)`; the filter delay is trimmed
//!   from the head and the tail is flushed with silence, then truncated
//! - seeking to output frame `k` seeks the input to `floor(k * in_rate / out_rate)`

use std::collections::VecDeque;

use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, PolynomialDegree, Resampler, SincInterpolationParameters,
    SincInterpolationType, WindowFunction, calculate_cutoff,
};

use crate::config::ResampleQuality;
use crate::error::SourceError;
use crate::source::{SampleSource, SourceSpec, read_full};

/// Upper bound on silent chunks fed after end of input while flushing the filter tail.
const MAX_FLUSH_CHUNKS: usize = 8;

/// Output frames corresponding to `in_frames` input frames, rounded to nearest.
pub fn output_frames_for(in_frames: u64, in_rate: u32, out_rate: u32) -> u64 {
    let num = in_frames as u128 * out_rate as u128 + in_rate as u128 / 2;
    (num / in_rate.max(1) as u128) as u64
}

/// Input frame that output frame `out_frame` maps onto (floor).
pub fn input_frame_for(out_frame: u64, in_rate: u32, out_rate: u32) -> u64 {
    (out_frame as u128 * in_rate as u128 / out_rate.max(1) as u128) as u64
}

/// A [`SampleSource`] presenting `inner` at a fixed output rate.
pub struct ResampledSource {
    inner: Box<dyn SampleSource>,
    spec: SourceSpec,
    stage: Option<Stage>,
}

struct Stage {
    resampler: Box<dyn Resampler<f32> + Send>,
    in_rate: u32,
    out_rate: u32,
    channels: usize,
    chunk_frames: usize,
    in_buf: Vec<f32>,
    out_buf: Vec<f32>,
    pending: VecDeque<f32>,
    /// Output frames of filter delay still to discard.
    delay_left: usize,
    /// Absolute output index one past the last frame queued in `pending`.
    generated: u64,
    /// Absolute output index of the next frame handed to the caller.
    position: u64,
    /// Absolute input index one past the last frame fed to the resampler.
    consumed_in: u64,
    input_done: bool,
    flush_chunks: usize,
}

impl ResampledSource {
    /// Wrap `inner`, converting to `out_rate`.
    ///
    /// When the rates already match the stage is a pass-through.
    pub fn new(
        inner: Box<dyn SampleSource>,
        out_rate: u32,
        quality: ResampleQuality,
        chunk_frames: usize,
    ) -> Result<Self, SourceError> {
        let src = inner.spec();
        let spec = SourceSpec::new(out_rate, src.channels);

        if src.sample_rate == out_rate {
            tracing::info!(rate_hz = out_rate, "resample skipped");
            return Ok(Self {
                inner,
                spec,
                stage: None,
            });
        }

        let chunk_frames = chunk_frames.max(1);
        let resampler = build_resampler(
            quality,
            src.sample_rate,
            out_rate,
            chunk_frames,
            src.channels,
        )?;
        let delay = resampler.output_delay();
        let out_capacity = resampler.output_frames_max() * src.channels;
        tracing::info!(
            from_hz = src.sample_rate,
            to_hz = out_rate,
            ?quality,
            delay_frames = delay,
            "resampling"
        );

        Ok(Self {
            inner,
            spec,
            stage: Some(Stage {
                resampler,
                in_rate: src.sample_rate,
                out_rate,
                channels: src.channels,
                chunk_frames,
                in_buf: vec![0.0; chunk_frames * src.channels],
                out_buf: vec![0.0; out_capacity],
                pending: VecDeque::new(),
                delay_left: delay,
                generated: 0,
                position: 0,
                consumed_in: 0,
                input_done: false,
                flush_chunks: 0,
            }),
        })
    }

    /// Native rate of the wrapped source.
    pub fn input_rate(&self) -> u32 {
        self.inner.spec().sample_rate
    }

    /// `true` when the stage actually converts rates.
    pub fn is_resampling(&self) -> bool {
        self.stage.is_some()
    }
}

fn build_resampler(
    quality: ResampleQuality,
    in_rate: u32,
    out_rate: u32,
    chunk_frames: usize,
    channels: usize,
) -> Result<Box<dyn Resampler<f32> + Send>, SourceError> {
    let f_ratio = out_rate as f64 / in_rate as f64;
    let made = match quality {
        ResampleQuality::Cubic => Async::<f32>::new_poly(
            f_ratio,
            1.1,
            PolynomialDegree::Cubic,
            chunk_frames,
            channels,
            FixedAsync::Input,
        ),
        ResampleQuality::Sinc => {
            let sinc_len = 128;
            let window = WindowFunction::BlackmanHarris2;
            let params = SincInterpolationParameters {
                sinc_len,
                f_cutoff: calculate_cutoff(sinc_len, window),
                interpolation: SincInterpolationType::Cubic,
                oversampling_factor: 256,
                window,
            };
            Async::<f32>::new_sinc(
                f_ratio,
                1.1,
                &params,
                chunk_frames,
                channels,
                FixedAsync::Input,
            )
        }
    };
    match made {
        Ok(r) => Ok(Box::new(r)),
        Err(e) => Err(SourceError::Resample(format!("init: {e}"))),
    }
}

impl Stage {
    fn expected_total(&self, inner_len: Option<u64>) -> Option<u64> {
        match inner_len {
            Some(n) => Some(output_frames_for(n, self.in_rate, self.out_rate)),
            None if self.input_done => Some(output_frames_for(
                self.consumed_in,
                self.in_rate,
                self.out_rate,
            )),
            None => None,
        }
    }

    /// Push one input chunk through the resampler.
    ///
    /// Returns `false` once no further output will be produced.
    fn process_chunk(&mut self, inner: &mut dyn SampleSource) -> Result<bool, SourceError> {
        let inner_len = inner.len_frames();
        if let Some(total) = self.expected_total(inner_len) {
            if self.generated >= total {
                return Ok(false);
            }
        }

        let ch = self.channels;
        let chunk = self.chunk_frames;
        let got = if self.input_done {
            0
        } else {
            read_full(inner, &mut self.in_buf[..chunk * ch])?
        };
        if got < chunk {
            self.input_done = true;
            self.in_buf[got * ch..].fill(0.0);
        }
        self.consumed_in += got as u64;
        if got == 0 {
            self.flush_chunks += 1;
            if self.flush_chunks > MAX_FLUSH_CHUNKS {
                return Ok(false);
            }
        }

        let produced = {
            let input_adapter = InterleavedSlice::new(&self.in_buf, ch, chunk)
                .map_err(|e| SourceError::Resample(format!("input slice: {e}")))?;
            let out_capacity_frames = self.out_buf.len() / ch;
            let mut output_adapter =
                InterleavedSlice::new_mut(&mut self.out_buf, ch, out_capacity_frames)
                    .map_err(|e| SourceError::Resample(format!("output slice: {e}")))?;
            let (_nbr_in, nbr_out) = self
                .resampler
                .process_into_buffer(&input_adapter, &mut output_adapter, None)
                .map_err(|e| SourceError::Resample(e.to_string()))?;
            nbr_out
        };

        let skip = self.delay_left.min(produced);
        self.delay_left -= skip;
        let mut frames = produced - skip;
        if let Some(total) = self.expected_total(inner_len) {
            frames = frames.min(total.saturating_sub(self.generated) as usize);
        }
        self.pending
            .extend(&self.out_buf[skip * ch..(skip + frames) * ch]);
        self.generated += frames as u64;
        Ok(true)
    }
}

impl SampleSource for ResampledSource {
    fn spec(&self) -> SourceSpec {
        self.spec
    }

    fn read(&mut self, out: &mut [f32]) -> Result<usize, SourceError> {
        let Some(stage) = self.stage.as_mut() else {
            return self.inner.read(out);
        };
        let ch = stage.channels;
        let want = out.len() / ch;

        while stage.pending.len() / ch < want {
            if !stage.process_chunk(self.inner.as_mut())? {
                break;
            }
        }

        let take = want.min(stage.pending.len() / ch);
        for (dst, src) in out[..take * ch].iter_mut().zip(stage.pending.drain(..take * ch)) {
            *dst = src;
        }
        stage.position += take as u64;
        Ok(take)
    }

    fn seek(&mut self, frame: u64) -> Result<(), SourceError> {
        let Some(stage) = self.stage.as_mut() else {
            return self.inner.seek(frame);
        };
        let in_frame = input_frame_for(frame, stage.in_rate, stage.out_rate);
        self.inner.seek(in_frame)?;

        stage.resampler.reset();
        stage.pending.clear();
        stage.delay_left = stage.resampler.output_delay();
        stage.generated = frame;
        stage.position = frame;
        stage.consumed_in = in_frame;
        stage.input_done = false;
        stage.flush_chunks = 0;
        Ok(())
    }

    fn len_frames(&self) -> Option<u64> {
        match &self.stage {
            Some(stage) => stage.expected_total(self.inner.len_frames()),
            None => self.inner.len_frames(),
        }
    }

    fn position(&self) -> u64 {
        match &self.stage {
            Some(stage) => stage.position,
            None => self.inner.position(),
        }
    }

    fn release(&mut self) {
        self.inner.release();
        if let Some(stage) = self.stage.as_mut() {
            stage.pending = VecDeque::new();
            stage.input_done = true;
        }
    }
}
