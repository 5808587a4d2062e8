//! Playback pipeline wiring: decode → resample → gain.

use std::sync::Arc;

use crate::config::PlaybackConfig;
use crate::decode;
use crate::error::PlayerError;
use crate::format::EncodedBuffer;
use crate::gain::{GainControl, GainStage};
use crate::resample::ResampledSource;
use crate::source::{SampleSource, SourceSpec};

/// A ready-to-render chain plus what the decoder reported about the source.
pub struct Pipeline {
    /// Outermost stage; the render loop pulls from here.
    pub source: Box<dyn SampleSource>,
    /// Rate and channel layout of the decoded source.
    pub native: SourceSpec,
    /// Codec label when known.
    pub codec: Option<&'static str>,
}

impl Pipeline {
    /// Session length in output frames.
    pub fn len_frames(&self) -> Option<u64> {
        self.source.len_frames()
    }
}

/// Build the chain for `buffer`, rendering at `out_rate` through `gain`.
pub fn build_pipeline(
    buffer: &EncodedBuffer,
    out_rate: u32,
    config: &PlaybackConfig,
    gain: Arc<GainControl>,
) -> Result<Pipeline, PlayerError> {
    let decoded = decode::decode_buffer(buffer)?;
    let native = decoded.spec();
    let codec = decoded.codec();

    let resampled = ResampledSource::new(
        Box::new(decoded),
        out_rate,
        config.resample_quality,
        config.chunk_frames,
    )?;
    let source = GainStage::new(resampled, gain);

    tracing::debug!(
        track = %buffer.track,
        native_rate = native.sample_rate,
        channels = native.channels,
        out_rate,
        len_frames = ?source.len_frames(),
        "pipeline built"
    );

    Ok(Pipeline {
        source: Box::new(source),
        native,
        codec,
    })
}
