//! Decoder adapter.
//!
//! Uses Symphonia to:
//! - probe the in-memory container, hinted by the format tag
//! - decode packets of the default track into interleaved `f32`
//! - seek by native frame index
//!
//! Every supported family (MP3, WAV, FLAC, OGG-Vorbis) goes through the same
//! [`DecodedSource`], which implements [`SampleSource`].

use std::io::{Cursor, ErrorKind};
use std::sync::Arc;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, CodecParameters, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{DecodeError, SourceError};
use crate::format::{EncodedBuffer, TrackFormat};
use crate::source::{SampleSource, SourceSpec};

/// Seekable decoder over an encoded in-memory buffer.
pub struct DecodedSource {
    spec: SourceSpec,
    len_frames: Option<u64>,
    codec: Option<&'static str>,
    position: u64,
    state: Option<DecoderState>,
}

struct DecoderState {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    buffer: Vec<f32>,
    offset: usize,
    /// Frames still to drop after an accurate seek landed early.
    skip_frames: u64,
}

/// Decode `buffer` according to its format tag.
pub fn decode_buffer(buffer: &EncodedBuffer) -> Result<DecodedSource, DecodeError> {
    decode(buffer.bytes.clone(), buffer.format)
}

/// Build a [`DecodedSource`] for `bytes` classified as `format`.
///
/// Fails with [`DecodeError::CorruptStream`] when the container or codec rejects the data.
pub fn decode(bytes: Arc<[u8]>, format: TrackFormat) -> Result<DecodedSource, DecodeError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    hint.with_extension(format.extension());

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| corrupt(format, e))?;
    let reader = probed.format;

    let track = reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DecodeError::CorruptStream(format!("{format}: no audio track")))?;
    let track_id = track.id;
    let codec_params: CodecParameters = track.codec_params.clone();

    let rate = codec_params
        .sample_rate
        .filter(|r| *r > 0)
        .ok_or_else(|| DecodeError::CorruptStream(format!("{format}: unknown sample rate")))?;
    let channels = codec_params
        .channels
        .map(|c| c.count())
        .filter(|c| *c > 0)
        .ok_or_else(|| DecodeError::CorruptStream(format!("{format}: unknown channel layout")))?;

    let decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| corrupt(format, e))?;

    let codec = codec_name_from_params(&codec_params);
    tracing::debug!(
        %format,
        codec = codec.unwrap_or("?"),
        rate_hz = rate,
        channels,
        duration_ms = ?duration_ms_from_codec_params(&codec_params),
        "decoder ready"
    );

    Ok(DecodedSource {
        spec: SourceSpec::new(rate, channels),
        len_frames: codec_params.n_frames,
        codec,
        position: 0,
        state: Some(DecoderState {
            format: reader,
            decoder,
            track_id,
            buffer: Vec::new(),
            offset: 0,
            skip_frames: 0,
        }),
    })
}

fn corrupt(format: TrackFormat, err: SymphoniaError) -> DecodeError {
    DecodeError::CorruptStream(format!("{format}: {err}"))
}

impl DecodedSource {
    /// Native sample rate of the source.
    pub fn native_rate(&self) -> u32 {
        self.spec.sample_rate
    }

    /// Native channel count of the source.
    pub fn channel_count(&self) -> usize {
        self.spec.channels
    }

    /// Best-effort codec label.
    pub fn codec(&self) -> Option<&'static str> {
        self.codec
    }
}

impl DecoderState {
    /// Decode the next packet of our track into `buffer`.
    ///
    /// Returns `false` at end of stream. Packets the codec rejects are skipped.
    fn refill(&mut self, channels: usize) -> Result<bool, SourceError> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => return Ok(false),
                Err(e) => return Err(SourceError::Decode(e.to_string())),
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(e)) => {
                    tracing::warn!(error = e, "skipping undecodable packet");
                    continue;
                }
                Err(e) => return Err(SourceError::Decode(e.to_string())),
            };
            if decoded.frames() == 0 {
                continue;
            }

            let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
            sample_buf.copy_interleaved_ref(decoded);
            self.buffer.clear();
            self.buffer.extend_from_slice(sample_buf.samples());
            self.offset = 0;

            if self.skip_frames > 0 {
                let frames = (self.buffer.len() / channels) as u64;
                let drop = self.skip_frames.min(frames);
                self.skip_frames -= drop;
                self.offset = drop as usize * channels;
                if self.offset >= self.buffer.len() {
                    continue;
                }
            }
            return Ok(true);
        }
    }
}

impl SampleSource for DecodedSource {
    fn spec(&self) -> SourceSpec {
        self.spec
    }

    fn read(&mut self, out: &mut [f32]) -> Result<usize, SourceError> {
        let ch = self.spec.channels;
        let want = out.len() / ch;
        let mut filled = 0usize;

        while filled < want {
            let Some(state) = self.state.as_mut() else {
                break;
            };
            if state.offset >= state.buffer.len() {
                if !state.refill(ch)? {
                    break;
                }
                continue;
            }

            let available = (state.buffer.len() - state.offset) / ch;
            let take = available.min(want - filled);
            if take == 0 {
                // Trailing partial frame; nothing whole left in this packet.
                state.offset = state.buffer.len();
                continue;
            }
            let dst = &mut out[filled * ch..(filled + take) * ch];
            dst.copy_from_slice(&state.buffer[state.offset..state.offset + take * ch]);
            state.offset += take * ch;
            filled += take;
        }

        self.position += filled as u64;
        Ok(filled)
    }

    fn seek(&mut self, frame: u64) -> Result<(), SourceError> {
        let Some(state) = self.state.as_mut() else {
            return Err(SourceError::Seek("decoder released".to_string()));
        };
        let seeked = state
            .format
            .seek(
                SeekMode::Accurate,
                SeekTo::TimeStamp {
                    ts: frame,
                    track_id: state.track_id,
                },
            )
            .map_err(|e| SourceError::Seek(e.to_string()))?;
        state.decoder.reset();
        state.buffer.clear();
        state.offset = 0;
        state.skip_frames = seeked.required_ts.saturating_sub(seeked.actual_ts);
        self.position = frame;
        tracing::trace!(
            frame,
            landed = seeked.actual_ts,
            skip = state.skip_frames,
            "decoder seek"
        );
        Ok(())
    }

    fn len_frames(&self) -> Option<u64> {
        self.len_frames
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn release(&mut self) {
        if self.state.take().is_some() {
            tracing::debug!(codec = self.codec.unwrap_or("?"), "decoder released");
        }
    }
}

/// Best-effort duration in milliseconds from codec metadata.
///
/// Returns `None` if the container does not provide total frames or sample rate.
fn duration_ms_from_codec_params(codec_params: &CodecParameters) -> Option<u64> {
    let frames = codec_params.n_frames?;
    let rate = codec_params.sample_rate? as u64;
    if rate == 0 {
        return None;
    }
    Some(frames.saturating_mul(1000) / rate)
}

/// Best-effort codec label used for logs and status lines.
fn codec_name_from_params(params: &CodecParameters) -> Option<&'static str> {
    use symphonia::core::codecs::*;
    let name = match params.codec {
        CODEC_TYPE_FLAC => "FLAC",
        CODEC_TYPE_MP3 => "MP3",
        CODEC_TYPE_VORBIS => "VORBIS",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM_S16",
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => "PCM_S24",
        CODEC_TYPE_PCM_S32LE | CODEC_TYPE_PCM_S32BE => "PCM_S32",
        CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE => "PCM_F32",
        CODEC_TYPE_PCM_U8 => "PCM_U8",
        _ => return None,
    };
    Some(name)
}
