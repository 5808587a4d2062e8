//! Local audio playback engine.
//!
//! Encoded bytes flow through decode → resample → gain and a render loop writes the
//! result to an [`AudioSink`]. [`Player`] owns the state machine and exposes the command
//! surface through [`PlayerHandle`]; notifications arrive as [`PlayerEvent`]s.

pub mod config;
pub mod decode;
pub mod device;
pub mod error;
pub mod format;
pub mod gain;
pub mod output;
pub mod pipeline;
pub mod player;
pub mod queue;
pub mod resample;
pub mod sequencer;
mod session;
pub mod signal;
pub mod sink;
pub mod source;
pub mod status;
#[cfg(test)]
mod test_support;

pub use config::{OutputConfig, PlaybackConfig, ResampleQuality};
pub use error::{DecodeError, PlayerError, SourceError};
pub use format::{EncodedBuffer, TrackFormat, TrackReference};
pub use output::DeviceSink;
pub use player::{Player, PlayerEvent, PlayerHandle};
pub use sink::{AudioSink, MemorySink};
