//! Error taxonomy for the playback engine.
//!
//! Every command on the public surface reports a [`PlayerError`]; lower stages use
//! narrower types that convert into it.

use std::path::PathBuf;

use thiserror::Error;

/// Failure while turning an encoded buffer into a sample source.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The format tag or extension is not in the allow-list.
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),
    /// The container or codec rejected the bytes.
    #[error("corrupt audio stream: {0}")]
    CorruptStream(String),
}

/// Failure while pulling from or seeking a live sample source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("seek failed: {0}")]
    Seek(String),
    #[error("resampler failed: {0}")]
    Resample(String),
}

/// Errors reported by the player command surface.
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("could not decode track: {0}")]
    DecodeFailed(String),

    /// Seek target outside `[0, length)`; the cursor is left unchanged.
    #[error("seek target {target} is outside 0..{}", bound_label(.length))]
    InvalidSeek { target: i64, length: Option<u64> },

    #[error("no track loaded")]
    NoTrackLoaded,

    #[error("track list is empty")]
    NoTracks,

    #[error("track index {index} is out of range (list has {len} tracks)")]
    TrackOutOfRange { index: usize, len: usize },

    /// The output device could not be opened. Fatal for the engine.
    #[error("audio output unavailable: {0}")]
    DeviceInitFailed(String),

    #[error("could not read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("player is shut down")]
    Disconnected,
}

fn bound_label(length: &Option<u64>) -> String {
    match length {
        Some(len) => len.to_string(),
        None => "?".to_string(),
    }
}

impl From<DecodeError> for PlayerError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::UnsupportedFormat(what) => PlayerError::UnsupportedFormat(what),
            DecodeError::CorruptStream(why) => PlayerError::DecodeFailed(why),
        }
    }
}

impl From<SourceError> for PlayerError {
    fn from(err: SourceError) -> Self {
        PlayerError::DecodeFailed(err.to_string())
    }
}
