//! Track references, format tags and encoded buffers.
//!
//! Format resolution is a pure function of the file extension; content is never sniffed.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::PlayerError;

/// Closed set of supported container/codec families.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TrackFormat {
    Mp3,
    Wav,
    Flac,
    OggVorbis,
}

impl TrackFormat {
    pub const ALL: [TrackFormat; 4] = [
        TrackFormat::Mp3,
        TrackFormat::Wav,
        TrackFormat::Flac,
        TrackFormat::OggVorbis,
    ];

    /// Canonical lowercase extension, also used as the demuxer hint.
    pub fn extension(self) -> &'static str {
        match self {
            TrackFormat::Mp3 => "mp3",
            TrackFormat::Wav => "wav",
            TrackFormat::Flac => "flac",
            TrackFormat::OggVorbis => "ogg",
        }
    }

    /// Resolve a format tag from an extension (case-insensitive, no leading dot).
    pub fn from_extension(ext: &str) -> Option<TrackFormat> {
        Self::ALL
            .into_iter()
            .find(|f| f.extension().eq_ignore_ascii_case(ext))
    }

    /// Resolve a format tag from the extension of `path`.
    pub fn from_path(path: &Path) -> Option<TrackFormat> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

impl fmt::Display for TrackFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TrackFormat::Mp3 => "MP3",
            TrackFormat::Wav => "WAV",
            TrackFormat::Flac => "FLAC",
            TrackFormat::OggVorbis => "OGG-Vorbis",
        };
        f.write_str(label)
    }
}

/// `true` if `path` carries one of the supported extensions.
pub fn is_supported(path: &Path) -> bool {
    TrackFormat::from_path(path).is_some()
}

/// Immutable locator of a track on disk.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackReference(PathBuf);

impl TrackReference {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// File name for status lines; falls back to the full path.
    pub fn display_name(&self) -> String {
        self.0
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.0.display().to_string())
    }
}

impl fmt::Display for TrackReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl From<PathBuf> for TrackReference {
    fn from(path: PathBuf) -> Self {
        Self(path)
    }
}

impl From<&Path> for TrackReference {
    fn from(path: &Path) -> Self {
        Self(path.to_path_buf())
    }
}

/// Raw file bytes plus the format tag they were classified as.
///
/// Bytes are shared so a session can be rebuilt from the same load without copying.
#[derive(Clone)]
pub struct EncodedBuffer {
    pub track: TrackReference,
    pub format: TrackFormat,
    pub bytes: Arc<[u8]>,
}

impl EncodedBuffer {
    pub fn new(track: TrackReference, format: TrackFormat, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            track,
            format,
            bytes: bytes.into(),
        }
    }

    /// Classify `path` by extension, then read the whole file into memory.
    ///
    /// Unsupported extensions are rejected before any I/O happens.
    pub fn load(path: &Path) -> Result<Self, PlayerError> {
        let format = TrackFormat::from_path(path)
            .ok_or_else(|| PlayerError::UnsupportedFormat(path.display().to_string()))?;
        let bytes = std::fs::read(path).map_err(|source| PlayerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), %format, "track buffered");
        Ok(Self::new(TrackReference::from(path), format, bytes))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for EncodedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedBuffer")
            .field("track", &self.track)
            .field("format", &self.format)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}
