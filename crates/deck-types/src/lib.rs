use serde::{Deserialize, Serialize};

/// Playback controller state as seen by front ends.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    /// No session and no pending track.
    #[default]
    Idle,
    /// A track buffer is loaded and classified; no pipeline has been built yet.
    Loading,
    /// A session is rendering audio.
    Playing,
    /// A session exists but the render loop is holding its position.
    Paused,
    /// The last session reached end of stream.
    Completed,
    /// The last session was torn down by an explicit command.
    Stopped,
}

impl PlayerState {
    /// `true` for states that own a live session.
    pub fn has_session(self) -> bool {
        matches!(self, PlayerState::Playing | PlayerState::Paused)
    }
}

/// Reason why the last playback session ended.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackEndReason {
    /// Natural end of stream.
    Eof,
    /// Decoder or output error interrupted playback.
    Error,
    /// Playback was explicitly stopped or replaced by a command.
    Stopped,
}

/// Point-in-time view of the player, suitable for printing or serializing.
///
/// Frame counts are expressed at the output rate.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct StatusSnapshot {
    /// Current controller state.
    pub state: PlayerState,
    /// Path of the loaded track, if any.
    pub now_playing: Option<String>,
    /// Cursor into the track list (`None` when nothing is selected).
    pub track_index: Option<usize>,
    /// Number of tracks in the current list.
    pub track_count: usize,
    /// Current render cursor in output frames.
    pub position_frames: Option<u64>,
    /// Total session length in output frames when known.
    pub length_frames: Option<u64>,
    /// Elapsed playback time in milliseconds.
    pub elapsed_ms: Option<u64>,
    /// Total duration in milliseconds when known.
    pub duration_ms: Option<u64>,
    /// Native sample rate of the decoded source (Hz).
    pub native_rate: Option<u32>,
    /// Native channel count of the decoded source.
    pub native_channels: Option<u16>,
    /// Output sample rate (Hz).
    pub output_rate: u32,
    /// `true` when a session exists and is paused.
    pub paused: bool,
    /// Gain in dB applied to the next frame pulled.
    pub volume_db: f32,
    /// `true` when the gain stage emits silence.
    pub muted: bool,
    /// Why the previous session ended.
    pub end_reason: Option<PlaybackEndReason>,
}
