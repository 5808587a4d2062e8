use deck_types::{PlaybackEndReason, PlayerState, StatusSnapshot};

use crate::format::TrackReference;
use crate::gain::GainControl;
use crate::source::SourceSpec;

/// Status fields owned by the player thread.
///
/// Live values (cursor, paused flag, gain) are read at snapshot time and passed in.
#[derive(Debug, Default)]
pub struct PlayerStatusState {
    /// Current controller state.
    pub state: PlayerState,
    /// Track whose buffer is loaded.
    pub now_playing: Option<TrackReference>,
    /// Native format of the decoded source.
    pub native: Option<SourceSpec>,
    /// Rate the pipeline renders at.
    pub output_rate: u32,
    /// Session length in output frames.
    pub length_frames: Option<u64>,
    /// Terminal reason of the last session.
    pub end_reason: Option<PlaybackEndReason>,
}

/// Values that live outside [`PlayerStatusState`] at snapshot time.
#[derive(Clone, Copy, Debug, Default)]
pub struct LiveStatus {
    pub position_frames: Option<u64>,
    pub paused: bool,
    pub track_index: Option<usize>,
    pub track_count: usize,
}

impl PlayerStatusState {
    pub fn new(output_rate: u32) -> Self {
        Self {
            output_rate,
            ..Self::default()
        }
    }

    /// Return a snapshot suitable for printing or serializing.
    pub fn snapshot(&self, live: LiveStatus, gain: &GainControl) -> StatusSnapshot {
        StatusSnapshot {
            state: self.state,
            now_playing: self.now_playing.as_ref().map(|t| t.to_string()),
            track_index: live.track_index,
            track_count: live.track_count,
            position_frames: live.position_frames,
            length_frames: self.length_frames,
            elapsed_ms: live
                .position_frames
                .and_then(|frames| frames_to_ms(frames, self.output_rate)),
            duration_ms: self
                .length_frames
                .and_then(|frames| frames_to_ms(frames, self.output_rate)),
            native_rate: self.native.map(|n| n.sample_rate),
            native_channels: self.native.map(|n| n.channels as u16),
            output_rate: self.output_rate,
            paused: live.paused,
            volume_db: gain.volume_db(),
            muted: gain.is_silent(),
            end_reason: self.end_reason,
        }
    }

    /// Clear session-specific fields when playback ends. The loaded track is kept.
    pub fn clear_playback(&mut self) {
        self.native = None;
        self.length_frames = None;
    }
}

fn frames_to_ms(frames: u64, rate: u32) -> Option<u64> {
    if rate == 0 {
        return None;
    }
    Some(frames.saturating_mul(1000) / rate as u64)
}
