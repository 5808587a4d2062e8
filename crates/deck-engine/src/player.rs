//! Playback controller.
//!
//! A single player thread owns the state machine, the track list and the loaded buffer.
//! [`PlayerHandle`] methods send a [`PlayerCommand`] and block on the reply, so commands
//! are applied one at a time. Session tasks report back over the same channel
//! (`SessionFinished`, `SessionFailed`); outbound notifications go out as [`PlayerEvent`]s.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use deck_types::{PlaybackEndReason, PlayerState, StatusSnapshot};

use crate::config::PlaybackConfig;
use crate::error::PlayerError;
use crate::format::{EncodedBuffer, TrackReference, is_supported};
use crate::gain::GainControl;
use crate::pipeline::build_pipeline;
use crate::sequencer::{TrackList, scan_directory};
use crate::session::{ActiveSession, SessionTasks, SessionTiming, Shared};
use crate::sink::AudioSink;
use crate::status::{LiveStatus, PlayerStatusState};

/// Notifications published by the player thread.
#[derive(Clone, Debug, PartialEq)]
pub enum PlayerEvent {
    /// Short human-readable status line.
    StatusChanged(String),
    /// Periodic cursor sample, in output frames.
    PositionChanged(u64),
    /// A session reached natural end of stream. Never sent for stop or replacement.
    TrackCompleted,
    /// A session started rendering.
    TrackStarted {
        index: Option<usize>,
        track: TrackReference,
    },
    StateChanged(PlayerState),
}

type Reply<T> = Sender<T>;

/// Commands accepted by the player thread.
pub(crate) enum PlayerCommand {
    Load {
        path: PathBuf,
        reply: Reply<Result<(), PlayerError>>,
    },
    Play {
        reply: Reply<Result<(), PlayerError>>,
    },
    LoadAndPlay {
        path: PathBuf,
        reply: Reply<Result<(), PlayerError>>,
    },
    TogglePause {
        reply: Reply<Result<bool, PlayerError>>,
    },
    Seek {
        frame: i64,
        reply: Reply<Result<(), PlayerError>>,
    },
    SetVolume {
        db: f32,
        reply: Reply<()>,
    },
    SetMuted {
        muted: bool,
        reply: Reply<()>,
    },
    Stop {
        reply: Reply<()>,
    },
    Next {
        reply: Reply<Option<TrackReference>>,
    },
    Prev {
        reply: Reply<Option<TrackReference>>,
    },
    Select {
        index: usize,
        reply: Reply<Result<TrackReference, PlayerError>>,
    },
    SelectDirectory {
        path: PathBuf,
        reply: Reply<io::Result<Vec<TrackReference>>>,
    },
    Status {
        reply: Reply<StatusSnapshot>,
    },
    SessionFinished {
        id: u64,
    },
    SessionFailed {
        id: u64,
        message: String,
    },
    Shutdown,
}

/// Cloneable command surface of a running [`Player`].
#[derive(Clone)]
pub struct PlayerHandle {
    cmd_tx: Sender<PlayerCommand>,
    shared: Arc<Shared>,
}

impl PlayerHandle {
    fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> PlayerCommand,
    ) -> Result<T, PlayerError> {
        let (reply, rx) = crossbeam_channel::bounded(1);
        self.cmd_tx
            .send(make(reply))
            .map_err(|_| PlayerError::Disconnected)?;
        rx.recv().map_err(|_| PlayerError::Disconnected)
    }

    /// Read `path` into memory without starting playback.
    ///
    /// Unsupported extensions are rejected without touching the current session.
    pub fn load(&self, path: impl Into<PathBuf>) -> Result<(), PlayerError> {
        let path = path.into();
        self.request(|reply| PlayerCommand::Load { path, reply })?
    }

    /// Start a fresh session from the loaded buffer, replacing any current one.
    pub fn play(&self) -> Result<(), PlayerError> {
        self.request(|reply| PlayerCommand::Play { reply })?
    }

    pub fn load_and_play(&self, path: impl Into<PathBuf>) -> Result<(), PlayerError> {
        let path = path.into();
        self.request(|reply| PlayerCommand::LoadAndPlay { path, reply })?
    }

    /// Flip the paused flag of the current session. Returns the new flag.
    pub fn toggle_pause(&self) -> Result<bool, PlayerError> {
        self.request(|reply| PlayerCommand::TogglePause { reply })?
    }

    /// Move the cursor to `frame` (output frames). Valid range is `[0, length)`.
    pub fn seek(&self, frame: i64) -> Result<(), PlayerError> {
        self.request(|reply| PlayerCommand::Seek { frame, reply })?
    }

    /// Gain in dB for the current and every later session.
    pub fn set_volume(&self, db: f32) {
        let _ = self.request(|reply| PlayerCommand::SetVolume { db, reply });
    }

    pub fn set_muted(&self, muted: bool) {
        let _ = self.request(|reply| PlayerCommand::SetMuted { muted, reply });
    }

    /// Tear down the current session. No-op when nothing is playing.
    pub fn stop(&self) -> Result<(), PlayerError> {
        self.request(|reply| PlayerCommand::Stop { reply })
    }

    /// Play the next track of the list, wrapping after the last one.
    pub fn next(&self) -> Option<TrackReference> {
        self.request(|reply| PlayerCommand::Next { reply })
            .ok()
            .flatten()
    }

    /// Play the previous track of the list, wrapping before the first one.
    pub fn prev(&self) -> Option<TrackReference> {
        self.request(|reply| PlayerCommand::Prev { reply })
            .ok()
            .flatten()
    }

    /// Play the track at `index` of the list.
    pub fn select(&self, index: usize) -> Result<TrackReference, PlayerError> {
        self.request(|reply| PlayerCommand::Select { index, reply })?
    }

    /// Replace the track list with the playable files of `dir`.
    ///
    /// Resets the cursor and leaves the current session alone.
    pub fn select_directory(&self, dir: impl AsRef<Path>) -> io::Result<Vec<TrackReference>> {
        let path = dir.as_ref().to_path_buf();
        match self.request(|reply| PlayerCommand::SelectDirectory { path, reply }) {
            Ok(result) => result,
            Err(e) => Err(io::Error::other(e)),
        }
    }

    pub fn status(&self) -> Result<StatusSnapshot, PlayerError> {
        self.request(|reply| PlayerCommand::Status { reply })
    }

    /// Render loops currently alive.
    pub fn live_render_loops(&self) -> usize {
        self.shared.live_render_loops()
    }
}

/// Owner of the player thread. Dropping it shuts the thread down.
pub struct Player {
    handle: PlayerHandle,
    events: Receiver<PlayerEvent>,
    join: Option<JoinHandle<()>>,
}

impl Player {
    /// Start the player thread rendering into `sink`.
    pub fn spawn(sink: Arc<dyn AudioSink>, config: PlaybackConfig) -> Self {
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let shared = Shared::new();

        tracing::info!(
            output_rate = sink.sample_rate(),
            volume_db = config.volume_db,
            auto_advance = config.auto_advance,
            "player started"
        );
        let actor = PlayerActor {
            gain: GainControl::shared(config.volume_base, config.volume_db),
            status: PlayerStatusState::new(sink.sample_rate()),
            config,
            sink,
            shared: shared.clone(),
            tracks: TrackList::default(),
            loaded: None,
            loaded_index: None,
            tasks: None,
            next_session_id: 0,
            events: events_tx,
            notify: cmd_tx.clone(),
        };
        let join = std::thread::spawn(move || actor.run(cmd_rx));

        Self {
            handle: PlayerHandle { cmd_tx, shared },
            events: events_rx,
            join: Some(join),
        }
    }

    pub fn handle(&self) -> PlayerHandle {
        self.handle.clone()
    }

    /// Receiver of outbound notifications. Clones share one queue.
    pub fn events(&self) -> Receiver<PlayerEvent> {
        self.events.clone()
    }

    pub fn live_render_loops(&self) -> usize {
        self.handle.live_render_loops()
    }

    /// Stop playback and join the player thread.
    pub fn shutdown(mut self) {
        self.join_thread();
    }

    fn join_thread(&mut self) {
        if let Some(join) = self.join.take() {
            let _ = self.handle.cmd_tx.send(PlayerCommand::Shutdown);
            if join.join().is_err() {
                tracing::warn!("player thread panicked");
            }
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.join_thread();
    }
}

struct PlayerActor {
    config: PlaybackConfig,
    sink: Arc<dyn AudioSink>,
    shared: Arc<Shared>,
    gain: Arc<GainControl>,
    tracks: TrackList,
    loaded: Option<EncodedBuffer>,
    /// List index of the loaded buffer, when it came from the list.
    loaded_index: Option<usize>,
    tasks: Option<SessionTasks>,
    next_session_id: u64,
    status: PlayerStatusState,
    events: Sender<PlayerEvent>,
    notify: Sender<PlayerCommand>,
}

impl PlayerActor {
    fn run(mut self, cmd_rx: Receiver<PlayerCommand>) {
        while let Ok(cmd) = cmd_rx.recv() {
            if !self.handle(cmd) {
                break;
            }
        }
        self.end_session(PlaybackEndReason::Stopped);
        tracing::info!("player stopped");
    }

    /// Apply one command. Returns `false` on shutdown.
    fn handle(&mut self, cmd: PlayerCommand) -> bool {
        match cmd {
            PlayerCommand::Load { path, reply } => {
                let _ = reply.send(self.load(&path));
            }
            PlayerCommand::Play { reply } => {
                let _ = reply.send(self.play());
            }
            PlayerCommand::LoadAndPlay { path, reply } => {
                let result = self.load(&path).and_then(|()| self.play());
                let _ = reply.send(result);
            }
            PlayerCommand::TogglePause { reply } => {
                let _ = reply.send(self.toggle_pause());
            }
            PlayerCommand::Seek { frame, reply } => {
                let _ = reply.send(self.seek(frame));
            }
            PlayerCommand::SetVolume { db, reply } => {
                self.gain.set_volume_db(db);
                tracing::debug!(volume_db = db, "volume set");
                let _ = reply.send(());
            }
            PlayerCommand::SetMuted { muted, reply } => {
                self.gain.set_silent(muted);
                tracing::debug!(muted, "mute set");
                let _ = reply.send(());
            }
            PlayerCommand::Stop { reply } => {
                self.stop();
                let _ = reply.send(());
            }
            PlayerCommand::Next { reply } => {
                let step = self.tracks.next();
                let _ = reply.send(self.play_step(step));
            }
            PlayerCommand::Prev { reply } => {
                let step = self.tracks.prev();
                let _ = reply.send(self.play_step(step));
            }
            PlayerCommand::Select { index, reply } => {
                let result = self.tracks.select(index).and_then(|track| {
                    self.play_track(index, &track)?;
                    Ok(track)
                });
                let _ = reply.send(result);
            }
            PlayerCommand::SelectDirectory { path, reply } => {
                let _ = reply.send(self.select_directory(&path));
            }
            PlayerCommand::Status { reply } => {
                let _ = reply.send(self.snapshot());
            }
            PlayerCommand::SessionFinished { id } => self.session_finished(id),
            PlayerCommand::SessionFailed { id, message } => self.session_failed(id, &message),
            PlayerCommand::Shutdown => return false,
        }
        true
    }

    fn emit(&self, event: PlayerEvent) {
        let _ = self.events.send(event);
    }

    fn set_state(&mut self, state: PlayerState) {
        if self.status.state != state {
            tracing::debug!(from = ?self.status.state, to = ?state, "state changed");
            self.status.state = state;
            self.emit(PlayerEvent::StateChanged(state));
        }
    }

    /// Tear down the current session, if any, and release its pipeline.
    fn end_session(&mut self, reason: PlaybackEndReason) -> bool {
        let Some(tasks) = self.tasks.take() else {
            return false;
        };
        let id = tasks.id();
        let flush = reason != PlaybackEndReason::Eof;
        if let Some(mut session) = tasks.teardown(&self.shared, self.sink.as_ref(), flush) {
            session.pipeline.release();
            tracing::info!(session = id, ?reason, position = session.position, "session ended");
        }
        self.status.end_reason = Some(reason);
        self.status.clear_playback();
        true
    }

    fn load(&mut self, path: &Path) -> Result<(), PlayerError> {
        if !is_supported(path) {
            tracing::warn!(path = %path.display(), "rejecting unsupported file");
            return Err(PlayerError::UnsupportedFormat(path.display().to_string()));
        }
        self.end_session(PlaybackEndReason::Stopped);
        self.loaded_index = None;

        match EncodedBuffer::load(path) {
            Ok(buffer) => {
                tracing::info!(path = %path.display(), bytes = buffer.len(), format = %buffer.format, "track loaded");
                self.status.now_playing = Some(buffer.track.clone());
                self.loaded = Some(buffer);
                self.set_state(PlayerState::Loading);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("load failed: {e}");
                self.loaded = None;
                self.status.now_playing = None;
                self.set_state(PlayerState::Idle);
                Err(e)
            }
        }
    }

    fn play(&mut self) -> Result<(), PlayerError> {
        let Some(buffer) = self.loaded.clone() else {
            return Err(PlayerError::NoTrackLoaded);
        };
        self.end_session(PlaybackEndReason::Stopped);

        let out_rate = self.sink.sample_rate();
        let pipeline = match build_pipeline(&buffer, out_rate, &self.config, self.gain.clone()) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                tracing::warn!(track = %buffer.track, "decode failed: {e}");
                self.status.end_reason = Some(PlaybackEndReason::Error);
                self.set_state(PlayerState::Idle);
                self.emit(PlayerEvent::StatusChanged(e.to_string()));
                return Err(e);
            }
        };

        self.next_session_id += 1;
        let id = self.next_session_id;
        let length = pipeline.len_frames();
        self.status.native = Some(pipeline.native);
        self.status.length_frames = length;
        self.status.output_rate = out_rate;
        self.status.end_reason = None;

        let session = ActiveSession {
            id,
            pipeline: pipeline.source,
            paused: false,
            position: 0,
            length,
        };
        let timing = SessionTiming {
            block_frames: self.config.block_frames,
            position_interval: self.config.position_interval,
        };
        self.tasks = Some(SessionTasks::start(
            &self.shared,
            &self.sink,
            session,
            timing,
            self.events.clone(),
            self.notify.clone(),
        ));

        tracing::info!(
            session = id,
            track = %buffer.track,
            native_rate = pipeline.native.sample_rate,
            channels = pipeline.native.channels,
            codec = pipeline.codec.unwrap_or("unknown"),
            len_frames = ?length,
            "session started"
        );
        self.set_state(PlayerState::Playing);
        self.emit(PlayerEvent::TrackStarted {
            index: self.loaded_index,
            track: buffer.track.clone(),
        });
        self.emit(PlayerEvent::StatusChanged(format!(
            "playing {}",
            buffer.track.display_name()
        )));
        Ok(())
    }

    fn play_track(&mut self, index: usize, track: &TrackReference) -> Result<(), PlayerError> {
        let result = self.load(track.path()).and_then(|()| {
            self.loaded_index = Some(index);
            self.play()
        });
        if let Err(e) = &result {
            self.emit(PlayerEvent::StatusChanged(format!(
                "could not play {}: {e}",
                track.display_name()
            )));
        }
        result
    }

    fn play_step(
        &mut self,
        step: Result<(usize, TrackReference), PlayerError>,
    ) -> Option<TrackReference> {
        match step {
            Ok((index, track)) => {
                let _ = self.play_track(index, &track);
                Some(track)
            }
            Err(e) => {
                tracing::debug!("no track to step to: {e}");
                None
            }
        }
    }

    fn toggle_pause(&mut self) -> Result<bool, PlayerError> {
        let paused = {
            let mut g = self.shared.lock();
            let Some(session) = g.as_mut() else {
                return Err(PlayerError::NoTrackLoaded);
            };
            session.paused = !session.paused;
            session.paused
        };
        self.shared.notify();
        self.sink.set_paused(paused);
        tracing::info!(paused, "pause toggled");
        self.set_state(if paused {
            PlayerState::Paused
        } else {
            PlayerState::Playing
        });
        Ok(paused)
    }

    fn seek(&mut self, target: i64) -> Result<(), PlayerError> {
        {
            let mut g = self.shared.lock();
            let Some(session) = g.as_mut() else {
                return Err(PlayerError::NoTrackLoaded);
            };
            let in_range =
                target >= 0 && session.length.is_none_or(|len| (target as u64) < len);
            if !in_range {
                return Err(PlayerError::InvalidSeek {
                    target,
                    length: session.length,
                });
            }
            session.pipeline.seek(target as u64)?;
            session.position = target as u64;
            // Queued audio and any block read before this point belong to the old position.
            self.sink.reset();
        }
        tracing::info!(frame = target, "seeked");
        self.emit(PlayerEvent::PositionChanged(target as u64));
        Ok(())
    }

    fn stop(&mut self) {
        if self.end_session(PlaybackEndReason::Stopped) {
            self.set_state(PlayerState::Stopped);
            self.set_state(PlayerState::Idle);
            self.emit(PlayerEvent::StatusChanged("stopped".into()));
        }
    }

    fn select_directory(&mut self, path: &Path) -> io::Result<Vec<TrackReference>> {
        let tracks = scan_directory(path)?;
        tracing::info!(dir = %path.display(), tracks = tracks.len(), "track list replaced");
        self.tracks.replace(tracks.clone());
        self.emit(PlayerEvent::StatusChanged(format!(
            "{} tracks in {}",
            tracks.len(),
            path.display()
        )));
        Ok(tracks)
    }

    fn snapshot(&self) -> StatusSnapshot {
        let (position_frames, paused) = match self.shared.lock().as_ref() {
            Some(s) => (Some(s.position), s.paused),
            None => (None, false),
        };
        self.status.snapshot(
            LiveStatus {
                position_frames,
                paused,
                track_index: self.tracks.cursor(),
                track_count: self.tracks.len(),
            },
            &self.gain,
        )
    }

    fn is_current(&self, id: u64) -> bool {
        self.tasks.as_ref().is_some_and(|t| t.id() == id)
    }

    fn session_finished(&mut self, id: u64) {
        if !self.is_current(id) {
            tracing::debug!(session = id, "ignoring completion of a replaced session");
            return;
        }
        self.end_session(PlaybackEndReason::Eof);
        self.set_state(PlayerState::Completed);
        self.emit(PlayerEvent::TrackCompleted);

        if self.config.auto_advance && !self.tracks.is_empty() {
            if let Ok((index, track)) = self.tracks.next() {
                tracing::info!(index, track = %track, "advancing");
                if self.play_track(index, &track).is_ok() {
                    return;
                }
            }
        }
        self.set_state(PlayerState::Idle);
    }

    fn session_failed(&mut self, id: u64, message: &str) {
        if !self.is_current(id) {
            return;
        }
        self.end_session(PlaybackEndReason::Error);
        self.set_state(PlayerState::Stopped);
        self.emit(PlayerEvent::StatusChanged(format!("playback error: {message}")));
        self.set_state(PlayerState::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use crate::test_support::sine_wav;
    use std::time::Duration;

    fn player() -> (Player, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::counting(44_100).with_speed(1.0));
        let player = Player::spawn(sink.clone(), PlaybackConfig::default());
        (player, sink)
    }

    fn write_clip(dir: &Path, name: &str, frames: usize) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, sine_wav(44_100, 1, frames, 0.3)).unwrap();
        path
    }

    #[test]
    fn commands_without_a_session_report_no_track_loaded() {
        let (player, _sink) = player();
        let handle = player.handle();
        assert!(matches!(handle.play(), Err(PlayerError::NoTrackLoaded)));
        assert!(matches!(handle.toggle_pause(), Err(PlayerError::NoTrackLoaded)));
        assert!(matches!(handle.seek(0), Err(PlayerError::NoTrackLoaded)));
        handle.stop().unwrap();
        assert_eq!(handle.status().unwrap().state, PlayerState::Idle);
    }

    #[test]
    fn unsupported_load_keeps_current_session() {
        let dir = tempfile::tempdir().unwrap();
        let clip = write_clip(dir.path(), "long.wav", 44_100 * 30);
        let (player, _sink) = player();
        let handle = player.handle();

        handle.load_and_play(&clip).unwrap();
        let err = handle.load(dir.path().join("cover.jpg")).unwrap_err();
        assert!(matches!(err, PlayerError::UnsupportedFormat(_)));

        let status = handle.status().unwrap();
        assert_eq!(status.state, PlayerState::Playing);
        assert_eq!(status.now_playing.as_deref(), clip.to_str());
        handle.stop().unwrap();
    }

    #[test]
    fn load_does_not_start_playback() {
        let dir = tempfile::tempdir().unwrap();
        let clip = write_clip(dir.path(), "a.wav", 4_410);
        let (player, sink) = player();
        let handle = player.handle();

        handle.load(&clip).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(sink.writes(), 0);
        assert_eq!(handle.status().unwrap().state, PlayerState::Loading);
        assert_eq!(player.live_render_loops(), 0);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let (player, _sink) = player();
        let err = player
            .handle()
            .load_and_play(dir.path().join("gone.flac"))
            .unwrap_err();
        assert!(matches!(err, PlayerError::Io { .. }));
    }

    #[test]
    fn pause_and_volume_show_in_status() {
        let dir = tempfile::tempdir().unwrap();
        let clip = write_clip(dir.path(), "long.wav", 44_100 * 30);
        let (player, _sink) = player();
        let handle = player.handle();

        handle.set_volume(-2.0);
        handle.set_muted(true);
        handle.load_and_play(&clip).unwrap();
        assert!(handle.toggle_pause().unwrap());

        let status = handle.status().unwrap();
        assert_eq!(status.state, PlayerState::Paused);
        assert!(status.paused);
        assert!(status.muted);
        assert_eq!(status.volume_db, -2.0);
        assert_eq!(status.native_rate, Some(44_100));

        assert!(!handle.toggle_pause().unwrap());
        assert_eq!(handle.status().unwrap().state, PlayerState::Playing);
    }

    #[test]
    fn handle_reports_disconnect_after_shutdown() {
        let (player, _sink) = player();
        let handle = player.handle();
        player.shutdown();
        assert!(matches!(handle.status(), Err(PlayerError::Disconnected)));
        assert!(handle.next().is_none());
    }
}
