//! Live playback session and its background tasks.
//!
//! A session is the pipeline of one loaded track plus its cursor and paused flag. It lives
//! in [`Shared`] behind the single session lock, which the player thread, the render loop
//! and the position poller all take before touching it. Each session runs three threads:
//! - render loop: pulls blocks from the pipeline and writes them to the sink
//! - position poller: republishes the cursor on a fixed interval
//! - completion waiter: forwards natural end of stream to the player thread
//!
//! Blocks carry the sink epoch read together with them under the session lock. A seek
//! resets the sink inside that lock, so a block read before the seek is dropped by the
//! sink instead of playing after it.
//!
//! [`SessionTasks::teardown`] stops all three and returns the pipeline so the caller can
//! release it. The next session is only started after teardown returns.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, Sender};

use crate::player::{PlayerCommand, PlayerEvent};
use crate::signal::{CompletionSignal, SignalOutcome};
use crate::sink::AudioSink;
use crate::source::{SampleSource, read_full};

/// Upper bound on how long a paused render loop sleeps between checks.
const PAUSE_RECHECK: Duration = Duration::from_millis(100);

/// Mutable state of the active session.
pub(crate) struct ActiveSession {
    pub id: u64,
    pub pipeline: Box<dyn SampleSource>,
    pub paused: bool,
    /// Next output frame the render loop will pull.
    pub position: u64,
    pub length: Option<u64>,
}

/// The session lock shared by the player thread and the session tasks.
pub(crate) struct Shared {
    session: Mutex<Option<ActiveSession>>,
    cv: Condvar,
    live_render_loops: AtomicUsize,
}

impl Shared {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            session: Mutex::new(None),
            cv: Condvar::new(),
            live_render_loops: AtomicUsize::new(0),
        })
    }

    pub fn lock(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wake a render loop waiting on the paused flag or a teardown.
    pub fn notify(&self) {
        self.cv.notify_all();
    }

    /// Render loops currently running (0 or 1 when the invariants hold).
    pub fn live_render_loops(&self) -> usize {
        self.live_render_loops.load(Ordering::SeqCst)
    }
}

/// Tuning copied out of the playback config for one session.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SessionTiming {
    pub block_frames: usize,
    pub position_interval: Duration,
}

/// Handles to the background tasks of one session.
pub(crate) struct SessionTasks {
    id: u64,
    signal: Arc<CompletionSignal>,
    poll_stop: Option<Sender<()>>,
    render: Option<JoinHandle<()>>,
    poller: Option<JoinHandle<()>>,
    waiter: Option<JoinHandle<()>>,
}

impl SessionTasks {
    /// Install `session` as the active one and spawn its tasks.
    ///
    /// The caller must have torn down any previous session.
    pub fn start(
        shared: &Arc<Shared>,
        sink: &Arc<dyn AudioSink>,
        session: ActiveSession,
        timing: SessionTiming,
        events: Sender<PlayerEvent>,
        notify: Sender<PlayerCommand>,
    ) -> Self {
        let id = session.id;
        {
            let mut g = shared.lock();
            debug_assert!(g.is_none(), "previous session was not torn down");
            *g = Some(session);
        }
        sink.set_paused(false);

        let signal = Arc::new(CompletionSignal::new());
        let (poll_stop, poll_stop_rx) = crossbeam_channel::bounded::<()>(0);

        let render = {
            let shared = shared.clone();
            let sink = sink.clone();
            let signal = signal.clone();
            let notify = notify.clone();
            std::thread::spawn(move || {
                render_loop(&shared, sink.as_ref(), id, timing.block_frames, &signal, &notify)
            })
        };

        let poller = {
            let shared = shared.clone();
            std::thread::spawn(move || loop {
                match poll_stop_rx.recv_timeout(timing.position_interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    _ => return,
                }
                let position = match shared.lock().as_ref() {
                    Some(s) if s.id == id => s.position,
                    _ => return,
                };
                let _ = events.send(PlayerEvent::PositionChanged(position));
            })
        };

        let waiter = {
            let signal = signal.clone();
            std::thread::spawn(move || {
                if signal.wait() == SignalOutcome::Fired {
                    let _ = notify.send(PlayerCommand::SessionFinished { id });
                }
            })
        };

        tracing::debug!(session = id, "session tasks started");
        Self {
            id,
            signal,
            poll_stop: Some(poll_stop),
            render: Some(render),
            poller: Some(poller),
            waiter: Some(waiter),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stop every task of this session and hand back its state.
    ///
    /// With `flush` the sink is reset, which discards queued audio and aborts a render
    /// loop blocked on a full (possibly paused) sink. Natural completion passes `false`:
    /// the render loop has already drained the sink and exited.
    ///
    /// Safe after natural completion: the signal has already settled and cancelling it
    /// again is a no-op.
    pub fn teardown(
        mut self,
        shared: &Shared,
        sink: &dyn AudioSink,
        flush: bool,
    ) -> Option<ActiveSession> {
        let session = {
            let mut g = shared.lock();
            match g.as_ref() {
                Some(s) if s.id == self.id => g.take(),
                _ => None,
            }
        };
        shared.notify();
        self.signal.cancel();
        if flush {
            sink.reset();
        }
        drop(self.poll_stop.take());

        for (name, handle) in [
            ("render", self.render.take()),
            ("poller", self.poller.take()),
            ("waiter", self.waiter.take()),
        ] {
            if let Some(handle) = handle {
                if handle.join().is_err() {
                    tracing::warn!(session = self.id, task = name, "session task panicked");
                }
            }
        }

        sink.set_paused(false);
        tracing::debug!(session = self.id, flush, "session torn down");
        session
    }
}

struct LiveGuard<'a>(&'a AtomicUsize);

impl<'a> LiveGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn render_loop(
    shared: &Shared,
    sink: &dyn AudioSink,
    id: u64,
    block_frames: usize,
    signal: &CompletionSignal,
    notify: &Sender<PlayerCommand>,
) {
    let _live = LiveGuard::enter(&shared.live_render_loops);
    let block_frames = block_frames.max(1);
    let mut block: Vec<f32> = Vec::new();

    loop {
        let (frames, channels, epoch) = {
            let mut g = shared.lock();
            loop {
                match g.as_ref() {
                    Some(s) if s.id == id => {
                        if !s.paused {
                            break;
                        }
                    }
                    _ => return,
                }
                g = shared
                    .cv
                    .wait_timeout(g, PAUSE_RECHECK)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
            }
            let Some(session) = g.as_mut() else {
                return;
            };

            let epoch = sink.epoch();
            let channels = session.pipeline.spec().channels.max(1);
            block.resize(block_frames * channels, 0.0);
            match read_full(&mut session.pipeline, &mut block) {
                Ok(frames) => {
                    session.position = session.pipeline.position();
                    (frames, channels, epoch)
                }
                Err(e) => {
                    drop(g);
                    tracing::error!(session = id, "render read failed: {e}");
                    let _ = notify.send(PlayerCommand::SessionFailed {
                        id,
                        message: e.to_string(),
                    });
                    return;
                }
            }
        };

        if frames == 0 {
            // Let the tail play out before reporting the end.
            sink.drain(epoch);
            let g = shared.lock();
            match g.as_ref() {
                Some(s) if s.id == id => {}
                _ => return,
            }
            if sink.epoch() != epoch {
                // Seeked while the tail was playing; keep rendering from the new position.
                continue;
            }
            drop(g);
            tracing::debug!(session = id, "end of stream");
            signal.fire();
            return;
        }

        if let Err(e) = sink.write(&block[..frames * channels], channels, epoch) {
            tracing::error!(session = id, "sink write failed: {e:#}");
            let _ = notify.send(PlayerCommand::SessionFailed {
                id,
                message: format!("{e:#}"),
            });
            return;
        }
        tracing::trace!(session = id, frames, "block rendered");
    }
}
