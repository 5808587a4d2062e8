//! One-shot completion signal.
//!
//! Each session owns one. The render loop fires it at end of stream; teardown cancels
//! it. Whichever happens first wins, so a waiter observes exactly one outcome.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Terminal state observed by a waiter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalOutcome {
    /// Natural end of stream.
    Fired,
    /// Session torn down before end of stream.
    Cancelled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SignalState {
    Pending,
    Done(SignalOutcome),
}

#[derive(Debug)]
pub struct CompletionSignal {
    state: Mutex<SignalState>,
    cv: Condvar,
}

impl CompletionSignal {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SignalState::Pending),
            cv: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SignalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn settle(&self, outcome: SignalOutcome) -> bool {
        let mut g = self.lock();
        if *g != SignalState::Pending {
            return false;
        }
        *g = SignalState::Done(outcome);
        drop(g);
        self.cv.notify_all();
        true
    }

    /// Report end of stream. Returns `false` if the signal had already settled.
    pub fn fire(&self) -> bool {
        self.settle(SignalOutcome::Fired)
    }

    /// Abandon the signal. Returns `false` if the signal had already settled.
    pub fn cancel(&self) -> bool {
        self.settle(SignalOutcome::Cancelled)
    }

    pub fn outcome(&self) -> Option<SignalOutcome> {
        match *self.lock() {
            SignalState::Pending => None,
            SignalState::Done(outcome) => Some(outcome),
        }
    }

    /// Block until the signal settles.
    pub fn wait(&self) -> SignalOutcome {
        let mut g = self.lock();
        loop {
            if let SignalState::Done(outcome) = *g {
                return outcome;
            }
            g = self.cv.wait(g).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`CompletionSignal::wait`], giving up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<SignalOutcome> {
        let g = self.lock();
        let (g, _) = self
            .cv
            .wait_timeout_while(g, timeout, |s| *s == SignalState::Pending)
            .unwrap_or_else(PoisonError::into_inner);
        match *g {
            SignalState::Pending => None,
            SignalState::Done(outcome) => Some(outcome),
        }
    }
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}
