//! Barrier - Stop-the-World Gate
//!
//! Armed flag plus stopped counter behind one mutex, with two condition
//! variables:
//!
//! - `cv_resume`: parked threads wait here until the barrier is disarmed
//! - `cv_stopped`: the requester waits here until enough threads reported
//!
//! Every wait re-checks its predicate under the lock. Disarming bumps an
//! epoch so a thread woken by one release never mistakes the next pause
//! (armed again before it got the lock back) for the one it parked in.

use crate::safepoint::state::ThreadState;
use parking_lot::{Condvar, Mutex};

struct BarrierState {
    armed: bool,
    stopped: usize,
    epoch: u64,
}

pub(crate) struct Barrier {
    state: Mutex<BarrierState>,
    cv_resume: Condvar,
    cv_stopped: Condvar,
}

impl Barrier {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(BarrierState {
                armed: false,
                stopped: 0,
                epoch: 0,
            }),
            cv_resume: Condvar::new(),
            cv_stopped: Condvar::new(),
        }
    }

    /// Arm and flag the threads the pause covers
    ///
    /// `flag_threads` runs under the barrier lock and returns how many of the
    /// flagged threads were running, i.e. how many must report.
    pub(crate) fn arm<F>(&self, flag_threads: F) -> usize
    where
        F: FnOnce() -> usize,
    {
        let mut state = self.state.lock();
        assert!(!state.armed, "safepoint barrier armed twice");
        state.armed = true;
        state.stopped = 0;
        flag_threads()
    }

    /// Clear thread flags and wake every parked thread
    pub(crate) fn disarm<F>(&self, clear_threads: F)
    where
        F: FnOnce(),
    {
        let mut state = self.state.lock();
        assert!(state.armed, "safepoint barrier disarmed while not armed");
        clear_threads();
        state.armed = false;
        state.epoch = state.epoch.wrapping_add(1);
        self.cv_resume.notify_all();
    }

    /// Block until exactly `running` threads reported
    pub(crate) fn wait_until_stopped(&self, running: usize) {
        let mut state = self.state.lock();
        debug_assert!(state.armed);
        while state.stopped != running {
            debug_assert!(state.stopped < running, "more threads stopped than required");
            self.cv_stopped.wait(&mut state);
        }
    }

    /// Report a running thread as stopped and wait for release
    ///
    /// Returns false without counting anything when the thread's request
    /// flag was already cleared, i.e. the pause it observed is over.
    pub(crate) fn notify_park(&self, thread: &ThreadState) -> bool {
        let mut state = self.state.lock();
        let word = thread.load();
        if !state.armed || !word.is_safepoint_requested() || word.is_parked() {
            return false;
        }

        state.stopped += 1;
        self.cv_stopped.notify_one();

        let epoch = state.epoch;
        while state.armed && state.epoch == epoch {
            self.cv_resume.wait(&mut state);
        }
        true
    }

    /// Wait for release without being counted
    ///
    /// For a thread that was parked when the pause formed and wants to run
    /// again.
    pub(crate) fn wait_in_unpark(&self, thread: &ThreadState) {
        let mut state = self.state.lock();
        let epoch = state.epoch;
        while state.armed && state.epoch == epoch && thread.load().is_safepoint_requested() {
            self.cv_resume.wait(&mut state);
        }
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.state.lock().armed
    }

    pub(crate) fn stopped(&self) -> usize {
        self.state.lock().stopped
    }
}
