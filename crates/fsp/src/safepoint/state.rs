//! Thread State - Atomic Park/Safepoint Word
//!
//! ```text
//!   bit 0  PARKED               thread is not touching the heap
//!   bit 1  SAFEPOINT_REQUESTED  a pause that includes this thread is active
//! ```
//!
//! The requester sets SAFEPOINT_REQUESTED on every thread the pause covers
//! and clears it on release, both while holding the barrier lock. The
//! owning thread flips PARKED with a CAS, so a CAS from the plain
//! `RUNNING`/`PARKED` values fails exactly when a pause is pending and the
//! thread has to take the slow path.

use crossbeam::utils::CachePadded;
use std::sync::atomic::{AtomicU8, Ordering};

const PARKED: u8 = 1 << 0;
const SAFEPOINT_REQUESTED: u8 = 1 << 1;

/// Snapshot of a thread state word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StateWord(u8);

impl StateWord {
    pub(crate) const RUNNING: StateWord = StateWord(0);
    pub(crate) const PARKED: StateWord = StateWord(PARKED);

    pub(crate) fn is_parked(self) -> bool {
        self.0 & PARKED != 0
    }

    pub(crate) fn is_running(self) -> bool {
        !self.is_parked()
    }

    pub(crate) fn is_safepoint_requested(self) -> bool {
        self.0 & SAFEPOINT_REQUESTED != 0
    }

    /// Same request flag, parked bit replaced
    pub(crate) fn with_parked(self, parked: bool) -> StateWord {
        if parked {
            StateWord(self.0 | PARKED)
        } else {
            StateWord(self.0 & !PARKED)
        }
    }
}

/// Observable status of a mutator thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    /// May read and write the heap; must poll for safepoints
    Running,
    /// Not touching the heap; does not hold up a pause
    Parked,
}

pub(crate) struct ThreadState {
    word: CachePadded<AtomicU8>,
}

impl ThreadState {
    /// Threads start parked and unpark once registered
    pub(crate) fn new_parked() -> Self {
        Self {
            word: CachePadded::new(AtomicU8::new(PARKED)),
        }
    }

    pub(crate) fn load(&self) -> StateWord {
        StateWord(self.word.load(Ordering::Acquire))
    }

    pub(crate) fn compare_exchange(&self, current: StateWord, new: StateWord) -> bool {
        self.word
            .compare_exchange(current.0, new.0, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Returns the word before the flag was set
    pub(crate) fn set_safepoint_requested(&self) -> StateWord {
        StateWord(self.word.fetch_or(SAFEPOINT_REQUESTED, Ordering::AcqRel))
    }

    pub(crate) fn clear_safepoint_requested(&self) {
        self.word.fetch_and(!SAFEPOINT_REQUESTED, Ordering::AcqRel);
    }

    pub(crate) fn status(&self) -> ThreadStatus {
        if self.load().is_parked() {
            ThreadStatus::Parked
        } else {
            ThreadStatus::Running
        }
    }
}
