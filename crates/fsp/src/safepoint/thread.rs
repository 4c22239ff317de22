//! Mutator Thread - Per-Thread Safepoint Handle
//!
//! A `MutatorThread` is created on the thread it represents and stays there
//! (it is neither `Send` nor `Sync`). The owning runtime drives it through
//! three operations:
//!
//! - `safepoint()` at every safepoint-check site (allocation slow paths,
//!   loop back-edges, call boundaries of the interpreter)
//! - `park()` before the thread blocks or otherwise stops touching the heap
//! - `unpark()` when it comes back
//!
//! A parked thread never holds up a pause. A running thread holds up a pause
//! until it reaches its next `safepoint()` or `park()`.

use crate::safepoint::coordinator::PauseCoordinator;
use crate::safepoint::persistent::{PersistentHandle, PersistentHandles};
use crate::safepoint::registry::MutatorId;
use crate::safepoint::state::{StateWord, ThreadState, ThreadStatus};
use crossbeam::utils::Backoff;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;

/// Role of a registered thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadKind {
    /// The runtime's main thread; a pause may leave it running
    Main,
    /// Any other mutator thread
    Background,
}

/// State shared between a thread's handle and the registry
pub(crate) struct ThreadShared {
    pub(crate) id: MutatorId,
    pub(crate) kind: ThreadKind,
    pub(crate) os_thread: std::thread::ThreadId,
    pub(crate) state: ThreadState,
    pub(crate) persistent: Mutex<PersistentHandles>,
}

impl ThreadShared {
    pub(crate) fn new(id: MutatorId, kind: ThreadKind) -> Self {
        Self {
            id,
            kind,
            os_thread: std::thread::current().id(),
            state: ThreadState::new_parked(),
            persistent: Mutex::new(PersistentHandles::new(id)),
        }
    }

    #[inline]
    pub(crate) fn safepoint(&self, coordinator: &PauseCoordinator) {
        // Anything but plain running: a pending pause or a parked caller.
        if self.state.load() != StateWord::RUNNING {
            self.safepoint_slow_path(coordinator);
        }
    }

    #[cold]
    fn safepoint_slow_path(&self, coordinator: &PauseCoordinator) {
        assert!(
            self.state.load().is_running(),
            "safepoint() polled by a parked thread"
        );

        let backoff = Backoff::new();
        while self.state.load().is_safepoint_requested() {
            if !coordinator.notify_parked(self) {
                backoff.snooze();
            }
        }
    }

    pub(crate) fn park(&self, coordinator: &PauseCoordinator) {
        if !self
            .state
            .compare_exchange(StateWord::RUNNING, StateWord::PARKED)
        {
            self.park_slow_path(coordinator);
        }
    }

    #[cold]
    fn park_slow_path(&self, coordinator: &PauseCoordinator) {
        let backoff = Backoff::new();
        loop {
            let current = self.state.load();
            assert!(current.is_running(), "park() on a thread that is already parked");

            if current.is_safepoint_requested() {
                // Counted as running by the pending pause: report first.
                log::trace!("thread {} parks into a pending pause", self.id);
                if !coordinator.notify_parked(self) {
                    backoff.snooze();
                }
                continue;
            }

            if self
                .state
                .compare_exchange(current, current.with_parked(true))
            {
                return;
            }
            backoff.spin();
        }
    }

    pub(crate) fn unpark(&self, coordinator: &PauseCoordinator) {
        if !self
            .state
            .compare_exchange(StateWord::PARKED, StateWord::RUNNING)
        {
            self.unpark_slow_path(coordinator);
        }
    }

    #[cold]
    fn unpark_slow_path(&self, coordinator: &PauseCoordinator) {
        let backoff = Backoff::new();
        loop {
            let current = self.state.load();
            assert!(current.is_parked(), "unpark() on a thread that is already running");

            if current.is_safepoint_requested() {
                log::trace!("thread {} waits for release before unparking", self.id);
                coordinator.wait_before_unpark(self);
                backoff.snooze();
                continue;
            }

            if self
                .state
                .compare_exchange(current, current.with_parked(false))
            {
                return;
            }
            backoff.spin();
        }
    }
}

thread_local! {
    /// Handles registered from this OS thread, keyed by coordinator
    static CURRENT: RefCell<Vec<(usize, Arc<ThreadShared>)>> = RefCell::new(Vec::new());
}

/// This OS thread's handle with `coordinator`, if it registered one
pub(crate) fn current_for(coordinator: usize) -> Option<Arc<ThreadShared>> {
    CURRENT.with(|current| {
        current
            .borrow()
            .iter()
            .find(|(owner, _)| *owner == coordinator)
            .map(|(_, shared)| Arc::clone(shared))
    })
}

fn set_current(coordinator: usize, shared: &Arc<ThreadShared>) {
    CURRENT.with(|current| {
        let mut current = current.borrow_mut();
        assert!(
            current.iter().all(|(owner, _)| *owner != coordinator),
            "thread registered twice with the same coordinator"
        );
        current.push((coordinator, Arc::clone(shared)));
    });
}

fn clear_current(coordinator: usize) {
    CURRENT.with(|current| {
        current.borrow_mut().retain(|(owner, _)| *owner != coordinator);
    });
}

/// Handle of a registered mutator thread
///
/// Dropping the handle unregisters the thread.
///
/// # Examples
///
/// ```rust,no_run
/// use fsp::{PauseCoordinator, ThreadKind};
///
/// let coordinator = PauseCoordinator::new();
/// let thread = coordinator.register_thread(ThreadKind::Background, || {});
///
/// for i in 0..1_000_000u64 {
///     if i % 1000 == 0 {
///         thread.safepoint();
///     }
/// }
///
/// thread.park();
/// // blocking I/O
/// thread.unpark();
/// ```
pub struct MutatorThread<'c> {
    coordinator: &'c PauseCoordinator,
    shared: Arc<ThreadShared>,
    detached: bool,
    _not_send: PhantomData<*const ()>,
}

impl<'c> MutatorThread<'c> {
    /// Wrap a freshly registered (still parked) thread and unpark it
    pub(crate) fn attach(coordinator: &'c PauseCoordinator, shared: Arc<ThreadShared>) -> Self {
        set_current(coordinator.id(), &shared);
        let thread = Self {
            coordinator,
            shared,
            detached: false,
            _not_send: PhantomData,
        };
        thread.unpark();
        thread
    }

    pub(crate) fn coordinator(&self) -> &'c PauseCoordinator {
        self.coordinator
    }

    /// Stable registry identifier
    pub fn id(&self) -> MutatorId {
        self.shared.id
    }

    pub fn kind(&self) -> ThreadKind {
        self.shared.kind
    }

    pub fn status(&self) -> ThreadStatus {
        self.shared.state.status()
    }

    pub fn is_parked(&self) -> bool {
        self.shared.state.load().is_parked()
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.load().is_running()
    }

    /// Safepoint poll
    ///
    /// One atomic load when no pause is pending. Otherwise reports this
    /// thread as stopped and blocks until the pause is released.
    ///
    /// # Panics
    ///
    /// If the thread is parked, whether or not a pause is active.
    #[inline]
    pub fn safepoint(&self) {
        self.shared.safepoint(self.coordinator);
    }

    /// Running -> Parked
    pub fn park(&self) {
        self.shared.park(self.coordinator);
    }

    /// Parked -> Running
    ///
    /// Blocks while a pause covering this thread is active.
    pub fn unpark(&self) {
        self.shared.unpark(self.coordinator);
    }

    /// Park for the lifetime of the returned scope
    pub fn parked_scope(&self) -> ParkedScope<'_, 'c> {
        self.park();
        ParkedScope { thread: self }
    }

    /// Unpark for the lifetime of the returned scope
    pub fn unparked_scope(&self) -> UnparkedScope<'_, 'c> {
        self.unpark();
        UnparkedScope { thread: self }
    }

    /// Add a root that survives pauses
    pub fn new_persistent(&self, address: usize) -> PersistentHandle {
        assert!(self.is_running(), "persistent handle created by a parked thread");
        self.shared.persistent.lock().create(address)
    }

    /// Current value of a persistent root
    ///
    /// A moving collector may have updated it during the last pause.
    pub fn persistent(&self, handle: PersistentHandle) -> usize {
        self.shared.persistent.lock().get(handle)
    }

    pub fn set_persistent(&self, handle: PersistentHandle, address: usize) {
        assert!(self.is_running(), "persistent handle written by a parked thread");
        self.shared.persistent.lock().set(handle, address);
    }

    pub fn dispose_persistent(&self, handle: PersistentHandle) {
        self.shared.persistent.lock().dispose(handle);
    }

    /// Number of live persistent roots
    pub fn persistent_count(&self) -> usize {
        self.shared.persistent.lock().len()
    }

    /// Unregister, running `callback` under the registry lock
    pub fn detach_with<F>(mut self, callback: F)
    where
        F: FnOnce(),
    {
        self.detach_inner(callback);
    }

    fn detach_inner<F>(&mut self, callback: F)
    where
        F: FnOnce(),
    {
        if self.detached {
            return;
        }
        self.detached = true;

        if self.is_running() {
            self.park();
        }
        self.coordinator.remove_thread(&self.shared, callback);
        clear_current(self.coordinator.id());
    }
}

impl Drop for MutatorThread<'_> {
    fn drop(&mut self) {
        self.detach_inner(|| {});
    }
}

impl std::fmt::Debug for MutatorThread<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutatorThread")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("status", &self.status())
            .finish()
    }
}

/// Keeps a thread parked, unparks on drop
pub struct ParkedScope<'t, 'c> {
    thread: &'t MutatorThread<'c>,
}

impl Drop for ParkedScope<'_, '_> {
    fn drop(&mut self) {
        self.thread.unpark();
    }
}

/// Keeps a thread running, parks on drop
pub struct UnparkedScope<'t, 'c> {
    thread: &'t MutatorThread<'c>,
}

impl Drop for UnparkedScope<'_, '_> {
    fn drop(&mut self) {
        self.thread.park();
    }
}
