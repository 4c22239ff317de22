//! Pause Coordinator - Stop-the-World Requests
//!
//! The coordinator owns the thread registry and the barrier. A pause goes
//! through these phases:
//!
//! ```text
//! request_pause()
//!   │
//!   ├─ 1. Take the registry lock (parking the caller's own handle if the
//!   │     lock is contended, so a concurrent requester is not held up)
//!   ├─ 2. Arm the barrier: flag every covered thread, count the running ones
//!   ├─ 3. Wait until every counted thread reported via safepoint()/park()
//!   └─ 4. Keep the registry locked-out (active_pauses > 0) until release
//!
//! release_pause()
//!   │
//!   └─ outermost release: clear flags, disarm, wake parked waiters
//! ```
//!
//! Registration and unregistration wait for any active pause to end, so the
//! registry never changes while a pause is in effect.
//!
//! # Nesting
//!
//! The thread that owns the active pause may request again. A nested request
//! only bumps the depth counter; it never re-arms and never blocks. Requests
//! from any other thread wait until the current pause is fully released.

use crate::config::SafepointConfig;
use crate::logging::{SafepointEvent, SafepointLogger};
use crate::safepoint::barrier::Barrier;
use crate::safepoint::registry::{MutatorId, ThreadRegistry};
use crate::safepoint::state::ThreadStatus;
use crate::safepoint::thread::{self, MutatorThread, ThreadKind, ThreadShared};
use crate::stats::{PauseTimer, SafepointStats};
use crate::visitor::RootVisitor;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;

static NEXT_COORDINATOR_ID: AtomicUsize = AtomicUsize::new(1);

struct RegistryState {
    threads: ThreadRegistry<Arc<ThreadShared>>,
    main_thread: Option<MutatorId>,
    active_pauses: usize,
    owner: Option<ThreadId>,
    pause_count: u64,
    reached_at: Option<PauseTimer>,
}

/// Coordinates stop-the-world pauses across registered mutator threads
///
/// # Examples
///
/// ```rust
/// use fsp::{PauseCoordinator, ThreadKind};
///
/// let coordinator = PauseCoordinator::new();
/// let _main = coordinator.register_thread(ThreadKind::Main, || {});
///
/// coordinator.request_pause(false);
/// assert!(coordinator.is_pause_active());
/// coordinator.release_pause();
/// assert!(!coordinator.is_pause_active());
/// ```
pub struct PauseCoordinator {
    id: usize,
    registry: Mutex<RegistryState>,
    /// Mirror of `active_pauses`, readable without the registry lock
    depth: AtomicUsize,
    /// Signalled when the last active pause is released
    idle: Condvar,
    barrier: Barrier,
    stats: Option<Arc<SafepointStats>>,
    logger: Option<Arc<SafepointLogger>>,
    slow_safepoint_threshold_ms: u64,
}

impl PauseCoordinator {
    pub fn new() -> Self {
        Self::with_config(&SafepointConfig::default())
    }

    /// Create a coordinator observed according to `config`
    ///
    /// The config is not validated here; `Runtime::new` does that.
    pub fn with_config(config: &SafepointConfig) -> Self {
        let logger = if config.verbose {
            Some(Arc::new(SafepointLogger::new(config.logger.clone())))
        } else {
            None
        };
        let stats = if config.stats_enabled {
            Some(Arc::new(SafepointStats::new()))
        } else {
            None
        };

        Self {
            id: NEXT_COORDINATOR_ID.fetch_add(1, Ordering::Relaxed),
            registry: Mutex::new(RegistryState {
                threads: ThreadRegistry::new(),
                main_thread: None,
                active_pauses: 0,
                owner: None,
                pause_count: 0,
                reached_at: None,
            }),
            depth: AtomicUsize::new(0),
            idle: Condvar::new(),
            barrier: Barrier::new(),
            stats,
            logger,
            slow_safepoint_threshold_ms: config.slow_safepoint_threshold_ms,
        }
    }

    pub(crate) fn id(&self) -> usize {
        self.id
    }

    /// Register the calling OS thread as a mutator
    ///
    /// Waits for any active pause to end. `callback` runs under the registry
    /// lock, after the wait and before the thread is linked in. The returned
    /// handle is running.
    ///
    /// # Panics
    ///
    /// If the caller holds the active pause, if it is already registered
    /// with this coordinator, or if a second `ThreadKind::Main` is
    /// registered.
    pub fn register_thread<F>(&self, kind: ThreadKind, callback: F) -> MutatorThread<'_>
    where
        F: FnOnce(),
    {
        let me = std::thread::current().id();
        assert!(
            thread::current_for(self.id).is_none(),
            "thread registered twice with the same coordinator"
        );
        let shared = {
            let mut reg = self.registry.lock();
            assert_ne!(
                reg.owner,
                Some(me),
                "cannot register a thread while it holds the active pause"
            );
            while reg.active_pauses > 0 {
                self.idle.wait(&mut reg);
            }

            callback();

            if kind == ThreadKind::Main {
                assert!(reg.main_thread.is_none(), "main thread registered twice");
            }
            let (id, shared) = reg
                .threads
                .insert_with(|id| Arc::new(ThreadShared::new(id, kind)));
            let shared = Arc::clone(shared);
            if kind == ThreadKind::Main {
                reg.main_thread = Some(id);
            }

            log::debug!("thread {} attached ({:?})", id, kind);
            self.emit(SafepointEvent::ThreadAttached {
                thread: id.as_u64(),
                main: kind == ThreadKind::Main,
            });
            shared
        };

        MutatorThread::attach(self, shared)
    }

    /// Unregister `thread`, running `callback` under the registry lock
    ///
    /// Same as `MutatorThread::detach_with`.
    pub fn unregister_thread<F>(&self, thread: MutatorThread<'_>, callback: F)
    where
        F: FnOnce(),
    {
        assert!(
            std::ptr::eq(thread.coordinator(), self),
            "thread is registered with another coordinator"
        );
        thread.detach_with(callback);
    }

    /// Unlink a parked thread once no pause is active
    pub(crate) fn remove_thread<F>(&self, shared: &ThreadShared, callback: F)
    where
        F: FnOnce(),
    {
        let me = std::thread::current().id();
        let mut reg = self.registry.lock();
        assert_ne!(
            reg.owner,
            Some(me),
            "cannot unregister a thread while it holds the active pause"
        );
        while reg.active_pauses > 0 {
            self.idle.wait(&mut reg);
        }

        callback();

        let removed = reg.threads.remove(shared.id);
        assert!(removed.is_some(), "thread {} is not registered", shared.id);
        if reg.main_thread == Some(shared.id) {
            reg.main_thread = None;
        }

        log::debug!("thread {} detached", shared.id);
        self.emit(SafepointEvent::ThreadDetached {
            thread: shared.id.as_u64(),
        });
    }

    /// Bring every covered running thread to a safepoint
    ///
    /// Covered threads are all registered threads except the caller's own
    /// handle, and except the main thread unless `stop_main_thread` is set.
    /// Returns once each covered thread that was running when the pause
    /// formed has reported. Threads that were parked are not waited for;
    /// they block in `unpark()` instead.
    ///
    /// Must be paired with `release_pause()` on the same OS thread.
    pub fn request_pause(&self, stop_main_thread: bool) {
        let me = std::thread::current().id();
        let own = thread::current_for(self.id);
        let mut parked_self = false;

        let mut reg = match self.registry.try_lock() {
            Some(reg) => reg,
            None => {
                // Another requester may be forming a pause that counts us.
                if let Some(own) = own.as_ref().filter(|t| t.state.load().is_running()) {
                    own.park(self);
                    parked_self = true;
                }
                self.registry.lock()
            },
        };

        if reg.active_pauses > 0 && reg.owner == Some(me) {
            reg.active_pauses += 1;
            self.depth.store(reg.active_pauses, Ordering::Release);
            drop(reg);
            if let Some(stats) = &self.stats {
                stats.record_nested();
            }
            self.restore_own(own.as_deref(), parked_self);
            return;
        }

        while reg.active_pauses > 0 {
            match own
                .as_ref()
                .filter(|t| !parked_self && t.state.load().is_running())
            {
                Some(own) => {
                    MutexGuard::unlocked(&mut reg, || own.park(self));
                    parked_self = true;
                },
                None => self.idle.wait(&mut reg),
            }
        }

        reg.pause_count += 1;
        let pause = reg.pause_count;
        log::debug!(
            "pause {} requested by {:?} ({} threads, stop main: {})",
            pause,
            me,
            reg.threads.len(),
            stop_main_thread
        );
        self.emit(SafepointEvent::PauseRequested {
            pause,
            stop_main_thread,
            registered_threads: reg.threads.len(),
        });

        let timer = PauseTimer::new();
        let running = self.barrier.arm(|| {
            let mut running = 0;
            for (_, thread) in reg.threads.iter() {
                if thread.os_thread == me {
                    continue;
                }
                if thread.kind == ThreadKind::Main && !stop_main_thread {
                    continue;
                }
                if thread.state.set_safepoint_requested().is_running() {
                    running += 1;
                }
            }
            running
        });
        self.barrier.wait_until_stopped(running);
        let time_to_safepoint_ns = timer.elapsed_ns();

        reg.owner = Some(me);
        reg.reached_at = Some(PauseTimer::new());
        reg.active_pauses += 1;
        self.depth.store(reg.active_pauses, Ordering::Release);
        drop(reg);

        self.record_reached(pause, running, time_to_safepoint_ns);
        self.restore_own(own.as_deref(), parked_self);
    }

    /// Release one level of the active pause
    ///
    /// The outermost release resumes every stopped thread.
    ///
    /// # Panics
    ///
    /// Without an active pause, or from a thread that does not own it.
    pub fn release_pause(&self) {
        let me = std::thread::current().id();
        let mut reg = self.registry.lock();
        assert!(reg.active_pauses > 0, "release_pause() without an active pause");
        assert_eq!(
            reg.owner,
            Some(me),
            "release_pause() from a thread that does not own the pause"
        );

        reg.active_pauses -= 1;
        self.depth.store(reg.active_pauses, Ordering::Release);
        if reg.active_pauses > 0 {
            return;
        }

        let duration_ns = reg.reached_at.take().map_or(0, |t| t.elapsed_ns());
        self.barrier.disarm(|| {
            for (_, thread) in reg.threads.iter() {
                thread.state.clear_safepoint_requested();
            }
        });
        reg.owner = None;
        let pause = reg.pause_count;
        drop(reg);
        self.idle.notify_all();

        if let Some(stats) = &self.stats {
            stats.record_release(duration_ns);
        }
        log::debug!("pause {} released after {} us", pause, duration_ns / 1_000);
        self.emit(SafepointEvent::PauseReleased {
            pause,
            duration_us: duration_ns / 1_000,
        });
    }

    /// Poll the calling thread's handle, if it registered one
    pub fn safepoint(&self) {
        if let Some(own) = thread::current_for(self.id) {
            own.safepoint(self);
        }
    }

    /// Report a flagged thread as stopped; blocks until release
    pub(crate) fn notify_parked(&self, shared: &ThreadShared) -> bool {
        self.barrier.notify_park(&shared.state)
    }

    pub(crate) fn wait_before_unpark(&self, shared: &ThreadShared) {
        self.barrier.wait_in_unpark(&shared.state);
    }

    /// Visit every registered thread and its persistent roots
    ///
    /// The registry lock is not held while `visitor` runs, so the visitor may
    /// query this coordinator.
    ///
    /// # Panics
    ///
    /// Unless the caller holds the active pause.
    pub fn visit_roots<V>(&self, visitor: &mut V)
    where
        V: RootVisitor + ?Sized,
    {
        for thread in self.paused_threads("visit_roots") {
            visitor.visit_thread(thread.id);
            thread.persistent.lock().iterate(visitor);
        }
    }

    /// Call `f` for every registered thread
    ///
    /// # Panics
    ///
    /// Unless the caller holds the active pause.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(ThreadRef<'_>),
    {
        for thread in self.paused_threads("for_each") {
            f(ThreadRef { shared: &thread });
        }
    }

    // The registry queries below take the registry lock, which a forming
    // pause holds. Running mutators call them from a parked scope.

    pub fn contains_thread(&self, id: MutatorId) -> bool {
        self.registry.lock().threads.contains(id)
    }

    pub fn contains_any_thread(&self) -> bool {
        !self.registry.lock().threads.is_empty()
    }

    pub fn thread_count(&self) -> usize {
        self.registry.lock().threads.len()
    }

    pub fn is_pause_active(&self) -> bool {
        self.active_pauses() > 0
    }

    /// Nesting depth of the active pause
    pub fn active_pauses(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    /// Threads that reported for the pause being formed or held
    pub fn stopped_threads(&self) -> usize {
        self.barrier.stopped()
    }

    pub fn is_armed(&self) -> bool {
        self.barrier.is_armed()
    }

    pub fn stats(&self) -> Option<&SafepointStats> {
        self.stats.as_deref()
    }

    pub fn logger(&self) -> Option<&SafepointLogger> {
        self.logger.as_deref()
    }

    /// Snapshot of the registry, head first
    ///
    /// Registration and removal wait while a pause is active, so the
    /// snapshot stays exact until the caller releases.
    fn paused_threads(&self, op: &str) -> Vec<Arc<ThreadShared>> {
        let reg = self.registry.lock();
        assert!(
            reg.active_pauses > 0 && reg.owner == Some(std::thread::current().id()),
            "{}() requires the active pause to be held by the calling thread",
            op
        );
        reg.threads.iter().map(|(_, thread)| Arc::clone(thread)).collect()
    }

    fn restore_own(&self, own: Option<&ThreadShared>, parked_self: bool) {
        if let (Some(own), true) = (own, parked_self) {
            own.unpark(self);
        }
    }

    fn record_reached(&self, pause: u64, running: usize, time_to_safepoint_ns: u64) {
        let time_to_safepoint_us = time_to_safepoint_ns / 1_000;

        if let Some(stats) = &self.stats {
            stats.record_safepoint_reached(running, time_to_safepoint_ns);
        }

        if time_to_safepoint_ns > self.slow_safepoint_threshold_ms.saturating_mul(1_000_000) {
            log::warn!(
                "pause {} took {} us to reach a safepoint ({} running threads)",
                pause,
                time_to_safepoint_us,
                running
            );
            self.emit(SafepointEvent::SlowSafepoint {
                pause,
                time_to_safepoint_us,
                threshold_ms: self.slow_safepoint_threshold_ms,
            });
        }

        log::debug!(
            "pause {} reached: {} threads stopped in {} us",
            pause,
            running,
            time_to_safepoint_us
        );
        self.emit(SafepointEvent::PauseReached {
            pause,
            running_threads: running,
            time_to_safepoint_us,
        });
    }

    fn emit(&self, event: SafepointEvent) {
        if let Some(logger) = &self.logger {
            logger.log(event);
        }
    }
}

impl Default for PauseCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PauseCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PauseCoordinator")
            .field("id", &self.id)
            .field("armed", &self.barrier.is_armed())
            .field("stopped", &self.barrier.stopped())
            .finish()
    }
}

/// View of a registered thread during a pause
pub struct ThreadRef<'a> {
    shared: &'a ThreadShared,
}

impl ThreadRef<'_> {
    pub fn id(&self) -> MutatorId {
        self.shared.id
    }

    pub fn kind(&self) -> ThreadKind {
        self.shared.kind
    }

    pub fn status(&self) -> ThreadStatus {
        self.shared.state.status()
    }

    pub fn persistent_count(&self) -> usize {
        self.shared.persistent.lock().len()
    }

    /// Visit only this thread's persistent roots
    pub fn visit_roots<V>(&self, visitor: &mut V)
    where
        V: RootVisitor + ?Sized,
    {
        visitor.visit_thread(self.shared.id);
        self.shared.persistent.lock().iterate(visitor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pause_without_threads() {
        let coordinator = PauseCoordinator::new();
        coordinator.request_pause(true);
        assert!(coordinator.is_pause_active());
        assert!(coordinator.is_armed());
        assert_eq!(coordinator.stopped_threads(), 0);

        coordinator.release_pause();
        assert!(!coordinator.is_pause_active());
        assert!(!coordinator.is_armed());
    }

    #[test]
    fn test_nested_pause_depth() {
        let coordinator = PauseCoordinator::new();
        coordinator.request_pause(true);
        coordinator.request_pause(true);
        assert_eq!(coordinator.active_pauses(), 2);

        coordinator.release_pause();
        assert!(coordinator.is_armed());
        coordinator.release_pause();
        assert!(!coordinator.is_armed());
        assert_eq!(coordinator.stats().map(|s| s.summary().nested_pauses), Some(1));
    }

    #[test]
    #[should_panic(expected = "without an active pause")]
    fn test_release_without_request_panics() {
        PauseCoordinator::new().release_pause();
    }

    #[test]
    fn test_own_thread_not_counted() {
        let coordinator = PauseCoordinator::new();
        let own = coordinator.register_thread(ThreadKind::Background, || {});

        coordinator.request_pause(true);
        assert_eq!(coordinator.stopped_threads(), 0);
        assert!(own.is_running());
        own.safepoint();
        coordinator.release_pause();
    }

    #[test]
    #[should_panic(expected = "main thread registered twice")]
    fn test_second_main_thread_panics() {
        let coordinator = PauseCoordinator::new();
        let _main = coordinator.register_thread(ThreadKind::Main, || {});
        // A second handle on this OS thread trips a different check first.
        std::thread::scope(|s| {
            let result = s
                .spawn(|| {
                    let _second = coordinator.register_thread(ThreadKind::Main, || {});
                })
                .join();
            if let Err(panic) = result {
                std::panic::resume_unwind(panic);
            }
        });
    }

    #[test]
    fn test_register_callback_runs_once() {
        let coordinator = PauseCoordinator::new();
        let mut calls = 0;
        let thread = coordinator.register_thread(ThreadKind::Background, || calls += 1);
        assert_eq!(calls, 1);

        let mut detached = 0;
        coordinator.unregister_thread(thread, || detached += 1);
        assert_eq!(detached, 1);
        assert!(!coordinator.contains_any_thread());
    }

    #[test]
    fn test_visit_roots_sees_persistents() {
        let coordinator = PauseCoordinator::new();
        let thread = coordinator.register_thread(ThreadKind::Background, || {});
        let handle = thread.new_persistent(0x1000);

        coordinator.request_pause(true);
        let mut seen = Vec::new();
        coordinator.visit_roots(&mut |owner: MutatorId, slot: &mut usize| {
            seen.push((owner, *slot));
            *slot += 0x10;
        });
        coordinator.release_pause();

        assert_eq!(seen, vec![(thread.id(), 0x1000)]);
        assert_eq!(thread.persistent(handle), 0x1010);
    }

    #[test]
    fn test_visitor_may_query_coordinator() {
        let coordinator = PauseCoordinator::new();
        let thread = coordinator.register_thread(ThreadKind::Background, || {});
        thread.new_persistent(0x1000);
        thread.new_persistent(0x2000);

        coordinator.request_pause(true);
        let mut counts = Vec::new();
        coordinator.visit_roots(&mut |owner: MutatorId, _: &mut usize| {
            assert!(coordinator.contains_thread(owner));
            counts.push(coordinator.thread_count());
        });
        let mut registered = Vec::new();
        coordinator.for_each(|t| registered.push(coordinator.contains_thread(t.id())));
        coordinator.release_pause();

        assert_eq!(counts, vec![1, 1]);
        assert_eq!(registered, vec![true]);
    }

    #[test]
    #[should_panic(expected = "requires the active pause")]
    fn test_visit_roots_without_pause_panics() {
        let coordinator = PauseCoordinator::new();
        coordinator.visit_roots(&mut |_: MutatorId, _: &mut usize| {});
    }

    #[test]
    fn test_for_each_reports_threads() {
        let coordinator = PauseCoordinator::new();
        let thread = coordinator.register_thread(ThreadKind::Main, || {});
        thread.park();

        coordinator.request_pause(true);
        let mut views = Vec::new();
        coordinator.for_each(|t| views.push((t.id(), t.kind(), t.status())));
        coordinator.release_pause();

        assert_eq!(
            views,
            vec![(thread.id(), ThreadKind::Main, ThreadStatus::Parked)]
        );
        thread.unpark();
    }

    #[test]
    fn test_verbose_records_events() {
        let config = SafepointConfig {
            verbose: true,
            logger: crate::logging::SafepointLoggerConfig {
                console: false,
                level: crate::logging::LogLevel::Debug,
                ..Default::default()
            },
            ..Default::default()
        };
        let coordinator = PauseCoordinator::with_config(&config);
        coordinator.request_pause(true);
        coordinator.release_pause();

        let logger = coordinator.logger().unwrap();
        let events = logger.get_events();
        assert!(matches!(events[0].1, SafepointEvent::PauseRequested { pause: 1, .. }));
        assert!(events
            .iter()
            .any(|(_, e)| matches!(e, SafepointEvent::PauseReleased { pause: 1, .. })));
    }
}
