//! Pause Scope - RAII Stop-the-World
//!
//! Requests a pause on construction and releases it on drop. The scope is
//! pinned to the thread that created it, because the pause is owned by that
//! thread.

use crate::safepoint::coordinator::{PauseCoordinator, ThreadRef};
use crate::visitor::RootVisitor;
use std::marker::PhantomData;

/// Holds a stop-the-world pause for its lifetime
///
/// Always stops the main thread. Use `PauseScope::with_main_thread(.., false)`
/// to leave it running.
///
/// # Examples
///
/// ```rust
/// use fsp::{MutatorId, PauseCoordinator, PauseScope, ThreadKind};
///
/// let coordinator = PauseCoordinator::new();
/// let thread = coordinator.register_thread(ThreadKind::Background, || {});
/// thread.new_persistent(0x1000);
///
/// let mut roots = 0;
/// {
///     let pause = PauseScope::new(&coordinator);
///     pause.visit_roots(&mut |_: MutatorId, _: &mut usize| roots += 1);
/// }
/// assert_eq!(roots, 1);
/// ```
#[must_use = "the pause is released as soon as the scope is dropped"]
pub struct PauseScope<'a> {
    coordinator: &'a PauseCoordinator,
    _not_send: PhantomData<*const ()>,
}

impl<'a> PauseScope<'a> {
    pub fn new(coordinator: &'a PauseCoordinator) -> Self {
        Self::with_main_thread(coordinator, true)
    }

    pub fn with_main_thread(coordinator: &'a PauseCoordinator, stop_main_thread: bool) -> Self {
        coordinator.request_pause(stop_main_thread);
        Self {
            coordinator,
            _not_send: PhantomData,
        }
    }

    pub fn coordinator(&self) -> &'a PauseCoordinator {
        self.coordinator
    }

    pub fn visit_roots<V>(&self, visitor: &mut V)
    where
        V: RootVisitor + ?Sized,
    {
        self.coordinator.visit_roots(visitor);
    }

    pub fn for_each<F>(&self, f: F)
    where
        F: FnMut(ThreadRef<'_>),
    {
        self.coordinator.for_each(f);
    }
}

impl Drop for PauseScope<'_> {
    fn drop(&mut self) {
        self.coordinator.release_pause();
    }
}
