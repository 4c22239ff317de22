//! Root Visitor - Root Iteration Capability
//!
//! Root iteration during a pause hands every persistent reference held by a
//! registered mutator thread to a `RootVisitor`. What the visitor does with
//! a slot (mark it, forward it, count it) is up to the collector.

use crate::safepoint::MutatorId;

/// Visitor invoked while threads are stopped
///
/// Slots are passed mutably so a moving collector can update them in place.
///
/// The coordinator's registry is not locked while the visitor runs, so it
/// may call registry queries such as `PauseCoordinator::thread_count`. The
/// visited thread's persistent block is locked; the visitor must not read
/// or write that thread's handles through `MutatorThread`.
///
/// # Examples
///
/// ```rust
/// use fsp::{MutatorId, RootVisitor};
///
/// struct Counter(usize);
///
/// impl RootVisitor for Counter {
///     fn visit_root(&mut self, _thread: MutatorId, _slot: &mut usize) {
///         self.0 += 1;
///     }
/// }
/// ```
pub trait RootVisitor {
    /// Called once per registered thread, before its roots
    fn visit_thread(&mut self, _thread: MutatorId) {}

    /// Called once per live root slot of `thread`
    fn visit_root(&mut self, thread: MutatorId, slot: &mut usize);
}

impl<F> RootVisitor for F
where
    F: FnMut(MutatorId, &mut usize),
{
    fn visit_root(&mut self, thread: MutatorId, slot: &mut usize) {
        self(thread, slot)
    }
}
