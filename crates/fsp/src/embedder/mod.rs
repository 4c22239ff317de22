//! Embedder Module - Tracing Across the Embedder Boundary
//!
//! `LocalEmbedderHeapTracer` is the runtime's side of the embedder tracing
//! protocol. It holds an optional `EmbedderHeapTracer`, forwards the
//! collector's cycle events to it, and decides which stack state the final
//! pause reports.
//!
//! Every operation is a no-op when no tracer is attached; the completion
//! queries then report "done".
//!
//! The bridge has no locking of its own. It is driven by the one thread that
//! holds the current pause; `&mut self` on the state-changing operations
//! enforces that within a single owner.

pub mod scopes;
pub mod tracer;

pub use scopes::{EmbedderStackStateScope, ProcessingScope};
pub use tracer::{
    EmbedderHeapTracer, EmbedderStackState, HeapId, TraceFlags, TraceSummary, WrapperInfo,
};

use std::sync::Arc;

/// Embedder heap sizes as last reported
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoteStats {
    /// Live embedder bytes at the end of the last cycle
    pub used_size: usize,
    /// Embedder bytes allocated since the last cycle ended
    pub allocated_size_since_last_gc: usize,
}

/// Bridge between the collector and an embedder-supplied tracer
///
/// # Examples
///
/// ```rust
/// use fsp::embedder::{HeapId, LocalEmbedderHeapTracer};
///
/// let mut bridge = LocalEmbedderHeapTracer::new(Some(HeapId(1)));
/// assert!(!bridge.in_use());
/// assert!(bridge.trace(f64::INFINITY));
/// bridge.enter_final_pause();
/// ```
pub struct LocalEmbedderHeapTracer {
    heap: Option<HeapId>,
    remote_tracer: Option<Arc<dyn EmbedderHeapTracer>>,
    embedder_stack_state: EmbedderStackState,
    next_finalization_stack_state: Option<EmbedderStackState>,
    remote_stats: RemoteStats,
}

impl LocalEmbedderHeapTracer {
    pub fn new(heap: Option<HeapId>) -> Self {
        Self {
            heap,
            remote_tracer: None,
            embedder_stack_state: EmbedderStackState::default(),
            next_finalization_stack_state: None,
            remote_stats: RemoteStats::default(),
        }
    }

    pub fn heap(&self) -> Option<HeapId> {
        self.heap
    }

    /// Attach `tracer`, or detach with `None`
    ///
    /// The outgoing tracer is told it no longer belongs to a heap; the
    /// incoming one learns this bridge's heap.
    pub fn set_remote_tracer(&mut self, tracer: Option<Arc<dyn EmbedderHeapTracer>>) {
        if let Some(old) = self.remote_tracer.take() {
            old.set_heap(None);
        }
        if let Some(new) = &tracer {
            new.set_heap(self.heap);
        }
        log::debug!(
            "embedder tracer {} for {:?}",
            if tracer.is_some() { "attached" } else { "detached" },
            self.heap
        );
        self.remote_tracer = tracer;
    }

    pub fn remote_tracer(&self) -> Option<&Arc<dyn EmbedderHeapTracer>> {
        self.remote_tracer.as_ref()
    }

    pub fn in_use(&self) -> bool {
        self.remote_tracer.is_some()
    }

    pub fn trace_prologue(&self, flags: TraceFlags) {
        if let Some(tracer) = &self.remote_tracer {
            tracer.trace_prologue(flags);
        }
    }

    /// End the cycle; the tracer fills in `summary`
    ///
    /// The reported live size becomes the new `used_size`, and the
    /// allocation counter restarts.
    pub fn trace_epilogue(&mut self, summary: Option<&mut TraceSummary>) {
        let Some(tracer) = &self.remote_tracer else {
            return;
        };

        let mut local = TraceSummary::default();
        let summary = summary.unwrap_or(&mut local);
        tracer.trace_epilogue(summary);

        self.remote_stats.used_size = summary.allocated_size;
        self.remote_stats.allocated_size_since_last_gc = 0;
    }

    /// Forward the final pause with the effective stack state
    ///
    /// A one-shot override from `set_embedder_stack_state_for_next_finalization`
    /// wins and is consumed; otherwise the current default is used.
    pub fn enter_final_pause(&mut self) {
        let Some(tracer) = &self.remote_tracer else {
            return;
        };

        let stack_state = self
            .next_finalization_stack_state
            .take()
            .unwrap_or(self.embedder_stack_state);
        tracer.enter_final_pause(stack_state);
    }

    pub fn is_remote_tracing_done(&self) -> bool {
        self.remote_tracer
            .as_ref()
            .map_or(true, |tracer| tracer.is_tracing_done())
    }

    /// Advance embedder tracing; true when there is nothing left to do
    pub fn trace(&self, deadline_in_ms: f64) -> bool {
        match &self.remote_tracer {
            Some(tracer) => tracer.advance_tracing(deadline_in_ms),
            None => true,
        }
    }

    pub fn set_embedder_stack_state_for_next_finalization(&mut self, stack_state: EmbedderStackState) {
        self.next_finalization_stack_state = Some(stack_state);
    }

    /// Default stack state for the final pause
    pub fn embedder_stack_state(&self) -> EmbedderStackState {
        self.embedder_stack_state
    }

    pub(crate) fn replace_embedder_stack_state(
        &mut self,
        stack_state: EmbedderStackState,
    ) -> EmbedderStackState {
        std::mem::replace(&mut self.embedder_stack_state, stack_state)
    }

    /// Install `stack_state` until the returned scope is dropped
    pub fn stack_state_scope(&mut self, stack_state: EmbedderStackState) -> EmbedderStackStateScope<'_> {
        EmbedderStackStateScope::new(self, stack_state)
    }

    /// Open a batch of wrapper references
    pub fn processing_scope(&self) -> ProcessingScope<'_> {
        ProcessingScope::new(self)
    }

    pub(crate) fn register_references(&self, references: &[WrapperInfo]) {
        if let Some(tracer) = &self.remote_tracer {
            tracer.register_references(references);
        }
    }

    /// Account embedder allocation between cycles
    pub fn increase_allocated_size(&mut self, bytes: usize) {
        self.remote_stats.allocated_size_since_last_gc = self
            .remote_stats
            .allocated_size_since_last_gc
            .saturating_add(bytes);
    }

    pub fn used_size(&self) -> usize {
        self.remote_stats.used_size
    }

    pub fn allocated_size_since_last_gc(&self) -> usize {
        self.remote_stats.allocated_size_since_last_gc
    }

    pub fn remote_stats(&self) -> RemoteStats {
        self.remote_stats
    }
}

impl Default for LocalEmbedderHeapTracer {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Drop for LocalEmbedderHeapTracer {
    fn drop(&mut self) {
        if let Some(tracer) = self.remote_tracer.take() {
            tracer.set_heap(None);
        }
    }
}

impl std::fmt::Debug for LocalEmbedderHeapTracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalEmbedderHeapTracer")
            .field("heap", &self.heap)
            .field("in_use", &self.in_use())
            .field("embedder_stack_state", &self.embedder_stack_state)
            .field("next_finalization_stack_state", &self.next_finalization_stack_state)
            .field("remote_stats", &self.remote_stats)
            .finish()
    }
}
