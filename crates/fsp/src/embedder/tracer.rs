//! Embedder Heap Tracer - External Tracing Capability
//!
//! Implemented by the embedder, which owns a heap of its own (DOM nodes,
//! native wrappers) with edges into the managed heap. The bridge in
//! `embedder` calls exactly the operations of `EmbedderHeapTracer` and
//! nothing else.

/// Flags for the start of a tracing cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraceFlags {
    #[default]
    None,
    /// The cycle was started to reduce memory; the embedder may drop caches
    ReduceMemory,
}

/// Whether the stack may hold pointers into the embedder heap
///
/// With `MayContainHeapPointers` the tracer has to scan the stack
/// conservatively in its final pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmbedderStackState {
    #[default]
    MayContainHeapPointers,
    NoHeapPointers,
}

/// Filled in by the tracer at the end of a cycle
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TraceSummary {
    /// Bytes allocated in the embedder heap that are still live
    pub allocated_size: usize,
    /// Time spent tracing, in milliseconds
    pub time: f64,
}

/// One cross-heap reference: the wrapper's type info and instance fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WrapperInfo {
    pub type_info: usize,
    pub instance: usize,
}

impl WrapperInfo {
    pub fn new(type_info: usize, instance: usize) -> Self {
        Self {
            type_info,
            instance,
        }
    }
}

/// Identifies the managed heap a tracer is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapId(pub u64);

impl std::fmt::Display for HeapId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "heap#{}", self.0)
    }
}

/// Tracer for the embedder heap
///
/// Shared with the bridge as `Arc<dyn EmbedderHeapTracer>`; the embedder
/// keeps its own reference and decides the tracer's lifetime. Methods take
/// `&self`, so implementations use interior mutability for their state.
///
/// # Examples
///
/// ```rust
/// use fsp::embedder::{EmbedderHeapTracer, EmbedderStackState, TraceFlags, TraceSummary, WrapperInfo};
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// #[derive(Default)]
/// struct CountingTracer {
///     references: AtomicUsize,
/// }
///
/// impl EmbedderHeapTracer for CountingTracer {
///     fn trace_prologue(&self, _flags: TraceFlags) {}
///     fn trace_epilogue(&self, _summary: &mut TraceSummary) {}
///     fn enter_final_pause(&self, _stack_state: EmbedderStackState) {}
///     fn is_tracing_done(&self) -> bool {
///         true
///     }
///     fn register_references(&self, references: &[WrapperInfo]) {
///         self.references.fetch_add(references.len(), Ordering::Relaxed);
///     }
///     fn advance_tracing(&self, _deadline_in_ms: f64) -> bool {
///         true
///     }
/// }
/// ```
pub trait EmbedderHeapTracer: Send + Sync {
    /// Start of a tracing cycle
    fn trace_prologue(&self, flags: TraceFlags);

    /// End of a tracing cycle
    fn trace_epilogue(&self, summary: &mut TraceSummary);

    /// The collector enters its final atomic pause
    fn enter_final_pause(&self, stack_state: EmbedderStackState);

    /// True once the embedder has no more work
    fn is_tracing_done(&self) -> bool;

    /// References from managed objects into the embedder heap
    fn register_references(&self, references: &[WrapperInfo]);

    /// Trace until done or `deadline_in_ms` elapsed; returns true when done
    fn advance_tracing(&self, deadline_in_ms: f64) -> bool;

    /// Attached to (`Some`) or detached from (`None`) a managed heap
    fn set_heap(&self, _heap: Option<HeapId>) {}
}
