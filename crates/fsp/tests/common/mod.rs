//! Test Utilities for the FSP Test Suite
//!
//! Fixtures for spinning up polling mutator threads, a tracer that records
//! every call it receives, and a root visitor that counts what it sees.

#![allow(dead_code)]

use fsp::embedder::{
    EmbedderHeapTracer, EmbedderStackState, HeapId, TraceFlags, TraceSummary, WrapperInfo,
};
use fsp::{MutatorId, PauseCoordinator, RootVisitor, ThreadKind};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How long a "must still be blocked" check waits before looking
pub const BLOCK_CHECK: Duration = Duration::from_millis(50);

/// ============================================================================
/// MUTATOR FIXTURE
/// ============================================================================

/// Background mutators that poll `safepoint()` until told to stop
pub struct Mutators {
    stop: Arc<AtomicBool>,
    polls: Arc<AtomicUsize>,
    ids: Arc<Mutex<Vec<MutatorId>>>,
    handles: Vec<JoinHandle<()>>,
}

impl Mutators {
    /// Spawn `count` registered mutators with `roots` persistent handles each
    ///
    /// Returns once every mutator is registered and running.
    pub fn spawn(coordinator: &Arc<PauseCoordinator>, count: usize, roots: usize) -> Self {
        Self::spawn_kind(coordinator, count, roots, ThreadKind::Background)
    }

    pub fn spawn_kind(
        coordinator: &Arc<PauseCoordinator>,
        count: usize,
        roots: usize,
        kind: ThreadKind,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let polls = Arc::new(AtomicUsize::new(0));
        let ids = Arc::new(Mutex::new(Vec::new()));
        let ready = Arc::new(Barrier::new(count + 1));

        let handles = (0..count)
            .map(|i| {
                let coordinator = Arc::clone(coordinator);
                let stop = Arc::clone(&stop);
                let polls = Arc::clone(&polls);
                let ids = Arc::clone(&ids);
                let ready = Arc::clone(&ready);

                thread::spawn(move || {
                    let thread = coordinator.register_thread(kind, || {});
                    for r in 0..roots {
                        thread.new_persistent(0x1000 * (i + 1) + r * 8);
                    }
                    ids.lock().push(thread.id());
                    ready.wait();

                    while !stop.load(Ordering::Acquire) {
                        thread.safepoint();
                        polls.fetch_add(1, Ordering::Relaxed);
                        std::hint::spin_loop();
                    }
                })
            })
            .collect();

        ready.wait();
        Self {
            stop,
            polls,
            ids,
            handles,
        }
    }

    pub fn ids(&self) -> Vec<MutatorId> {
        self.ids.lock().clone()
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::Relaxed)
    }

    /// Stop polling and wait for every mutator to detach
    pub fn join(self) {
        self.stop.store(true, Ordering::Release);
        for handle in self.handles {
            handle.join().expect("mutator thread panicked");
        }
    }
}

/// ============================================================================
/// RECORDING TRACER
/// ============================================================================

/// One call received by `RecordingTracer`
#[derive(Debug, Clone, PartialEq)]
pub enum TracerCall {
    Prologue(TraceFlags),
    Epilogue,
    EnterFinalPause(EmbedderStackState),
    IsTracingDone,
    RegisterReferences(Vec<WrapperInfo>),
    AdvanceTracing(f64),
}

/// Tracer that records its calls and reports a fixed outcome
pub struct RecordingTracer {
    calls: Mutex<Vec<TracerCall>>,
    heap: Mutex<Option<HeapId>>,
    done: AtomicBool,
    live_bytes: usize,
}

impl RecordingTracer {
    pub fn new() -> Arc<Self> {
        Self::with_outcome(true, 0)
    }

    pub fn with_outcome(done: bool, live_bytes: usize) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            heap: Mutex::new(None),
            done: AtomicBool::new(done),
            live_bytes,
        })
    }

    pub fn calls(&self) -> Vec<TracerCall> {
        self.calls.lock().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    pub fn heap(&self) -> Option<HeapId> {
        *self.heap.lock()
    }

    pub fn set_done(&self, done: bool) {
        self.done.store(done, Ordering::Relaxed);
    }

    /// Stack states forwarded by `enter_final_pause`, in order
    pub fn final_pause_states(&self) -> Vec<EmbedderStackState> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                TracerCall::EnterFinalPause(state) => Some(*state),
                _ => None,
            })
            .collect()
    }

    /// Batches passed to `register_references`, in order
    pub fn reference_batches(&self) -> Vec<Vec<WrapperInfo>> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                TracerCall::RegisterReferences(batch) => Some(batch.clone()),
                _ => None,
            })
            .collect()
    }
}

impl EmbedderHeapTracer for RecordingTracer {
    fn trace_prologue(&self, flags: TraceFlags) {
        self.calls.lock().push(TracerCall::Prologue(flags));
    }

    fn trace_epilogue(&self, summary: &mut TraceSummary) {
        summary.allocated_size = self.live_bytes;
        summary.time = 1.5;
        self.calls.lock().push(TracerCall::Epilogue);
    }

    fn enter_final_pause(&self, stack_state: EmbedderStackState) {
        self.calls.lock().push(TracerCall::EnterFinalPause(stack_state));
    }

    fn is_tracing_done(&self) -> bool {
        self.calls.lock().push(TracerCall::IsTracingDone);
        self.done.load(Ordering::Relaxed)
    }

    fn register_references(&self, references: &[WrapperInfo]) {
        self.calls
            .lock()
            .push(TracerCall::RegisterReferences(references.to_vec()));
    }

    fn advance_tracing(&self, deadline_in_ms: f64) -> bool {
        self.calls
            .lock()
            .push(TracerCall::AdvanceTracing(deadline_in_ms));
        self.done.load(Ordering::Relaxed)
    }

    fn set_heap(&self, heap: Option<HeapId>) {
        *self.heap.lock() = heap;
    }
}

/// ============================================================================
/// COUNTING VISITOR
/// ============================================================================

/// Records visited threads and how many roots each contributed
#[derive(Default)]
pub struct CountingVisitor {
    pub threads: Vec<MutatorId>,
    pub roots: HashMap<MutatorId, usize>,
}

impl CountingVisitor {
    pub fn total_roots(&self) -> usize {
        self.roots.values().sum()
    }
}

impl RootVisitor for CountingVisitor {
    fn visit_thread(&mut self, thread: MutatorId) {
        self.threads.push(thread);
    }

    fn visit_root(&mut self, thread: MutatorId, _slot: &mut usize) {
        *self.roots.entry(thread).or_insert(0) += 1;
    }
}

/// Assert `ids` contains every element of `expected` exactly once
pub fn assert_same_threads(mut ids: Vec<MutatorId>, mut expected: Vec<MutatorId>) {
    ids.sort();
    expected.sort();
    assert_eq!(ids, expected, "visited threads differ from registered threads");
}
