//! Runtime Module - One Heap's Safepoint Machinery
//!
//! A `Runtime` bundles what a single managed heap needs to stop its mutators
//! and trace across the embedder boundary:
//! - the `PauseCoordinator` (exactly one per runtime)
//! - the `LocalEmbedderHeapTracer` bridge
//! - lifecycle state
//!
//! Mutator threads attach through `attach_thread` and keep the returned
//! handle for as long as they touch the heap.

use crate::config::SafepointConfig;
use crate::embedder::{EmbedderHeapTracer, HeapId, LocalEmbedderHeapTracer, TraceFlags, TraceSummary};
use crate::error::{FspError, Result};
use crate::safepoint::{MutatorThread, PauseCoordinator, PauseScope, ThreadKind};
use crate::stats::SafepointSummary;
use crate::visitor::RootVisitor;
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_HEAP_ID: AtomicU64 = AtomicU64::new(1);

/// Runtime state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    /// Runtime not yet started
    Initialized,
    /// Runtime running normally
    Running,
    /// Runtime has stopped
    Stopped,
}

/// Safepoint runtime for one managed heap
///
/// # Examples
///
/// ```rust
/// use fsp::{MutatorId, Runtime, SafepointConfig, ThreadKind};
/// use fsp::embedder::TraceFlags;
///
/// let runtime = Runtime::new(SafepointConfig::default()).unwrap();
/// runtime.start().unwrap();
///
/// let main = runtime.attach_thread(ThreadKind::Main).unwrap();
/// main.new_persistent(0x4000);
///
/// let mut roots = 0;
/// let summary = runtime.atomic_pause(TraceFlags::None, &mut |_: MutatorId, _: &mut usize| {
///     roots += 1
/// });
/// assert_eq!(roots, 1);
/// assert_eq!(summary.allocated_size, 0);
///
/// drop(main);
/// runtime.stop().unwrap();
/// ```
pub struct Runtime {
    heap: HeapId,
    config: SafepointConfig,
    coordinator: PauseCoordinator,
    embedder: Mutex<LocalEmbedderHeapTracer>,
    state: Mutex<RuntimeState>,
}

impl Runtime {
    /// Create new runtime
    pub fn new(config: SafepointConfig) -> Result<Self> {
        config.validate()?;

        let heap = HeapId(NEXT_HEAP_ID.fetch_add(1, Ordering::Relaxed));
        log::debug!("creating runtime for {}", heap);

        Ok(Self {
            heap,
            coordinator: PauseCoordinator::with_config(&config),
            embedder: Mutex::new(LocalEmbedderHeapTracer::new(Some(heap))),
            state: Mutex::new(RuntimeState::Initialized),
            config,
        })
    }

    /// Start runtime
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state != RuntimeState::Initialized {
            return Err(FspError::InvalidState {
                expected: "Initialized".to_string(),
                actual: format!("{:?}", *state),
            });
        }
        *state = RuntimeState::Running;
        Ok(())
    }

    /// Stop runtime
    ///
    /// Every mutator must have detached and no pause may be held.
    pub fn stop(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state != RuntimeState::Running {
            return Err(FspError::InvalidState {
                expected: "Running".to_string(),
                actual: format!("{:?}", *state),
            });
        }
        if self.coordinator.is_pause_active() {
            return Err(FspError::InvalidState {
                expected: "no active pause".to_string(),
                actual: format!("{} active pauses", self.coordinator.active_pauses()),
            });
        }
        let attached = self.coordinator.thread_count();
        if attached > 0 {
            return Err(FspError::InvalidState {
                expected: "no attached threads".to_string(),
                actual: format!("{} attached threads", attached),
            });
        }

        self.embedder.lock().set_remote_tracer(None);
        *state = RuntimeState::Stopped;
        log::debug!("runtime for {} stopped", self.heap);
        Ok(())
    }

    /// Get runtime state
    pub fn state(&self) -> RuntimeState {
        *self.state.lock()
    }

    pub fn heap_id(&self) -> HeapId {
        self.heap
    }

    pub fn config(&self) -> &SafepointConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &PauseCoordinator {
        &self.coordinator
    }

    /// Register the calling thread as a mutator of this heap
    pub fn attach_thread(&self, kind: ThreadKind) -> Result<MutatorThread<'_>> {
        let state = self.state();
        if state != RuntimeState::Running {
            return Err(FspError::InvalidState {
                expected: "Running".to_string(),
                actual: format!("{:?}", state),
            });
        }
        Ok(self.coordinator.register_thread(kind, || {}))
    }

    /// Stop every other mutator, including the main thread
    pub fn pause(&self) -> PauseScope<'_> {
        PauseScope::new(&self.coordinator)
    }

    /// Stop every other mutator, optionally leaving the main thread running
    pub fn pause_with_main_thread(&self, stop_main_thread: bool) -> PauseScope<'_> {
        PauseScope::with_main_thread(&self.coordinator, stop_main_thread)
    }

    /// Safepoint poll for the calling thread, if attached
    pub fn safepoint(&self) {
        self.coordinator.safepoint();
    }

    /// Exclusive access to the embedder bridge
    pub fn embedder_tracer(&self) -> MutexGuard<'_, LocalEmbedderHeapTracer> {
        self.embedder.lock()
    }

    pub fn set_embedder_tracer(&self, tracer: Option<Arc<dyn EmbedderHeapTracer>>) {
        self.embedder.lock().set_remote_tracer(tracer);
    }

    /// One atomic tracing cycle
    ///
    /// Stops every mutator, runs the embedder prologue, hands all roots to
    /// `visitor`, enters the final pause and lets the embedder finish, then
    /// closes the cycle. Returns what the embedder reported.
    pub fn atomic_pause<V>(&self, flags: TraceFlags, visitor: &mut V) -> TraceSummary
    where
        V: RootVisitor + ?Sized,
    {
        let pause = self.pause();
        let mut embedder = self.embedder.lock();

        embedder.trace_prologue(flags);
        pause.visit_roots(visitor);
        embedder.enter_final_pause();

        if !embedder.trace(f64::INFINITY) || !embedder.is_remote_tracing_done() {
            log::warn!("embedder tracing for {} not done at end of final pause", self.heap);
        }

        let mut summary = TraceSummary::default();
        embedder.trace_epilogue(Some(&mut summary));
        summary
    }

    /// Pause statistics, if enabled
    pub fn stats(&self) -> Option<SafepointSummary> {
        self.coordinator.stats().map(|stats| stats.summary())
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("heap", &self.heap)
            .field("state", &self.state())
            .field("coordinator", &self.coordinator)
            .finish()
    }
}
