//! # FSP - Cooperative Safepoints and Embedder Tracing
//!
//! FSP brings every thread that touches a managed heap to a halt at a point
//! where its heap-visible state is consistent, so a collector can inspect or
//! move objects. It also carries the bridge that lets an embedder-supplied
//! tracer take part in that same pause.
//!
//! ## Overview
//!
//! - **Cooperative Suspension**: Threads report at their own safepoint polls;
//!   nothing is preempted
//! - **Running-Only Counting**: Only threads running when a pause forms are
//!   waited for; parked threads block when they try to unpark
//! - **Reentrant Pauses**: The thread holding a pause may request again
//!   without blocking or re-counting
//! - **Arena Registry**: Registered threads are addressed by generation-checked
//!   ids, never by raw links
//! - **Embedder Bridge**: Forwards the tracing cycle to an optional external
//!   tracer and batches cross-heap references
//!
//! ## Quick Start
//!
//! ```rust
//! use fsp::{MutatorId, Runtime, SafepointConfig, ThreadKind};
//! use std::sync::atomic::{AtomicBool, Ordering};
//!
//! fn main() -> Result<(), fsp::FspError> {
//!     let runtime = Runtime::new(SafepointConfig::default())?;
//!     runtime.start()?;
//!
//!     let done = AtomicBool::new(false);
//!     std::thread::scope(|s| {
//!         s.spawn(|| {
//!             let thread = runtime.attach_thread(ThreadKind::Background).unwrap();
//!             thread.new_persistent(0x1000);
//!             while !done.load(Ordering::Acquire) {
//!                 thread.safepoint();
//!             }
//!         });
//!
//!         // Wait until the mutator attached, then stop it.
//!         while !runtime.coordinator().contains_any_thread() {
//!             std::thread::yield_now();
//!         }
//!         let mut roots = 0;
//!         {
//!             let pause = runtime.pause();
//!             pause.visit_roots(&mut |_: MutatorId, _: &mut usize| roots += 1);
//!         }
//!         assert!(roots <= 1);
//!         done.store(true, Ordering::Release);
//!     });
//!
//!     runtime.stop()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    Mutator Threads                      │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐   │
//! │  │ MutatorThread│  │ MutatorThread│  │ MutatorThread│   │
//! │  │  safepoint() │  │  park()      │  │  unpark()    │   │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘   │
//! │         └─────────────────┼─────────────────┘           │
//! │                   state word + Barrier                  │
//! └───────────────────────────┼─────────────────────────────┘
//!                             │
//! ┌───────────────────────────┼─────────────────────────────┐
//! │                    Collector Thread                     │
//! │                           ▼                             │
//! │  ┌───────────────────────────────────────────┐          │
//! │  │ PauseScope                                │          │
//! │  │  - request_pause / release_pause          │          │
//! │  │  - visit_roots over persistent handles    │          │
//! │  └───────────────────────────────────────────┘          │
//! │                           │                             │
//! │                           ▼                             │
//! │  ┌───────────────────────────────────────────┐          │
//! │  │ LocalEmbedderHeapTracer                   │          │
//! │  │  - prologue / final pause / epilogue      │          │
//! │  │  - ProcessingScope batches references     │          │
//! │  └───────────────────────────────────────────┘          │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ### Pause Phases
//!
//! 1. **Request**: Requesters serialize on the registry lock
//! 2. **Arm**: Every covered thread gets its request bit; running ones are counted
//! 3. **Reach**: Counted threads report from `safepoint()` or `park()`
//! 4. **Work**: Root iteration, embedder final pause
//! 5. **Release**: Bits cleared, barrier disarmed, waiters woken
//!
//! ## Safepoint Placement
//!
//! Mutators call `MutatorThread::safepoint()` at allocation slow paths and
//! loop back-edges, and `park()` before any blocking wait. A thread that
//! never polls stalls every pause; there is no timeout.
//!
//! ## Thread Safety
//!
//! - `PauseCoordinator` and `Runtime` are `Send + Sync`
//! - `MutatorThread` and `PauseScope` stay on the thread that created them
//! - `LocalEmbedderHeapTracer` is driven by the thread holding the pause
//!
//! ## Modules
//!
//! - [`safepoint`]: Coordinator, barrier, thread handles, pause scope
//! - [`embedder`]: External tracer contract and the bridge to it
//! - [`runtime`]: Per-heap bundle of coordinator and bridge
//! - [`visitor`]: Root visitor capability
//! - [`config`]: Configuration and validation
//! - [`error`]: Error types
//! - [`logging`]: Structured safepoint event log
//! - [`stats`]: Pause statistics

// Core protocol
pub mod safepoint;
pub mod visitor;

// Embedder boundary
pub mod embedder;

// Integration
pub mod config;
pub mod error;
pub mod runtime;

// Monitoring
pub mod logging;
pub mod stats;

pub use config::SafepointConfig;
pub use error::{FspError, Result};
pub use runtime::{Runtime, RuntimeState};
pub use safepoint::{
    MutatorId, MutatorThread, ParkedScope, PauseCoordinator, PauseScope, PersistentHandle,
    ThreadKind, ThreadRef, ThreadStatus, UnparkedScope,
};
pub use visitor::RootVisitor;

/// FSP version string from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize FSP with default configuration
///
/// The runtime must be started before use with `runtime.start()`.
///
/// # Examples
///
/// ```rust
/// let runtime = fsp::init()?;
/// runtime.start()?;
///
/// runtime.stop()?;
/// # Ok::<(), fsp::FspError>(())
/// ```
pub fn init() -> Result<Runtime> {
    Runtime::new(SafepointConfig::default())
}

/// Initialize FSP with custom configuration
///
/// # Examples
///
/// ```rust
/// let config = fsp::SafepointConfig {
///     slow_safepoint_threshold_ms: 2,
///     ..Default::default()
/// };
///
/// let runtime = fsp::init_with_config(config)?;
/// # Ok::<(), fsp::FspError>(())
/// ```
pub fn init_with_config(config: SafepointConfig) -> Result<Runtime> {
    Runtime::new(config)
}
