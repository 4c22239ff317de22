//! Safepoint Module - Cooperative Stop-the-World
//!
//! Mutator threads register with a `PauseCoordinator` and poll
//! `MutatorThread::safepoint()` at safe places. A collector thread brings
//! them all to a halt with `PauseScope`, walks their roots, and lets them go.
//!
//! ```text
//! ┌──────────────────┐     request_pause()      ┌───────────────────┐
//! │ PauseCoordinator │ ───────────────────────► │ Barrier (armed)   │
//! │  - registry      │                          │  - stopped count  │
//! │  - depth         │ ◄─────────────────────── │  - epoch          │
//! └──────────────────┘   all running reported   └───────────────────┘
//!          ▲                                              ▲
//!          │ register / unregister                        │ safepoint() / park()
//!   ┌──────┴───────┐                               ┌──────┴───────┐
//!   │ MutatorThread │ ─── state word (atomic) ───► │ MutatorThread │
//!   └──────────────┘                               └──────────────┘
//! ```

mod barrier;
pub mod coordinator;
pub mod persistent;
mod registry;
pub mod scope;
mod state;
pub mod thread;

pub use coordinator::{PauseCoordinator, ThreadRef};
pub use persistent::PersistentHandle;
pub use registry::MutatorId;
pub use scope::PauseScope;
pub use state::ThreadStatus;
pub use thread::{MutatorThread, ParkedScope, ThreadKind, UnparkedScope};
