//! Scoped helpers over the embedder bridge

use crate::embedder::tracer::{EmbedderStackState, WrapperInfo};
use crate::embedder::LocalEmbedderHeapTracer;
use std::ops::{Deref, DerefMut};

/// Temporarily replaces the bridge's default stack state
///
/// Restores the state seen at construction on drop. Scopes nest; because
/// each one borrows the bridge mutably, an inner scope is created through
/// the outer one and always ends first.
///
/// # Examples
///
/// ```rust
/// use fsp::embedder::{EmbedderStackState, LocalEmbedderHeapTracer};
///
/// let mut bridge = LocalEmbedderHeapTracer::new(None);
/// {
///     let scope = bridge.stack_state_scope(EmbedderStackState::NoHeapPointers);
///     assert_eq!(scope.embedder_stack_state(), EmbedderStackState::NoHeapPointers);
/// }
/// assert_eq!(
///     bridge.embedder_stack_state(),
///     EmbedderStackState::MayContainHeapPointers
/// );
/// ```
pub struct EmbedderStackStateScope<'a> {
    tracer: &'a mut LocalEmbedderHeapTracer,
    saved: EmbedderStackState,
}

impl<'a> EmbedderStackStateScope<'a> {
    pub fn new(tracer: &'a mut LocalEmbedderHeapTracer, stack_state: EmbedderStackState) -> Self {
        let saved = tracer.replace_embedder_stack_state(stack_state);
        Self { tracer, saved }
    }

    /// State restored when this scope ends
    pub fn saved(&self) -> EmbedderStackState {
        self.saved
    }
}

impl Deref for EmbedderStackStateScope<'_> {
    type Target = LocalEmbedderHeapTracer;

    fn deref(&self) -> &Self::Target {
        self.tracer
    }
}

impl DerefMut for EmbedderStackStateScope<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.tracer
    }
}

impl Drop for EmbedderStackStateScope<'_> {
    fn drop(&mut self) {
        self.tracer.replace_embedder_stack_state(self.saved);
    }
}

/// Batches wrapper references for one `register_references` call
///
/// Nothing reaches the tracer until the scope is dropped. An empty batch is
/// never sent.
pub struct ProcessingScope<'a> {
    tracer: &'a LocalEmbedderHeapTracer,
    wrapper_cache: Vec<WrapperInfo>,
}

impl<'a> ProcessingScope<'a> {
    pub fn new(tracer: &'a LocalEmbedderHeapTracer) -> Self {
        Self {
            tracer,
            wrapper_cache: Vec::new(),
        }
    }

    pub fn add_wrapper_info(&mut self, info: WrapperInfo) {
        self.wrapper_cache.push(info);
    }

    pub fn len(&self) -> usize {
        self.wrapper_cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wrapper_cache.is_empty()
    }
}

impl Drop for ProcessingScope<'_> {
    fn drop(&mut self) {
        if self.wrapper_cache.is_empty() {
            return;
        }
        log::trace!("flushing {} wrapper references", self.wrapper_cache.len());
        self.tracer.register_references(&self.wrapper_cache);
        self.wrapper_cache.clear();
    }
}
