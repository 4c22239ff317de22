//! Persistent Handles - Per-Thread Root Slots
//!
//! A mutator thread keeps references it must survive a pause with in its
//! persistent handle block. The block is the thread's root-iteration hook:
//! `PauseCoordinator::visit_roots` walks every live slot.

use crate::safepoint::MutatorId;
use crate::visitor::RootVisitor;

/// Handle to one slot in a thread's persistent block
///
/// Only valid with the thread that created it, and only until disposed. A
/// slot reused after a dispose gets a new generation, so a stale handle
/// never reaches the root that lives there now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PersistentHandle {
    owner: MutatorId,
    index: usize,
    generation: u32,
}

impl PersistentHandle {
    /// Thread owning the slot
    pub fn owner(&self) -> MutatorId {
        self.owner
    }
}

struct Slot {
    generation: u32,
    address: Option<usize>,
}

/// Slot block with free-list reuse
pub(crate) struct PersistentHandles {
    owner: MutatorId,
    slots: Vec<Slot>,
    free: Vec<usize>,
    live: usize,
}

impl PersistentHandles {
    pub(crate) fn new(owner: MutatorId) -> Self {
        Self {
            owner,
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    pub(crate) fn create(&mut self, address: usize) -> PersistentHandle {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    address: None,
                });
                self.slots.len() - 1
            },
        };
        let slot = &mut self.slots[index];
        slot.address = Some(address);
        self.live += 1;

        PersistentHandle {
            owner: self.owner,
            index,
            generation: slot.generation,
        }
    }

    pub(crate) fn get(&self, handle: PersistentHandle) -> usize {
        *self.slot(handle)
    }

    pub(crate) fn set(&mut self, handle: PersistentHandle, address: usize) {
        *self.slot_mut(handle) = address;
    }

    pub(crate) fn dispose(&mut self, handle: PersistentHandle) {
        self.slot_mut(handle);
        let slot = &mut self.slots[handle.index];
        slot.address = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.live -= 1;
    }

    pub(crate) fn len(&self) -> usize {
        self.live
    }

    /// Hand every live slot to `visitor`
    pub(crate) fn iterate<V: RootVisitor + ?Sized>(&mut self, visitor: &mut V) {
        for address in self.slots.iter_mut().filter_map(|slot| slot.address.as_mut()) {
            visitor.visit_root(self.owner, address);
        }
    }

    fn slot(&self, handle: PersistentHandle) -> &usize {
        self.check_owner(handle);
        self.slots
            .get(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.address.as_ref())
            .unwrap_or_else(|| panic!("use of disposed persistent handle {:?}", handle))
    }

    fn slot_mut(&mut self, handle: PersistentHandle) -> &mut usize {
        self.check_owner(handle);
        self.slots
            .get_mut(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.address.as_mut())
            .unwrap_or_else(|| panic!("use of disposed persistent handle {:?}", handle))
    }

    fn check_owner(&self, handle: PersistentHandle) {
        assert_eq!(
            handle.owner, self.owner,
            "persistent handle used with a thread that does not own it"
        );
    }
}
