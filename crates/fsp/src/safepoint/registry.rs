//! Thread Registry - Arena-Backed Doubly-Linked List
//!
//! Registered mutator threads live in slots of an arena owned by the
//! registry. Neighbours are linked by slot index instead of by address, so
//! removing an entry can never leave a dangling link behind.
//!
//! New entries are linked at the head. Iteration walks `head -> next`, i.e.
//! most recently registered first.
//!
//! The registry is not synchronized; the coordinator keeps it behind its
//! registry mutex.

use std::fmt;

/// Stable identifier of a registered mutator thread
///
/// Index of the arena slot plus the slot's generation. A slot reused after
/// an unregister gets a new generation, so stale identifiers never alias a
/// newer thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MutatorId {
    index: u32,
    generation: u32,
}

impl MutatorId {
    /// Arena slot index
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Slot generation
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Packed representation, used in log events
    pub fn as_u64(&self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }
}

impl fmt::Display for MutatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

struct Entry<T> {
    value: T,
    prev: Option<u32>,
    next: Option<u32>,
}

struct Slot<T> {
    generation: u32,
    entry: Option<Entry<T>>,
}

/// Arena of registered threads
pub struct ThreadRegistry<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    head: Option<u32>,
    len: usize,
}

impl<T> ThreadRegistry<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            len: 0,
        }
    }

    /// Insert at the head of the list
    ///
    /// `make` receives the identifier the new entry will have, so the value
    /// can carry its own id.
    pub fn insert_with<F>(&mut self, make: F) -> (MutatorId, &T)
    where
        F: FnOnce(MutatorId) -> T,
    {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                let index = u32::try_from(self.slots.len())
                    .unwrap_or_else(|_| panic!("thread registry exhausted u32 slot indices"));
                self.slots.push(Slot {
                    generation: 0,
                    entry: None,
                });
                index
            },
        };

        let slot = &mut self.slots[index as usize];
        let id = MutatorId {
            index,
            generation: slot.generation,
        };

        slot.entry = Some(Entry {
            value: make(id),
            prev: None,
            next: self.head,
        });

        if let Some(old_head) = self.head {
            self.entry_mut(old_head).prev = Some(index);
        }
        self.head = Some(index);
        self.len += 1;

        (id, &self.entry_mut(index).value)
    }

    /// Unlink and return the entry for `id`
    pub fn remove(&mut self, id: MutatorId) -> Option<T> {
        if !self.contains(id) {
            return None;
        }

        let slot = &mut self.slots[id.index as usize];
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);

        match entry.prev {
            Some(prev) => self.entry_mut(prev).next = entry.next,
            None => self.head = entry.next,
        }
        if let Some(next) = entry.next {
            self.entry_mut(next).prev = entry.prev;
        }

        self.free.push(id.index);
        self.len -= 1;

        Some(entry.value)
    }

    pub fn contains(&self, id: MutatorId) -> bool {
        self.slots
            .get(id.index as usize)
            .map(|slot| slot.generation == id.generation && slot.entry.is_some())
            .unwrap_or(false)
    }

    pub fn get(&self, id: MutatorId) -> Option<&T> {
        if !self.contains(id) {
            return None;
        }
        self.slots[id.index as usize]
            .entry
            .as_ref()
            .map(|entry| &entry.value)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Walk the list from head
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            registry: self,
            cursor: self.head,
        }
    }

    fn entry_mut(&mut self, index: u32) -> &mut Entry<T> {
        self.slots[index as usize]
            .entry
            .as_mut()
            .unwrap_or_else(|| panic!("thread registry link to empty slot {}", index))
    }
}

impl<T> Default for ThreadRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over registered entries, head first
pub struct Iter<'a, T> {
    registry: &'a ThreadRegistry<T>,
    cursor: Option<u32>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (MutatorId, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        let slot = &self.registry.slots[index as usize];
        let entry = slot.entry.as_ref()?;
        self.cursor = entry.next;

        let id = MutatorId {
            index,
            generation: slot.generation,
        };
        Some((id, &entry.value))
    }
}
