//! Forward cursors over the live entries of a core.
use std::iter::FusedIterator;

/// A key together with the id assigned to it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Entry {
    /// The key.
    pub key: i64,
    /// The id assigned to the key.
    pub id: u32,
}

/// Slot level access shared by both core kinds.
pub(crate) trait Slots {
    /// Number of slots, occupied or not.
    fn slot_count(&self) -> usize;

    /// Number of occupied slots.
    fn len(&self) -> usize;

    /// The entry stored in `slot`, if it is occupied.
    fn entry(&self, slot: usize) -> Option<Entry>;
}

/// Visits the occupied slots of a core in slot order.
pub(crate) struct SlotIter<'a, C> {
    core: &'a C,
    slot: usize,
    remaining: usize,
}

impl<'a, C: Slots> SlotIter<'a, C> {
    pub fn new(core: &'a C) -> Self {
        Self {
            core,
            slot: 0,
            remaining: core.len(),
        }
    }
}

impl<C: Slots> Iterator for SlotIter<'_, C> {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        if self.remaining == 0 {
            return None;
        }
        while self.slot < self.core.slot_count() {
            let slot = self.slot;
            self.slot += 1;
            if let Some(entry) = self.core.entry(slot) {
                self.remaining -= 1;
                return Some(entry);
            }
        }
        unreachable!("fewer occupied slots than entries")
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<C: Slots> ExactSizeIterator for SlotIter<'_, C> {}

impl<C: Slots> FusedIterator for SlotIter<'_, C> {}
