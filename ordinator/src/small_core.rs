//! Fixed capacity open addressing table used while an ordinator holds few keys.
use crate::{
    config::next_grow_size,
    id_space::RESERVED_ID,
    iter::{Entry, SlotIter, Slots},
    lease::MemoryContext,
    memory::{MemoryAccountant, OutOfMemory},
    page::{PagePool, PagedArray},
    status::SmallCoreStatus,
};

/// Keys and ids in one page each, probed with triangular numbers.
///
/// An id of [`RESERVED_ID`] marks an empty slot. The small core never grows, once inserting
/// another key would reach `next_grow_size` the owner has to transition to a big core.
pub(crate) struct SmallCore {
    keys: PagedArray<u64>,
    ids: PagedArray<u32>,
    mask: usize,
    size: usize,
    next_grow_size: usize,
}

impl SmallCore {
    pub fn new<P: PagePool, M: MemoryAccountant>(
        context: &MemoryContext<P, M>,
        capacity: usize,
        fill_factor: f64,
    ) -> Result<Self, OutOfMemory> {
        debug_assert!(capacity.is_power_of_two() && capacity <= context.page_size() / 8);

        let keys = context.lease_pages(1)?;
        let ids = context.lease_pages(1)?;

        let keys = PagedArray::from_pages(keys.commit());
        let mut ids = PagedArray::from_pages(ids.commit());
        ids.fill_bytes(0xff);
        debug_assert_eq!(ids.get(0), RESERVED_ID);

        Ok(Self {
            keys,
            ids,
            mask: capacity - 1,
            size: 0,
            next_grow_size: next_grow_size(capacity, fill_factor),
        })
    }

    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Returns the id of `key` or the empty slot where it would have to be inserted.
    #[inline]
    pub fn probe(&self, hash: u64, key: i64) -> Result<u32, usize> {
        let mut slot = hash as usize & self.mask;
        let mut step = 0;
        loop {
            let id = self.ids.get(slot);
            if id == RESERVED_ID {
                return Err(slot);
            }
            if self.keys.get(slot) == key as u64 {
                return Ok(id);
            }
            step += 1;
            slot = (slot + step) & self.mask;
        }
    }

    #[inline]
    pub fn find(&self, hash: u64, key: i64) -> Option<u32> {
        self.probe(hash, key).ok()
    }

    /// Whether inserting one more key requires transitioning to a big core first.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.size + 1 >= self.next_grow_size
    }

    /// Stores a new key in an empty slot returned by [`probe`][Self::probe].
    #[inline]
    pub fn insert_at(&mut self, slot: usize, key: i64, id: u32) {
        debug_assert!(!self.is_full());
        debug_assert_eq!(self.ids.get(slot), RESERVED_ID);
        self.keys.set(slot, key as u64);
        self.ids.set(slot, id);
        self.size += 1;
    }

    pub fn iter(&self) -> SlotIter<'_, Self> {
        SlotIter::new(self)
    }

    pub fn status(&self) -> SmallCoreStatus {
        SmallCoreStatus {
            grow_count: 0,
            capacity: self.capacity(),
            size: self.size,
            next_grow_size: self.next_grow_size,
        }
    }

    pub fn close<P: PagePool, M: MemoryAccountant>(self, context: &MemoryContext<P, M>) {
        context.release_pages(self.keys.into_pages());
        context.release_pages(self.ids.into_pages());
    }
}

impl Slots for SmallCore {
    fn slot_count(&self) -> usize {
        self.capacity()
    }

    fn len(&self) -> usize {
        self.size
    }

    #[inline]
    fn entry(&self, slot: usize) -> Option<Entry> {
        let id = self.ids.get(slot);
        (id != RESERVED_ID).then(|| Entry {
            key: self.keys.get(slot) as i64,
            id,
        })
    }
}
