//! Growable table probing groups of control bytes at once.
use crate::{
    config::next_grow_size,
    group::{Group, EMPTY, GROUP_WIDTH},
    hash::{control_byte, hash_key},
    id_space::IdSpace,
    iter::{Entry, SlotIter, Slots},
    lease::MemoryContext,
    memory::{MemoryAccountant, OutOfMemory},
    page::{pages_for, PagePool, PagedArray},
    small_core::SmallCore,
    status::{BigCoreStatus, Status},
};

/// Swiss table style core.
///
/// Each slot has a control byte that is either [`EMPTY`] or the top 7 bits of the stored key's
/// hash. The control array has `capacity + GROUP_WIDTH` bytes, the tail mirrors the first
/// `GROUP_WIDTH` bytes, so a group can be loaded at any slot without wrapping. Keys and ids live
/// in separate paged arrays.
///
/// Keys are never removed, so the first group along a probe sequence that contains an empty slot
/// terminates both lookups and inserts.
pub(crate) struct BigCore {
    control: Box<[u8]>,
    keys: PagedArray<u64>,
    ids: PagedArray<u32>,
    mask: usize,
    size: usize,
    next_grow_size: usize,
    fill_factor: f64,
    grow_count: usize,
    insert_probes: usize,
}

/// Group positions visited for a hash, advancing by triangular multiples of the group width.
struct ProbeSeq {
    pos: usize,
    stride: usize,
}

impl ProbeSeq {
    #[inline(always)]
    fn new(hash: u64, mask: usize) -> Self {
        Self {
            pos: hash as usize & mask,
            stride: 0,
        }
    }

    #[inline(always)]
    fn advance(&mut self, mask: usize) {
        self.stride += GROUP_WIDTH;
        self.pos = (self.pos + self.stride) & mask;
    }
}

impl BigCore {
    /// Leases storage for an empty core of `capacity` slots.
    ///
    /// Everything leased so far is released again when a later charge is refused.
    pub fn new<P: PagePool, M: MemoryAccountant>(
        context: &MemoryContext<P, M>,
        capacity: usize,
        fill_factor: f64,
        grow_count: usize,
    ) -> Result<Self, OutOfMemory> {
        assert!(capacity.is_power_of_two() && capacity >= GROUP_WIDTH);
        let page_size = context.page_size();

        let keys = context.lease_pages(pages_for::<u64>(page_size, capacity))?;
        let ids = context.lease_pages(pages_for::<u32>(page_size, capacity))?;
        let control = context.lease_bytes(capacity + GROUP_WIDTH, EMPTY)?;

        Ok(Self {
            control: control.commit(),
            keys: PagedArray::from_pages(keys.commit()),
            ids: PagedArray::from_pages(ids.commit()),
            mask: capacity - 1,
            size: 0,
            next_grow_size: next_grow_size(capacity, fill_factor),
            fill_factor,
            grow_count,
            insert_probes: 0,
        })
    }

    /// Builds the core replacing a full small core, leaving the small core untouched.
    pub fn from_small<P: PagePool, M: MemoryAccountant>(
        context: &MemoryContext<P, M>,
        small: &SmallCore,
        fill_factor: f64,
    ) -> Result<Self, OutOfMemory> {
        let entries = small.iter();
        let capacity = capacity_for(
            (small.capacity() * 2).max(GROUP_WIDTH),
            entries.len(),
            fill_factor,
        );
        let mut core = Self::new(context, capacity, fill_factor, 1)?;
        core.rehash(entries);
        Ok(core)
    }

    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    fn rehash(&mut self, entries: impl Iterator<Item = Entry>) {
        for Entry { key, id } in entries {
            self.insert(hash_key(key), key, id);
        }
        debug_assert!(self.size < self.next_grow_size);
    }

    #[inline]
    pub fn find(&self, hash: u64, key: i64) -> Option<u32> {
        let needle = control_byte(hash);
        let mut probe = ProbeSeq::new(hash, self.mask);
        loop {
            let group = Group::load(&self.control, probe.pos);
            for offset in group.match_byte(needle) {
                let slot = (probe.pos + offset) & self.mask;
                if self.keys.get(slot) == key as u64 {
                    return Some(self.ids.get(slot));
                }
            }
            if group.match_empty().any() {
                return None;
            }
            probe.advance(self.mask);
        }
    }

    /// Returns the id of `key`, assigning a new one if the key is absent.
    ///
    /// Grows before inserting when the insert would reach `next_grow_size`. When the grow fails,
    /// the core is left as it was and no id is allocated.
    #[inline]
    pub fn add<P: PagePool, M: MemoryAccountant>(
        &mut self,
        context: &MemoryContext<P, M>,
        id_space: &IdSpace,
        hash: u64,
        key: i64,
    ) -> Result<u32, OutOfMemory> {
        if let Some(id) = self.find(hash, key) {
            return Ok(id);
        }
        if self.size + 1 >= self.next_grow_size {
            self.grow(context)?;
        }
        let id = id_space.next();
        self.insert(hash, key, id);
        Ok(id)
    }

    /// Stores a key known to be absent.
    pub fn insert(&mut self, hash: u64, key: i64, id: u32) {
        let mut probe = ProbeSeq::new(hash, self.mask);
        let slot = loop {
            if let Some(offset) = Group::load(&self.control, probe.pos).match_empty().lowest() {
                break (probe.pos + offset) & self.mask;
            }
            self.insert_probes += 1;
            probe.advance(self.mask);
        };

        self.keys.set(slot, key as u64);
        self.ids.set(slot, id);
        self.set_control(slot, control_byte(hash));
        self.size += 1;
    }

    #[inline(always)]
    fn set_control(&mut self, slot: usize, byte: u8) {
        self.control[slot] = byte;
        if slot < GROUP_WIDTH {
            let capacity = self.capacity();
            self.control[capacity + slot] = byte;
        }
    }

    /// Replaces this core with one of at least twice the capacity holding the same entries, with
    /// room for one more.
    fn grow<P: PagePool, M: MemoryAccountant>(
        &mut self,
        context: &MemoryContext<P, M>,
    ) -> Result<(), OutOfMemory> {
        let capacity = capacity_for(double(self.capacity()), self.size + 1, self.fill_factor);
        let mut grown = Self::new(context, capacity, self.fill_factor, self.grow_count + 1)?;
        grown.rehash(self.iter());
        std::mem::replace(self, grown).close(context);
        log::debug!("grew {}", Status::Big(self.status()));
        Ok(())
    }

    pub fn iter(&self) -> SlotIter<'_, Self> {
        SlotIter::new(self)
    }

    pub fn status(&self) -> BigCoreStatus {
        BigCoreStatus {
            grow_count: self.grow_count,
            capacity: self.capacity(),
            size: self.size,
            next_grow_size: self.next_grow_size,
            insert_probes: self.insert_probes,
            key_pages: self.keys.page_count(),
            id_pages: self.ids.page_count(),
        }
    }

    pub fn close<P: PagePool, M: MemoryAccountant>(self, context: &MemoryContext<P, M>) {
        context.release_bytes(self.control);
        context.release_pages(self.keys.into_pages());
        context.release_pages(self.ids.into_pages());
    }
}

fn double(capacity: usize) -> usize {
    capacity.checked_mul(2).expect("big core capacity overflow")
}

/// Smallest power of two multiple of `capacity` whose grow size exceeds `len`.
///
/// With low fill factors this may take several doublings.
fn capacity_for(mut capacity: usize, len: usize, fill_factor: f64) -> usize {
    while next_grow_size(capacity, fill_factor) <= len {
        capacity = double(capacity);
    }
    capacity
}

impl Slots for BigCore {
    fn slot_count(&self) -> usize {
        self.capacity()
    }

    fn len(&self) -> usize {
        self.size
    }

    #[inline]
    fn entry(&self, slot: usize) -> Option<Entry> {
        (self.control[slot] != EMPTY).then(|| Entry {
            key: self.keys.get(slot) as i64,
            id: self.ids.get(slot),
        })
    }
}
