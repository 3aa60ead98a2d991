//! Point-in-time snapshots of an ordinator's active core.
use core::fmt;

/// Snapshot of a small core.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SmallCoreStatus {
    /// Number of transitions and grows so far, always zero for a small core.
    pub grow_count: usize,
    /// Number of slots.
    pub capacity: usize,
    /// Number of stored keys.
    pub size: usize,
    /// Size that triggers the transition to a big core.
    pub next_grow_size: usize,
}

/// Snapshot of a big core.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BigCoreStatus {
    /// Number of transitions and grows so far.
    pub grow_count: usize,
    /// Number of slots.
    pub capacity: usize,
    /// Number of stored keys.
    pub size: usize,
    /// Size that triggers the next grow.
    pub next_grow_size: usize,
    /// Extra probe rounds taken by inserts into this core, ideally close to zero.
    pub insert_probes: usize,
    /// Number of pages holding keys.
    pub key_pages: usize,
    /// Number of pages holding ids.
    pub id_pages: usize,
}

/// Snapshot of whichever core is active.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    #[allow(missing_docs)]
    Small(SmallCoreStatus),
    #[allow(missing_docs)]
    Big(BigCoreStatus),
}

impl Status {
    /// Number of transitions and grows so far.
    pub fn grow_count(&self) -> usize {
        match self {
            Status::Small(status) => status.grow_count,
            Status::Big(status) => status.grow_count,
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        match self {
            Status::Small(status) => status.capacity,
            Status::Big(status) => status.capacity,
        }
    }

    /// Number of stored keys.
    pub fn size(&self) -> usize {
        match self {
            Status::Small(status) => status.size,
            Status::Big(status) => status.size,
        }
    }

    /// Size that triggers the next transition or grow.
    pub fn next_grow_size(&self) -> usize {
        match self {
            Status::Small(status) => status.next_grow_size,
            Status::Big(status) => status.next_grow_size,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Small(status) => write!(
                f,
                "small core: size={} capacity={} next_grow_size={}",
                status.size, status.capacity, status.next_grow_size
            ),
            Status::Big(status) => write!(
                f,
                "big core: size={} capacity={} next_grow_size={} grow_count={} \
                 insert_probes={} key_pages={} id_pages={}",
                status.size,
                status.capacity,
                status.next_grow_size,
                status.grow_count,
                status.insert_probes,
                status.key_pages,
                status.id_pages
            ),
        }
    }
}
