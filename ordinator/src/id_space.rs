//! Monotonic source of ordinals that may be shared between sibling tables.
use std::sync::atomic::{AtomicU32, Ordering::Relaxed};

/// Id value reserved as the "empty slot" marker of the small core. Never allocated.
pub(crate) const RESERVED_ID: u32 = u32::MAX;

/// Hands out dense, strictly increasing ids.
///
/// All [`Ordinator`][crate::Ordinator]s constructed with the same `IdSpace` (usually via an
/// [`Arc`][std::sync::Arc]) draw from one counter, so their ids never collide. Ids are never
/// reused or revoked.
#[derive(Debug, Default)]
pub struct IdSpace {
    first: u32,
    counter: AtomicU32,
}

impl IdSpace {
    /// Constructs an id space whose first id is `0`.
    pub const fn new() -> Self {
        Self::starting_at(0)
    }

    /// Constructs an id space whose first id is `first`.
    pub const fn starting_at(first: u32) -> Self {
        assert!(first < RESERVED_ID, "id space exhausted");
        Self {
            first,
            counter: AtomicU32::new(first),
        }
    }

    /// Allocates the next id.
    ///
    /// # Panics
    /// Panics when the id space is exhausted. This is treated as an invariant violation, not as a
    /// recoverable condition.
    pub fn next(&self) -> u32 {
        match self.counter.fetch_update(Relaxed, Relaxed, |current| {
            current.checked_add(1).filter(|&next| next <= RESERVED_ID)
        }) {
            Ok(id) => id,
            Err(_) => panic!("id space exhausted"),
        }
    }

    /// Returns the id that would be allocated by the next call to [`next`][Self::next].
    pub fn peek(&self) -> u32 {
        self.counter.load(Relaxed)
    }

    /// Returns the number of ids allocated so far.
    pub fn allocated(&self) -> u32 {
        self.peek() - self.first
    }
}
