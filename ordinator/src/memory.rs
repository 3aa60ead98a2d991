//! Byte budget accounting for table storage.
use std::{
    fmt,
    rc::Rc,
    sync::{
        atomic::{AtomicUsize, Ordering::Relaxed},
        Arc,
    },
};

/// Returned when a [`MemoryAccountant`] refuses to charge an allocation.
///
/// This is the only recoverable error produced by this crate. An embedding query engine is
/// expected to abort the aggregation that triggered it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutOfMemory {
    /// Number of bytes the refused charge asked for.
    pub requested: usize,
    /// Number of bytes charged at the time of the refusal.
    pub used: usize,
    /// Budget of the refusing accountant.
    pub limit: usize,
}

impl fmt::Display for OutOfMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "out of memory: requested {} bytes with {} of {} bytes in use",
            self.requested, self.used, self.limit
        )
    }
}

impl std::error::Error for OutOfMemory {}

/// Budget tracker that has to approve every allocation made for table storage.
///
/// Implementations must leave their state unchanged when refusing a charge.
pub trait MemoryAccountant {
    /// Charges `bytes` against the budget.
    fn charge(&self, bytes: usize) -> Result<(), OutOfMemory>;

    /// Credits back `bytes` that were previously charged.
    fn release(&self, bytes: usize);
}

impl<T: MemoryAccountant + ?Sized> MemoryAccountant for &T {
    fn charge(&self, bytes: usize) -> Result<(), OutOfMemory> {
        (**self).charge(bytes)
    }

    fn release(&self, bytes: usize) {
        (**self).release(bytes)
    }
}

impl<T: MemoryAccountant + ?Sized> MemoryAccountant for Rc<T> {
    fn charge(&self, bytes: usize) -> Result<(), OutOfMemory> {
        (**self).charge(bytes)
    }

    fn release(&self, bytes: usize) {
        (**self).release(bytes)
    }
}

impl<T: MemoryAccountant + ?Sized> MemoryAccountant for Arc<T> {
    fn charge(&self, bytes: usize) -> Result<(), OutOfMemory> {
        (**self).charge(bytes)
    }

    fn release(&self, bytes: usize) {
        (**self).release(bytes)
    }
}

/// A [`MemoryAccountant`] with a fixed byte limit.
#[derive(Debug)]
pub struct BudgetAccountant {
    limit: usize,
    used: AtomicUsize,
    peak: AtomicUsize,
}

impl Default for BudgetAccountant {
    fn default() -> Self {
        Self::unlimited()
    }
}

impl BudgetAccountant {
    /// Constructs an accountant that refuses charges exceeding `limit` bytes in total.
    pub const fn new(limit: usize) -> Self {
        Self {
            limit,
            used: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Constructs an accountant that never refuses a charge but still tracks usage.
    pub const fn unlimited() -> Self {
        Self::new(usize::MAX)
    }

    /// The byte limit.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Bytes currently charged.
    pub fn used(&self) -> usize {
        self.used.load(Relaxed)
    }

    /// Highest number of bytes charged at any point so far.
    pub fn peak(&self) -> usize {
        self.peak.load(Relaxed)
    }
}

impl MemoryAccountant for BudgetAccountant {
    fn charge(&self, bytes: usize) -> Result<(), OutOfMemory> {
        match self.used.fetch_update(Relaxed, Relaxed, |used| {
            used.checked_add(bytes).filter(|&total| total <= self.limit)
        }) {
            Ok(used) => {
                self.peak.fetch_max(used + bytes, Relaxed);
                Ok(())
            }
            Err(used) => {
                log::warn!(
                    "refusing charge of {bytes} bytes, {used} of {} bytes in use",
                    self.limit
                );
                Err(OutOfMemory {
                    requested: bytes,
                    used,
                    limit: self.limit,
                })
            }
        }
    }

    fn release(&self, bytes: usize) {
        let previous = self.used.fetch_sub(bytes, Relaxed);
        assert!(previous >= bytes, "released more bytes than were charged");
    }
}
