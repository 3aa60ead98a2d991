//! The facade dispatching to the active core.
use core::fmt;
use std::{iter::FusedIterator, mem::replace, sync::Arc};

use crate::{
    big_core::BigCore,
    config::OrdinatorConfig,
    hash::hash_key,
    id_space::IdSpace,
    iter::{Entry, SlotIter},
    lease::MemoryContext,
    memory::{BudgetAccountant, MemoryAccountant, OutOfMemory},
    page::{HeapPagePool, PagePool},
    small_core::SmallCore,
    status::Status,
};

enum Core {
    Small(SmallCore),
    Big(BigCore),
    Closed,
}

#[cold]
#[inline(never)]
fn used_after_close() -> ! {
    panic!("ordinator used after close")
}

/// Assigns dense ids to `i64` keys.
///
/// An ordinator starts out with a small fixed-capacity core. Once that fills up, it transitions
/// to a big core, which then grows by doubling whenever it reaches its fill factor. Both kinds of
/// cores lease their storage from a [`PagePool`] after charging a [`MemoryAccountant`]. Neither
/// the transition nor a grow change the id of any key.
///
/// Dropping an ordinator closes it.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use ordinator::{BudgetAccountant, HeapPagePool, IdSpace, Ordinator};
///
/// let mut ordinator = Ordinator::new(
///     Arc::new(HeapPagePool::default()),
///     Arc::new(BudgetAccountant::unlimited()),
///     Arc::new(IdSpace::new()),
/// )?;
///
/// assert_eq!(ordinator.add(10)?, 0);
/// assert_eq!(ordinator.add(20)?, 1);
/// assert_eq!(ordinator.add(10)?, 0);
/// assert_eq!(ordinator.find(20), Some(1));
/// assert_eq!(ordinator.find(30), None);
/// # Ok::<(), ordinator::OutOfMemory>(())
/// ```
pub struct Ordinator<P: PagePool = Arc<HeapPagePool>, M: MemoryAccountant = Arc<BudgetAccountant>>
{
    context: MemoryContext<P, M>,
    id_space: Arc<IdSpace>,
    big_fill_factor: f64,
    core: Core,
}

impl<P: PagePool, M: MemoryAccountant> fmt::Debug for Ordinator<P, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.core {
            Core::Closed => f.write_str("Ordinator(closed)"),
            _ => f.debug_tuple("Ordinator").field(&self.status()).finish(),
        }
    }
}

impl<P: PagePool, M: MemoryAccountant> Drop for Ordinator<P, M> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<P: PagePool, M: MemoryAccountant> Ordinator<P, M> {
    /// Constructs an ordinator with the default [`OrdinatorConfig`].
    pub fn new(pool: P, accountant: M, id_space: Arc<IdSpace>) -> Result<Self, OutOfMemory> {
        Self::with_config(Default::default(), pool, accountant, id_space)
    }

    /// Constructs an ordinator, leasing the pages of its small core.
    ///
    /// # Panics
    /// Panics when `config` is invalid for the pool's page size.
    pub fn with_config(
        config: OrdinatorConfig,
        pool: P,
        accountant: M,
        id_space: Arc<IdSpace>,
    ) -> Result<Self, OutOfMemory> {
        let context = MemoryContext::new(pool, accountant);
        let capacity = config.small_capacity_for(context.page_size());
        let small = SmallCore::new(&context, capacity, config.small_fill_factor)?;
        Ok(Self {
            context,
            id_space,
            big_fill_factor: config.big_fill_factor,
            core: Core::Small(small),
        })
    }

    /// Returns the id of `key` if it was added before.
    #[inline]
    pub fn find(&self, key: i64) -> Option<u32> {
        let hash = hash_key(key);
        match &self.core {
            Core::Small(small) => small.find(hash, key),
            Core::Big(big) => big.find(hash, key),
            Core::Closed => used_after_close(),
        }
    }

    /// Returns the id of `key`, assigning the next id of the id space if the key is new.
    ///
    /// Fails only when storage for a transition or grow can't be charged, in which case the
    /// ordinator is left unchanged.
    #[inline]
    pub fn add(&mut self, key: i64) -> Result<u32, OutOfMemory> {
        let hash = hash_key(key);
        match &mut self.core {
            Core::Small(small) => match small.probe(hash, key) {
                Ok(id) => Ok(id),
                Err(slot) if !small.is_full() => {
                    let id = self.id_space.next();
                    small.insert_at(slot, key, id);
                    Ok(id)
                }
                Err(_) => {
                    self.transition_to_big_core()?;
                    self.add(key)
                }
            },
            Core::Big(big) => big.add(&self.context, &self.id_space, hash, key),
            Core::Closed => used_after_close(),
        }
    }

    /// Adds every key in order, appending their ids to `ids`.
    ///
    /// Observably the same as calling [`add`][Self::add] for each key. On failure, the ids of
    /// the keys added before the failing one remain appended.
    pub fn add_many(&mut self, keys: &[i64], ids: &mut Vec<u32>) -> Result<(), OutOfMemory> {
        ids.reserve(keys.len());
        let mut rest = keys;
        while let [key, tail @ ..] = rest {
            if let Core::Big(big) = &mut self.core {
                // Once big, the core stays big, so skip the dispatch for the remaining keys.
                for &key in rest {
                    ids.push(big.add(&self.context, &self.id_space, hash_key(key), key)?);
                }
                return Ok(());
            }
            ids.push(self.add(*key)?);
            rest = tail;
        }
        Ok(())
    }

    /// Replaces the small core by a big core holding the same entries.
    ///
    /// The small core is only released after the big core was built successfully.
    #[cold]
    fn transition_to_big_core(&mut self) -> Result<(), OutOfMemory> {
        let Core::Small(small) = &self.core else {
            unreachable!()
        };
        let big = BigCore::from_small(&self.context, small, self.big_fill_factor)?;
        if let Core::Small(small) = replace(&mut self.core, Core::Big(big)) {
            small.close(&self.context);
        }
        log::debug!("transitioned to {}", self.status());
        Ok(())
    }

    /// Iterates over all entries in unspecified order.
    ///
    /// The order may change whenever the ordinator transitions or grows.
    pub fn iter(&self) -> Iter<'_> {
        Iter(match &self.core {
            Core::Small(small) => IterInner::Small(small.iter()),
            Core::Big(big) => IterInner::Big(big.iter()),
            Core::Closed => used_after_close(),
        })
    }

    /// Number of keys added so far.
    pub fn len(&self) -> usize {
        self.status().size()
    }

    /// Whether no key was added so far.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the ordinator already transitioned to a big core.
    pub fn is_big(&self) -> bool {
        match self.core {
            Core::Small(_) => false,
            Core::Big(_) => true,
            Core::Closed => used_after_close(),
        }
    }

    /// Snapshot of the active core.
    pub fn status(&self) -> Status {
        match &self.core {
            Core::Small(small) => Status::Small(small.status()),
            Core::Big(big) => Status::Big(big.status()),
            Core::Closed => used_after_close(),
        }
    }

    /// The id space new ids are drawn from.
    pub fn id_space(&self) -> &Arc<IdSpace> {
        &self.id_space
    }

    /// The pool pages are leased from.
    pub fn pool(&self) -> &P {
        self.context.pool()
    }

    /// The accountant charged for all storage.
    pub fn accountant(&self) -> &M {
        self.context.accountant()
    }

    /// Whether [`close`][Self::close] was called.
    pub fn is_closed(&self) -> bool {
        matches!(self.core, Core::Closed)
    }

    /// Releases all pages and refunds all charges.
    ///
    /// Calling this again has no effect. Any other use of a closed ordinator panics.
    pub fn close(&mut self) {
        match replace(&mut self.core, Core::Closed) {
            Core::Small(small) => small.close(&self.context),
            Core::Big(big) => big.close(&self.context),
            Core::Closed => (),
        }
    }
}

impl<'a, P: PagePool, M: MemoryAccountant> IntoIterator for &'a Ordinator<P, M> {
    type Item = Entry;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

enum IterInner<'a> {
    Small(SlotIter<'a, SmallCore>),
    Big(SlotIter<'a, BigCore>),
}

/// Iterator over the entries of an [`Ordinator`], see [`Ordinator::iter`].
pub struct Iter<'a>(IterInner<'a>);

impl Iterator for Iter<'_> {
    type Item = Entry;

    #[inline]
    fn next(&mut self) -> Option<Entry> {
        match &mut self.0 {
            IterInner::Small(iter) => iter.next(),
            IterInner::Big(iter) => iter.next(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.0 {
            IterInner::Small(iter) => iter.size_hint(),
            IterInner::Big(iter) => iter.size_hint(),
        }
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl FusedIterator for Iter<'_> {}
