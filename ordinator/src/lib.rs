//! Hash tables assigning dense ids to `i64` grouping keys.
//!
//! An [`Ordinator`] hands out the next id of its [`IdSpace`] the first time it sees a key and
//! returns the same id for every later occurrence. It starts with a small open addressing table
//! probed with triangular numbers and switches to a growable Swiss table style core that probes
//! 16 control bytes at a time once the small table fills up.
//!
//! All storage is leased in fixed-size pages from a [`PagePool`] after charging a
//! [`MemoryAccountant`], so a query engine can bound the memory used by aggregations. A refused
//! charge surfaces as [`OutOfMemory`] and leaves the ordinator unchanged.
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::undocumented_unsafe_blocks)]
#![warn(missing_docs)]

mod big_core;
mod config;
mod group;
mod hash;
mod id_space;
mod iter;
mod lease;
mod memory;
mod ordinator;
mod small_core;
mod status;

pub mod page;

pub use config::OrdinatorConfig;
pub use group::GROUP_WIDTH;
pub use hash::hash_key;
pub use id_space::IdSpace;
pub use iter::Entry;
pub use memory::{BudgetAccountant, MemoryAccountant, OutOfMemory};
pub use ordinator::{Iter, Ordinator};
pub use page::{HeapPagePool, Page, PagePool, DEFAULT_PAGE_SIZE};
pub use status::{BigCoreStatus, SmallCoreStatus, Status};
