//! Charged leases of pages and byte arrays that are rolled back unless committed.
use std::mem::take;

use crate::{
    memory::{MemoryAccountant, OutOfMemory},
    page::{Page, PagePool},
};

/// The page pool and memory accountant backing the cores of one ordinator.
pub(crate) struct MemoryContext<P, M> {
    pool: P,
    accountant: M,
}

impl<P: PagePool, M: MemoryAccountant> MemoryContext<P, M> {
    pub fn new(pool: P, accountant: M) -> Self {
        Self { pool, accountant }
    }

    pub fn page_size(&self) -> usize {
        self.pool.page_size()
    }

    /// Charges and leases `count` pages.
    ///
    /// When a charge is refused, all pages leased by this call are released before returning.
    pub fn lease_pages(&self, count: usize) -> Result<PageLease<'_, P, M>, OutOfMemory> {
        let page_size = self.page_size();
        let mut lease = PageLease {
            context: self,
            pages: Vec::with_capacity(count),
        };
        for _ in 0..count {
            self.accountant.charge(page_size)?;
            lease.pages.push(self.pool.lend_page());
        }
        log::trace!("leased {count} pages of {page_size} bytes");
        Ok(lease)
    }

    /// Releases pages and refunds their charge.
    pub fn release_pages(&self, pages: Vec<Page>) {
        let count = pages.len();
        for page in pages {
            let len = page.len();
            self.pool.release(page);
            self.accountant.release(len);
        }
        if count > 0 {
            log::trace!("released {count} pages");
        }
    }

    /// Charges and allocates a byte array of `len` bytes initialized to `fill`.
    pub fn lease_bytes(&self, len: usize, fill: u8) -> Result<ByteLease<'_, P, M>, OutOfMemory> {
        self.accountant.charge(len)?;
        Ok(ByteLease {
            context: self,
            bytes: vec![fill; len].into_boxed_slice(),
        })
    }

    /// Frees a byte array and refunds its charge.
    pub fn release_bytes(&self, bytes: Box<[u8]>) {
        self.accountant.release(bytes.len());
    }

    pub fn accountant(&self) -> &M {
        &self.accountant
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }
}

/// Pages that are returned to the pool when dropped before being committed.
pub(crate) struct PageLease<'a, P: PagePool, M: MemoryAccountant> {
    context: &'a MemoryContext<P, M>,
    pages: Vec<Page>,
}

impl<P: PagePool, M: MemoryAccountant> Drop for PageLease<'_, P, M> {
    fn drop(&mut self) {
        self.context.release_pages(take(&mut self.pages));
    }
}

impl<P: PagePool, M: MemoryAccountant> PageLease<'_, P, M> {
    pub fn commit(mut self) -> Vec<Page> {
        take(&mut self.pages)
    }
}

/// A byte array whose charge is refunded when dropped before being committed.
pub(crate) struct ByteLease<'a, P: PagePool, M: MemoryAccountant> {
    context: &'a MemoryContext<P, M>,
    bytes: Box<[u8]>,
}

impl<P: PagePool, M: MemoryAccountant> Drop for ByteLease<'_, P, M> {
    fn drop(&mut self) {
        self.context.release_bytes(take(&mut self.bytes));
    }
}

impl<P: PagePool, M: MemoryAccountant> ByteLease<'_, P, M> {
    pub fn commit(mut self) -> Box<[u8]> {
        take(&mut self.bytes)
    }
}
