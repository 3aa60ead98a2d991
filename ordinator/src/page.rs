//! Fixed-size pages lent by a pool and arrays of fixed-width elements spread over them.
use core::fmt;
use std::{marker::PhantomData, rc::Rc, sync::Arc, sync::Mutex};

/// Page size used by [`HeapPagePool::default`].
pub const DEFAULT_PAGE_SIZE: usize = 1 << 14;

/// Smallest page size accepted by [`HeapPagePool`].
pub const MIN_PAGE_SIZE: usize = 64;

/// A fixed-size byte buffer lent from a [`PagePool`].
///
/// The contents of a freshly lent page are unspecified, recycled pages keep whatever their
/// previous user wrote.
pub struct Page {
    bytes: Box<[u8]>,
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page").field("len", &self.len()).finish()
    }
}

impl Page {
    /// Allocates a new zeroed page of `size` bytes.
    pub fn zeroed(size: usize) -> Self {
        Self {
            bytes: vec![0; size].into_boxed_slice(),
        }
    }

    /// The size of this page in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the page has no bytes, never the case for pages lent by a pool.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Overwrites every byte of the page.
    pub fn fill(&mut self, byte: u8) {
        self.bytes.fill(byte)
    }

    /// Reads a native-endian `u64` at byte `offset`.
    #[inline(always)]
    pub fn read_u64(&self, offset: usize) -> u64 {
        let mut buf = [0; 8];
        buf.copy_from_slice(&self.bytes[offset..offset + 8]);
        u64::from_ne_bytes(buf)
    }

    /// Writes a native-endian `u64` at byte `offset`.
    #[inline(always)]
    pub fn write_u64(&mut self, offset: usize, value: u64) {
        self.bytes[offset..offset + 8].copy_from_slice(&value.to_ne_bytes())
    }

    /// Reads a native-endian `u32` at byte `offset`.
    #[inline(always)]
    pub fn read_u32(&self, offset: usize) -> u32 {
        let mut buf = [0; 4];
        buf.copy_from_slice(&self.bytes[offset..offset + 4]);
        u32::from_ne_bytes(buf)
    }

    /// Writes a native-endian `u32` at byte `offset`.
    #[inline(always)]
    pub fn write_u32(&mut self, offset: usize, value: u32) {
        self.bytes[offset..offset + 4].copy_from_slice(&value.to_ne_bytes())
    }
}

/// Lends and reclaims fixed-size [`Page`]s.
///
/// All pages lent by a pool have the same power-of-two size. Lending itself never fails, the
/// budget for a page is charged to a [`MemoryAccountant`][crate::MemoryAccountant] beforehand.
pub trait PagePool {
    /// Size of every page lent by this pool.
    fn page_size(&self) -> usize;

    /// Lends a page.
    fn lend_page(&self) -> Page;

    /// Returns a page to the pool.
    fn release(&self, page: Page);
}

impl<T: PagePool + ?Sized> PagePool for &T {
    fn page_size(&self) -> usize {
        (**self).page_size()
    }

    fn lend_page(&self) -> Page {
        (**self).lend_page()
    }

    fn release(&self, page: Page) {
        (**self).release(page)
    }
}

impl<T: PagePool + ?Sized> PagePool for Rc<T> {
    fn page_size(&self) -> usize {
        (**self).page_size()
    }

    fn lend_page(&self) -> Page {
        (**self).lend_page()
    }

    fn release(&self, page: Page) {
        (**self).release(page)
    }
}

impl<T: PagePool + ?Sized> PagePool for Arc<T> {
    fn page_size(&self) -> usize {
        (**self).page_size()
    }

    fn lend_page(&self) -> Page {
        (**self).lend_page()
    }

    fn release(&self, page: Page) {
        (**self).release(page)
    }
}

#[derive(Default)]
struct FreeList {
    pages: Vec<Page>,
    outstanding: usize,
    lent: usize,
    recycled: usize,
}

/// A [`PagePool`] backed by the global allocator that keeps released pages for reuse.
pub struct HeapPagePool {
    page_size: usize,
    max_retained: usize,
    free: Mutex<FreeList>,
}

impl fmt::Debug for HeapPagePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapPagePool")
            .field("page_size", &self.page_size)
            .field("outstanding", &self.outstanding())
            .field("retained", &self.retained())
            .finish()
    }
}

impl Default for HeapPagePool {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl HeapPagePool {
    /// Constructs a pool of `page_size` byte pages that retains up to 64 released pages.
    pub fn new(page_size: usize) -> Self {
        Self::with_max_retained(page_size, 64)
    }

    /// Constructs a pool that retains up to `max_retained` released pages for reuse.
    ///
    /// # Panics
    /// Panics unless `page_size` is a power of two no smaller than [`MIN_PAGE_SIZE`].
    pub fn with_max_retained(page_size: usize, max_retained: usize) -> Self {
        assert!(
            page_size.is_power_of_two() && page_size >= MIN_PAGE_SIZE,
            "page size must be a power of two of at least {MIN_PAGE_SIZE} bytes"
        );
        Self {
            page_size,
            max_retained,
            free: Default::default(),
        }
    }

    fn free_list(&self) -> std::sync::MutexGuard<'_, FreeList> {
        // A panic while holding the lock can't leave the free list inconsistent.
        self.free.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of pages currently lent out.
    pub fn outstanding(&self) -> usize {
        self.free_list().outstanding
    }

    /// Number of released pages kept for reuse.
    pub fn retained(&self) -> usize {
        self.free_list().pages.len()
    }

    /// Total number of pages lent so far.
    pub fn lent(&self) -> usize {
        self.free_list().lent
    }

    /// Number of lent pages that were served from the free list.
    pub fn recycled(&self) -> usize {
        self.free_list().recycled
    }
}

impl PagePool for HeapPagePool {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn lend_page(&self) -> Page {
        let mut free = self.free_list();
        free.outstanding += 1;
        free.lent += 1;
        let recycled = free.pages.pop();
        free.recycled += recycled.is_some() as usize;
        drop(free);
        recycled.unwrap_or_else(|| Page::zeroed(self.page_size))
    }

    fn release(&self, page: Page) {
        assert_eq!(page.len(), self.page_size, "page released to the wrong pool");
        let mut free = self.free_list();
        free.outstanding -= 1;
        if free.pages.len() < self.max_retained {
            free.pages.push(page);
        }
    }
}

/// Fixed-width element that can be stored in a [`PagedArray`].
pub trait Element: Copy {
    /// log2 of the element size in bytes.
    const SHIFT: u32;

    /// Reads an element at byte `offset` of a page.
    fn read(page: &Page, offset: usize) -> Self;

    /// Writes an element at byte `offset` of a page.
    fn write(page: &mut Page, offset: usize, value: Self);
}

impl Element for u64 {
    const SHIFT: u32 = 3;

    #[inline(always)]
    fn read(page: &Page, offset: usize) -> Self {
        page.read_u64(offset)
    }

    #[inline(always)]
    fn write(page: &mut Page, offset: usize, value: Self) {
        page.write_u64(offset, value)
    }
}

impl Element for u32 {
    const SHIFT: u32 = 2;

    #[inline(always)]
    fn read(page: &Page, offset: usize) -> Self {
        page.read_u32(offset)
    }

    #[inline(always)]
    fn write(page: &mut Page, offset: usize, value: Self) {
        page.write_u32(offset, value)
    }
}

/// Number of pages of `page_size` bytes needed to hold `len` elements of type `T`.
pub fn pages_for<T: Element>(page_size: usize, len: usize) -> usize {
    let bytes = len
        .checked_shl(T::SHIFT)
        .filter(|bytes| bytes >> T::SHIFT == len)
        .expect("paged array size overflow");
    bytes.div_ceil(page_size)
}

/// A logical array of fixed-width elements spread over whole pages.
///
/// Element `index` lives in page `index >> per_page_shift` at byte offset
/// `(index & per_page_mask) << T::SHIFT`.
pub struct PagedArray<T> {
    pages: Vec<Page>,
    per_page_shift: u32,
    per_page_mask: usize,
    _phantom: PhantomData<T>,
}

impl<T: Element> PagedArray<T> {
    /// Wraps pages lent from a pool. All pages must have the same power-of-two size.
    pub fn from_pages(pages: Vec<Page>) -> Self {
        let page_size = pages.first().map_or(MIN_PAGE_SIZE, Page::len);
        debug_assert!(page_size.is_power_of_two());
        debug_assert!(pages.iter().all(|page| page.len() == page_size));
        let per_page = page_size >> T::SHIFT;
        Self {
            pages,
            per_page_shift: per_page.trailing_zeros(),
            per_page_mask: per_page - 1,
            _phantom: PhantomData,
        }
    }

    /// Number of elements this array can hold.
    pub fn capacity(&self) -> usize {
        self.pages.len() << self.per_page_shift
    }

    /// Number of backing pages.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Overwrites every byte of every page.
    pub fn fill_bytes(&mut self, byte: u8) {
        for page in &mut self.pages {
            page.fill(byte);
        }
    }

    #[inline(always)]
    fn locate(&self, index: usize) -> (usize, usize) {
        (
            index >> self.per_page_shift,
            (index & self.per_page_mask) << T::SHIFT,
        )
    }

    /// Reads the element at `index`.
    #[inline(always)]
    pub fn get(&self, index: usize) -> T {
        let (page, offset) = self.locate(index);
        T::read(&self.pages[page], offset)
    }

    /// Writes the element at `index`.
    #[inline(always)]
    pub fn set(&mut self, index: usize, value: T) {
        let (page, offset) = self.locate(index);
        T::write(&mut self.pages[page], offset, value)
    }

    /// Gives up the backing pages so they can be returned to their pool.
    pub fn into_pages(self) -> Vec<Page> {
        self.pages
    }
}
