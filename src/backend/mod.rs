//! Page backends: pluggable suppliers of the raw pages pools carve up.
//!
//! A backend hands out fixed-size, page-aligned blocks and takes them back.
//! It may fail under memory pressure; the pool treats a `None` from
//! [`PageBackend::alloc_page`] as a recoverable exhaustion condition. Pools
//! always call into the backend with their own lock released, so a backend
//! is free to block or take locks of its own.

mod syscall;
mod system;

pub use system::{SystemPageBackend, SYSTEM_PAGE_SIZE};

use core::alloc::Layout;
use core::ptr::NonNull;

/// A supplier of fixed-size raw pages.
///
/// # Contract
///
/// - [`page_size`](Self::page_size) is constant for the lifetime of the
///   backend and is a power of two.
/// - Pages returned by [`alloc_page`](Self::alloc_page) are aligned to
///   `page_size`. Pools rely on this to locate in-page bookkeeping by
///   masking item addresses.
/// - A backend must be safe to call concurrently from several pools and
///   threads.
pub trait PageBackend: Send + Sync {
    /// The fixed size (and alignment) of pages this backend supplies.
    fn page_size(&self) -> usize;

    /// Allocates one page, or `None` under memory pressure.
    fn alloc_page(&self) -> Option<NonNull<u8>>;

    /// Returns a page to the backend.
    ///
    /// # Safety
    ///
    /// `page` must have come from [`alloc_page`](Self::alloc_page) on this
    /// same backend and must not be used afterwards.
    unsafe fn dealloc_page(&self, page: NonNull<u8>);
}

/// A page backend drawing from the process global allocator.
#[derive(Debug, Clone, Copy)]
pub struct GlobalPageBackend {
    page_size: usize,
}

impl GlobalPageBackend {
    /// Creates a backend supplying `page_size`-byte pages.
    ///
    /// # Panics
    ///
    /// Panics if `page_size` is not a power of two or is smaller than
    /// 128 bytes (too small to hold in-page bookkeeping plus a single item).
    pub fn new(page_size: usize) -> Self {
        assert!(
            page_size.is_power_of_two(),
            "page size {page_size} is not a power of two"
        );
        assert!(page_size >= 128, "page size {page_size} is too small");
        Self { page_size }
    }

    fn layout(&self) -> Layout {
        // SAFETY: page_size is a non-zero power of two, checked in new().
        unsafe { Layout::from_size_align_unchecked(self.page_size, self.page_size) }
    }
}

impl PageBackend for GlobalPageBackend {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn alloc_page(&self) -> Option<NonNull<u8>> {
        // SAFETY: the layout has non-zero size.
        let ptr = unsafe { std::alloc::alloc(self.layout()) };
        NonNull::new(ptr)
    }

    unsafe fn dealloc_page(&self, page: NonNull<u8>) {
        std::alloc::dealloc(page.as_ptr(), self.layout());
    }
}
