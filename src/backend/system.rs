use core::ptr::NonNull;
use std::sync::{Mutex, PoisonError};

use super::{syscall, PageBackend};

/// The page size supplied by [`SystemPageBackend`].
pub const SYSTEM_PAGE_SIZE: usize = 4096;

const CHUNK_PAGES: usize = 64;

struct PageCache {
    head: *mut u8,
    len: usize,
}

// SAFETY: the cache only stores pages no pool references; access is
// serialized by the mutex around it.
unsafe impl Send for PageCache {}

static PAGE_CACHE: Mutex<PageCache> = Mutex::new(PageCache {
    head: core::ptr::null_mut(),
    len: 0,
});

/// A backend supplying 4 KiB pages straight from the OS.
///
/// Pages are drawn from a process-wide cache refilled in 64-page chunks
/// (`mmap` on Unix, `VirtualAlloc` on Windows), so allocation bursts do not
/// storm the OS with one syscall per page. Freed pages go back to the cache,
/// not the OS; [`trim`](Self::trim) releases cached pages where the platform
/// can unmap piecewise.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPageBackend;

impl SystemPageBackend {
    /// Creates the backend. All instances share one page cache.
    pub const fn new() -> Self {
        Self
    }

    /// Releases cached pages back to the OS.
    ///
    /// Returns the number of pages released. Windows regions must be
    /// released whole, so there the cache is retained and this returns 0.
    pub fn trim() -> usize {
        #[cfg(unix)]
        {
            let mut cache = lock_cache();
            let mut freed = 0;
            while !cache.head.is_null() {
                let page = cache.head;
                // SAFETY: every cached page starts with a link to the next.
                unsafe {
                    cache.head = *page.cast::<*mut u8>();
                    syscall::free_region(page, SYSTEM_PAGE_SIZE);
                }
                freed += 1;
            }
            cache.len = 0;
            freed
        }
        #[cfg(not(unix))]
        {
            0
        }
    }

    /// Number of pages currently sitting in the shared cache.
    pub fn cached_pages() -> usize {
        lock_cache().len
    }
}

fn lock_cache() -> std::sync::MutexGuard<'static, PageCache> {
    PAGE_CACHE.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PageBackend for SystemPageBackend {
    fn page_size(&self) -> usize {
        SYSTEM_PAGE_SIZE
    }

    fn alloc_page(&self) -> Option<NonNull<u8>> {
        {
            let mut cache = lock_cache();
            if !cache.head.is_null() {
                let page = cache.head;
                // SAFETY: every cached page starts with a link to the next.
                unsafe { cache.head = *page.cast::<*mut u8>() };
                cache.len -= 1;
                return NonNull::new(page);
            }
        }

        // Cache empty: map a fresh chunk, keep the first page, cache the rest.
        // SAFETY: requesting a fresh anonymous mapping.
        let chunk = unsafe { syscall::allocate_region(CHUNK_PAGES * SYSTEM_PAGE_SIZE)? };
        let mut cache = lock_cache();
        for i in 1..CHUNK_PAGES {
            // SAFETY: `i` stays within the chunk just mapped.
            unsafe {
                let page = chunk.add(i * SYSTEM_PAGE_SIZE);
                *page.cast::<*mut u8>() = cache.head;
                cache.head = page;
            }
        }
        cache.len += CHUNK_PAGES - 1;
        NonNull::new(chunk)
    }

    unsafe fn dealloc_page(&self, page: NonNull<u8>) {
        let mut cache = lock_cache();
        *page.as_ptr().cast::<*mut u8>() = cache.head;
        cache.head = page.as_ptr();
        cache.len += 1;
    }
}
