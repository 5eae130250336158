#![allow(dead_code)]

use core::ptr::NonNull;
use corral::PageBackend;
use std::alloc::{alloc, dealloc, Layout};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

struct BackendState {
    page_size: usize,
    max_pages: usize,
    live: AtomicUsize,
    allocated: AtomicUsize,
    freed: AtomicUsize,
    refuse: AtomicBool,
}

/// A page backend over the global allocator with a page budget, a failure
/// switch, and counters. Clones share state, so a handle kept outside the
/// pool observes everything the pool does.
#[derive(Clone)]
pub struct TestBackend {
    state: Arc<BackendState>,
}

impl TestBackend {
    pub fn new(page_size: usize, max_pages: usize) -> Self {
        Self {
            state: Arc::new(BackendState {
                page_size,
                max_pages,
                live: AtomicUsize::new(0),
                allocated: AtomicUsize::new(0),
                freed: AtomicUsize::new(0),
                refuse: AtomicBool::new(false),
            }),
        }
    }

    pub fn unlimited(page_size: usize) -> Self {
        Self::new(page_size, usize::MAX)
    }

    /// While set, every allocation fails regardless of the budget.
    pub fn set_refuse(&self, refuse: bool) {
        self.state.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn allocated(&self) -> usize {
        self.state.allocated.load(Ordering::SeqCst)
    }

    pub fn freed(&self) -> usize {
        self.state.freed.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.state.live.load(Ordering::SeqCst)
    }

    fn layout(&self) -> Layout {
        Layout::from_size_align(self.state.page_size, self.state.page_size).expect("page layout")
    }
}

impl PageBackend for TestBackend {
    fn page_size(&self) -> usize {
        self.state.page_size
    }

    fn alloc_page(&self) -> Option<NonNull<u8>> {
        if self.state.refuse.load(Ordering::SeqCst) {
            return None;
        }
        if self
            .state
            .live
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |live| {
                (live < self.state.max_pages).then_some(live + 1)
            })
            .is_err()
        {
            return None;
        }
        // SAFETY: the layout has non-zero size.
        let page = NonNull::new(unsafe { alloc(self.layout()) });
        if page.is_some() {
            self.state.allocated.fetch_add(1, Ordering::SeqCst);
        } else {
            self.state.live.fetch_sub(1, Ordering::SeqCst);
        }
        page
    }

    unsafe fn dealloc_page(&self, page: NonNull<u8>) {
        dealloc(page.as_ptr(), self.layout());
        self.state.live.fetch_sub(1, Ordering::SeqCst);
        self.state.freed.fetch_add(1, Ordering::SeqCst);
    }
}
