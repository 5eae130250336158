//! The pool allocator core.
//!
//! A [`Pool`] manages same-sized items carved out of pages obtained from a
//! [`PageBackend`]. Pages are partitioned into three intrusive lists -
//! empty, partial, full - and every owned page is on exactly one of them at
//! all times. Allocation prefers partially used pages (keeping hot pages
//! hot), falls back to idle ones, and grows by a page only when neither has
//! a free slot and the hard limit permits.
//!
//! One lock guards all pool state; a second, independent lock guards only
//! the asynchronous request queue, so satisfying a queued request from `put`
//! never nests the two.

mod page;
pub(crate) mod registry;
mod request;
mod stats;


pub use request::{PoolRequest, RequestId};
pub use stats::PoolInfo;

use core::fmt;
use core::ptr::NonNull;
use std::collections::BTreeMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bitflags::bitflags;
use crossbeam_utils::CachePadded;
use thiserror::Error;

use crate::backend::PageBackend;
use crate::sync::{Ipl, IplMutex, IplMutexGuard};
use page::{PageHeader, PageLayout, PageList, Placement};
use request::RequestQueue;
use stats::PoolStats;

bitflags! {
    /// Pool behavior flags.
    ///
    /// [`WAIT`](Self::WAIT), [`LIMITFAIL`](Self::LIMITFAIL) and
    /// [`ZERO`](Self::ZERO) are per-call flags for [`Pool::get`];
    /// [`CHECK`](Self::CHECK) and [`OFFPAGE`](Self::OFFPAGE) are fixed at
    /// creation and ignored by `get`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PoolFlags: u32 {
        /// Block until an item can be delivered instead of failing.
        const WAIT = 1 << 0;
        /// Together with `WAIT`: still fail immediately when the failure is
        /// the hard limit rather than backend pressure.
        const LIMITFAIL = 1 << 1;
        /// Zero the item before returning it.
        const ZERO = 1 << 2;
        /// Stamp freed items with a fill pattern, verify it on reuse, and
        /// detect double frees. Costs a pass over the item per cycle.
        const CHECK = 1 << 3;
        /// Keep page headers out of the pages themselves even for small
        /// items, for pages that must stay free of allocator bookkeeping.
        const OFFPAGE = 1 << 4;
    }
}

impl PoolFlags {
    const CREATION: PoolFlags = PoolFlags::CHECK.union(PoolFlags::OFFPAGE);
}

/// Exhaustion conditions reported by [`Pool::get`] and [`Pool::prime`].
///
/// Both are recoverable by the caller (retry, block, or propagate). Misuse -
/// wrong-pool puts, double frees, teardown with items outstanding - is not
/// an error value but a panic; see the crate-level documentation.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// The pool's hard limit on outstanding items is reached.
    #[error("pool `{pool}`: hard limit of {limit} outstanding items reached")]
    LimitReached {
        /// Name of the pool that refused the allocation.
        pool: &'static str,
        /// The configured limit.
        limit: usize,
    },
    /// The page backend could not supply a page.
    #[error("pool `{pool}`: page backend allocation failed")]
    BackendFailed {
        /// Name of the pool that refused the allocation.
        pool: &'static str,
    },
}

/// Mutable pool state. Everything here is guarded by the pool lock.
struct PoolInner {
    /// Fully free pages.
    empty: PageList,
    /// Pages with both used and free slots; the head is the page favored
    /// for the next allocation.
    partial: PageList,
    /// Fully allocated pages.
    full: PageList,
    /// Detached headers indexed by page base address. Unused (and empty)
    /// for embedded placement.
    detached: BTreeMap<usize, NonNull<PageHeader>>,
    npages: usize,
    /// Items currently held by callers.
    nout: usize,
    /// Items currently free.
    nitems: usize,
    /// Color offset the next page will get.
    color: usize,
    minitems: usize,
    minpages: usize,
    /// Pages above this bound are released eagerly when they go idle;
    /// `usize::MAX` means unbounded.
    maxpages: usize,
    /// Cap on outstanding items; 0 means unlimited.
    hardlimit: usize,
    warning: Option<&'static str>,
    ratecap: Duration,
    last_warning: Option<Instant>,
    stats: PoolStats,
}

// SAFETY: the raw header pointers reference pages and boxed headers owned
// exclusively by this pool; they are only dereferenced under the pool lock.
unsafe impl Send for PoolInner {}

impl PoolInner {
    fn new() -> Self {
        Self {
            empty: PageList::new(),
            partial: PageList::new(),
            full: PageList::new(),
            detached: BTreeMap::new(),
            npages: 0,
            nout: 0,
            nitems: 0,
            color: 0,
            minitems: 0,
            minpages: 0,
            maxpages: usize::MAX,
            hardlimit: 0,
            warning: None,
            ratecap: Duration::ZERO,
            last_warning: None,
            stats: PoolStats::default(),
        }
    }
}

/// What is left of a page once it is stripped from the pool bookkeeping.
/// Disposed of only after the pool lock is released.
struct FreedPage {
    page: NonNull<u8>,
    /// The boxed header, for detached placement.
    header: Option<NonNull<PageHeader>>,
}

pub(crate) struct PoolShared {
    name: &'static str,
    wchan: &'static str,
    pub(crate) serial: u32,
    flags: PoolFlags,
    layout: PageLayout,
    page_size: usize,
    backend: Box<dyn PageBackend>,
    lock: CachePadded<IplMutex<PoolInner>>,
    /// Blocked getters sleep here and re-validate after wakeup.
    item_waiters: Condvar,
    /// Request queue lock, independent of the pool lock.
    requests: CachePadded<Mutex<RequestQueue>>,
}

impl PoolShared {
    fn lock_requests(&self) -> MutexGuard<'_, RequestQueue> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn get(&self, flags: PoolFlags) -> Result<NonNull<u8>, PoolError> {
        let mut inner = self.lock.lock();
        loop {
            // The hard limit caps outstanding items, so it gates every
            // allocation, not just growth.
            if inner.hardlimit != 0 && inner.nout >= inner.hardlimit {
                if flags.contains(PoolFlags::WAIT) && !flags.contains(PoolFlags::LIMITFAIL) {
                    inner = self.sleep(inner);
                    continue;
                }
                inner.stats.nfails += 1;
                self.warn_limit(&mut inner);
                let limit = inner.hardlimit;
                return Err(PoolError::LimitReached {
                    pool: self.name,
                    limit,
                });
            }

            if let Some(item) = self.take_item(&mut inner) {
                inner.stats.ngets += 1;
                drop(inner);
                // SAFETY: the item was just taken off a free list we own.
                unsafe { self.finish_get(item, flags) };
                return Ok(item);
            }

            let (guard, grown) = self.grow(inner);
            inner = guard;
            if !grown {
                if flags.contains(PoolFlags::WAIT) {
                    inner = self.sleep(inner);
                    continue;
                }
                inner.stats.nfails += 1;
                return Err(PoolError::BackendFailed { pool: self.name });
            }
        }
    }

    fn sleep<'a>(&'a self, inner: IplMutexGuard<'a, PoolInner>) -> IplMutexGuard<'a, PoolInner> {
        #[cfg(feature = "tracing")]
        tracing::trace!(pool = self.name, wchan = self.wchan, "blocking until an item frees up");
        inner.wait_on(&self.item_waiters)
    }

    /// Takes one item from the favored page, repartitioning it as needed.
    fn take_item(&self, inner: &mut PoolInner) -> Option<NonNull<u8>> {
        let item_size = self.layout.item_size;
        let (hdr, from_empty) = match inner.partial.head() {
            Some(hdr) => (hdr, false),
            None => (inner.empty.head()?, true),
        };

        // SAFETY: headers on the partitions are live and exclusively owned;
        // the pool lock is held.
        unsafe {
            let (item, now_full) = {
                let header = &mut *hdr.as_ptr();
                let item = header
                    .pop_free(item_size)
                    .expect("page on a non-full partition has a free slot");
                (item, header.is_full())
            };
            if from_empty {
                inner.empty.remove(hdr);
                if now_full {
                    inner.full.push_front(hdr);
                } else {
                    inner.partial.push_front(hdr);
                }
            } else if now_full {
                inner.partial.remove(hdr);
                inner.full.push_front(hdr);
            }
            inner.nout += 1;
            inner.nitems -= 1;
            Some(item)
        }
    }

    /// Post-processing on an item already owned by the caller.
    ///
    /// # Safety
    ///
    /// `item` must have just been taken from this pool.
    unsafe fn finish_get(&self, item: NonNull<u8>, flags: PoolFlags) {
        if self.flags.contains(PoolFlags::CHECK) {
            page::verify_item(item, self.layout.item_size, self.layout.placement, self.name);
        }
        if flags.contains(PoolFlags::ZERO) {
            item.as_ptr().write_bytes(0, self.layout.item_size);
        }
    }

    /// Attaches one fresh backend page. The backend is called with the pool
    /// lock released; the bool reports whether a page was attached.
    fn grow<'a>(
        &'a self,
        mut inner: IplMutexGuard<'a, PoolInner>,
    ) -> (IplMutexGuard<'a, PoolInner>, bool) {
        let color = inner.color;
        inner.color = self.layout.next_color(color);
        drop(inner);

        let Some(new_page) = self.backend.alloc_page() else {
            #[cfg(feature = "tracing")]
            tracing::debug!(pool = self.name, "page backend refused a page");
            return (self.lock.lock(), false);
        };
        debug_assert_eq!(
            new_page.as_ptr() as usize & (self.page_size - 1),
            0,
            "backend returned a misaligned page"
        );

        let hdr = match self.layout.placement {
            // SAFETY: the page is fresh, exclusively ours, and page-aligned
            // per the backend contract.
            Placement::Embedded => unsafe {
                PageHeader::init_embedded(new_page, self.serial, &self.layout, color)
            },
            Placement::Detached => {
                PageHeader::new_detached(new_page, self.serial, &self.layout, color)
            }
        };
        if self.flags.contains(PoolFlags::CHECK) {
            // SAFETY: every slot of the fresh page is free.
            unsafe { hdr.as_ref().stamp_all_free(self.layout.item_size) };
        }

        let mut inner = self.lock.lock();
        if self.layout.placement == Placement::Detached {
            inner.detached.insert(new_page.as_ptr() as usize, hdr);
        }
        // SAFETY: the fresh header is not on any list yet.
        unsafe { inner.empty.push_front(hdr) };
        inner.npages += 1;
        inner.nitems += self.layout.items_per_page;
        inner.stats.npagealloc += 1;
        inner.stats.hiwat_pages = inner.stats.hiwat_pages.max(inner.npages as u64);
        (inner, true)
    }

    /// # Safety
    ///
    /// `item` must have been obtained from this pool and not used after this
    /// call.
    unsafe fn put(&self, item: NonNull<u8>) {
        if !self.lock_requests().is_empty() {
            // A queued request takes the item directly; it never touches
            // the free list, and the callback runs with no locks held.
            // A foreign address must still panic, so validate first.
            self.validate_item(item);
            // Bound to a local so the queue guard is gone before the
            // callback runs.
            let pending = self.lock_requests().pop_front();
            if let Some(request) = pending {
                {
                    let mut inner = self.lock.lock();
                    inner.stats.nputs += 1;
                    inner.stats.ngets += 1;
                    inner.stats.ndelivered += 1;
                }
                request.invoke(item);
                return;
            }
            // The queue drained between the check and the pop; the item
            // goes back the ordinary way.
        }

        self.free_item(item, true);
        self.item_waiters.notify_one();
    }

    /// Panics unless `item` is an item address of this pool.
    fn validate_item(&self, item: NonNull<u8>) {
        let inner = self.lock.lock();
        let hdr = self.lookup_header(&inner, item);
        // SAFETY: the header was just located through this pool's own
        // bookkeeping and the pool lock is held.
        let idx = unsafe { hdr.as_ref().index_of(item, self.layout.item_size) };
        assert!(
            idx.is_some(),
            "pool `{}`: put of {:p}, which is not an item address",
            self.name,
            item.as_ptr()
        );
    }

    /// Returns `item` to its page's free tracking and repartitions the page.
    ///
    /// # Safety
    ///
    /// As for [`put`](Self::put).
    unsafe fn free_item(&self, item: NonNull<u8>, record_put: bool) {
        let item_size = self.layout.item_size;
        let mut inner = self.lock.lock();
        let hdr = self.lookup_header(&inner, item);

        // SAFETY: the header was just located through this pool's own
        // bookkeeping and the pool lock is held.
        let (was_full, now_idle) = {
            let header = &mut *hdr.as_ptr();
            let Some(idx) = header.index_of(item, item_size) else {
                panic!(
                    "pool `{}`: put of {:p}, which is not an item address",
                    self.name,
                    item.as_ptr()
                );
            };
            if self.flags.contains(PoolFlags::CHECK) {
                assert!(
                    !header.slot_is_free(idx, item_size),
                    "pool `{}`: double free of item {:p}",
                    self.name,
                    item.as_ptr()
                );
                page::stamp_item(item, item_size, self.layout.placement);
            }
            let was_full = header.is_full();
            header.push_free(idx, item_size);
            (was_full, header.is_idle())
        };

        inner.nout -= 1;
        inner.nitems += 1;
        if record_put {
            inner.stats.nputs += 1;
        }

        if was_full {
            inner.full.remove(hdr);
        } else {
            inner.partial.remove(hdr);
        }

        if now_idle {
            if inner.npages > inner.maxpages {
                // Above the high-water bound: the page goes straight back.
                let freed = self.release_page(&mut inner, hdr);
                drop(inner);
                self.dispose_page(freed);
                return;
            }
            inner.empty.push_front(hdr);
        } else {
            inner.partial.push_front(hdr);
        }
    }

    /// Resolves the page header owning `item`, or panics on a foreign
    /// address.
    fn lookup_header(&self, inner: &PoolInner, item: NonNull<u8>) -> NonNull<PageHeader> {
        let addr = item.as_ptr() as usize;
        let base = addr & !(self.page_size - 1);
        match self.layout.placement {
            Placement::Embedded => {
                assert!(
                    base != 0,
                    "pool `{}`: put of foreign address {:p}",
                    self.name,
                    item.as_ptr()
                );
                let hdr = base as *mut PageHeader;
                // SAFETY: candidate read through the masked base, exactly
                // like the original address-masked lookup; the magic and
                // serial checks below reject anything that is not one of
                // this pool's pages.
                let owned = unsafe { (*hdr).magic_ok() && (*hdr).serial() == self.serial };
                assert!(
                    owned,
                    "pool `{}`: put of foreign address {:p}",
                    self.name,
                    item.as_ptr()
                );
                // SAFETY: base is non-zero, checked above.
                unsafe { NonNull::new_unchecked(hdr) }
            }
            Placement::Detached => match inner.detached.get(&base) {
                Some(&hdr) => hdr,
                None => panic!(
                    "pool `{}`: put of foreign address {:p}",
                    self.name,
                    item.as_ptr()
                ),
            },
        }
    }

    /// Strips an off-list, idle page from the pool bookkeeping. The returned
    /// [`FreedPage`] must be disposed of after the lock is released.
    fn release_page(&self, inner: &mut PoolInner, hdr: NonNull<PageHeader>) -> FreedPage {
        // SAFETY: hdr is live, idle and off every partition; the pool lock
        // is held.
        let (freed_page, capacity) = unsafe {
            let header = hdr.as_ref();
            debug_assert!(header.is_idle());
            (header.page(), header.capacity() as usize)
        };
        if self.layout.placement == Placement::Detached {
            inner.detached.remove(&(freed_page.as_ptr() as usize));
        }
        inner.npages -= 1;
        inner.nitems -= capacity;
        inner.stats.npagefree += 1;
        FreedPage {
            page: freed_page,
            header: (self.layout.placement == Placement::Detached).then_some(hdr),
        }
    }

    /// Hands a stripped page back to the backend. Called without the pool
    /// lock.
    fn dispose_page(&self, freed: FreedPage) {
        if let Some(hdr) = freed.header {
            // SAFETY: detached headers are boxed at creation and reach here
            // exactly once, after being removed from the tree index.
            drop(unsafe { Box::from_raw(hdr.as_ptr()) });
        }
        // SAFETY: the page came from this backend and no reference to it
        // survives.
        unsafe { self.backend.dealloc_page(freed.page) };
    }

    fn prime(&self, nitems: usize) -> Result<(), PoolError> {
        let mut inner = self.lock.lock();
        while inner.nitems < nitems {
            let (guard, grown) = self.grow(inner);
            inner = guard;
            if !grown {
                return Err(PoolError::BackendFailed { pool: self.name });
            }
        }
        drop(inner);
        self.item_waiters.notify_all();
        self.run_requests();
        Ok(())
    }

    fn reclaim(&self) -> usize {
        let mut freed = Vec::new();
        {
            let mut inner = self.lock.lock();
            while inner.npages > inner.minpages
                && inner.nitems >= inner.minitems + self.layout.items_per_page
            {
                let Some(hdr) = inner.empty.pop_front() else {
                    break;
                };
                let page = self.release_page(&mut inner, hdr);
                freed.push(page);
            }
        }
        let released = freed.len();
        for freed_page in freed {
            self.dispose_page(freed_page);
        }
        #[cfg(feature = "tracing")]
        if released > 0 {
            tracing::debug!(pool = self.name, released, "released idle pages");
        }
        released
    }

    /// Non-blocking get that neither counts a failure nor warns; used by the
    /// request machinery.
    fn try_get_quiet(&self) -> Option<NonNull<u8>> {
        let mut inner = self.lock.lock();
        loop {
            if inner.hardlimit != 0 && inner.nout >= inner.hardlimit {
                return None;
            }
            if let Some(item) = self.take_item(&mut inner) {
                inner.stats.ngets += 1;
                drop(inner);
                // SAFETY: the item was just taken off a free list we own.
                unsafe { self.finish_get(item, PoolFlags::empty()) };
                return Some(item);
            }
            let (guard, grown) = self.grow(inner);
            inner = guard;
            if !grown {
                return None;
            }
        }
    }

    fn request(&self, request: PoolRequest) -> RequestId {
        let id = request.id();
        // Fast path: deliver synchronously when an item is on hand.
        if let Some(item) = self.try_get_quiet() {
            self.lock.lock().stats.ndelivered += 1;
            request.invoke(item);
            return id;
        }

        self.lock_requests().push_back(request);
        self.lock.lock().stats.nrequests += 1;
        // An item may have been freed between the failed try and the
        // enqueue; run the queue so the request cannot be stranded.
        self.run_requests();
        id
    }

    /// Delivers queued requests, oldest first, for as long as items can be
    /// had without blocking. Callbacks run with no locks held.
    fn run_requests(&self) {
        loop {
            if self.lock_requests().is_empty() {
                return;
            }
            let Some(item) = self.try_get_quiet() else {
                return;
            };
            // Bound to a local so the queue guard is gone before the
            // callback runs.
            let delivered = self.lock_requests().pop_front();
            match delivered {
                Some(request) => {
                    self.lock.lock().stats.ndelivered += 1;
                    request.invoke(item);
                }
                None => {
                    // Raced with a cancellation; the item goes back.
                    // SAFETY: the item was taken above and never escaped.
                    unsafe { self.free_item(item, false) };
                    return;
                }
            }
        }
    }

    fn cancel_request(&self, id: RequestId) -> bool {
        self.lock_requests().cancel(id)
    }

    fn set_hard_limit(&self, limit: usize, warning: Option<&'static str>, ratecap: Duration) {
        {
            let mut inner = self.lock.lock();
            inner.hardlimit = limit;
            inner.warning = warning;
            inner.ratecap = ratecap;
            inner.last_warning = None;
        }
        // A raised limit may unblock sleeping getters.
        self.item_waiters.notify_all();
    }

    /// Emits the configured hard-limit warning, at most once per rate-cap
    /// interval.
    fn warn_limit(&self, inner: &mut PoolInner) {
        let Some(_message) = inner.warning else {
            return;
        };
        let now = Instant::now();
        let due = inner
            .last_warning
            .is_none_or(|last| now.duration_since(last) >= inner.ratecap);
        if due {
            inner.last_warning = Some(now);
            inner.stats.nwarnings += 1;
            #[cfg(feature = "tracing")]
            tracing::warn!(
                pool = self.name,
                limit = inner.hardlimit,
                "{_message}"
            );
        }
    }

    pub(crate) fn info(&self) -> PoolInfo {
        let inner = self.lock.lock();
        PoolInfo {
            name: self.name.to_owned(),
            serial: self.serial,
            item_size: self.layout.item_size,
            page_size: self.page_size,
            items_per_page: self.layout.items_per_page,
            slack: self.layout.slack,
            ipl: self.lock.ceiling(),
            minitems: inner.minitems,
            minpages: inner.minpages,
            maxpages: (inner.maxpages != usize::MAX).then_some(inner.maxpages),
            hard_limit: inner.hardlimit,
            npages: inner.npages,
            nout: inner.nout,
            nitems: inner.nitems,
            nidle: inner.empty.len(),
            ngets: inner.stats.ngets,
            nfails: inner.stats.nfails,
            nputs: inner.stats.nputs,
            npagealloc: inner.stats.npagealloc,
            npagefree: inner.stats.npagefree,
            hiwat_pages: inner.stats.hiwat_pages,
            nrequests: inner.stats.nrequests,
            ndelivered: inner.stats.ndelivered,
            nwarnings: inner.stats.nwarnings,
        }
    }

    /// Pages needed to hold `nitems` items.
    fn pages_for(&self, nitems: usize) -> usize {
        nitems.div_ceil(self.layout.items_per_page)
    }
}

impl Drop for PoolShared {
    fn drop(&mut self) {
        let layout = self.layout;
        let inner = self.lock.get_mut();
        if inner.nout != 0 {
            if std::thread::panicking() {
                // Already unwinding from another failure; leak the pages
                // rather than escalate into an abort.
                return;
            }
            panic!(
                "pool `{}` destroyed with {} items outstanding",
                self.name, inner.nout
            );
        }
        debug_assert!(inner.partial.is_empty() && inner.full.is_empty());

        let mut freed = Vec::with_capacity(inner.npages);
        while let Some(hdr) = inner.empty.pop_front() {
            // SAFETY: the header is live and now off-list; teardown has
            // exclusive access.
            let freed_page = unsafe { hdr.as_ref().page() };
            freed.push(FreedPage {
                page: freed_page,
                header: (layout.placement == Placement::Detached).then_some(hdr),
            });
        }
        inner.detached.clear();
        debug_assert_eq!(freed.len(), inner.npages);

        for freed_page in freed {
            self.dispose_page(freed_page);
        }
    }
}

/// A pool of same-sized items.
///
/// Created with [`Pool::new`]; destroyed by dropping, which requires every
/// item to have been returned (outstanding items at drop indicate a
/// use-after-free risk elsewhere and panic). All methods take `&self` and
/// may be called concurrently from any number of threads.
pub struct Pool {
    shared: Arc<PoolShared>,
}

impl Pool {
    /// Creates a pool of `size`-byte items aligned to `align`, drawing pages
    /// from `backend`.
    ///
    /// `ioff` is the offset within each item to which the alignment applies
    /// (0 for plain alignment of the item base). `name` identifies the pool
    /// in diagnostics and [`PoolInfo`]; `wchan` names the wait channel
    /// blocked getters sleep on. Creation-time behavior is selected with
    /// [`PoolFlags::CHECK`] and [`PoolFlags::OFFPAGE`].
    ///
    /// The pool lock defaults to a ceiling of [`Ipl::Vm`]; retune it with
    /// [`set_ipl`](Self::set_ipl).
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero, `align` is zero or not a power of two,
    /// `ioff >= size`, the backend page size is not a power of two or is
    /// smaller than `align`, or a single item does not fit in a page after
    /// the header reserve (multi-page items are not supported).
    pub fn new(
        name: &'static str,
        size: usize,
        align: usize,
        ioff: usize,
        flags: PoolFlags,
        wchan: &'static str,
        backend: Box<dyn PageBackend>,
    ) -> Pool {
        assert!(size > 0, "pool `{name}`: zero item size");
        assert!(
            align > 0 && align.is_power_of_two(),
            "pool `{name}`: alignment {align} is not a power of two"
        );
        assert!(
            ioff < size,
            "pool `{name}`: alignment offset {ioff} is not inside a {size}-byte item"
        );
        let page_size = backend.page_size();
        assert!(
            page_size.is_power_of_two(),
            "pool `{name}`: backend page size {page_size} is not a power of two"
        );
        assert!(
            align <= page_size,
            "pool `{name}`: alignment {align} exceeds the page size {page_size}"
        );

        let layout = PageLayout::compute(
            size,
            align,
            ioff,
            flags.contains(PoolFlags::OFFPAGE),
            page_size,
        )
        .unwrap_or_else(|| {
            panic!("pool `{name}`: {size}-byte items do not fit in {page_size}-byte pages")
        });

        let shared = Arc::new(PoolShared {
            name,
            wchan,
            serial: registry::next_serial(),
            flags: flags & PoolFlags::CREATION,
            layout,
            page_size,
            backend,
            lock: CachePadded::new(IplMutex::new(Ipl::Vm, PoolInner::new())),
            item_waiters: Condvar::new(),
            requests: CachePadded::new(Mutex::new(RequestQueue::new())),
        });
        registry::register(&shared);
        Pool { shared }
    }

    /// Allocates one item.
    ///
    /// The returned memory is exclusively owned by the caller, has the
    /// pool's configured size and alignment, and is uninitialized unless
    /// [`PoolFlags::ZERO`] was passed. On exhaustion: with
    /// [`PoolFlags::WAIT`] the call blocks until an item frees up (unless
    /// the cause is the hard limit and [`PoolFlags::LIMITFAIL`] is also
    /// set); otherwise it fails with the matching [`PoolError`].
    ///
    /// # Panics
    ///
    /// Pools created with [`PoolFlags::CHECK`] panic here when the item's
    /// free-fill pattern was overwritten while the item was free.
    pub fn get(&self, flags: PoolFlags) -> Result<NonNull<u8>, PoolError> {
        self.shared.get(flags)
    }

    /// Returns an item to the pool.
    ///
    /// If asynchronous requests are queued, the oldest one receives this
    /// item directly - its callback runs on the calling thread, before this
    /// function returns. Otherwise the item rejoins its page's free list and
    /// one blocked getter, if any, is woken.
    ///
    /// # Panics
    ///
    /// Panics if `item` does not belong to this pool, is not an item
    /// address, or (under [`PoolFlags::CHECK`]) is already free.
    ///
    /// # Safety
    ///
    /// `item` must have been obtained from this pool's [`get`](Self::get)
    /// (or a request callback) and must not be accessed after this call.
    pub unsafe fn put(&self, item: NonNull<u8>) {
        self.shared.put(item);
    }

    /// Grows the pool until at least `nitems` items are available, so later
    /// non-blocking `get`s cannot fail for lack of pages.
    ///
    /// # Errors
    ///
    /// Fails with [`PoolError::BackendFailed`] if the backend runs out
    /// before the target is reached; pages attached up to that point are
    /// kept.
    pub fn prime(&self, nitems: usize) -> Result<(), PoolError> {
        self.shared.prime(nitems)
    }

    /// Releases surplus idle pages back to the backend, keeping at least the
    /// configured minimums resident. Returns the number of pages released.
    ///
    /// Deliberately separate from [`put`](Self::put) so bursty
    /// allocate/free cycles do not thrash the backend; call it on demand or
    /// via [`reclaim_all`](crate::reclaim_all) under memory pressure.
    pub fn reclaim(&self) -> usize {
        self.shared.reclaim()
    }

    /// Registers an asynchronous allocation request.
    ///
    /// If an item is available (or a page can be attached without blocking),
    /// the callback runs immediately on this thread. Otherwise the request
    /// queues FIFO and fires - exactly once - from whichever thread's
    /// [`put`](Self::put) or [`prime`](Self::prime) first has an item for
    /// it.
    pub fn request(&self, request: PoolRequest) -> RequestId {
        self.shared.request(request)
    }

    /// Cancels a queued request. Returns `false` if the request was already
    /// delivered (or never queued); its callback is dropped, never called.
    pub fn cancel_request(&self, id: RequestId) -> bool {
        self.shared.cancel_request(id)
    }

    /// Installs or changes the hard limit on outstanding items (0 disables
    /// it) together with the warning emitted on limit hits and the minimum
    /// interval between two warnings.
    pub fn set_hard_limit(
        &self,
        limit: usize,
        warning: Option<&'static str>,
        ratecap: Duration,
    ) {
        self.shared.set_hard_limit(limit, warning, ratecap);
    }

    /// Sets the low-water mark: at least `nitems` items (and the pages
    /// backing them) are kept resident across [`reclaim`](Self::reclaim).
    pub fn set_low_water(&self, nitems: usize) {
        let minpages = self.shared.pages_for(nitems);
        let mut inner = self.shared.lock.lock();
        inner.minitems = nitems;
        inner.minpages = minpages;
    }

    /// Sets the high-water mark: when the pool holds more pages than needed
    /// for `nitems` items, pages going idle are released to the backend
    /// immediately instead of waiting for [`reclaim`](Self::reclaim).
    /// `nitems == 0` removes the bound.
    pub fn set_high_water(&self, nitems: usize) {
        let maxpages = if nitems == 0 {
            usize::MAX
        } else {
            self.shared.pages_for(nitems)
        };
        self.shared.lock.lock().maxpages = maxpages;
    }

    /// Retunes the priority ceiling of the pool lock to the highest level
    /// the pool is touched from.
    pub fn set_ipl(&self, ipl: Ipl) {
        self.shared.lock.set_ceiling(ipl);
    }

    /// Takes a read-only snapshot of the pool's shape, policy and counters.
    pub fn info(&self) -> PoolInfo {
        self.shared.info()
    }

    /// The diagnostic name given at creation.
    pub fn name(&self) -> &'static str {
        self.shared.name
    }

    /// The wait channel name blocked getters sleep on.
    pub fn wait_channel(&self) -> &'static str {
        self.shared.wchan
    }

    /// The unique serial assigned at creation.
    pub fn serial(&self) -> u32 {
        self.shared.serial
    }

    /// Item size in bytes after alignment rounding; `get` returns exactly
    /// this much memory.
    pub fn item_size(&self) -> usize {
        self.shared.layout.item_size
    }

    /// Item slots per backend page.
    pub fn items_per_page(&self) -> usize {
        self.shared.layout.items_per_page
    }

    /// The backend page size.
    pub fn page_size(&self) -> usize {
        self.shared.page_size
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.shared.name)
            .field("serial", &self.shared.serial)
            .field("item_size", &self.shared.layout.item_size)
            .finish_non_exhaustive()
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        registry::unregister(self.shared.serial);
    }
}
