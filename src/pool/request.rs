//! Asynchronous allocation requests.
//!
//! A caller that cannot block but still wants eventual delivery registers a
//! one-shot callback instead of sleeping. Requests queue FIFO under their
//! own lock - independent of the pool lock, so delivery from `put` never
//! nests the two - and are satisfied, exactly once each, by whichever
//! `put` or `prime` first has an item to hand over.

use core::fmt;
use core::ptr::NonNull;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies a queued [`PoolRequest`] for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

/// A pending asynchronous allocation request.
///
/// The callback is invoked exactly once with the granted item - either
/// synchronously from [`Pool::request`](crate::Pool::request) if an item is
/// on hand, or later from whichever thread's `put` frees one. Ownership of
/// the item transfers to the callback; it must eventually be returned via
/// `put` like any other item.
pub struct PoolRequest {
    id: RequestId,
    callback: Box<dyn FnOnce(NonNull<u8>) + Send>,
}

impl PoolRequest {
    /// Wraps `callback` into a request ready to hand to
    /// [`Pool::request`](crate::Pool::request).
    pub fn new(callback: impl FnOnce(NonNull<u8>) + Send + 'static) -> Self {
        Self {
            id: RequestId(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)),
            callback: Box::new(callback),
        }
    }

    /// The id to use with [`Pool::cancel_request`](crate::Pool::cancel_request).
    pub fn id(&self) -> RequestId {
        self.id
    }

    pub(crate) fn invoke(self, item: NonNull<u8>) {
        (self.callback)(item);
    }
}

impl fmt::Debug for PoolRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolRequest").field("id", &self.id).finish()
    }
}

/// FIFO of pending requests. Guarded by its own mutex in the pool.
pub(crate) struct RequestQueue {
    entries: VecDeque<PoolRequest>,
}

impl RequestQueue {
    pub(crate) const fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn push_back(&mut self, request: PoolRequest) {
        self.entries.push_back(request);
    }

    pub(crate) fn pop_front(&mut self) -> Option<PoolRequest> {
        self.entries.pop_front()
    }

    /// Removes a not-yet-satisfied request. The callback is dropped, never
    /// called.
    pub(crate) fn cancel(&mut self, id: RequestId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|request| request.id != id);
        self.entries.len() != before
    }
}
