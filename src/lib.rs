//! # `corral` - Fixed-Size Object Pool Allocator
//!
//! A slab-style allocator managing pools of same-sized objects carved out of
//! pages obtained from a pluggable backend, with growth/shrink policy, hard
//! limits, blocking and asynchronous allocation, cache-color rotation, and
//! live statistics.
//!
//! ## Design
//!
//! Each [`Pool`] owns a set of backend pages partitioned into three intrusive
//! lists - *empty* (no items in use), *partial*, and *full* - and hands out
//! fixed-size items from them. Pages are described by a small header that
//! either lives at the start of the page itself (small items, cache-local)
//! or in a detached, tree-indexed record that leaves the page memory
//! untouched (large items, or pages destined for direct device access).
//!
//! ## Key Features
//!
//! - **Pluggable page backends**: anything implementing [`PageBackend`] can
//!   supply pages - the process allocator ([`GlobalPageBackend`]), raw OS
//!   pages ([`SystemPageBackend`]), or a test double.
//! - **Hard limits with throttled diagnostics**: a pool can cap outstanding
//!   items; repeated limit hits emit at most one warning per configured
//!   interval.
//! - **Blocking and asynchronous allocation**: a caller may sleep until an
//!   item frees up, or register a [`PoolRequest`] callback that fires from
//!   whichever `put` first has an item to give.
//! - **Priority-ceiling locking**: the pool lock is an [`IplMutex`] that
//!   raises the thread's execution level for the whole critical section, so
//!   lock ordering across interrupt-style contexts is enforced structurally.
//! - **Cache coloring**: successive pages stagger their first item offset to
//!   spread items of hot pools across cache sets.
//! - **Debug checking**: pools created with [`PoolFlags::CHECK`] stamp freed
//!   items with a fill pattern and panic on `get` if a free item was written.
//!
//! ## Example
//!
//! ```rust
//! use corral::{GlobalPageBackend, Pool, PoolFlags};
//!
//! let pool = Pool::new(
//!     "examplepl",
//!     64,                 // item size in bytes
//!     8,                  // required alignment (power of two)
//!     0,                  // offset within the item that must be aligned
//!     PoolFlags::empty(),
//!     "examplewt",
//!     Box::new(GlobalPageBackend::new(4096)),
//! );
//!
//! let item = pool.get(PoolFlags::ZERO).expect("fresh pool cannot be exhausted");
//! unsafe {
//!     item.as_ptr().write(7);
//!     assert_eq!(item.as_ptr().read(), 7);
//!     pool.put(item);
//! }
//! ```
//!
//! ## Ownership Rules
//!
//! An item returned by [`Pool::get`] is exclusively owned by the caller until
//! it is returned through [`Pool::put`] *on the same pool*. Returning an item
//! to a different pool, returning an address that is not an item, or dropping
//! a pool that still has items outstanding are programming errors and panic
//! with a diagnostic naming the pool.

#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod backend;
pub mod pool;
pub mod sync;

pub use backend::{GlobalPageBackend, PageBackend, SystemPageBackend};
pub use pool::registry::{pool_list, reclaim_all};
pub use pool::{Pool, PoolError, PoolFlags, PoolInfo, PoolRequest, RequestId};
pub use sync::{current_level, Ipl, IplMutex, IplMutexGuard};
