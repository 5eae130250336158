//! Cumulative counters and the read-only introspection snapshot.

use serde::{Deserialize, Serialize};

use crate::sync::Ipl;

/// Counters kept under the pool lock. All cumulative, never reset.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct PoolStats {
    pub ngets: u64,
    pub nfails: u64,
    pub nputs: u64,
    pub npagealloc: u64,
    pub npagefree: u64,
    pub hiwat_pages: u64,
    pub nrequests: u64,
    pub ndelivered: u64,
    pub nwarnings: u64,
}

/// A point-in-time, read-only snapshot of one pool.
///
/// Produced by [`Pool::info`](crate::Pool::info) and
/// [`pool_list`](crate::pool_list) for operator-facing reporting; taking a
/// snapshot never mutates pool state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolInfo {
    /// Diagnostic name given at creation.
    pub name: String,
    /// Unique, monotonically assigned pool serial.
    pub serial: u32,
    /// Item size in bytes after alignment rounding.
    pub item_size: usize,
    /// Backend page size in bytes.
    pub page_size: usize,
    /// Item slots per page.
    pub items_per_page: usize,
    /// Unused bytes per page after the header reserve and all items.
    pub slack: usize,
    /// Priority ceiling of the pool lock.
    pub ipl: Ipl,
    /// Minimum items kept available across reclaim.
    pub minitems: usize,
    /// Minimum pages kept resident across reclaim.
    pub minpages: usize,
    /// Page bound above which empty pages are released eagerly; `None` when
    /// unbounded.
    pub maxpages: Option<usize>,
    /// Hard limit on outstanding items; 0 means unlimited.
    pub hard_limit: usize,
    /// Pages currently held.
    pub npages: usize,
    /// Items currently outstanding.
    pub nout: usize,
    /// Items currently available.
    pub nitems: usize,
    /// Pages currently fully free.
    pub nidle: usize,
    /// Successful gets.
    pub ngets: u64,
    /// Failed gets (hard limit or backend failure).
    pub nfails: u64,
    /// Puts.
    pub nputs: u64,
    /// Pages obtained from the backend.
    pub npagealloc: u64,
    /// Pages returned to the backend.
    pub npagefree: u64,
    /// High-water mark of pages ever held.
    pub hiwat_pages: u64,
    /// Asynchronous requests enqueued.
    pub nrequests: u64,
    /// Asynchronous requests delivered.
    pub ndelivered: u64,
    /// Rate-capped hard-limit warnings actually emitted.
    pub nwarnings: u64,
}
