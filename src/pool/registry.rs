//! Process-wide registry of live pools.
//!
//! Pools register at creation and deregister on drop; the registry holds
//! weak references under its own lock, so enumeration and global reclaim
//! never extend a pool's lifetime beyond a single operation and never race
//! with teardown bookkeeping.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use super::{PoolInfo, PoolShared};

static NEXT_SERIAL: AtomicU32 = AtomicU32::new(1);
static REGISTRY: Mutex<Vec<(u32, Weak<PoolShared>)>> = Mutex::new(Vec::new());

fn lock_registry() -> std::sync::MutexGuard<'static, Vec<(u32, Weak<PoolShared>)>> {
    REGISTRY.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn next_serial() -> u32 {
    NEXT_SERIAL.fetch_add(1, Ordering::Relaxed)
}

pub(crate) fn register(shared: &Arc<PoolShared>) {
    lock_registry().push((shared.serial, Arc::downgrade(shared)));
}

pub(crate) fn unregister(serial: u32) {
    lock_registry().retain(|(entry, _)| *entry != serial);
}

/// Snapshots every live pool, ordered by serial.
///
/// Read-only: taking the snapshots never mutates pool state.
pub fn pool_list() -> Vec<PoolInfo> {
    let pools: Vec<Arc<PoolShared>> = lock_registry()
        .iter()
        .filter_map(|(_, weak)| weak.upgrade())
        .collect();
    // Snapshots are taken outside the registry lock; each one briefly takes
    // its pool's own lock.
    pools.iter().map(|shared| shared.info()).collect()
}

/// Releases surplus idle pages from every live pool.
///
/// Returns the total number of pages handed back to the backends. Typically
/// invoked under global memory pressure.
pub fn reclaim_all() -> usize {
    let pools: Vec<Arc<PoolShared>> = lock_registry()
        .iter()
        .filter_map(|(_, weak)| weak.upgrade())
        .collect();
    pools.iter().map(|shared| shared.reclaim()).sum()
}
