//! Execution-level tracking and the priority-ceiling mutex.
//!
//! The original system acquires its pool lock at an interrupt-priority
//! ceiling so allocation is safe from interrupt context. Hosted code has no
//! interrupt priorities, but the *discipline* is still worth enforcing: a
//! lock is parameterized by the highest level it is touched from, holding it
//! raises the thread to that level, and acquiring a lock whose ceiling is
//! below the current level is a lock-ordering bug caught in debug builds.

mod level;
mod mutex;

pub use level::{current_level, Ipl};
pub use mutex::{IplMutex, IplMutexGuard};
