use std::mem::{self, ManuallyDrop};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use super::level::{current_level, set_level, Ipl};

/// A mutex with a priority ceiling.
///
/// Acquisition raises the calling thread's execution level to the lock's
/// ceiling for the whole critical section; the guard restores the previous
/// level on drop. Acquiring a lock whose ceiling is *below* the thread's
/// current level would invert the lock order of the original system and is
/// rejected by a debug assertion.
pub struct IplMutex<T> {
    ceiling: AtomicU8,
    inner: Mutex<T>,
}

impl<T> IplMutex<T> {
    /// Creates a mutex guarded at `ceiling`.
    pub fn new(ceiling: Ipl, value: T) -> Self {
        Self {
            ceiling: AtomicU8::new(ceiling as u8),
            inner: Mutex::new(value),
        }
    }

    /// The current ceiling.
    pub fn ceiling(&self) -> Ipl {
        Ipl::from_u8(self.ceiling.load(Ordering::Relaxed))
    }

    /// Retunes the ceiling. Threads already inside the critical section keep
    /// the level they acquired at; the new ceiling applies from the next
    /// acquisition on.
    pub fn set_ceiling(&self, ceiling: Ipl) {
        self.ceiling.store(ceiling as u8, Ordering::Relaxed);
    }

    /// Acquires the lock, raising the thread to the ceiling.
    ///
    /// # Panics
    ///
    /// Debug builds panic if the thread's current level exceeds the ceiling.
    pub fn lock(&self) -> IplMutexGuard<'_, T> {
        let saved = current_level();
        let ceiling = self.ceiling();
        debug_assert!(
            saved <= ceiling,
            "lock ordering violation: acquiring a ceiling-{ceiling:?} lock at level {saved:?}"
        );
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        set_level(ceiling.max(saved));
        IplMutexGuard {
            guard: ManuallyDrop::new(guard),
            lock: self,
            saved,
        }
    }

    /// Exclusive access without locking.
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Guard for an [`IplMutex`]; restores the saved execution level on drop.
pub struct IplMutexGuard<'a, T> {
    guard: ManuallyDrop<MutexGuard<'a, T>>,
    lock: &'a IplMutex<T>,
    saved: Ipl,
}

impl<'a, T> IplMutexGuard<'a, T> {
    /// Atomically releases the lock, sleeps on `condvar`, and reacquires.
    ///
    /// The thread drops back to its saved level while asleep and is raised
    /// to the ceiling again on wakeup. Wakeups are subject to the usual
    /// condition-variable caveats: the caller must re-validate its predicate.
    ///
    /// # Panics
    ///
    /// Debug builds panic if the thread entered the lock above [`Ipl::None`];
    /// sleeping is only legal from ordinary thread context.
    pub fn wait_on(self, condvar: &Condvar) -> Self {
        let (inner, lock, saved) = self.into_parts();
        debug_assert_eq!(saved, Ipl::None, "sleeping with a raised execution level");
        set_level(saved);
        let inner = condvar.wait(inner).unwrap_or_else(PoisonError::into_inner);
        set_level(lock.ceiling().max(saved));
        IplMutexGuard {
            guard: ManuallyDrop::new(inner),
            lock,
            saved,
        }
    }

    fn into_parts(mut self) -> (MutexGuard<'a, T>, &'a IplMutex<T>, Ipl) {
        // SAFETY: `self` is forgotten immediately after, so the guard is
        // taken exactly once and Drop never observes the hole.
        let inner = unsafe { ManuallyDrop::take(&mut self.guard) };
        let lock = self.lock;
        let saved = self.saved;
        mem::forget(self);
        (inner, lock, saved)
    }
}

impl<T> Deref for IplMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for IplMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for IplMutexGuard<'_, T> {
    fn drop(&mut self) {
        // SAFETY: the guard is dropped exactly once, here.
        unsafe { ManuallyDrop::drop(&mut self.guard) };
        set_level(self.saved);
    }
}
