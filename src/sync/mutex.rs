//! # Mutex
//! The plain, unfair lock every other primitive here stands on.
//!
//! The state is a u32 so it works with the wait & wake:
//! - 0 - unlocked
//! - 1 - locked, no other threads
//! - 2 - locked, other threads may be waiting
//!
//! Locking spins for a short while first, since most critical sections in the simulator
//! (queue links, counters) are a handful of instructions long. Only then the thread goes
//! to sleep on the state word. Unlocking calls `wake_one` only if somebody switched the
//! state to 2, so an uncontended lock/unlock pair never enters the kernel.
//!
//! There are no guarantees on who gets the lock after an unlock: any thread may be faster
//! than the one we woke up. That's what [FairLock](super::fair_lock::FairLock) is for.

use std::{
    cell::UnsafeCell,
    ops::{Deref, DerefMut},
    sync::atomic::{
        AtomicU32,
        Ordering::{Acquire, Relaxed, Release},
    },
};

use atomic_wait::{wait, wake_one};

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1;
const CONTENDED: u32 = 2;

/// The bare lock word, with no data attached.
///
/// Used where the locking and unlocking don't nest as a guard would, e.g. the inner lock
/// of the FairLock is released while the queue lock is held.
pub struct RawMutex {
    state: AtomicU32,
}

impl RawMutex {
    pub const fn new() -> Self {
        Self {
            state: AtomicU32::new(UNLOCKED),
        }
    }

    pub fn lock(&self) {
        if self
            .state
            .compare_exchange(UNLOCKED, LOCKED, Acquire, Relaxed)
            .is_err()
        {
            Self::lock_contended(&self.state);
        }
    }

    #[cold]
    fn lock_contended(state: &AtomicU32) {
        let mut spin_count = 0;

        // only check for 1, as 2 means that the other threads already gave up spinning
        while state.load(Relaxed) == LOCKED && spin_count < 100 {
            spin_count += 1;
            std::hint::spin_loop();
        }

        if state
            .compare_exchange(UNLOCKED, LOCKED, Acquire, Relaxed)
            .is_ok()
        {
            return;
        }

        // leave 2 behind ourselves, so the unlock knows to wake somebody up
        while state.swap(CONTENDED, Acquire) != UNLOCKED {
            wait(state, CONTENDED);
        }
    }

    /// # Safety
    /// The calling thread must have locked this mutex with [RawMutex::lock] and must not
    /// touch the protected state afterwards.
    pub unsafe fn unlock(&self) {
        if self.state.swap(UNLOCKED, Release) == CONTENDED {
            wake_one(&self.state);
        }
    }

    pub fn is_locked(&self) -> bool {
        self.state.load(Relaxed) != UNLOCKED
    }
}

impl Default for RawMutex {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Mutex<Y> {
    pub(crate) raw: RawMutex,
    value: UnsafeCell<Y>,
}

/// promise to the compiler that it's safe to share if the underlying value is safe to send
unsafe impl<Y> Sync for Mutex<Y> where Y: Send {}

impl<Y> Mutex<Y> {
    pub const fn new(value: Y) -> Self {
        Self {
            raw: RawMutex::new(),
            value: UnsafeCell::new(value),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Y> {
        self.raw.lock();
        MutexGuard { mutex: self }
    }

    #[cfg(test)]
    pub(crate) fn into_inner(self) -> Y {
        self.value.into_inner()
    }
}

impl<Y: Default> Default for Mutex<Y> {
    fn default() -> Self {
        Self::new(Y::default())
    }
}

/// Unlocking is dropping the guard, there's no other way to do that.
pub struct MutexGuard<'a, Y> {
    pub(crate) mutex: &'a Mutex<Y>,
}

unsafe impl<Y> Sync for MutexGuard<'_, Y> where Y: Sync {}

impl<Y> Deref for MutexGuard<'_, Y> {
    type Target = Y;
    fn deref(&self) -> &Self::Target {
        // SAFETY: existence of the guard means the mutex is locked by us
        unsafe { &*self.mutex.value.get() }
    }
}

impl<Y> DerefMut for MutexGuard<'_, Y> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: existence of the guard means the mutex is locked by us
        unsafe { &mut *self.mutex.value.get() }
    }
}

impl<Y> Drop for MutexGuard<'_, Y> {
    fn drop(&mut self) {
        // SAFETY: the guard is the proof of the lock
        unsafe { self.mutex.raw.unlock() }
    }
}

#[cfg(test)]
mod test {
    use std::thread::scope;

    use super::*;

    #[test]
    fn test_mutex_counts() {
        let m = Mutex::new(0u64);
        scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..5_000 {
                        *m.lock() += 1;
                    }
                });
            }
        });
        assert_eq!(m.into_inner(), 20_000);
    }

    #[test]
    fn test_raw_mutex_state() {
        let raw = RawMutex::new();
        assert!(!raw.is_locked());
        raw.lock();
        assert!(raw.is_locked());
        // SAFETY: locked right above
        unsafe { raw.unlock() };
        assert!(!raw.is_locked());
    }
}
