//! # FIFO lock
//! A mutex that hands itself over strictly in arrival order.
//!
//! The plain [Mutex](super::mutex::Mutex) lets whoever is fastest take the lock after an
//! unlock. Here every contender first appends a [WaitRecord] to a [WaitQueue] and only the
//! queue front may go for the inner lock:
//! - acquire: link a fresh record at the back, sleep on it if there's somebody ahead, then
//!   take the inner lock
//! - release: with the queue locked, unlock the inner lock, pop our own record and wake the
//!   new front
//!
//! Since the new front is woken only after the inner lock is released, and nobody but the
//! front ever tries it, the inner lock is always free when the front gets there. A later
//! arrival can't barge in: it sees a predecessor in the queue and goes to sleep.
//!
//! The records live on the heap from acquire until the matching release. The queue holds
//! raw pointers to them, and the owner of the front record frees it when it pops it.

use std::{
    cell::UnsafeCell,
    ops::{Deref, DerefMut},
    ptr::NonNull,
};

use super::{
    mutex::RawMutex,
    wait_queue::{WaitQueue, WaitRecord},
};

pub struct FairLock<Y> {
    queue: WaitQueue,
    inner: RawMutex,
    value: UnsafeCell<Y>,
}

unsafe impl<Y> Sync for FairLock<Y> where Y: Send {}

impl<Y> FairLock<Y> {
    pub const fn new(value: Y) -> Self {
        Self {
            queue: WaitQueue::new(),
            inner: RawMutex::new(),
            value: UnsafeCell::new(value),
        }
    }

    pub fn acquire(&self) -> FairLockGuard<'_, Y> {
        let record = NonNull::from(Box::leak(Box::new(WaitRecord::new())));

        // Nothing between the allocation and the link can unwind, so a contender is
        // either on the queue or never got here.
        // SAFETY: the record stays alive until our own release pops it
        let queued_behind = unsafe { self.queue.append(record) };

        if queued_behind {
            // SAFETY: only the release of this very acquire frees the record
            unsafe { record.as_ref() }.wait();
        }

        // we're the front => the previous holder has already unlocked it
        self.inner.lock();
        FairLockGuard { lock: self }
    }

    /// Contenders in the queue, the holder included.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    #[cfg(test)]
    pub(crate) fn into_inner(self) -> Y {
        self.value.into_inner()
    }

    fn release(&self) {
        let mut queue = self.queue.lock();

        // SAFETY: the guard being dropped is the proof we hold it
        unsafe { self.inner.unlock() };

        let ours = queue.pop_front();
        debug_assert!(ours.is_some(), "a FairLock was released with an empty queue");

        if let Some(next) = queue.front() {
            // The next one can't free its record before it gets the queue lock back in
            // its own release, so the record is alive while we signal it.
            unsafe { next.as_ref() }.wake();
        }
        drop(queue);

        if let Some(record) = ours {
            // SAFETY: leaked in acquire, unlinked right above, nobody else points to it
            drop(unsafe { Box::from_raw(record.as_ptr()) });
        }
    }
}

impl<Y: Default> Default for FairLock<Y> {
    fn default() -> Self {
        Self::new(Y::default())
    }
}

/// Releasing is dropping the guard.
pub struct FairLockGuard<'a, Y> {
    lock: &'a FairLock<Y>,
}

unsafe impl<Y> Sync for FairLockGuard<'_, Y> where Y: Sync {}

impl<Y> FairLockGuard<'_, Y> {
    /// Same as dropping the guard, reads better at call sites that release mid-function.
    pub fn release(self) {}
}

impl<Y> Deref for FairLockGuard<'_, Y> {
    type Target = Y;
    fn deref(&self) -> &Self::Target {
        // SAFETY: the guard exists only while the inner lock is held by us
        unsafe { &*self.lock.value.get() }
    }
}

impl<Y> DerefMut for FairLockGuard<'_, Y> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: the guard exists only while the inner lock is held by us
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<Y> Drop for FairLockGuard<'_, Y> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

#[cfg(test)]
mod test {
    use std::thread::{scope, yield_now};

    use super::*;

    #[test]
    fn test_uncontended() {
        let lock = FairLock::new(1);
        {
            let mut g = lock.acquire();
            assert!(lock.is_locked());
            assert_eq!(lock.queue_len(), 1);
            *g += 1;
        }
        assert!(!lock.is_locked());
        assert_eq!(lock.queue_len(), 0);
        assert_eq!(lock.into_inner(), 2);
    }

    #[test]
    fn test_fifo_handover() {
        let lock = FairLock::new(Vec::new());
        let lock = &lock;

        scope(|s| {
            let holder = lock.acquire();
            for i in 0..16 {
                s.spawn(move || lock.acquire().push(i));
                // don't spawn the next one until this one is in the queue
                while lock.queue_len() < i + 2 {
                    yield_now();
                }
            }
            holder.release();
        });

        assert_eq!(*lock.acquire(), (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn test_no_lost_wakeups() {
        let lock = FairLock::new(0usize);
        scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..2_000 {
                        *lock.acquire() += 1;
                    }
                });
            }
        });
        assert_eq!(lock.queue_len(), 0);
        assert_eq!(lock.into_inner(), 16_000);
    }

    #[test]
    fn test_released_on_unwind() {
        let lock = FairLock::new(());
        let lock = &lock;
        let r = std::thread::scope(|s| {
            s.spawn(move || {
                let _g = lock.acquire();
                panic!("boom");
            })
            .join()
        });
        assert!(r.is_err());
        assert!(!lock.is_locked());
        drop(lock.acquire());
    }
}
