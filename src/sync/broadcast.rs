//! # Broadcast
//! Lets threads sleep on a [Mutex](super::mutex::Mutex)-protected state until it satisfies
//! them, and lets whoever changes that state wake all of them at once.
//!
//! The futex word is an epoch bumped by every broadcast. A sleeper reads the epoch while it
//! still holds the lock, so a broadcast made after its unlock has already moved the epoch
//! and the sleep returns at once.
//!
//! Broadcasts are free when nobody sleeps: `sleepers` only changes while the sleeper holds
//! the lock, and the state change that leads to a broadcast happens under the same lock.

use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering::Relaxed;

use atomic_wait::{wait, wake_all};

use super::mutex::MutexGuard;

pub struct Broadcast {
    epoch: AtomicU32,
    sleepers: AtomicU32,
}

impl Broadcast {
    pub const fn new() -> Self {
        Self {
            epoch: AtomicU32::new(0),
            sleepers: AtomicU32::new(0),
        }
    }

    /// Wakes every thread in [Broadcast::wait_while]. Call it after changing the state.
    pub fn notify_all(&self) {
        if self.sleepers.load(Relaxed) != 0 {
            self.epoch.fetch_add(1, Relaxed);
            wake_all(&self.epoch);
        }
    }

    /// Sleeps until `keep_waiting` turns false, checking it under the lock after every wake.
    pub fn wait_while<'a, Y, F>(
        &self,
        mut guard: MutexGuard<'a, Y>,
        mut keep_waiting: F,
    ) -> MutexGuard<'a, Y>
    where
        F: FnMut(&mut Y) -> bool,
    {
        while keep_waiting(&mut guard) {
            let seen = self.epoch.load(Relaxed);
            self.sleepers.fetch_add(1, Relaxed);

            let mutex = guard.mutex;
            drop(guard);
            wait(&self.epoch, seen);

            self.sleepers.fetch_sub(1, Relaxed);
            guard = mutex.lock();
        }
        guard
    }
}

impl Default for Broadcast {
    fn default() -> Self {
        Self::new()
    }
}
