//! # Counting semaphore
//! A pool of permits in a single atomic word.
//!
//! `acquire` takes a permit with a CAS, or sleeps on the word while it reads 0.
//! `release` puts a permit back and wakes one sleeper. The woken thread isn't promised the
//! permit: a newcomer may grab it first, the sleeper then sees 0 again and goes back to
//! sleep. Ordering between acquirers is somebody else's job.

use std::sync::atomic::{
    AtomicU32,
    Ordering::{Acquire, Relaxed, Release},
};

use atomic_wait::{wait, wake_one};

pub struct Semaphore {
    permits: AtomicU32,
}

impl Semaphore {
    pub const fn new(permits: u32) -> Self {
        Self {
            permits: AtomicU32::new(permits),
        }
    }

    pub fn acquire(&self) {
        let mut s = self.permits.load(Relaxed);
        loop {
            if s == 0 {
                // only sleeps while it's still 0, a release in between makes it return at once
                wait(&self.permits, 0);
                s = self.permits.load(Relaxed);
                continue;
            }
            match self
                .permits
                .compare_exchange_weak(s, s - 1, Acquire, Relaxed)
            {
                Ok(_) => return,
                Err(e) => s = e,
            }
        }
    }

    pub fn release(&self) {
        self.permits.fetch_add(1, Release);
        wake_one(&self.permits);
    }

    pub fn available(&self) -> u32 {
        self.permits.load(Relaxed)
    }
}
