//! # Wait queue
//! An intrusive doubly-linked FIFO of [WaitRecord]s.
//!
//! The queue doesn't own any allocation, it only links records somebody else keeps alive.
//! Links are only read and written with the structural lock held, so a record can be
//! published by a plain pointer. The lock is held for a few pointer writes, never for the
//! time a contender waits.
//!
//! Invariant: `front.is_none() == back.is_none() == (len == 0)`.

use std::{
    cell::Cell,
    ptr::NonNull,
    sync::atomic::{
        AtomicU32,
        Ordering::{Acquire, Release},
    },
};

use atomic_wait::{wait, wake_one};

use super::mutex::{Mutex, MutexGuard};

const PENDING: u32 = 0;
const WOKEN: u32 = 1;

/// One pending contender.
///
/// Carries its own one-shot wake signal, so waking the next in line touches nobody else's
/// futex word.
pub struct WaitRecord {
    signal: AtomicU32,
    prev: Cell<Option<NonNull<WaitRecord>>>,
    next: Cell<Option<NonNull<WaitRecord>>>,
}

impl WaitRecord {
    pub const fn new() -> Self {
        Self {
            signal: AtomicU32::new(PENDING),
            prev: Cell::new(None),
            next: Cell::new(None),
        }
    }

    /// Sleeps until [WaitRecord::wake] was called, returns at once if it already was.
    pub fn wait(&self) {
        while self.signal.load(Acquire) == PENDING {
            wait(&self.signal, PENDING);
        }
    }

    pub fn wake(&self) {
        self.signal.store(WOKEN, Release);
        wake_one(&self.signal);
    }

    #[cfg(test)]
    pub(crate) fn is_woken(&self) -> bool {
        self.signal.load(Acquire) == WOKEN
    }
}

impl Default for WaitRecord {
    fn default() -> Self {
        Self::new()
    }
}

struct Links {
    front: Option<NonNull<WaitRecord>>,
    back: Option<NonNull<WaitRecord>>,
    len: usize,
}

// the pointers are only followed with the structural lock held
unsafe impl Send for Links {}

pub struct WaitQueue {
    links: Mutex<Links>,
}

impl WaitQueue {
    pub const fn new() -> Self {
        Self {
            links: Mutex::new(Links {
                front: None,
                back: None,
                len: 0,
            }),
        }
    }

    /// Takes the structural lock for a compound update.
    pub fn lock(&self) -> QueueGuard<'_> {
        QueueGuard {
            links: self.links.lock(),
        }
    }

    /// Links `record` at the back under the structural lock.
    /// Returns `true` if somebody is ahead of it.
    ///
    /// # Safety
    /// See [QueueGuard::append].
    pub unsafe fn append(&self, record: NonNull<WaitRecord>) -> bool {
        self.lock().append(record)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// The queue with its structural lock held.
pub struct QueueGuard<'a> {
    links: MutexGuard<'a, Links>,
}

impl QueueGuard<'_> {
    /// O(1). Returns `true` if the record got a predecessor, i.e. it isn't the front.
    ///
    /// # Safety
    /// `record` must stay alive and must not be appended anywhere else until it has been
    /// popped from this queue.
    pub unsafe fn append(&mut self, record: NonNull<WaitRecord>) -> bool {
        let links = &mut *self.links;
        let node = record.as_ref();
        node.next.set(None);
        node.prev.set(links.back);
        match links.back {
            Some(back) => back.as_ref().next.set(Some(record)),
            None => links.front = Some(record),
        }
        links.back = Some(record);
        links.len += 1;
        node.prev.get().is_some()
    }

    /// O(1). Unlinks the front record and hands it back to the caller.
    pub fn pop_front(&mut self) -> Option<NonNull<WaitRecord>> {
        let links = &mut *self.links;
        let front = links.front?;
        // SAFETY: linked records are alive until popped, see append
        let next = unsafe { front.as_ref() }.next.replace(None);
        match next {
            Some(next) => unsafe { next.as_ref() }.prev.set(None),
            None => links.back = None,
        }
        links.front = next;
        links.len -= 1;
        Some(front)
    }

    pub fn front(&self) -> Option<NonNull<WaitRecord>> {
        self.links.front
    }

    pub fn len(&self) -> usize {
        self.links.len
    }

    pub fn is_empty(&self) -> bool {
        self.links.front.is_none()
    }
}
