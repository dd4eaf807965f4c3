//! # Shared counters
//! Everything the customers report into: how many of them are still around, the money,
//! and one latency table per order kind.
//!
//! Each aggregate has its own lock, there's no lock over all of them.

use std::{
    ops::{Index, IndexMut},
    sync::Arc,
    time::Duration,
};

use crate::{
    customer::OrderKind,
    error::SimError,
    sync::{Broadcast, Mutex},
};

/// An integer behind its own lock, with a broadcast whenever it drops to zero.
pub struct Counter {
    value: Mutex<i64>,
    zero: Broadcast,
}

impl Counter {
    pub const fn new(value: i64) -> Self {
        Self {
            value: Mutex::new(value),
            zero: Broadcast::new(),
        }
    }

    pub fn increment(&self, n: i64) {
        self.update(|v| v + n);
    }

    pub fn decrement(&self, n: i64) {
        self.update(|v| v - n);
    }

    pub fn set(&self, n: i64) {
        self.update(|_| n);
    }

    pub fn read(&self) -> i64 {
        *self.value.lock()
    }

    /// Sleeps until the value is down to zero.
    pub fn await_zero(&self) {
        let g = self.zero.wait_while(self.value.lock(), |v| *v > 0);
        debug_assert!(*g == 0, "counter went below zero: {}", *g);
    }

    fn update(&self, f: impl FnOnce(i64) -> i64) {
        let mut g = self.value.lock();
        let was = *g;
        *g = f(was);
        // broadcast under the lock, so a waiter can't check between our write and the wake
        if *g == 0 && was != 0 {
            self.zero.notify_all();
        }
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new(0)
    }
}

/// One value per order kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PerKind<T> {
    pub simple: T,
    pub complex: T,
}

impl<T> PerKind<T> {
    pub fn try_from_fn<E>(mut f: impl FnMut(OrderKind) -> Result<T, E>) -> Result<Self, E> {
        Ok(Self {
            simple: f(OrderKind::Simple)?,
            complex: f(OrderKind::Complex)?,
        })
    }

    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> PerKind<U> {
        PerKind {
            simple: f(&self.simple),
            complex: f(&self.complex),
        }
    }
}

impl<T> Index<OrderKind> for PerKind<T> {
    type Output = T;
    fn index(&self, kind: OrderKind) -> &Self::Output {
        match kind {
            OrderKind::Simple => &self.simple,
            OrderKind::Complex => &self.complex,
        }
    }
}

impl<T> IndexMut<OrderKind> for PerKind<T> {
    fn index_mut(&mut self, kind: OrderKind) -> &mut Self::Output {
        match kind {
            OrderKind::Simple => &mut self.simple,
            OrderKind::Complex => &mut self.complex,
        }
    }
}

/// Completion latencies of one order kind, in completion order.
///
/// The room for every arrival is reserved up front, so recording never allocates.
pub struct LatencyTable {
    entries: Mutex<Vec<Duration>>,
}

impl LatencyTable {
    pub fn with_capacity(arrivals: usize) -> Result<Self, SimError> {
        let mut entries = Vec::new();
        entries
            .try_reserve_exact(arrivals)
            .map_err(|_| SimError::OutOfMemory {
                what: "latency table",
                requested: arrivals,
            })?;
        Ok(Self {
            entries: Mutex::new(entries),
        })
    }

    /// Returns the slot the latency went to.
    pub fn record(&self, latency: Duration) -> usize {
        let mut entries = self.entries.lock();
        entries.push(latency);
        entries.len() - 1
    }

    pub fn completed(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn summary(&self) -> LatencySummary {
        LatencySummary::of(&self.entries.lock())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LatencySummary {
    pub count: usize,
    pub total: Duration,
    pub min: Duration,
    pub max: Duration,
}

impl LatencySummary {
    pub fn of(latencies: &[Duration]) -> Self {
        Self {
            count: latencies.len(),
            total: latencies.iter().sum(),
            min: latencies.iter().min().copied().unwrap_or_default(),
            max: latencies.iter().max().copied().unwrap_or_default(),
        }
    }

    /// Zero when nothing was recorded.
    pub fn average(&self) -> Duration {
        match u32::try_from(self.count) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.total / n,
            Err(_) => Duration::from_secs_f64(self.total.as_secs_f64() / self.count as f64),
        }
    }
}

/// The process-wide aggregates of one simulated day.
///
/// The completed count of a kind is the length of its latency table, kept under that
/// table's lock.
pub struct SharedCounters {
    pub active: Counter,
    /// in cents
    pub revenue: Counter,
    tables: PerKind<LatencyTable>,
}

impl SharedCounters {
    pub fn new(arrivals: usize) -> Result<Self, SimError> {
        Ok(Self {
            active: Counter::new(0),
            revenue: Counter::new(0),
            tables: PerKind::try_from_fn(|_| LatencyTable::with_capacity(arrivals))?,
        })
    }

    pub fn table(&self, kind: OrderKind) -> &LatencyTable {
        &self.tables[kind]
    }

    pub fn completed(&self, kind: OrderKind) -> usize {
        self.tables[kind].completed()
    }

    /// Counts one more active customer until the returned [Enlistment] is dropped.
    pub fn enlist(self: &Arc<Self>) -> Enlistment {
        self.active.increment(1);
        Enlistment {
            counters: Arc::clone(self),
        }
    }
}

/// A customer's place in the active count.
///
/// Whatever happens to the customer, dropping this takes it out of the count, so the
/// completion barrier can't wait for a customer that never started or died halfway.
pub struct Enlistment {
    counters: Arc<SharedCounters>,
}

impl Enlistment {
    pub fn counters(&self) -> &SharedCounters {
        &self.counters
    }
}

impl Drop for Enlistment {
    fn drop(&mut self) {
        self.counters.active.decrement(1);
    }
}
