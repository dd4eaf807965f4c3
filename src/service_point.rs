//! # Service point
//! A station with a fixed number of service points, i.e. at most `capacity` customers are
//! served at once.
//!
//! Getting in is 2 steps:
//! 1. win the turn to try, serialized by the admission gate
//! 2. take a token from the pool, sleeping if all of them are out
//!
//! The gate is released as soon as a token is held, so it's never kept for the whole
//! service. With the FIFO gate the order of *attempts* is the arrival order. Who gets a
//! token once one is freed is up to the semaphore, same as being next in line only gets
//! you into the room, not a seat.

use std::sync::atomic::{AtomicUsize, Ordering::SeqCst};

use log::debug;
use strum_macros::{Display, EnumIter, EnumString};

use crate::{
    error::SimError,
    sync::{FairLock, Mutex, Semaphore},
};

/// How the decision to take a token is serialized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display, EnumIter, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum GateKind {
    /// strict arrival order through the [FairLock]
    #[default]
    Fifo,
    /// whoever is fastest, through the plain [Mutex]
    Plain,
}

enum Gate {
    Fifo(FairLock<()>),
    Plain(Mutex<()>),
}

impl Gate {
    fn new(kind: GateKind) -> Self {
        match kind {
            GateKind::Fifo => Gate::Fifo(FairLock::new(())),
            GateKind::Plain => Gate::Plain(Mutex::new(())),
        }
    }

    /// Runs `f` while holding the turn.
    fn take_turn<R>(&self, f: impl FnOnce() -> R) -> R {
        match self {
            Gate::Fifo(lock) => {
                let _turn = lock.acquire();
                f()
            }
            Gate::Plain(lock) => {
                let _turn = lock.lock();
                f()
            }
        }
    }
}

pub struct ServicePoint {
    name: &'static str,
    capacity: u32,
    gate: Gate,
    tokens: Semaphore,
    admitted: AtomicUsize,
    released: AtomicUsize,
    occupied: AtomicUsize,
    peak: AtomicUsize,
}

impl ServicePoint {
    pub fn new(name: &'static str, capacity: u32, gate: GateKind) -> Result<Self, SimError> {
        if capacity == 0 {
            return Err(SimError::ZeroCapacity { station: name });
        }
        debug!("station {name}: {capacity} service points, {gate} gate");
        Ok(Self {
            name,
            capacity,
            gate: Gate::new(gate),
            tokens: Semaphore::new(capacity),
            admitted: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
            occupied: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    /// Blocks until one of the service points is ours.
    pub fn admit(&self) -> Token<'_> {
        self.gate.take_turn(|| self.tokens.acquire());

        self.admitted.fetch_add(1, SeqCst);
        let now = self.occupied.fetch_add(1, SeqCst) + 1;
        self.peak.fetch_max(now, SeqCst);
        Token { point: self }
    }

    /// Hands a token back. Never blocks and doesn't need the gate.
    fn release_token(&self) {
        // leave before the token is up for grabs, so occupied never overshoots
        self.occupied.fetch_sub(1, SeqCst);
        self.released.fetch_add(1, SeqCst);
        self.tokens.release();
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn admitted(&self) -> usize {
        self.admitted.load(SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(SeqCst)
    }

    pub fn occupied(&self) -> usize {
        self.occupied.load(SeqCst)
    }

    /// The most tokens that were out at the same time.
    pub fn peak(&self) -> usize {
        self.peak.load(SeqCst)
    }

    pub fn stats(&self) -> StationStats {
        StationStats {
            name: self.name,
            capacity: self.capacity,
            admitted: self.admitted(),
            released: self.released(),
            peak: self.peak(),
        }
    }
}

/// A held service point, given back on drop.
#[must_use = "dropping the token gives the service point back at once"]
pub struct Token<'a> {
    point: &'a ServicePoint,
}

impl Token<'_> {
    pub fn release(self) {}
}

impl Drop for Token<'_> {
    fn drop(&mut self) {
        self.point.release_token();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StationStats {
    pub name: &'static str,
    pub capacity: u32,
    pub admitted: usize,
    pub released: usize,
    pub peak: usize,
}

#[cfg(test)]
mod test {
    use std::{
        thread::{scope, sleep, yield_now},
        time::Duration,
    };

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_zero_capacity_rejected() {
        for gate in GateKind::iter() {
            assert!(matches!(
                ServicePoint::new("nobody", 0, gate),
                Err(SimError::ZeroCapacity { station: "nobody" })
            ));
        }
    }

    #[test]
    fn test_admission_bound_and_conservation() {
        for gate in GateKind::iter() {
            for capacity in 1..=3 {
                let point = ServicePoint::new("bar", capacity, gate).unwrap();
                scope(|s| {
                    for _ in 0..8 {
                        s.spawn(|| {
                            for _ in 0..100 {
                                let token = point.admit();
                                assert!(point.occupied() <= capacity as usize);
                                yield_now();
                                token.release();
                            }
                        });
                    }
                });
                assert!(point.peak() <= capacity as usize, "{gate}: peak over {capacity}");
                assert_eq!(point.admitted(), 800);
                assert_eq!(point.admitted(), point.released());
                assert_eq!(point.occupied(), 0);
            }
        }
    }

    #[test]
    fn test_full_station_blocks_until_release() {
        let point = ServicePoint::new("cashier", 1, GateKind::Fifo).unwrap();
        let first = point.admit();
        scope(|s| {
            let waiter = s.spawn(|| {
                let _t = point.admit();
                point.admitted()
            });
            // the waiter can't get in while the only token is out
            sleep(Duration::from_millis(50));
            assert_eq!(point.admitted(), 1);
            first.release();
            assert_eq!(waiter.join().unwrap(), 2);
        });
        assert_eq!(point.stats().peak, 1);
    }

    #[test]
    fn test_gate_parses() {
        assert_eq!("fifo".parse::<GateKind>().unwrap(), GateKind::Fifo);
        assert_eq!(GateKind::Plain.to_string(), "plain");
    }
}
