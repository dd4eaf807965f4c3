//! # Dispatcher
//! Sets up the stations for one simulated day, lets the customers in and waits for the
//! last one to leave.
//!
//! 2 layouts:
//! - single stage: every customer queues for the baristas and pays there
//! - two stage: simple orders go to the self-serve machines (3 per self-serve station),
//!   complex ones to the baristas, and everybody pays at the cashiers
//!
//! No self-serve stations means single stage, whatever the cashier count is.

use std::{
    io,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use log::{debug, error, info, warn};
use rand::{rngs::StdRng, SeedableRng};
use strum_macros::{Display, EnumIter, EnumString};

use crate::{
    counters::{LatencySummary, PerKind, SharedCounters},
    customer::{Costs, Customer, OrderKind},
    error::SimError,
    service_point::{GateKind, ServicePoint, StationStats},
};

/// Self-serve machines per self-serve station.
pub const MACHINES_PER_SELF_SERVE: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumIter, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum Mode {
    SingleStage,
    TwoStage,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DayConfig {
    pub arrivals: usize,
    pub self_serves: u32,
    pub baristas: u32,
    pub cashiers: u32,
    pub costs: Costs,
    pub gate: GateKind,
    /// `None` draws the order kinds from entropy
    pub seed: Option<u64>,
    /// extra attempts to start one customer thread before the day is aborted
    pub spawn_retries: u32,
    pub stack_size: usize,
}

impl DayConfig {
    pub const DEFAULT_SPAWN_RETRIES: u32 = 64;
    pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;

    /// A single stage day with the standard costs.
    pub fn new(arrivals: usize, baristas: u32) -> Self {
        Self {
            arrivals,
            self_serves: 0,
            baristas,
            cashiers: 0,
            costs: Costs::STANDARD,
            gate: GateKind::Fifo,
            seed: None,
            spawn_retries: Self::DEFAULT_SPAWN_RETRIES,
            stack_size: Self::DEFAULT_STACK_SIZE,
        }
    }

    pub fn mode(&self) -> Mode {
        if self.self_serves == 0 {
            Mode::SingleStage
        } else {
            Mode::TwoStage
        }
    }
}

/// The stations of one day. They outlive every customer.
pub struct Topology {
    barista: Arc<ServicePoint>,
    /// both present in two stage mode
    self_serve: Option<Arc<ServicePoint>>,
    cashier: Option<Arc<ServicePoint>>,
}

impl Topology {
    pub fn build(config: &DayConfig) -> Result<Self, SimError> {
        let barista = Arc::new(ServicePoint::new("barista", config.baristas, config.gate)?);
        let topology = match config.mode() {
            Mode::SingleStage => Topology {
                barista,
                self_serve: None,
                cashier: None,
            },
            Mode::TwoStage => {
                let machines = config
                    .self_serves
                    .checked_mul(MACHINES_PER_SELF_SERVE)
                    .ok_or(SimError::CapacityOverflow {
                        station: "self-serve",
                        requested: u64::from(config.self_serves)
                            * u64::from(MACHINES_PER_SELF_SERVE),
                    })?;
                Topology {
                    barista,
                    self_serve: Some(Arc::new(ServicePoint::new(
                        "self-serve",
                        machines,
                        config.gate,
                    )?)),
                    cashier: Some(Arc::new(ServicePoint::new(
                        "cashier",
                        config.cashiers,
                        config.gate,
                    )?)),
                }
            }
        };
        debug!("{} topology ready", topology.mode());
        Ok(topology)
    }

    pub fn mode(&self) -> Mode {
        if self.self_serve.is_some() {
            Mode::TwoStage
        } else {
            Mode::SingleStage
        }
    }

    /// Where a customer with this order goes first, and where it pays if that's elsewhere.
    pub fn route(&self, kind: OrderKind) -> (Arc<ServicePoint>, Option<Arc<ServicePoint>>) {
        match (&self.self_serve, kind) {
            (Some(self_serve), OrderKind::Simple) => {
                (Arc::clone(self_serve), self.cashier.clone())
            }
            (Some(_), OrderKind::Complex) => (Arc::clone(&self.barista), self.cashier.clone()),
            (None, _) => (Arc::clone(&self.barista), None),
        }
    }

    pub fn stations(&self) -> impl Iterator<Item = &ServicePoint> {
        std::iter::once(&*self.barista)
            .chain(self.self_serve.as_deref())
            .chain(self.cashier.as_deref())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DayReport {
    pub mode: Mode,
    pub arrivals: usize,
    /// customers started per order kind
    pub spawned: PerKind<usize>,
    /// in cents
    pub revenue: i64,
    pub latency: PerKind<LatencySummary>,
    pub stations: Vec<StationStats>,
    pub wall_time: Duration,
}

impl DayReport {
    /// What the day should have earned given the customers that came.
    pub fn expected_revenue(&self) -> i64 {
        self.spawned.simple as i64 * OrderKind::Simple.price()
            + self.spawned.complex as i64 * OrderKind::Complex.price()
    }
}

/// Runs one day and blocks until every customer has left.
pub fn run_day(config: &DayConfig) -> Result<DayReport, SimError> {
    let topology = Topology::build(config)?;
    let counters = Arc::new(SharedCounters::new(config.arrivals)?);
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    info!(
        "opening: {} customers, {} mode, {} gate",
        config.arrivals,
        topology.mode(),
        config.gate
    );
    let opened = Instant::now();

    let mut spawned = PerKind::default();
    let mut aborted = None;
    for id in 0..config.arrivals {
        let kind = OrderKind::draw(&mut rng);
        let (primary, secondary) = topology.route(kind);

        let started = spawn_with_retry(id, config.spawn_retries, || {
            let customer = Customer::new(
                id,
                kind,
                Arc::clone(&primary),
                secondary.clone(),
                config.costs,
                counters.enlist(),
            );
            // detached, the customer reports through the counters
            thread::Builder::new()
                .name(format!("customer-{id}"))
                .stack_size(config.stack_size)
                .spawn(move || {
                    customer.run();
                })
                .map(drop)
        });

        match started {
            Ok(_) => spawned[kind] += 1,
            Err(e) => {
                aborted = Some(e);
                break;
            }
        }
    }

    // everybody who got in is served, aborted or not
    counters.active.await_zero();
    let wall_time = opened.elapsed();

    for station in topology.stations() {
        debug!(
            "station {}: capacity {}, admitted {}, peak {}",
            station.name(),
            station.capacity(),
            station.admitted(),
            station.peak()
        );
    }

    if let Some(e) = aborted {
        error!("{e}");
        return Err(e);
    }

    let report = DayReport {
        mode: topology.mode(),
        arrivals: config.arrivals,
        spawned,
        revenue: counters.revenue.read(),
        latency: PerKind {
            simple: counters.table(OrderKind::Simple).summary(),
            complex: counters.table(OrderKind::Complex).summary(),
        },
        stations: topology.stations().map(ServicePoint::stats).collect(),
        wall_time,
    };
    info!("closing after {:?}", report.wall_time);
    Ok(report)
}

/// Calls `spawn` until it succeeds, yielding the processor between attempts, at most
/// `retries` times more than once. Returns the number of attempts it took.
///
/// A failed attempt must leave nothing behind: the customer it built is dropped with it,
/// taking itself out of the active count.
pub fn spawn_with_retry(
    arrival: usize,
    retries: u32,
    mut spawn: impl FnMut() -> io::Result<()>,
) -> Result<u32, SimError> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        match spawn() {
            Ok(()) => return Ok(attempts),
            Err(source) if attempts > retries => {
                return Err(SimError::SpawnExhausted {
                    arrival,
                    attempts,
                    source,
                })
            }
            Err(e) => {
                warn!("failed to start customer {arrival} ({e}), trying again");
                thread::yield_now();
            }
        }
    }
}

#[cfg(test)]
mod test {
    use strum::IntoEnumIterator;

    use super::*;

    fn free_day(arrivals: usize, self_serves: u32, baristas: u32, cashiers: u32) -> DayConfig {
        DayConfig {
            self_serves,
            cashiers,
            costs: Costs::FREE,
            seed: Some(42),
            ..DayConfig::new(arrivals, baristas)
        }
    }

    #[test]
    fn test_single_stage_topology() {
        let t = Topology::build(&free_day(1, 0, 2, 0)).unwrap();
        assert_eq!(t.mode(), Mode::SingleStage);
        for kind in OrderKind::iter() {
            let (primary, secondary) = t.route(kind);
            assert_eq!(primary.name(), "barista");
            assert!(secondary.is_none());
        }
        assert_eq!(t.stations().count(), 1);
    }

    #[test]
    fn test_two_stage_topology() {
        let t = Topology::build(&free_day(1, 2, 1, 1)).unwrap();
        assert_eq!(t.mode(), Mode::TwoStage);
        let (simple, pay_at) = t.route(OrderKind::Simple);
        assert_eq!((simple.name(), simple.capacity()), ("self-serve", 6));
        assert_eq!(pay_at.unwrap().name(), "cashier");
        let (complex, pay_at) = t.route(OrderKind::Complex);
        assert_eq!(complex.name(), "barista");
        assert_eq!(pay_at.unwrap().name(), "cashier");
        assert_eq!(t.stations().count(), 3);
    }

    #[test]
    fn test_no_self_serves_ignores_cashiers() {
        // zero cashiers would be rejected if the cashier station was built
        let t = Topology::build(&free_day(1, 0, 1, 0)).unwrap();
        assert_eq!(t.mode(), Mode::SingleStage);
    }

    #[test]
    fn test_zero_stations_are_fatal() {
        assert!(matches!(
            Topology::build(&free_day(1, 0, 0, 0)),
            Err(SimError::ZeroCapacity { station: "barista" })
        ));
        assert!(matches!(
            Topology::build(&free_day(1, 1, 1, 0)),
            Err(SimError::ZeroCapacity { station: "cashier" })
        ));
        assert!(matches!(
            Topology::build(&free_day(1, u32::MAX, 1, 1)),
            Err(SimError::CapacityOverflow { .. })
        ));
    }

    #[test]
    fn test_run_day_single_stage() {
        let report = run_day(&free_day(100, 0, 1, 0)).unwrap();
        assert_eq!(report.mode, Mode::SingleStage);
        assert_eq!(report.spawned.simple + report.spawned.complex, 100);
        assert_eq!(report.revenue, report.expected_revenue());
        assert_eq!(report.latency.simple.count, report.spawned.simple);
        assert_eq!(report.latency.complex.count, report.spawned.complex);
        let bar = report.stations[0];
        assert_eq!((bar.admitted, bar.released, bar.peak), (100, 100, 1));
    }

    #[test]
    fn test_run_day_two_stage() {
        let report = run_day(&free_day(60, 1, 2, 1)).unwrap();
        assert_eq!(report.mode, Mode::TwoStage);
        assert_eq!(report.revenue, report.expected_revenue());
        for s in &report.stations {
            assert!(s.peak <= s.capacity as usize, "{s:?}");
            assert_eq!(s.admitted, s.released);
        }
        // everybody pays at the cashier
        assert_eq!(report.stations[2].admitted, 60);
    }

    #[test]
    fn test_same_seed_same_orders() {
        let a = run_day(&free_day(50, 0, 3, 0)).unwrap();
        let b = run_day(&free_day(50, 0, 3, 0)).unwrap();
        assert_eq!(a.spawned, b.spawned);
        assert_eq!(a.revenue, b.revenue);
    }

    #[test]
    fn test_spawn_retry_recovers() {
        let mut failures = 2;
        let attempts = spawn_with_retry(0, 5, || {
            if failures > 0 {
                failures -= 1;
                Err(io::Error::new(io::ErrorKind::WouldBlock, "busy"))
            } else {
                Ok(())
            }
        })
        .unwrap();
        assert_eq!(attempts, 3);
    }

    #[test]
    fn test_spawn_retry_is_bounded() {
        let mut calls = 0;
        let e = spawn_with_retry(9, 3, || {
            calls += 1;
            Err(io::Error::new(io::ErrorKind::WouldBlock, "busy"))
        })
        .unwrap_err();
        assert_eq!(calls, 4);
        assert!(matches!(
            e,
            SimError::SpawnExhausted {
                arrival: 9,
                attempts: 4,
                ..
            }
        ));
    }

    #[test]
    fn test_failed_spawn_leaves_no_active_customer() {
        let counters = Arc::new(SharedCounters::new(1).unwrap());
        let bar = Arc::new(ServicePoint::new("barista", 1, GateKind::Fifo).unwrap());
        let r = spawn_with_retry(0, 1, || {
            let _customer = Customer::new(
                0,
                OrderKind::Simple,
                bar.clone(),
                None,
                Costs::FREE,
                counters.enlist(),
            );
            Err(io::Error::new(io::ErrorKind::OutOfMemory, "no stack"))
        });
        assert!(r.is_err());
        assert_eq!(counters.active.read(), 0);
        // the barrier doesn't hang on it
        counters.active.await_zero();
    }
}
