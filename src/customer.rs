//! # Customer
//! One arrival, run by one thread from start to finish.
//!
//! ```text
//! Created -> AwaitingPrimary -> InPrimaryService -> Paid -> Recorded -> Terminated
//!                                      |              ^
//!                                      v              |
//!                      AwaitingSecondary -> InSecondaryService
//! ```
//!
//! The customer pays at its last stop. Service and payment are spins, not sleeps: they model
//! fixed work done while holding the token.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use log::trace;
use rand::Rng;
use strum_macros::{Display, EnumCount, EnumIter, EnumString};

use crate::{counters::Enlistment, service_point::ServicePoint};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumCount, EnumIter, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum OrderKind {
    Simple,
    Complex,
}

impl OrderKind {
    /// in cents
    pub const fn price(self) -> i64 {
        match self {
            OrderKind::Simple => 200,
            OrderKind::Complex => 450,
        }
    }

    /// Either kind with the same odds.
    pub fn draw<R: Rng + ?Sized>(rng: &mut R) -> Self {
        if rng.gen_bool(0.5) {
            OrderKind::Simple
        } else {
            OrderKind::Complex
        }
    }
}

/// Spin iterations spent on each step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Costs {
    pub simple: u64,
    pub complex: u64,
    pub pay: u64,
}

impl Costs {
    pub const STANDARD: Costs = Costs {
        simple: 1 << 18,
        complex: 1 << 19,
        pay: 1 << 18,
    };

    /// For tests that only care about the bookkeeping.
    pub const FREE: Costs = Costs {
        simple: 0,
        complex: 0,
        pay: 0,
    };

    pub fn service(&self, kind: OrderKind) -> u64 {
        match kind {
            OrderKind::Simple => self.simple,
            OrderKind::Complex => self.complex,
        }
    }

    /// Every cost divided by `divisor`, keeping the ratios.
    pub fn scaled_down(self, divisor: u64) -> Self {
        let divisor = divisor.max(1);
        Costs {
            simple: self.simple / divisor,
            complex: self.complex / divisor,
            pay: self.pay / divisor,
        }
    }
}

impl Default for Costs {
    fn default() -> Self {
        Costs::STANDARD
    }
}

/// Burns `iterations` loop turns the optimizer can't remove.
pub fn spin(iterations: u64) {
    for i in 0..iterations {
        std::hint::black_box(i);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum Stage {
    Created,
    AwaitingPrimary,
    InPrimaryService,
    AwaitingSecondary,
    InSecondaryService,
    Paid,
    Recorded,
    Terminated,
}

impl Stage {
    pub fn may_follow(self, prev: Stage) -> bool {
        use Stage::*;
        matches!(
            (prev, self),
            (Created, AwaitingPrimary)
                | (AwaitingPrimary, InPrimaryService)
                | (InPrimaryService, Paid)
                | (InPrimaryService, AwaitingSecondary)
                | (AwaitingSecondary, InSecondaryService)
                | (InSecondaryService, Paid)
                | (Paid, Recorded)
                | (Recorded, Terminated)
        )
    }
}

/// What a finished customer leaves behind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub kind: OrderKind,
    pub latency: Duration,
    pub caffeinated: bool,
}

pub struct Customer {
    id: usize,
    kind: OrderKind,
    primary: Arc<ServicePoint>,
    /// where to pay, the primary if none
    secondary: Option<Arc<ServicePoint>>,
    costs: Costs,
    stage: Stage,
    caffeinated: bool,
    start: Option<Instant>,
    enlistment: Enlistment,
}

impl Customer {
    pub fn new(
        id: usize,
        kind: OrderKind,
        primary: Arc<ServicePoint>,
        secondary: Option<Arc<ServicePoint>>,
        costs: Costs,
        enlistment: Enlistment,
    ) -> Self {
        Self {
            id,
            kind,
            primary,
            secondary,
            costs,
            stage: Stage::Created,
            caffeinated: false,
            start: None,
            enlistment,
        }
    }

    pub fn kind(&self) -> OrderKind {
        self.kind
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Runs the whole visit. Leaves the active count on return (or unwind).
    pub fn run(mut self) -> Receipt {
        self.start = Some(Instant::now());
        self.advance(Stage::AwaitingPrimary);

        let primary = Arc::clone(&self.primary);
        let token = primary.admit();
        self.advance(Stage::InPrimaryService);
        self.serve();

        match self.secondary.clone() {
            None => {
                self.pay();
                token.release();
            }
            Some(cashier) => {
                token.release();
                self.advance(Stage::AwaitingSecondary);
                let token = cashier.admit();
                self.advance(Stage::InSecondaryService);
                self.pay();
                token.release();
            }
        }

        let receipt = self.record();
        self.advance(Stage::Terminated);
        receipt
    }

    fn advance(&mut self, next: Stage) {
        debug_assert!(
            next.may_follow(self.stage),
            "customer {}: {} -> {}",
            self.id,
            self.stage,
            next
        );
        trace!("customer {} ({}): {} -> {}", self.id, self.kind, self.stage, next);
        self.stage = next;
    }

    fn serve(&mut self) {
        spin(self.costs.service(self.kind));
        self.caffeinated = true;
    }

    fn pay(&mut self) {
        spin(self.costs.pay);
        self.enlistment.counters().revenue.increment(self.kind.price());
        self.advance(Stage::Paid);
    }

    fn record(&mut self) -> Receipt {
        let latency = self.start.map(|start| start.elapsed()).unwrap_or_default();
        self.enlistment.counters().table(self.kind).record(latency);
        self.advance(Stage::Recorded);
        Receipt {
            kind: self.kind,
            latency,
            caffeinated: self.caffeinated,
        }
    }
}

#[cfg(test)]
mod test {
    use rand::{rngs::StdRng, SeedableRng};
    use strum::{EnumCount, IntoEnumIterator};

    use crate::{counters::SharedCounters, service_point::GateKind};

    use super::*;

    fn station(name: &'static str, capacity: u32) -> Arc<ServicePoint> {
        Arc::new(ServicePoint::new(name, capacity, GateKind::Fifo).unwrap())
    }

    #[test]
    fn test_pays_at_the_only_stop() {
        let counters = Arc::new(SharedCounters::new(1).unwrap());
        let bar = station("barista", 1);
        let c = Customer::new(
            0,
            OrderKind::Complex,
            bar.clone(),
            None,
            Costs::FREE,
            counters.enlist(),
        );
        assert_eq!(c.stage(), Stage::Created);
        assert_eq!(counters.active.read(), 1);

        let receipt = c.run();
        assert!(receipt.caffeinated);
        assert_eq!(receipt.kind, OrderKind::Complex);
        let recorded = counters.table(OrderKind::Complex).summary();
        assert_eq!((recorded.count, recorded.max), (1, receipt.latency));
        assert_eq!(counters.revenue.read(), OrderKind::Complex.price());
        assert_eq!(counters.completed(OrderKind::Complex), 1);
        assert_eq!(counters.completed(OrderKind::Simple), 0);
        assert_eq!(counters.active.read(), 0);
        assert_eq!((bar.admitted(), bar.released()), (1, 1));
    }

    #[test]
    fn test_pays_at_the_cashier() {
        let counters = Arc::new(SharedCounters::new(1).unwrap());
        let self_serve = station("self-serve", 3);
        let cashier = station("cashier", 1);
        Customer::new(
            0,
            OrderKind::Simple,
            self_serve.clone(),
            Some(cashier.clone()),
            Costs::FREE,
            counters.enlist(),
        )
        .run();
        assert_eq!(counters.revenue.read(), OrderKind::Simple.price());
        assert_eq!(self_serve.released(), 1);
        assert_eq!(cashier.released(), 1);
        assert_eq!(self_serve.occupied() + cashier.occupied(), 0);
    }

    #[test]
    fn test_transitions() {
        use Stage::*;
        let paid_at_primary = [
            Created,
            AwaitingPrimary,
            InPrimaryService,
            Paid,
            Recorded,
            Terminated,
        ];
        let paid_at_secondary = [
            Created,
            AwaitingPrimary,
            InPrimaryService,
            AwaitingSecondary,
            InSecondaryService,
            Paid,
            Recorded,
            Terminated,
        ];
        for path in [&paid_at_primary[..], &paid_at_secondary[..]] {
            for w in path.windows(2) {
                assert!(w[1].may_follow(w[0]), "{} -> {}", w[0], w[1]);
            }
        }
        assert!(!Paid.may_follow(AwaitingSecondary));
        assert!(!Created.may_follow(Terminated));
    }

    #[test]
    fn test_draw_covers_both_kinds() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = [0usize; OrderKind::COUNT];
        for _ in 0..1_000 {
            seen[OrderKind::draw(&mut rng) as usize] += 1;
        }
        assert!(seen.iter().all(|&n| n > 300), "{seen:?}");
        assert_eq!(OrderKind::iter().count(), 2);
    }

    #[test]
    fn test_scaled_costs() {
        let c = Costs::STANDARD.scaled_down(1 << 10);
        assert_eq!(c.complex, 2 * c.simple);
        assert_eq!(Costs::STANDARD.scaled_down(0), Costs::STANDARD);
    }
}
