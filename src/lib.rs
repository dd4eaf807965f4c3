//! A day at a coffee bar, to watch a fair lock at work.
//!
//! Customers are threads; stations are [ServicePoint]s letting a fixed number of them in
//! at once, in arrival order thanks to the [FairLock](sync::FairLock).

pub mod counters;
pub mod customer;
pub mod dispatcher;
pub mod error;
pub mod report;
pub mod service_point;
pub mod sync;

pub use counters::{Counter, LatencySummary, PerKind, SharedCounters};
pub use customer::{Costs, Customer, OrderKind, Stage};
pub use dispatcher::{run_day, DayConfig, DayReport, Mode, Topology};
pub use error::SimError;
pub use service_point::{GateKind, ServicePoint, Token};
