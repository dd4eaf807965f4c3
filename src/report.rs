//! Printing of the day's numbers.

use std::{fmt::Write, time::Duration};

use crate::{
    counters::LatencySummary,
    customer::OrderKind,
    dispatcher::{DayConfig, DayReport},
};

/// `$ D.CC` from cents.
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    format!("$ {sign}{}.{:02}", cents / 100, cents % 100)
}

/// `S.UUUUUU`, seconds with microseconds.
pub fn format_seconds(d: Duration) -> String {
    format!("{}.{:06}", d.as_secs(), d.subsec_micros())
}

pub fn configuration(config: &DayConfig) -> String {
    format!(
        "Customers     :\t{}\n\
         Self Services :\t{}\n\
         Baristas      :\t{}\n\
         Cashiers      :\t{}",
        config.arrivals, config.self_serves, config.baristas, config.cashiers
    )
}

/// The profit and the average latency per order kind, plus min/max if `extended`.
pub fn results(report: &DayReport, extended: bool) -> String {
    let mut out = format!("Profit:\t{}", format_cents(report.revenue));
    for (kind, label) in [(OrderKind::Simple, "Simple "), (OrderKind::Complex, "Complex")] {
        let summary: &LatencySummary = &report.latency[kind];
        // writing to a String can't fail
        let _ = write!(out, "\nAvg {label}:\t{}", format_seconds(summary.average()));
        if extended {
            let _ = write!(
                out,
                "\t(n = {}, min {}, max {})",
                summary.count,
                format_seconds(summary.min),
                format_seconds(summary.max)
            );
        }
    }
    out
}
