//! Headless driver: steps an engine until every ladle is delivered or the
//! run gives up, then summarises the outcome.

use ladle_core::engine::{Engine, SimError};
use ladle_core::query::GoodsReport;
use ladle_core::sim::{Ticks, format_clock};
use std::fmt;
use tracing::{info, warn};

/// When a headless run stops early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLimits {
    /// Seconds past the latest scheduled order end before giving up.
    pub grace: Ticks,
    /// Hard cap on engine steps.
    pub max_steps: Option<u64>,
}

impl RunLimits {
    pub const DEFAULT_GRACE: Ticks = 3600;
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            grace: Self::DEFAULT_GRACE,
            max_steps: None,
        }
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    AllDelivered,
    TimedOut,
    StepLimit,
}

/// Outcome of a headless run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub reason: StopReason,
    pub steps: u64,
    pub end_clock: Ticks,
    pub conflicts: usize,
    pub routing_retries: usize,
    /// Every goods, live first, then delivered.
    pub goods: Vec<GoodsReport>,
}

impl RunSummary {
    pub fn delivered(&self) -> usize {
        self.goods.iter().filter(|g| g.delivered).count()
    }
}

/// Step `engine` until all goods are delivered, the clock passes the latest
/// order end plus `limits.grace`, or `limits.max_steps` is reached.
pub fn run_headless(engine: &mut Engine, limits: RunLimits) -> Result<RunSummary, SimError> {
    let mut conflicts = 0;
    let mut routing_retries = 0;
    let mut taken = 0u64;

    let reason = loop {
        if engine.all_delivered() {
            break StopReason::AllDelivered;
        }
        if engine.timed_out(limits.grace) {
            warn!(clock = %format_clock(engine.clock()), "run timed out");
            break StopReason::TimedOut;
        }
        if limits.max_steps.is_some_and(|max| taken >= max) {
            break StopReason::StepLimit;
        }
        let report = engine.step()?;
        conflicts += report.conflicts;
        routing_retries += report.routing_retries;
        taken += 1;
    };

    info!(
        ?reason,
        steps = taken,
        clock = %format_clock(engine.clock()),
        "run finished"
    );
    Ok(RunSummary {
        reason,
        steps: taken,
        end_clock: engine.clock(),
        conflicts,
        routing_retries,
        goods: engine.goods_report(),
    })
}

/// Per-goods completion table with each station visit.
impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:=<72}", "")?;
        writeln!(
            f,
            "stopped: {:?} after {} steps at {}",
            self.reason,
            self.steps,
            format_clock(self.end_clock)
        )?;
        writeln!(f, "{:-<72}", "")?;
        writeln!(f, "{:<12} {:<8} {:<12} {:<10}", "goods", "variant", "status", "done at")?;
        for g in &self.goods {
            let done_at = g
                .visits
                .last()
                .filter(|_| g.delivered)
                .map(|v| format_clock(v.arrived_at))
                .unwrap_or_else(|| "-".to_string());
            let status = if g.delivered { "delivered" } else { "in transit" };
            writeln!(f, "{:<12} {:<8} {:<12} {:<10}", g.goods_id, g.variant, status, done_at)?;
            for v in &g.visits {
                let left = v.departed_at.map(format_clock).unwrap_or_else(|| "-".to_string());
                writeln!(
                    f,
                    "{:>14} in {}  out {}",
                    v.station,
                    format_clock(v.arrived_at),
                    left
                )?;
            }
        }
        writeln!(f, "{:-<72}", "")?;
        writeln!(
            f,
            "delivered {}/{}, conflicts {}, routing retries {}",
            self.delivered(),
            self.goods.len(),
            self.conflicts,
            self.routing_retries
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ladle_core::test_utils::*;

    #[test]
    fn runs_until_everything_is_delivered() {
        let mut engine = line_engine(vec![lf_order(1, "00:00:00"), rh_order(2, "00:30:00")]);
        let summary = run_headless(&mut engine, RunLimits::default()).unwrap();
        assert_eq!(summary.reason, StopReason::AllDelivered);
        assert_eq!(summary.delivered(), 2);
        assert_eq!(summary.steps, engine.steps());
    }

    #[test]
    fn step_limit_stops_early() {
        let mut engine = line_engine(vec![lf_order(1, "00:00:00")]);
        let limits = RunLimits {
            max_steps: Some(5),
            ..Default::default()
        };
        let summary = run_headless(&mut engine, limits).unwrap();
        assert_eq!(summary.reason, StopReason::StepLimit);
        assert_eq!(summary.steps, 5);
        assert_eq!(summary.end_clock, 50);
        assert_eq!(summary.delivered(), 0);
    }

    #[test]
    fn undeliverable_order_times_out() {
        let mut engine = line_engine(vec![lf_order(1, "00:00:00")]);
        // Detached from its track, C1 is never bound to the queued segment.
        let c1 = engine.registry.vehicles.key_of("C1").unwrap();
        let t1 = engine.registry.tracks.key_of("T1").unwrap();
        engine.registry.tracks.get_mut(t1).unwrap().vehicles.retain(|&v| v != c1);

        let limits = RunLimits {
            grace: 0,
            max_steps: Some(2000),
        };
        let summary = run_headless(&mut engine, limits).unwrap();
        assert_eq!(summary.reason, StopReason::TimedOut);
        assert!(summary.end_clock > engine.latest_order_end().unwrap());
        assert_eq!(summary.delivered(), 0);
    }

    #[test]
    fn summary_table_lists_visits() {
        let mut engine = line_engine(vec![lf_order(1, "00:00:00")]);
        let summary = run_headless(&mut engine, RunLimits::default()).unwrap();
        let text = summary.to_string();
        assert!(text.contains("goods_1"));
        assert!(text.contains("delivered 1/1"));
        assert!(text.contains("1LF"));
    }
}
