//! Decomposes released orders into sequentially dependent legs.
//!
//! Each refining variant has a fixed leg template. A leg is generated once
//! its scheduled start has passed and its predecessor is both generated and
//! completed, so a late leg delays every leg after it.

use crate::engine::SimError;
use crate::id::*;
use crate::order::ProductionOrder;
use crate::registry::Registry;
use crate::sim::Ticks;
use crate::task::{Leg, LegKind};
use std::collections::HashMap;
use tracing::info;

/// Progress flags for one (order, leg kind) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LegStatus {
    pub generated: bool,
    pub routed: bool,
    pub completed: bool,
}

/// One entry of an order's leg template, resolved against the order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegPlan {
    pub kind: LegKind,
    pub start: String,
    pub end: String,
    pub scheduled_start: Ticks,
    pub nominal_duration: u32,
}

/// Resolve an order's leg template into concrete stations and times.
pub fn leg_plan(order: &ProductionOrder) -> Vec<LegPlan> {
    let s = &order.schedule;
    let lf = order.lf_station.clone().unwrap_or_default();
    let rh = order.rh_station.clone().unwrap_or_default();
    let lf_end = s.lf_end.unwrap_or(s.task_start);
    let rh_end = s.rh_end.unwrap_or(s.task_start);
    order
        .variant
        .legs()
        .iter()
        .map(|&kind| {
            let (start, end, scheduled_start) = match kind {
                LegKind::LdToLf => (order.origin.clone(), lf.clone(), s.task_start),
                LegKind::LdToRh => (order.origin.clone(), rh.clone(), s.task_start),
                LegKind::LfToRh => (lf.clone(), rh.clone(), lf_end),
                LegKind::LfToCc => (lf.clone(), order.terminal.clone(), lf_end),
                LegKind::RhToCc => (rh.clone(), order.terminal.clone(), rh_end),
            };
            LegPlan {
                kind,
                start,
                end,
                scheduled_start,
                nominal_duration: order.durations.for_leg(kind),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct TaskSplitBuffer {
    status: HashMap<(OrderNo, LegKind), LegStatus>,
}

impl TaskSplitBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self, order: OrderNo, kind: LegKind) -> LegStatus {
        self.status.get(&(order, kind)).copied().unwrap_or_default()
    }

    /// Mark a generated leg routed. Returns false if it was never generated.
    pub fn mark_routed(&mut self, order: OrderNo, kind: LegKind) -> bool {
        match self.status.get_mut(&(order, kind)) {
            Some(s) if s.generated => {
                s.routed = true;
                true
            }
            _ => false,
        }
    }

    /// Mark a generated leg completed. Returns false if it was never generated.
    pub fn mark_completed(&mut self, order: OrderNo, kind: LegKind) -> bool {
        match self.status.get_mut(&(order, kind)) {
            Some(s) if s.generated => {
                s.completed = true;
                true
            }
            _ => false,
        }
    }

    /// Generate every leg that has become eligible. Returns the new legs in
    /// generation order.
    pub fn scan(&mut self, reg: &mut Registry) -> Result<Vec<LegKey>, SimError> {
        let now = reg.clock();
        let mut out = Vec::new();
        for order_key in reg.orders.keys() {
            let Some(order) = reg.orders.get(order_key) else {
                continue;
            };
            let order_no = order.order_no;
            let plan = leg_plan(order);

            for (i, step) in plan.iter().enumerate() {
                if self.status(order_no, step.kind).generated {
                    continue;
                }
                if step.scheduled_start > now {
                    break;
                }
                if i > 0 {
                    let prev = self.status(order_no, plan[i - 1].kind);
                    if !(prev.generated && prev.completed) {
                        break;
                    }
                }

                let start = resolve(reg, order_no, &step.start)?;
                let end = resolve(reg, order_no, &step.end)?;
                let leg = Leg {
                    order_key,
                    order_no,
                    kind: step.kind,
                    start,
                    end,
                    scheduled_start: step.scheduled_start,
                    nominal_duration: step.nominal_duration,
                    generated_at: now,
                    routed: false,
                    completed: false,
                    segments: Vec::new(),
                };
                if let Some(key) = reg.legs.register(Leg::name_for(order_no, step.kind), leg) {
                    out.push(key);
                }
                self.status.entry((order_no, step.kind)).or_default().generated = true;
                info!(
                    order = %order_no,
                    leg = %step.kind,
                    from = %step.start,
                    to = %step.end,
                    "leg generated"
                );
            }
        }
        Ok(out)
    }
}

fn resolve(reg: &Registry, order: OrderNo, id: &str) -> Result<StationKey, SimError> {
    reg.stations
        .key_of(id)
        .ok_or_else(|| SimError::UnknownOrderStation {
            order,
            station: id.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::TaskDispatcher;
    use crate::sim::{minutes, parse_clock};
    use crate::test_utils::*;

    fn released(orders: Vec<ProductionOrder>) -> Registry {
        let mut reg = build_line_registry();
        reg.set_clock(parse_clock("12:00:00").unwrap());
        let mut d = TaskDispatcher::new(orders).unwrap();
        d.dispatch(&mut reg).unwrap();
        reg.set_clock(0);
        reg
    }

    #[test]
    fn templates_per_variant() {
        let plan = leg_plan(&lf_order(1, "00:00:00"));
        let kinds: Vec<LegKind> = plan.iter().map(|p| p.kind).collect();
        assert_eq!(kinds, vec![LegKind::LdToLf, LegKind::LfToCc]);
        assert_eq!(plan[0].start, "1LD");
        assert_eq!(plan[0].end, "1LF");
        assert_eq!(plan[1].end, "1CC");
        assert_eq!(plan[0].nominal_duration, 5);
        assert_eq!(plan[1].nominal_duration, 8);

        let dual = leg_plan(&dual_order(2, "00:00:00"));
        assert_eq!(dual[1].kind, LegKind::LfToRh);
        assert_eq!(dual[1].start, "1LF");
        assert_eq!(dual[1].end, "1RH");
        assert_eq!(dual[2].scheduled_start, dual_order(2, "00:00:00").schedule.rh_end.unwrap());
    }

    #[test]
    fn first_leg_generated_once() {
        let mut reg = released(vec![lf_order(1, "00:00:00")]);
        let mut split = TaskSplitBuffer::new();
        let legs = split.scan(&mut reg).unwrap();
        assert_eq!(legs.len(), 1);
        assert!(split.status(OrderNo(1), LegKind::LdToLf).generated);

        // Idempotent at the same clock.
        assert!(split.scan(&mut reg).unwrap().is_empty());
        assert_eq!(reg.legs.len(), 1);
    }

    #[test]
    fn second_leg_waits_for_predecessor_completion() {
        let mut reg = released(vec![lf_order(1, "00:00:00")]);
        let mut split = TaskSplitBuffer::new();
        split.scan(&mut reg).unwrap();

        // LF end has passed but the first leg is still in flight.
        reg.set_clock(minutes(200));
        assert!(split.scan(&mut reg).unwrap().is_empty());

        assert!(split.mark_completed(OrderNo(1), LegKind::LdToLf));
        let legs = split.scan(&mut reg).unwrap();
        assert_eq!(legs.len(), 1);
        assert_eq!(reg.legs.get(legs[0]).unwrap().kind, LegKind::LfToCc);
    }

    #[test]
    fn second_leg_waits_for_its_scheduled_start() {
        let mut reg = released(vec![lf_order(1, "00:00:00")]);
        let mut split = TaskSplitBuffer::new();
        split.scan(&mut reg).unwrap();
        split.mark_completed(OrderNo(1), LegKind::LdToLf);

        reg.set_clock(minutes(10));
        assert!(split.scan(&mut reg).unwrap().is_empty());
    }

    #[test]
    fn marking_unknown_leg_fails() {
        let mut split = TaskSplitBuffer::new();
        assert!(!split.mark_completed(OrderNo(4), LegKind::LdToRh));
        assert!(!split.mark_routed(OrderNo(4), LegKind::LdToRh));
        assert_eq!(split.status(OrderNo(4), LegKind::LdToRh), LegStatus::default());
    }
}
