//! Completion roll-up and garbage collection of finished work.
//!
//! Runs last in the tick. A leg is complete when every segment it owns is
//! complete; the scanner then flips the owning order's stage flags and
//! removes the leg and its segments from the registry.

use crate::id::*;
use crate::order::{ProductionOrder, RefineVariant};
use crate::registry::Registry;
use crate::sim::Ticks;
use crate::splitter::TaskSplitBuffer;
use crate::task::{LegKind, SegmentStatus};
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    pub completed_legs: Vec<(OrderNo, LegKind)>,
    pub removed_segments: usize,
}

/// Apply the stage-flag effects of a completed leg to its order.
pub fn apply_leg_completion(order: &mut ProductionOrder, kind: LegKind, now: Ticks) {
    let p = &mut order.progress;
    match kind {
        LegKind::LdToLf => p.lf_arrival = Some(now),
        LegKind::LdToRh => p.rh_arrival = Some(now),
        LegKind::LfToRh => {
            p.rh_arrival = Some(now);
            p.lf_completed = true;
        }
        LegKind::LfToCc => {
            p.cc_arrival = Some(now);
            p.lf_completed = true;
        }
        LegKind::RhToCc => {
            p.cc_arrival = Some(now);
            p.rh_completed = true;
        }
    }
    let variant: RefineVariant = order.variant;
    let p = &mut order.progress;
    p.all_completed =
        (!variant.uses_lf() || p.lf_completed) && (!variant.uses_rh() || p.rh_completed);
}

/// Roll up completed segments into completed legs.
pub fn scan(reg: &mut Registry, splitter: &mut TaskSplitBuffer) -> ScanOutcome {
    let now = reg.clock();
    let mut out = ScanOutcome::default();

    // Snapshot before mutating.
    let completed: Vec<(SegmentKey, Option<LegKey>)> = reg
        .segments
        .iter()
        .filter(|(_, s)| s.status == SegmentStatus::Completed)
        .map(|(k, s)| (k, s.leg))
        .collect();

    let mut legs: Vec<LegKey> = Vec::new();
    let mut orphans: Vec<SegmentKey> = Vec::new();
    for (seg_key, leg) in completed {
        match leg.filter(|l| reg.legs.contains(*l)) {
            Some(l) => {
                if !legs.contains(&l) {
                    legs.push(l);
                }
            }
            None => orphans.push(seg_key),
        }
    }

    for leg_key in legs {
        let Some(leg) = reg.legs.get_mut(leg_key) else {
            continue;
        };
        let all_done = leg.segments.iter().all(|s| {
            reg.segments
                .get(*s)
                .is_some_and(|s| s.status == SegmentStatus::Completed)
        });
        if !all_done {
            continue;
        }
        leg.completed = true;
        let (order_key, order_no, kind) = (leg.order_key, leg.order_no, leg.kind);
        let segments = std::mem::take(&mut leg.segments);

        splitter.mark_completed(order_no, kind);
        if let Some(order) = reg.orders.get_mut(order_key) {
            apply_leg_completion(order, kind, now);
        }
        for s in segments {
            if reg.segments.unregister(s).is_some() {
                out.removed_segments += 1;
            }
        }
        reg.legs.unregister(leg_key);
        info!(order = %order_no, leg = %kind, "leg completed");
        out.completed_legs.push((order_no, kind));
    }

    for s in orphans {
        if reg.segments.unregister(s).is_some() {
            out.removed_segments += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn stage_flags_for_dual_refine() {
        let mut order = dual_order(1, "00:00:00");
        apply_leg_completion(&mut order, LegKind::LdToLf, 100);
        assert_eq!(order.progress.lf_arrival, Some(100));
        assert!(!order.progress.lf_completed);

        apply_leg_completion(&mut order, LegKind::LfToRh, 200);
        assert_eq!(order.progress.rh_arrival, Some(200));
        assert!(order.progress.lf_completed);
        assert!(!order.progress.all_completed);

        apply_leg_completion(&mut order, LegKind::RhToCc, 300);
        assert_eq!(order.progress.cc_arrival, Some(300));
        assert!(order.progress.rh_completed);
        assert!(order.progress.all_completed);
    }

    #[test]
    fn lf_only_completes_on_caster_arrival() {
        let mut order = lf_order(1, "00:00:00");
        apply_leg_completion(&mut order, LegKind::LdToLf, 100);
        assert!(!order.progress.all_completed);
        apply_leg_completion(&mut order, LegKind::LfToCc, 900);
        assert!(order.progress.all_completed);
    }

    #[test]
    fn empty_registry_scan_is_a_no_op() {
        let mut reg = build_line_registry();
        let mut split = TaskSplitBuffer::new();
        assert_eq!(scan(&mut reg, &mut split), ScanOutcome::default());
    }
}
