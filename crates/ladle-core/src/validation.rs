//! Invariant checks and determinism tools.
//!
//! [`check_invariants`] walks the registry and reports every broken
//! structural rule. [`diff_engines`] compares two engines that were fed the
//! same input and lists where they diverge.

use crate::engine::Engine;
use crate::id::*;
use crate::order::GoodsLocation;
use crate::registry::Registry;
use crate::task::SegmentStatus;
use crate::track::MAX_VEHICLES_PER_TRACK;
use crate::vehicle::VehicleStatus;

// ---------------------------------------------------------------------------
// Invariants
// ---------------------------------------------------------------------------

/// One broken structural rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// A live goods is held by zero or several containers.
    GoodsContainers { goods: String, holders: usize },
    /// A goods' recorded location disagrees with the container holding it.
    GoodsLocation { goods: String },
    /// A container holds a goods key that is not live.
    DanglingGoods { holder: String },
    /// A released order has neither live nor delivered goods.
    GoodsLost { order: OrderNo },
    /// A completed leg still owns a segment that is not completed.
    LegIncomplete { leg: String },
    /// Vehicle status disagrees with whether it holds a segment.
    VehicleStatus {
        vehicle: String,
        status: VehicleStatus,
        has_segment: bool,
    },
    /// More than one vehicle holds the same segment.
    SegmentSharedBy { segment: String, vehicles: usize },
    /// A track hosts more residents than allowed.
    TrackOverCapacity { track: String, residents: usize },
}

/// Check every structural invariant. Returns an empty list when all hold.
pub fn check_invariants(reg: &Registry) -> Vec<Violation> {
    let mut out = Vec::new();
    check_goods(reg, &mut out);
    check_legs(reg, &mut out);
    check_vehicles(reg, &mut out);
    for track in reg.tracks.values() {
        if track.vehicles.len() > MAX_VEHICLES_PER_TRACK {
            out.push(Violation::TrackOverCapacity {
                track: track.id.clone(),
                residents: track.vehicles.len(),
            });
        }
    }
    out
}

fn check_goods(reg: &Registry, out: &mut Vec<Violation>) {
    for (gk, goods) in reg.goods.iter() {
        let at_stations: Vec<StationKey> = reg
            .stations
            .iter()
            .filter(|(_, ws)| ws.goods.iter().any(|h| h.goods == gk))
            .map(|(k, _)| k)
            .collect();
        let on_vehicles: Vec<VehicleKey> = reg
            .vehicles
            .iter()
            .filter(|(_, v)| v.goods == Some(gk))
            .map(|(k, _)| k)
            .collect();
        let holders = at_stations.len() + on_vehicles.len();
        if holders != 1 {
            out.push(Violation::GoodsContainers {
                goods: goods.goods_id.clone(),
                holders,
            });
            continue;
        }
        let consistent = match goods.location {
            GoodsLocation::Station(s) => at_stations == [s],
            GoodsLocation::Vehicle(v) => on_vehicles == [v],
            GoodsLocation::Delivered(_) => false,
        };
        if !consistent {
            out.push(Violation::GoodsLocation {
                goods: goods.goods_id.clone(),
            });
        }
    }

    for ws in reg.stations.values() {
        if ws.goods.iter().any(|h| !reg.goods.contains(h.goods)) {
            out.push(Violation::DanglingGoods {
                holder: ws.id.clone(),
            });
        }
    }
    for v in reg.vehicles.values() {
        if v.goods.is_some_and(|g| !reg.goods.contains(g)) {
            out.push(Violation::DanglingGoods {
                holder: v.id.clone(),
            });
        }
    }

    for order in reg.orders.values() {
        let live = reg.goods_for_order(order.order_no).is_some();
        let delivered = reg.delivered().iter().any(|g| g.order_no == order.order_no);
        if !live && !delivered {
            out.push(Violation::GoodsLost {
                order: order.order_no,
            });
        }
    }
}

fn check_legs(reg: &Registry, out: &mut Vec<Violation>) {
    for (key, leg) in reg.legs.iter() {
        if !leg.completed {
            continue;
        }
        let all_done = leg.segments.iter().all(|s| {
            reg.segments
                .get(*s)
                .is_none_or(|s| s.status == SegmentStatus::Completed)
        });
        if !all_done {
            out.push(Violation::LegIncomplete {
                leg: reg.legs.name_of(key).unwrap_or_default().to_string(),
            });
        }
    }
}

fn check_vehicles(reg: &Registry, out: &mut Vec<Violation>) {
    for v in reg.vehicles.values() {
        let has_segment = v.segment.is_some();
        let idle = v.status == VehicleStatus::Idle;
        if idle == has_segment {
            out.push(Violation::VehicleStatus {
                vehicle: v.id.clone(),
                status: v.status,
                has_segment,
            });
        }
    }
    for (sk, _) in reg.segments.iter() {
        let holders = reg
            .vehicles
            .values()
            .filter(|v| v.segment == Some(sk))
            .count();
        if holders > 1 {
            out.push(Violation::SegmentSharedBy {
                segment: reg.segments.name_of(sk).unwrap_or_default().to_string(),
                vehicles: holders,
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Engine diff
// ---------------------------------------------------------------------------

/// Where two engines disagree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateDiff {
    pub is_identical: bool,
    pub clock_matches: bool,
    pub hash_matches: bool,
    /// Ids of vehicles whose snapshots differ.
    pub vehicle_diffs: Vec<String>,
    /// Ids of stations whose snapshots differ.
    pub station_diffs: Vec<String>,
    /// Goods ids whose reports differ or exist on one side only.
    pub goods_diffs: Vec<String>,
}

/// Compare two engines entity by entity.
pub fn diff_engines(a: &Engine, b: &Engine) -> StateDiff {
    let mut diff = StateDiff {
        clock_matches: a.clock() == b.clock(),
        hash_matches: a.compute_state_hash() == b.compute_state_hash(),
        ..Default::default()
    };

    let (va, vb) = (a.snapshot_all_vehicles(), b.snapshot_all_vehicles());
    for x in &va {
        if vb.iter().find(|y| y.id == x.id) != Some(x) {
            diff.vehicle_diffs.push(x.id.clone());
        }
    }
    let (sa, sb) = (a.snapshot_all_stations(), b.snapshot_all_stations());
    for x in &sa {
        if sb.iter().find(|y| y.id == x.id) != Some(x) {
            diff.station_diffs.push(x.id.clone());
        }
    }
    let (ga, gb) = (a.goods_report(), b.goods_report());
    for x in &ga {
        if gb.iter().find(|y| y.goods_id == x.goods_id) != Some(x) {
            diff.goods_diffs.push(x.goods_id.clone());
        }
    }
    for y in &gb {
        if !ga.iter().any(|x| x.goods_id == y.goods_id) {
            diff.goods_diffs.push(y.goods_id.clone());
        }
    }

    diff.is_identical = diff.clock_matches
        && diff.hash_matches
        && diff.vehicle_diffs.is_empty()
        && diff.station_diffs.is_empty()
        && diff.goods_diffs.is_empty();
    diff
}
