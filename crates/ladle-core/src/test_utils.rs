//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::config::{TopologyConfig, TrackConfig, VehicleConfig, WorkstationConfig, build_registry};
use crate::dispatcher::TaskDispatcher;
use crate::engine::{Engine, SimError};
use crate::id::*;
use crate::order::{LegDurations, ProductionOrder, RefineVariant, StageProgress, StageSchedule};
use crate::registry::Registry;
use crate::sim::{Ticks, minutes, parse_clock};
use crate::splitter::TaskSplitBuffer;
use crate::station::StationRole;
use crate::track::Axis;
use crate::vehicle::VehicleKind;

// ===========================================================================
// Topology builders
// ===========================================================================

fn track(id: &str, axis: Axis, start: [i32; 2], end: [i32; 2]) -> TrackConfig {
    TrackConfig {
        id: id.into(),
        axis,
        start_pos: start,
        end_pos: end,
        safety_distance: 1,
    }
}

fn vehicle(id: &str, kind: VehicleKind, pos: [i32; 2], track: &str, connect: &[&str]) -> VehicleConfig {
    VehicleConfig {
        id: id.into(),
        kind,
        init_pos: pos,
        track: track.into(),
        connect_vehicles: connect.iter().map(|s| s.to_string()).collect(),
    }
}

fn station(id: &str, pos: [i32; 2], role: Option<StationRole>, tracks: &[&str]) -> WorkstationConfig {
    WorkstationConfig {
        id: id.into(),
        pos,
        role,
        connected_tracks: tracks.iter().map(|s| s.to_string()).collect(),
    }
}

/// One horizontal track served by crane C1:
///
/// ```text
/// 1LD(0) ---- 1LF(10) -- 1RH(15) -- 1CC(20)
/// ```
pub fn line_topology() -> TopologyConfig {
    TopologyConfig {
        tracks: vec![track("T1", Axis::Horizontal, [0, 0], [20, 0])],
        vehicles: vec![vehicle("C1", VehicleKind::Crane, [0, 0], "T1", &[])],
        workstations: vec![
            station("1LD", [0, 0], Some(StationRole::Processing), &["T1"]),
            station("1LF", [10, 0], None, &["T1"]),
            station("1RH", [15, 0], None, &["T1"]),
            station("1CC", [20, 0], None, &["T1"]),
        ],
    }
}

/// Two crane bays feeding a shared vertical trolley track:
///
/// ```text
/// 1LD(0,0)  --T1/C1--  X1(10,0)
///                         |
///                      1LF(10,8)   T3/V1
///                      1CC(10,12)
///                         |
/// 2LD(0,20) --T2/C2--  X2(10,20)
/// ```
pub fn hub_topology() -> TopologyConfig {
    TopologyConfig {
        tracks: vec![
            track("T1", Axis::Horizontal, [0, 0], [10, 0]),
            track("T2", Axis::Horizontal, [0, 20], [10, 20]),
            track("T3", Axis::Vertical, [10, 0], [10, 20]),
        ],
        vehicles: vec![
            vehicle("C1", VehicleKind::Crane, [0, 0], "T1", &["V1"]),
            vehicle("C2", VehicleKind::Crane, [0, 20], "T2", &["V1"]),
            vehicle("V1", VehicleKind::Trolley, [10, 10], "T3", &[]),
        ],
        workstations: vec![
            station("1LD", [0, 0], None, &["T1"]),
            station("2LD", [0, 20], None, &["T2"]),
            station("X1", [10, 0], Some(StationRole::Interaction), &["T1", "T3"]),
            station("X2", [10, 20], Some(StationRole::Interaction), &["T2", "T3"]),
            station("1LF", [10, 8], None, &["T3"]),
            station("1CC", [10, 12], None, &["T3"]),
        ],
    }
}

/// A bay crane whose only link to the trolley track is caster 2CC:
///
/// ```text
/// 1LD(0,0) --T1/C1-- 2CC(10,0)
///                       |
///                    1LF(10,8)   T3/V1
///                    1CC(10,12)
/// ```
pub fn shared_caster_topology() -> TopologyConfig {
    TopologyConfig {
        tracks: vec![
            track("T1", Axis::Horizontal, [0, 0], [10, 0]),
            track("T3", Axis::Vertical, [10, 0], [10, 20]),
        ],
        vehicles: vec![
            vehicle("C1", VehicleKind::Crane, [0, 0], "T1", &["V1"]),
            vehicle("V1", VehicleKind::Trolley, [10, 10], "T3", &[]),
        ],
        workstations: vec![
            station("1LD", [0, 0], None, &["T1"]),
            station("2CC", [10, 0], None, &["T1", "T3"]),
            station("1LF", [10, 8], None, &["T3"]),
            station("1CC", [10, 12], None, &["T3"]),
        ],
    }
}

pub fn build_line_registry() -> Registry {
    build_registry(&line_topology()).unwrap()
}

pub fn line_engine(orders: Vec<ProductionOrder>) -> Engine {
    Engine::new(&line_topology(), orders).unwrap()
}

pub fn hub_engine(orders: Vec<ProductionOrder>) -> Engine {
    Engine::new(&hub_topology(), orders).unwrap()
}

// ===========================================================================
// Order builders
// ===========================================================================

fn base_order(n: u32, start: Ticks, variant: RefineVariant) -> ProductionOrder {
    ProductionOrder {
        order_no: OrderNo(n),
        origin: "1LD".into(),
        terminal: "1CC".into(),
        variant,
        lf_station: None,
        rh_station: None,
        schedule: StageSchedule {
            task_start: start,
            task_end: start + minutes(120),
            ..Default::default()
        },
        durations: LegDurations::default(),
        progress: StageProgress::default(),
    }
}

/// 1LD -> 1LF -> 1CC, LF finishing 65 minutes after release.
pub fn lf_order(n: u32, start: &str) -> ProductionOrder {
    let start = parse_clock(start).unwrap();
    let mut order = base_order(n, start, RefineVariant::Lf);
    order.lf_station = Some("1LF".into());
    order.schedule.lf_start = Some(start + minutes(5));
    order.schedule.lf_end = Some(start + minutes(65));
    order.durations = LegDurations {
        ld_to_lf: Some(5),
        lf_process: Some(60),
        lf_to_cc: Some(8),
        ..Default::default()
    };
    order
}

/// 1LD -> 1RH -> 1CC, RH finishing 45 minutes after release.
pub fn rh_order(n: u32, start: &str) -> ProductionOrder {
    let start = parse_clock(start).unwrap();
    let mut order = base_order(n, start, RefineVariant::Rh);
    order.rh_station = Some("1RH".into());
    order.schedule.rh_start = Some(start + minutes(5));
    order.schedule.rh_end = Some(start + minutes(45));
    order.durations = LegDurations {
        ld_to_rh: Some(6),
        rh_process: Some(40),
        rh_to_cc: Some(4),
        ..Default::default()
    };
    order
}

/// 1LD -> 1LF -> 1RH -> 1CC.
pub fn dual_order(n: u32, start: &str) -> ProductionOrder {
    let start = parse_clock(start).unwrap();
    let mut order = base_order(n, start, RefineVariant::LfRh);
    order.lf_station = Some("1LF".into());
    order.rh_station = Some("1RH".into());
    order.schedule.task_end = start + minutes(150);
    order.schedule.lf_start = Some(start + minutes(5));
    order.schedule.lf_end = Some(start + minutes(50));
    order.schedule.rh_start = Some(start + minutes(55));
    order.schedule.rh_end = Some(start + minutes(95));
    order.durations = LegDurations {
        ld_to_lf: Some(5),
        lf_to_rh: Some(3),
        rh_to_cc: Some(4),
        lf_process: Some(45),
        rh_process: Some(40),
        ..Default::default()
    };
    order
}

/// LF order on the hub layout, released at midnight from `origin`.
pub fn hub_order(n: u32, origin: &str) -> ProductionOrder {
    let mut order = lf_order(n, "00:00:00");
    order.origin = origin.into();
    order
}

// ===========================================================================
// Driving helpers
// ===========================================================================

/// Release every order at the current clock and generate first legs.
pub fn release_and_split(
    reg: &mut Registry,
    split: &mut TaskSplitBuffer,
    orders: Vec<ProductionOrder>,
) {
    TaskDispatcher::new(orders)
        .unwrap()
        .dispatch(reg)
        .unwrap();
    split.scan(reg).unwrap();
}

/// Step until `done` holds or `max_steps` is reached. Returns the number of
/// steps taken, or `None` if the predicate never held.
pub fn run_until(
    engine: &mut Engine,
    max_steps: u64,
    mut done: impl FnMut(&Engine) -> bool,
) -> Result<Option<u64>, SimError> {
    for i in 0..max_steps {
        if done(engine) {
            return Ok(Some(i));
        }
        engine.step()?;
    }
    Ok(done(engine).then_some(max_steps))
}
