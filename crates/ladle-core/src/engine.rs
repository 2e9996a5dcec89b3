//! The simulation engine: owns the registry and the scheduling stages and
//! runs them in a fixed order once per tick.
//!
//! # Architecture
//!
//! The `Engine` owns:
//! - A [`Registry`] (typed arenas of orders, goods, legs, segments, tracks,
//!   vehicles and workstations, plus the logical clock)
//! - A [`TaskDispatcher`] holding the input order list
//! - A [`TaskSplitBuffer`] with per-leg status flags
//! - A [`PathPlanner`] with the static vehicle adjacency graph
//!
//! # Tick Pipeline
//!
//! Each `step()` runs:
//! 1. **Dispatch** -- release orders whose start time has passed
//! 2. **Split** -- generate legs whose predecessor is done
//! 3. **Plan** -- route un-routed legs over free vehicles
//! 4. **Allocate** -- push pending segments onto track queues
//! 5. **Tracks** -- bind queued segments, check conflicts
//! 6. **Vehicles** -- move, load, unload, complete
//! 7. **Stations** -- terminal stations consume delivered goods
//! 8. **Scan** -- roll completed segments up into completed legs
//! 9. **Bookkeeping** -- advance the clock, compute the state hash
//!
//! Work planned in one stage is first acted on by later stages of the same
//! tick at the earliest; the order must not change or replays diverge.

use crate::allocator::allocate;
use crate::config::{ConfigError, TopologyConfig, build_registry};
use crate::dispatcher::TaskDispatcher;
use crate::id::*;
use crate::order::{GoodsLocation, ProductionOrder};
use crate::planner::{PathPlanner, PlanError, request_avoid};
use crate::query::{
    GoodsReport, OrderReport, StationSnapshot, TrackSnapshot, VehicleSnapshot,
};
use crate::registry::Registry;
use crate::scanner::scan;
use crate::sim::{StateHash, StepReport, TICK_STEP, Ticks, format_clock};
use crate::splitter::TaskSplitBuffer;
use crate::station::update_station;
use crate::task::SegmentStatus;
use crate::track::update_track;
use crate::vehicle::{VehicleStatus, update_vehicle};
use tracing::{debug, info_span};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that halt the simulation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("planning error: {0}")]
    Plan(#[from] PlanError),
    #[error("order {order} starts at unknown station {station}")]
    UnknownOriginStation { order: OrderNo, station: String },
    #[error("order {order} references unknown station {station}")]
    UnknownOrderStation { order: OrderNo, station: String },
    #[error("unknown station {station}")]
    UnknownStation { station: String },
    #[error("unknown vehicle {vehicle}")]
    UnknownVehicle { vehicle: String },
    #[error("vehicle {vehicle} sits on an unknown track")]
    UnknownTrack { vehicle: String },
    #[error("goods of order {order} is missing at {station} and no longer exists")]
    MissingGoods { order: OrderNo, station: String },
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Engine {
    /// All simulation entities and the clock.
    pub registry: Registry,

    pub(crate) dispatcher: TaskDispatcher,
    pub(crate) splitter: TaskSplitBuffer,
    pub(crate) planner: PathPlanner,

    /// Whether the simulation is paused.
    pub(crate) paused: bool,

    /// Steps completed since construction.
    pub(crate) steps: u64,

    /// The most recently computed state hash.
    pub(crate) last_state_hash: u64,
}

impl Engine {
    /// Build the plant from `topology` and queue `orders` for release.
    pub fn new(topology: &TopologyConfig, orders: Vec<ProductionOrder>) -> Result<Self, SimError> {
        let registry = build_registry(topology)?;
        Self::from_registry(registry, orders)
    }

    /// Start from an already populated registry.
    pub fn from_registry(registry: Registry, orders: Vec<ProductionOrder>) -> Result<Self, SimError> {
        let planner = PathPlanner::new(&registry)?;
        let dispatcher = TaskDispatcher::new(orders)?;
        let mut engine = Self {
            registry,
            dispatcher,
            splitter: TaskSplitBuffer::new(),
            planner,
            paused: false,
            steps: 0,
            last_state_hash: 0,
        };
        engine.last_state_hash = engine.compute_state_hash();
        Ok(engine)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Current clock, in seconds since the base day.
    pub fn clock(&self) -> Ticks {
        self.registry.clock()
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn dispatcher(&self) -> &TaskDispatcher {
        &self.dispatcher
    }

    pub fn splitter(&self) -> &TaskSplitBuffer {
        &self.splitter
    }

    pub fn planner(&self) -> &PathPlanner {
        &self.planner
    }

    // -----------------------------------------------------------------------
    // State hash
    // -----------------------------------------------------------------------

    /// Get the most recently computed state hash.
    pub fn state_hash(&self) -> u64 {
        self.last_state_hash
    }

    // -----------------------------------------------------------------------
    // Pause / Resume
    // -----------------------------------------------------------------------

    /// Pause the simulation. While paused, `step()` is a no-op.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    // -----------------------------------------------------------------------
    // Stop predicates
    // -----------------------------------------------------------------------

    /// True once every order is released and no goods is still live.
    pub fn all_delivered(&self) -> bool {
        !self.dispatcher.has_pending() && self.registry.goods.is_empty()
    }

    /// Latest scheduled end over all orders.
    pub fn latest_order_end(&self) -> Option<Ticks> {
        self.dispatcher.latest_end_time()
    }

    /// True once the clock is past the latest order end plus `grace`.
    pub fn timed_out(&self, grace: Ticks) -> bool {
        self.latest_order_end()
            .is_some_and(|end| self.clock() > end + grace)
    }

    // -----------------------------------------------------------------------
    // External requests
    // -----------------------------------------------------------------------

    /// Queue a cargo-free repositioning move for a vehicle.
    pub fn request_avoid(
        &mut self,
        vehicle: &str,
        station: &str,
        order: OrderNo,
    ) -> Result<SegmentKey, SimError> {
        let vkey = self
            .registry
            .vehicles
            .key_of(vehicle)
            .ok_or_else(|| SimError::UnknownVehicle {
                vehicle: vehicle.to_string(),
            })?;
        let skey = self
            .registry
            .stations
            .key_of(station)
            .ok_or_else(|| SimError::UnknownStation {
                station: station.to_string(),
            })?;
        Ok(request_avoid(&mut self.registry, vkey, skey, order)?)
    }

    // -----------------------------------------------------------------------
    // Step
    // -----------------------------------------------------------------------

    /// Run one tick: every stage in order, then advance the clock.
    pub fn step(&mut self) -> Result<StepReport, SimError> {
        if self.paused {
            return Ok(StepReport {
                clock: self.clock(),
                ..Default::default()
            });
        }
        let span = info_span!("tick", clock = %format_clock(self.clock()));
        let _enter = span.enter();

        let report = self.run_stages()?;
        self.phase_bookkeeping();
        Ok(report)
    }

    /// Run every stage at the current clock without advancing it.
    pub fn run_stages(&mut self) -> Result<StepReport, SimError> {
        let mut report = StepReport {
            clock: self.clock(),
            ..Default::default()
        };
        self.phase_dispatch(&mut report)?;
        self.phase_split(&mut report)?;
        self.phase_plan(&mut report)?;
        self.phase_allocate(&mut report);
        self.phase_tracks(&mut report);
        self.phase_vehicles()?;
        self.phase_stations(&mut report);
        self.phase_scan(&mut report);
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Phases
    // -----------------------------------------------------------------------

    fn phase_dispatch(&mut self, report: &mut StepReport) -> Result<(), SimError> {
        report.released = self.dispatcher.dispatch(&mut self.registry)?;
        Ok(())
    }

    fn phase_split(&mut self, report: &mut StepReport) -> Result<(), SimError> {
        report.legs_generated = self.splitter.scan(&mut self.registry)?.len();
        Ok(())
    }

    fn phase_plan(&mut self, report: &mut StepReport) -> Result<(), SimError> {
        let outcome = self.planner.plan(&mut self.registry, &mut self.splitter)?;
        report.legs_routed = outcome.routed.len();
        report.routing_retries = outcome.retries;
        Ok(())
    }

    fn phase_allocate(&mut self, report: &mut StepReport) {
        report.segments_allocated = allocate(&mut self.registry)
            .iter()
            .map(|(_, segs)| segs.len())
            .sum();
    }

    fn phase_tracks(&mut self, report: &mut StepReport) {
        for key in self.registry.tracks.keys() {
            let update = update_track(&mut self.registry, key);
            if update.conflict.is_some() {
                report.conflicts += 1;
            }
        }
    }

    fn phase_vehicles(&mut self) -> Result<(), SimError> {
        for key in self.registry.vehicles.keys() {
            update_vehicle(&mut self.registry, key)?;
        }
        Ok(())
    }

    fn phase_stations(&mut self, report: &mut StepReport) {
        for key in self.registry.stations.keys() {
            report.goods_delivered += update_station(&mut self.registry, key);
        }
    }

    fn phase_scan(&mut self, report: &mut StepReport) {
        report.legs_completed = scan(&mut self.registry, &mut self.splitter)
            .completed_legs
            .len();
    }

    fn phase_bookkeeping(&mut self) {
        self.registry.advance_clock(TICK_STEP);
        self.steps += 1;
        self.last_state_hash = self.compute_state_hash();
        debug!(steps = self.steps, hash = self.last_state_hash, "tick done");
    }

    /// Compute a deterministic hash of the current simulation state.
    ///
    /// Every arena is walked in insertion order, and keys are hashed by
    /// registry name, so two engines fed the same input hash identically.
    pub fn compute_state_hash(&self) -> u64 {
        let reg = &self.registry;
        let mut h = StateHash::new();
        h.write_u64(reg.clock());

        for (key, order) in reg.orders.iter() {
            h.write_str(reg.orders.name_of(key).unwrap_or_default());
            let p = &order.progress;
            for t in [p.lf_arrival, p.rh_arrival, p.cc_arrival] {
                h.write_u64(t.unwrap_or(u64::MAX));
            }
            h.write(&[p.lf_completed as u8, p.rh_completed as u8, p.all_completed as u8]);
        }

        for g in reg.goods.values() {
            h.write_str(&g.goods_id);
            match g.location {
                GoodsLocation::Station(s) => {
                    h.write_u32(0);
                    h.write_str(reg.station_name(s));
                }
                GoodsLocation::Vehicle(v) => {
                    h.write_u32(1);
                    h.write_str(reg.vehicle_name(v));
                }
                GoodsLocation::Delivered(s) => {
                    h.write_u32(2);
                    h.write_str(reg.station_name(s));
                }
            }
            h.write_u64(g.ledger.len() as u64);
        }
        h.write_u64(reg.delivered().len() as u64);

        for (key, leg) in reg.legs.iter() {
            h.write_str(reg.legs.name_of(key).unwrap_or_default());
            h.write(&[leg.routed as u8, leg.completed as u8]);
            h.write_u64(leg.segments.len() as u64);
        }

        for (key, seg) in reg.segments.iter() {
            h.write_str(reg.segments.name_of(key).unwrap_or_default());
            h.write_u32(match seg.status {
                SegmentStatus::Pending => 0,
                SegmentStatus::Assigned => 1,
                SegmentStatus::Completed => 2,
            });
            h.write(&[seg.unloaded as u8]);
            h.write_str(reg.vehicle_name(seg.vehicle));
        }

        for track in reg.tracks.values() {
            h.write_u64(track.queue.len() as u64);
            h.write_u64(track.suspended.len() as u64);
        }

        for v in reg.vehicles.values() {
            h.write_i32(v.position.x);
            h.write_i32(v.position.y);
            h.write_u32(match v.status {
                VehicleStatus::Idle => 0,
                VehicleStatus::Moving => 1,
                VehicleStatus::Waiting => 2,
            });
            h.write(&[v.segment.is_some() as u8, v.goods.is_some() as u8]);
        }

        for ws in reg.stations.values() {
            h.write_u64(ws.goods.len() as u64);
            for held in &ws.goods {
                h.write_u32(held.order_no.0);
            }
        }

        h.finish()
    }

    // -----------------------------------------------------------------------
    // Query API (read-only)
    // -----------------------------------------------------------------------

    pub fn snapshot_track(&self, key: TrackKey) -> Option<TrackSnapshot> {
        let reg = &self.registry;
        let t = reg.tracks.get(key)?;
        Some(TrackSnapshot {
            id: t.id.clone(),
            axis: t.axis,
            start: t.start,
            end: t.end,
            safety_distance: t.safety_distance,
            vehicles: t.vehicles.iter().map(|&v| reg.vehicle_name(v).to_string()).collect(),
            stations: t.stations.iter().map(|&s| reg.station_name(s).to_string()).collect(),
            queued: t.queue.len(),
            suspended: t.suspended.len(),
            conflicts: t
                .conflicts
                .iter()
                .map(|c| (reg.vehicle_name(c.a).to_string(), reg.vehicle_name(c.b).to_string()))
                .collect(),
        })
    }

    pub fn snapshot_all_tracks(&self) -> Vec<TrackSnapshot> {
        self.registry
            .tracks
            .keys()
            .into_iter()
            .filter_map(|k| self.snapshot_track(k))
            .collect()
    }

    pub fn snapshot_vehicle(&self, key: VehicleKey) -> Option<VehicleSnapshot> {
        let reg = &self.registry;
        let v = reg.vehicles.get(key)?;
        Some(VehicleSnapshot {
            id: v.id.clone(),
            kind: v.kind,
            track: reg.track_name(v.track).to_string(),
            position: v.position,
            status: v.status,
            segment: v
                .segment
                .and_then(|s| reg.segments.name_of(s))
                .map(str::to_string),
            carrying: v.goods.and_then(|g| reg.goods.get(g)).map(|g| g.order_no),
        })
    }

    pub fn snapshot_all_vehicles(&self) -> Vec<VehicleSnapshot> {
        self.registry
            .vehicles
            .keys()
            .into_iter()
            .filter_map(|k| self.snapshot_vehicle(k))
            .collect()
    }

    pub fn snapshot_station(&self, key: StationKey) -> Option<StationSnapshot> {
        let ws = self.registry.stations.get(key)?;
        Some(StationSnapshot {
            id: ws.id.clone(),
            role: ws.role,
            position: ws.position,
            goods: ws.goods.iter().map(|h| h.order_no).collect(),
            ledger: ws.ledger.clone(),
        })
    }

    pub fn snapshot_all_stations(&self) -> Vec<StationSnapshot> {
        self.registry
            .stations
            .keys()
            .into_iter()
            .filter_map(|k| self.snapshot_station(k))
            .collect()
    }

    /// Every goods item, live first, then delivered in delivery order.
    pub fn goods_report(&self) -> Vec<GoodsReport> {
        let reg = &self.registry;
        let location = |loc: GoodsLocation| match loc {
            GoodsLocation::Station(s) | GoodsLocation::Delivered(s) => {
                reg.station_name(s).to_string()
            }
            GoodsLocation::Vehicle(v) => reg.vehicle_name(v).to_string(),
        };
        reg.goods
            .values()
            .chain(reg.delivered())
            .map(|g| GoodsReport {
                goods_id: g.goods_id.clone(),
                order_no: g.order_no,
                variant: g.variant,
                delivered: matches!(g.location, GoodsLocation::Delivered(_)),
                location: location(g.location),
                visits: g.ledger.clone(),
            })
            .collect()
    }

    /// Schedule and progress of every order, in input order.
    pub fn order_reports(&self) -> Vec<OrderReport> {
        self.dispatcher
            .all_orders()
            .iter()
            .map(|o| {
                let live = self
                    .registry
                    .order_by_no(o.order_no)
                    .and_then(|k| self.registry.orders.get(k));
                OrderReport {
                    order_no: o.order_no,
                    variant: o.variant,
                    released: live.is_some(),
                    latest_end: o.latest_end(),
                    progress: live.map(|l| l.progress).unwrap_or_default(),
                }
            })
            .collect()
    }
}
