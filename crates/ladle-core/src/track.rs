//! Tracks: straight rails that host up to two vehicles.
//!
//! Each tick a track binds its queued segments to idle resident vehicles,
//! checks its two residents for a safety-distance conflict, and releases its
//! suspended buffer once every resident is idle.
//!
//! Conflicts are detected and logged only. No hold or reroute is applied, so
//! two vehicles closing on each other keep moving.

use crate::id::*;
use crate::registry::Registry;
use crate::sim::Ticks;
use crate::vehicle::VehicleStatus;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// Grid position of a vehicle or station.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<(i32, i32)> for Position {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

/// Direction of motion along a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    /// Cranes; motion along x.
    Horizontal,
    /// Trolleys; motion along y.
    Vertical,
}

impl Axis {
    /// The coordinate that varies along this axis.
    pub fn coord(self, p: Position) -> i32 {
        match self {
            Axis::Horizontal => p.x,
            Axis::Vertical => p.y,
        }
    }

    /// Move `p` one unit toward `target` along this axis.
    pub fn step_toward(self, p: Position, target: i32) -> Position {
        let delta = (target - self.coord(p)).signum();
        match self {
            Axis::Horizontal => Position::new(p.x + delta, p.y),
            Axis::Vertical => Position::new(p.x, p.y + delta),
        }
    }

    pub fn distance(self, a: Position, b: Position) -> i32 {
        (self.coord(a) - self.coord(b)).abs()
    }
}

// ---------------------------------------------------------------------------
// Track
// ---------------------------------------------------------------------------

/// Maximum residents per track.
pub const MAX_VEHICLES_PER_TRACK: usize = 2;

/// Two residents closer than the safety distance while both moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conflict {
    pub a: VehicleKey,
    pub b: VehicleKey,
    pub separation: i32,
    pub detected_at: Ticks,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub id: String,
    pub axis: Axis,
    pub start: Position,
    pub end: Position,
    pub safety_distance: i32,
    /// Resident vehicles in residence order.
    pub vehicles: Vec<VehicleKey>,
    /// Stations on this track in configuration order.
    pub stations: Vec<StationKey>,
    pub queue: VecDeque<SegmentKey>,
    /// Segments set aside during an unresolved conflict.
    pub suspended: Vec<SegmentKey>,
    /// Conflicts found by the most recent update.
    pub conflicts: Vec<Conflict>,
}

impl Track {
    pub fn new(id: impl Into<String>, axis: Axis, start: Position, end: Position) -> Self {
        Self {
            id: id.into(),
            axis,
            start,
            end,
            safety_distance: 1,
            vehicles: Vec::new(),
            stations: Vec::new(),
            queue: VecDeque::new(),
            suspended: Vec::new(),
            conflicts: Vec::new(),
        }
    }

    /// True if `station` lies on this track.
    pub fn services(&self, station: StationKey) -> bool {
        self.stations.contains(&station)
    }

    /// Move everything waiting in the queue into the suspended buffer.
    pub fn suspend_queued(&mut self) -> usize {
        let n = self.queue.len();
        self.suspended.extend(self.queue.drain(..));
        n
    }
}

/// Outcome of one track update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackUpdate {
    pub bound: usize,
    pub conflict: Option<Conflict>,
    pub requeued: usize,
}

/// Per-tick track update: bind, check, requeue.
pub fn update_track(reg: &mut Registry, key: TrackKey) -> TrackUpdate {
    let mut out = TrackUpdate::default();
    let now = reg.clock();
    let Some(track) = reg.tracks.get_mut(key) else {
        return out;
    };
    let axis = track.axis;
    let residents = track.vehicles.clone();
    let queued: Vec<SegmentKey> = track.queue.drain(..).collect();

    // 1. Bind queued segments to the nearest idle resident.
    let mut idle: Vec<VehicleKey> = residents
        .iter()
        .copied()
        .filter(|&v| reg.vehicles.get(v).is_some_and(|v| v.is_idle()))
        .collect();
    let mut unmatched = VecDeque::new();
    for seg_key in queued {
        let Some(seg) = reg.segments.get(seg_key) else {
            continue;
        };
        let Some(start_pos) = reg.stations.get(seg.start).map(|s| s.position) else {
            unmatched.push_back(seg_key);
            continue;
        };
        let avoid = seg.kind.is_avoid();
        let nearest = idle
            .iter()
            .enumerate()
            .filter_map(|(i, &v)| {
                reg.vehicles
                    .get(v)
                    .map(|veh| (i, axis.distance(veh.position, start_pos)))
            })
            .min_by_key(|&(_, d)| d)
            .map(|(i, _)| i);
        match nearest {
            Some(i) => {
                let vkey = idle.remove(i);
                if let Some(veh) = reg.vehicles.get_mut(vkey) {
                    veh.assign(seg_key, avoid);
                }
                if let Some(seg) = reg.segments.get_mut(seg_key) {
                    seg.vehicle = vkey;
                }
                debug!(
                    track = reg.track_name(key),
                    vehicle = reg.vehicle_name(vkey),
                    "segment bound"
                );
                out.bound += 1;
            }
            None => unmatched.push_back(seg_key),
        }
    }

    // 2. Conflict check between exactly two residents.
    if let &[a, b] = residents.as_slice() {
        if let (Some(va), Some(vb)) = (reg.vehicles.get(a), reg.vehicles.get(b)) {
            let separation = axis.distance(va.position, vb.position);
            let both_moving =
                va.status == VehicleStatus::Moving && vb.status == VehicleStatus::Moving;
            if let Some(track) = reg.tracks.get(key) {
                if both_moving && separation < track.safety_distance {
                    out.conflict = Some(Conflict {
                        a,
                        b,
                        separation,
                        detected_at: now,
                    });
                    warn!(
                        track = %track.id,
                        separation,
                        safety = track.safety_distance,
                        "vehicles within safety distance"
                    );
                }
            }
        }
    }

    // 3. Release the suspended buffer once every resident is idle.
    let all_idle = residents
        .iter()
        .all(|&v| reg.vehicles.get(v).is_none_or(|v| v.is_idle()));

    let Some(track) = reg.tracks.get_mut(key) else {
        return out;
    };
    track.queue = unmatched;
    track.conflicts = out.conflict.into_iter().collect();
    if all_idle && !track.suspended.is_empty() {
        out.requeued = track.suspended.len();
        track.queue.extend(track.suspended.drain(..));
    }
    out
}
