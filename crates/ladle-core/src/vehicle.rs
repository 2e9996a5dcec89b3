//! Vehicles: cranes and trolleys executing one segment at a time.
//!
//! A vehicle with a segment heads for the pickup station while empty and for
//! the drop-off station while loaded, one unit per tick along its track's
//! axis. Load and unload are instantaneous. The segment completes on the tick
//! the vehicle stands at the drop-off coordinate with the goods unloaded.

use crate::engine::SimError;
use crate::id::*;
use crate::order::GoodsLocation;
use crate::registry::Registry;
use crate::station::{deposit, withdraw};
use crate::task::SegmentStatus;
use crate::track::Position;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleKind {
    /// Runs on a horizontal track.
    Crane,
    /// Runs on a vertical track.
    Trolley,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleStatus {
    Idle,
    Moving,
    /// Holding a segment but not pursuing cargo: an avoid move, or a pickup
    /// whose goods has not reached the station yet.
    Waiting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vehicle {
    pub id: String,
    pub kind: VehicleKind,
    pub track: TrackKey,
    pub position: Position,
    pub status: VehicleStatus,
    pub segment: Option<SegmentKey>,
    pub goods: Option<GoodsKey>,
    /// Ids of vehicles this one can hand goods to.
    pub connect_vehicles: Vec<String>,
}

impl Vehicle {
    pub fn new(id: impl Into<String>, kind: VehicleKind, track: TrackKey, position: Position) -> Self {
        Self {
            id: id.into(),
            kind,
            track,
            position,
            status: VehicleStatus::Idle,
            segment: None,
            goods: None,
            connect_vehicles: Vec::new(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.status == VehicleStatus::Idle && self.segment.is_none()
    }

    /// Take on a segment.
    pub fn assign(&mut self, segment: SegmentKey, avoid: bool) {
        self.segment = Some(segment);
        self.status = if avoid {
            VehicleStatus::Waiting
        } else {
            VehicleStatus::Moving
        };
    }

    /// Drop the current segment and go idle.
    pub fn release(&mut self) {
        self.segment = None;
        self.status = VehicleStatus::Idle;
    }
}

/// What a vehicle did on one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleAction {
    /// No segment.
    None,
    Moved,
    Loaded,
    Unloaded,
    /// At the pickup station but the goods is still elsewhere.
    WaitingForGoods,
    /// Reached the end of an avoid move.
    Arrived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VehicleUpdate {
    pub action: VehicleAction,
    pub completed: bool,
}

impl VehicleUpdate {
    fn idle() -> Self {
        Self {
            action: VehicleAction::None,
            completed: false,
        }
    }
}

/// Per-tick vehicle update.
pub fn update_vehicle(reg: &mut Registry, key: VehicleKey) -> Result<VehicleUpdate, SimError> {
    let Some(vehicle) = reg.vehicles.get(key) else {
        return Ok(VehicleUpdate::idle());
    };
    let Some(seg_key) = vehicle.segment else {
        return Ok(VehicleUpdate::idle());
    };
    let Some(seg) = reg.segments.get(seg_key).cloned() else {
        // Segment collected elsewhere; nothing left to do.
        if let Some(v) = reg.vehicles.get_mut(key) {
            v.release();
        }
        return Ok(VehicleUpdate::idle());
    };
    let axis = reg
        .tracks
        .get(vehicle.track)
        .map(|t| t.axis)
        .ok_or_else(|| SimError::UnknownTrack {
            vehicle: vehicle.id.clone(),
        })?;
    let position = vehicle.position;
    let carrying = vehicle.goods;
    let avoid = seg.kind.is_avoid();

    let target = if avoid || carrying.is_some() || seg.unloaded {
        seg.end
    } else {
        seg.start
    };
    let target_pos = reg
        .stations
        .get(target)
        .map(|s| s.position)
        .ok_or_else(|| SimError::UnknownStation {
            station: reg.station_name(target).to_string(),
        })?;
    let target_coord = axis.coord(target_pos);

    let action = if axis.coord(position) != target_coord {
        if let Some(v) = reg.vehicles.get_mut(key) {
            v.position = axis.step_toward(position, target_coord);
            v.status = if avoid {
                VehicleStatus::Waiting
            } else {
                VehicleStatus::Moving
            };
        }
        VehicleAction::Moved
    } else if avoid {
        VehicleAction::Arrived
    } else if let Some(goods) = carrying {
        if !deposit(reg, seg.end, goods) {
            return Err(SimError::UnknownStation {
                station: reg.station_name(seg.end).to_string(),
            });
        }
        if let Some(v) = reg.vehicles.get_mut(key) {
            v.goods = None;
            v.status = VehicleStatus::Moving;
        }
        if let Some(s) = reg.segments.get_mut(seg_key) {
            s.unloaded = true;
        }
        debug!(
            vehicle = reg.vehicle_name(key),
            station = reg.station_name(seg.end),
            order = %seg.order_no,
            "unloaded"
        );
        VehicleAction::Unloaded
    } else if seg.unloaded {
        VehicleAction::None
    } else {
        load(reg, key, seg.start, seg.order_no)?
    };

    // Completion: at the drop-off coordinate with the cargo delivered.
    let unloaded = reg.segments.get(seg_key).is_some_and(|s| s.unloaded);
    let at_end = reg.vehicles.get(key).is_some_and(|v| {
        reg.stations
            .get(seg.end)
            .is_some_and(|s| axis.coord(v.position) == axis.coord(s.position))
    });
    let completed = at_end && (unloaded || avoid);
    if completed {
        if let Some(s) = reg.segments.get_mut(seg_key) {
            s.status = SegmentStatus::Completed;
        }
        if let Some(v) = reg.vehicles.get_mut(key) {
            v.release();
        }
        debug!(
            vehicle = reg.vehicle_name(key),
            order = %seg.order_no,
            kind = seg.kind.label(),
            "segment completed"
        );
    }
    Ok(VehicleUpdate { action, completed })
}

fn load(
    reg: &mut Registry,
    key: VehicleKey,
    station: StationKey,
    order_no: OrderNo,
) -> Result<VehicleAction, SimError> {
    let here = reg
        .stations
        .get(station)
        .and_then(|s| s.goods_for_order(order_no));
    match here {
        Some(goods) => {
            withdraw(reg, station, goods);
            if let Some(g) = reg.goods.get_mut(goods) {
                g.location = GoodsLocation::Vehicle(key);
            }
            if let Some(v) = reg.vehicles.get_mut(key) {
                v.goods = Some(goods);
                v.status = VehicleStatus::Moving;
            }
            debug!(
                vehicle = reg.vehicle_name(key),
                station = reg.station_name(station),
                order = %order_no,
                "loaded"
            );
            Ok(VehicleAction::Loaded)
        }
        // Still in flight on another vehicle or at an upstream station.
        None if reg.goods_for_order(order_no).is_some() => {
            if let Some(v) = reg.vehicles.get_mut(key) {
                v.status = VehicleStatus::Waiting;
            }
            Ok(VehicleAction::WaitingForGoods)
        }
        None => Err(SimError::MissingGoods {
            order: order_no,
            station: reg.station_name(station).to_string(),
        }),
    }
}
