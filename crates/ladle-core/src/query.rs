//! Read-only query API for inspecting simulation state.
//!
//! Snapshot types are owned copies with entity ids resolved to names, so a
//! renderer or report writer never touches registry keys.

use crate::id::OrderNo;
use crate::order::{RefineVariant, StageProgress, StationVisit};
use crate::sim::Ticks;
use crate::station::{LedgerEntry, StationRole};
use crate::track::{Axis, Position};
use crate::vehicle::{VehicleKind, VehicleStatus};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Track snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackSnapshot {
    pub id: String,
    pub axis: Axis,
    pub start: Position,
    pub end: Position,
    pub safety_distance: i32,
    pub vehicles: Vec<String>,
    pub stations: Vec<String>,
    /// Segments waiting for a vehicle.
    pub queued: usize,
    pub suspended: usize,
    /// Vehicle pairs flagged by the most recent conflict check.
    pub conflicts: Vec<(String, String)>,
}

// ---------------------------------------------------------------------------
// Vehicle snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VehicleSnapshot {
    pub id: String,
    pub kind: VehicleKind,
    pub track: String,
    pub position: Position,
    pub status: VehicleStatus,
    /// Registry name of the segment being executed.
    pub segment: Option<String>,
    /// Order whose goods the vehicle is carrying.
    pub carrying: Option<OrderNo>,
}

// ---------------------------------------------------------------------------
// Station snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StationSnapshot {
    pub id: String,
    pub role: StationRole,
    pub position: Position,
    /// Orders whose goods are here, in arrival order.
    pub goods: Vec<OrderNo>,
    pub ledger: Option<Vec<LedgerEntry>>,
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// One goods item with its station ledger, live or delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GoodsReport {
    pub goods_id: String,
    pub order_no: OrderNo,
    pub variant: RefineVariant,
    pub delivered: bool,
    /// Station or vehicle id currently holding the goods.
    pub location: String,
    pub visits: Vec<StationVisit>,
}

/// Schedule and progress of one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderReport {
    pub order_no: OrderNo,
    pub variant: RefineVariant,
    pub released: bool,
    pub latest_end: Ticks,
    pub progress: StageProgress,
}
