//! Legs and routed segments.
//!
//! A [`Leg`] is one decomposed transport stage of an order (origin to LF,
//! LF to caster, ...). The planner splits each leg into one or more
//! [`RoutedSegment`]s, one per vehicle hop. A leg owns its segments by key;
//! the scanner removes both once every segment is completed.

use crate::id::*;
use crate::sim::Ticks;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Leg
// ---------------------------------------------------------------------------

/// The transport stages an order can go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegKind {
    LdToLf,
    LdToRh,
    LfToRh,
    LfToCc,
    RhToCc,
}

impl LegKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LegKind::LdToLf => "ld_to_lf",
            LegKind::LdToRh => "ld_to_rh",
            LegKind::LfToRh => "lf_to_rh",
            LegKind::LfToCc => "lf_to_cc",
            LegKind::RhToCc => "rh_to_cc",
        }
    }
}

impl std::fmt::Display for LegKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One transport stage of an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leg {
    pub order_key: OrderKey,
    pub order_no: OrderNo,
    pub kind: LegKind,
    pub start: StationKey,
    pub end: StationKey,
    pub scheduled_start: Ticks,
    /// Nominal transit time in minutes.
    pub nominal_duration: u32,
    /// Clock value at which the split buffer emitted this leg.
    pub generated_at: Ticks,
    pub routed: bool,
    pub completed: bool,
    pub segments: Vec<SegmentKey>,
}

impl Leg {
    pub fn name_for(order_no: OrderNo, kind: LegKind) -> String {
        format!("leg_{order_no}_{kind}")
    }

    /// Scheduled start plus the nominal transit time.
    pub fn scheduled_end(&self) -> Ticks {
        self.scheduled_start + crate::sim::minutes(self.nominal_duration)
    }
}

// ---------------------------------------------------------------------------
// Routed segment
// ---------------------------------------------------------------------------

/// What a segment asks its vehicle to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    /// Carry the order's goods from start to end.
    Transport(LegKind),
    /// Reposition without cargo to clear the way for another vehicle.
    Avoid,
}

impl SegmentKind {
    pub fn is_avoid(self) -> bool {
        matches!(self, SegmentKind::Avoid)
    }

    pub fn label(self) -> &'static str {
        match self {
            SegmentKind::Transport(kind) => kind.as_str(),
            SegmentKind::Avoid => "avoid",
        }
    }
}

/// Lifecycle of a routed segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentStatus {
    /// Emitted by the planner, not yet on a track queue.
    Pending,
    /// On a track queue or bound to a vehicle.
    Assigned,
    Completed,
}

/// A vehicle-level piece of a leg, bound to one track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedSegment {
    pub order_no: OrderNo,
    /// Owning leg. `None` for standalone avoid moves.
    pub leg: Option<LegKey>,
    pub kind: SegmentKind,
    pub start: StationKey,
    pub end: StationKey,
    pub track: TrackKey,
    pub vehicle: VehicleKey,
    pub status: SegmentStatus,
    /// Set once the vehicle has dropped the goods at `end`.
    pub unloaded: bool,
    /// Position of this segment in its leg's hop sequence.
    pub hop: usize,
}

impl RoutedSegment {
    pub fn name_for(order_no: OrderNo, kind: SegmentKind, hop: usize) -> String {
        format!("segment_{order_no}_{}_{hop}", kind.label())
    }

    pub fn is_live(&self) -> bool {
        self.status != SegmentStatus::Completed
    }
}
