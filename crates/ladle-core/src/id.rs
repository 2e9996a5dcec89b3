use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies a released production order in the registry.
    pub struct OrderKey;

    /// Identifies one physical ladle lot.
    pub struct GoodsKey;

    /// Identifies a decomposed transport leg of an order.
    pub struct LegKey;

    /// Identifies a vehicle-level routed segment of a leg.
    pub struct SegmentKey;

    /// Identifies a track.
    pub struct TrackKey;

    /// Identifies a vehicle (crane or trolley).
    pub struct VehicleKey;

    /// Identifies a workstation.
    pub struct StationKey;
}

/// Production order number (PONO). Cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNo(pub u32);

impl std::fmt::Display for OrderNo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
